//! Generation gateway.
//!
//! The [`Generator`] trait is the seam between the control loop and the text
//! generator. Tests use scripted generators; production talks to an
//! OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::io::config::LlmConfig;

/// Prompt in, text out. One request per call and no internal retries.
pub trait Generator {
    fn propose(&self, prompt: &str) -> Result<String>;
}

impl<G: Generator + ?Sized> Generator for &G {
    fn propose(&self, prompt: &str) -> Result<String> {
        (**self).propose(prompt)
    }
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn propose(&self, prompt: &str) -> Result<String> {
        (**self).propose(prompt)
    }
}

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl ChatCompletionsGenerator {
    /// Build from config, reading the API key from `cfg.api_key_env`.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("read api key from ${}", cfg.api_key_env))?;
        Self::new(cfg, api_key)
    }

    pub fn new(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            api_key,
        })
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

impl Generator for ChatCompletionsGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = prompt.len()))]
    fn propose(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(prompt))
            .send()
            .context("send chat completion request")?;
        let status = response.status();
        let body = response.text().context("read chat completion body")?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat completion request failed");
            return Err(anyhow!(
                "chat completion failed with status {}: {}",
                status.as_u16(),
                truncate(&body, 300)
            ));
        }
        let content = parse_completion(&body)?;
        debug!(response_bytes = content.len(), "chat completion received");
        Ok(content)
    }
}

/// Extract `choices[0].message.content` from a completion body.
pub fn parse_completion(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).context("parse chat completion json")?;
    let content = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("chat completion missing choices[0].message.content"))?;
    Ok(content.trim().to_string())
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_completion_extracts_trimmed_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  SELECT 1\n"}}]}"#;
        assert_eq!(parse_completion(body).expect("content"), "SELECT 1");
    }

    #[test]
    fn parse_completion_rejects_missing_content() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("choices[0]"));
        assert!(parse_completion("not json").is_err());
    }

    #[test]
    fn payload_carries_model_and_temperature() {
        let generator =
            ChatCompletionsGenerator::new(&LlmConfig::default(), "key".to_string()).expect("new");
        let payload = generator.payload("hello");
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["temperature"], 0.0);
        assert_eq!(payload["messages"][0]["content"], "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}

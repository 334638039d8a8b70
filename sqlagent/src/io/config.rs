//! Agent configuration stored in `sqlagent.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::Policy;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "sqlagent.toml";

/// Agent configuration (TOML).
///
/// Missing sections and fields fall back to defaults, so an absent file is a
/// valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub policy: PolicyConfig,
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub schema: SchemaConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Corrections allowed within one strategy before escalating.
    pub max_retries_per_strategy: u32,
    /// Generation cycles allowed across all strategies.
    pub max_total_attempts: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let policy = Policy::default();
        Self {
            max_retries_per_strategy: policy.max_retries_per_strategy,
            max_total_attempts: policy.max_total_attempts,
        }
    }
}

impl PolicyConfig {
    pub fn policy(&self) -> Policy {
        Policy {
            max_retries_per_strategy: self.max_retries_per_strategy,
            max_total_attempts: self.max_total_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Wall-clock limit for one generator call.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Open the connection read-only.
    pub read_only: bool,
    /// Rows retained from a single execution.
    pub max_rows: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/sqlagent.db"),
            read_only: true,
            max_rows: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchemaConfig {
    /// Schema catalog file (YAML or JSON).
    pub path: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("schema/schema_summary.yaml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    /// Result rows shown to the validator.
    pub result_sample_rows: usize,
    /// Columns enumerated in correction prompts.
    pub max_listed_columns: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            result_sample_rows: 10,
            max_listed_columns: 50,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.policy.max_total_attempts == 0 {
            return Err(anyhow!("policy.max_total_attempts must be > 0"));
        }
        if self.policy.max_retries_per_strategy == 0 {
            return Err(anyhow!("policy.max_retries_per_strategy must be > 0"));
        }
        if self.llm.endpoint.trim().is_empty() {
            return Err(anyhow!("llm.endpoint must be non-empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("llm.temperature must be within 0.0..=2.0"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.database.max_rows == 0 {
            return Err(anyhow!("database.max_rows must be > 0"));
        }
        if self.prompt.result_sample_rows == 0 {
            return Err(anyhow!("prompt.result_sample_rows must be > 0"));
        }
        if self.prompt.max_listed_columns == 0 {
            return Err(anyhow!("prompt.max_listed_columns must be > 0"));
        }
        Ok(())
    }

    /// Resolve relative database and schema paths against `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.database.path.is_relative() {
            self.database.path = base.join(&self.database.path);
        }
        if self.schema.path.is_relative() {
            self.schema.path = base.join(&self.schema.path);
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.policy.policy(), Policy::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = AgentConfig::default();
        cfg.policy.max_total_attempts = 8;
        cfg.llm.model = "gpt-4o".to_string();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[policy]\nmax_total_attempts = 4\n").expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.policy.max_total_attempts, 4);
        assert_eq!(loaded.policy.max_retries_per_strategy, 2);
        assert_eq!(loaded.llm, LlmConfig::default());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[policy]\nmax_total_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_total_attempts"));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let cfg = AgentConfig::default().resolve_paths(Path::new("/srv/agent"));
        assert_eq!(cfg.database.path, PathBuf::from("/srv/agent/data/sqlagent.db"));
        assert_eq!(
            cfg.schema.path,
            PathBuf::from("/srv/agent/schema/schema_summary.yaml")
        );
    }
}

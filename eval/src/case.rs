//! Case file parsing and validation.
//!
//! Cases are TOML files naming one question and the checks its session
//! record must satisfy. See `eval/cases/` for examples.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

/// A parsed case file containing the question, policy overrides, and checks.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseFile {
    pub case: CaseMeta,
    #[serde(default)]
    pub policy: PolicyOverride,
    #[serde(default)]
    pub checks: Vec<Check>,
}

/// Case metadata: identifier and question.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    /// Question passed to the agent.
    pub question: String,
}

/// Budget overrides applied on top of the agent config.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PolicyOverride {
    pub max_retries_per_strategy: Option<u32>,
    pub max_total_attempts: Option<u32>,
}

/// Check applied to the session record after the agent answers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// The session ended with (or without) a validated answer.
    Valid { expect: bool },
    /// The final candidate did (or did not) execute.
    Executed { expect: bool },
    /// The session used at most `value` attempts.
    MaxAttempts { value: u32 },
    /// The final SQL contains `text` (case-insensitive).
    SqlContains { text: String },
    /// The response contains at least one of `any` (case-insensitive).
    ResponseContains { any: Vec<String> },
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load case {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.case.question.trim().is_empty() {
            bail!("case.question must be non-empty");
        }
        if self.policy.max_total_attempts == Some(0) {
            bail!("policy.max_total_attempts must be > 0");
        }
        if self.policy.max_retries_per_strategy == Some(0) {
            bail!("policy.max_retries_per_strategy must be > 0");
        }
        if self.checks.is_empty() {
            bail!("checks must be a non-empty array");
        }
        for (index, check) in self.checks.iter().enumerate() {
            check
                .validate()
                .with_context(|| format!("checks[{index}] invalid"))?;
        }
        Ok(())
    }
}

impl Check {
    fn validate(&self) -> Result<()> {
        match self {
            Check::SqlContains { text } if text.trim().is_empty() => {
                bail!("sql_contains.text must be non-empty");
            }
            Check::ResponseContains { any }
                if any.is_empty() || any.iter().any(|needle| needle.trim().is_empty()) =>
            {
                bail!("response_contains.any must be a non-empty array of non-empty strings");
            }
            Check::MaxAttempts { value: 0 } => bail!("max_attempts.value must be > 0"),
            _ => Ok(()),
        }
    }
}

/// Discover and load all case files from a directory.
///
/// Returns cases sorted by id. Errors if duplicate ids are found.
pub fn discover_cases(dir: &Path) -> Result<Vec<CaseFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read cases dir {}", dir.display()))? {
        let entry = entry.context("read case entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        cases.push(CaseFile::load(&path)?);
    }
    cases.sort_by(|left, right| left.case.id.cmp(&right.case.id));
    for pair in cases.windows(2) {
        if pair[0].case.id == pair[1].case.id {
            return Err(anyhow!("duplicate case.id {}", pair[0].case.id));
        }
    }
    Ok(cases)
}

fn validate_case_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("case.id must be non-empty");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("case.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_case() {
        let input = r#"
[case]
id = "top-products"
question = "Show me the top 5 most ordered products"

[policy]
max_total_attempts = 4

[[checks]]
type = "valid"
expect = true

[[checks]]
type = "max_attempts"
value = 2

[[checks]]
type = "response_contains"
any = ["clarification", "not available"]
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        assert_eq!(case.case.id, "top-products");
        assert_eq!(case.policy.max_total_attempts, Some(4));
        assert_eq!(case.policy.max_retries_per_strategy, None);
        assert_eq!(case.checks.len(), 3);
        assert_eq!(case.checks[1], Check::MaxAttempts { value: 2 });
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[case]
id = "bad/id"
question = "q"

[[checks]]
type = "valid"
expect = true
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn rejects_empty_response_needles() {
        let input = r#"
[case]
id = "empty-needles"
question = "q"

[[checks]]
type = "response_contains"
any = []
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid check");
        assert!(format!("{err:#}").contains("checks[0]"));
    }

    #[test]
    fn shipped_cases_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("cases");
        let cases = discover_cases(&dir).expect("cases");
        assert_eq!(cases.len(), 3);
    }
}

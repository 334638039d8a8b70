//! Check evaluation and outcome recording.
//!
//! Applies declarative checks to a finished session record and records each
//! outcome with the observed value so failed runs can be read without
//! reopening the session file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlagent::core::types::SessionResult;
use tracing::{debug, instrument};

use crate::case::Check;

/// Collected check outcomes for a run.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Judgment {
    pub checks: Vec<CheckOutcome>,
}

impl Judgment {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(CheckOutcome::passed)
    }
}

/// Result of evaluating a single check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckOutcome {
    Valid {
        expect: bool,
        actual: bool,
        passed: bool,
    },
    Executed {
        expect: bool,
        actual: bool,
        passed: bool,
    },
    MaxAttempts {
        value: u32,
        actual: u32,
        passed: bool,
    },
    SqlContains {
        text: String,
        sql: Option<String>,
        passed: bool,
    },
    ResponseContains {
        any: Vec<String>,
        passed: bool,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::Valid { passed, .. }
            | CheckOutcome::Executed { passed, .. }
            | CheckOutcome::MaxAttempts { passed, .. }
            | CheckOutcome::SqlContains { passed, .. }
            | CheckOutcome::ResponseContains { passed, .. } => *passed,
        }
    }

    /// Stable label used to aggregate pass rates across runs.
    pub fn label(&self) -> String {
        match self {
            CheckOutcome::Valid { expect, .. } => format!("valid({expect})"),
            CheckOutcome::Executed { expect, .. } => format!("executed({expect})"),
            CheckOutcome::MaxAttempts { value, .. } => format!("max_attempts({value})"),
            CheckOutcome::SqlContains { text, .. } => format!("sql_contains({text})"),
            CheckOutcome::ResponseContains { any, .. } => {
                format!("response_contains({})", any.join("|"))
            }
        }
    }
}

/// Evaluate all checks against the session record.
#[instrument(skip_all, fields(check_count = checks.len()))]
pub fn run_checks(checks: &[Check], session: &SessionResult) -> Judgment {
    let outcomes: Vec<CheckOutcome> = checks
        .iter()
        .map(|check| {
            let outcome = evaluate(check, session);
            debug!(check = %outcome.label(), passed = outcome.passed(), "check result");
            outcome
        })
        .collect();
    Judgment { checks: outcomes }
}

fn evaluate(check: &Check, session: &SessionResult) -> CheckOutcome {
    match check {
        Check::Valid { expect } => CheckOutcome::Valid {
            expect: *expect,
            actual: session.valid,
            passed: session.valid == *expect,
        },
        Check::Executed { expect } => CheckOutcome::Executed {
            expect: *expect,
            actual: session.executed,
            passed: session.executed == *expect,
        },
        Check::MaxAttempts { value } => CheckOutcome::MaxAttempts {
            value: *value,
            actual: session.total_attempts,
            passed: session.total_attempts <= *value,
        },
        Check::SqlContains { text } => {
            let needle = text.to_lowercase();
            let passed = session
                .sql
                .as_deref()
                .is_some_and(|sql| sql.to_lowercase().contains(&needle));
            CheckOutcome::SqlContains {
                text: text.clone(),
                sql: session.sql.clone(),
                passed,
            }
        }
        Check::ResponseContains { any } => {
            let response = session.nl_response.to_lowercase();
            let passed = any
                .iter()
                .any(|needle| response.contains(&needle.to_lowercase()));
            CheckOutcome::ResponseContains {
                any: any.clone(),
                passed,
            }
        }
    }
}

pub fn write_judgment(path: &Path, judgment: &Judgment) -> Result<()> {
    let contents = serde_json::to_string_pretty(judgment).context("serialize checks")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(valid: bool, response: &str) -> SessionResult {
        SessionResult {
            question: "Which department has the most products?".to_string(),
            sql: Some(
                "select d.department, count(*) as n from products p join departments d \
                 on p.department_id = d.department_id group by d.department order by n desc limit 1"
                    .to_string(),
            ),
            nl_response: response.to_string(),
            valid,
            executed: true,
            results: None,
            total_attempts: 2,
            attempted_strategies: Vec::new(),
            failure_type: None,
            planned_tables: Vec::new(),
            transcript: Vec::new(),
        }
    }

    #[test]
    fn flags_checks_against_session() {
        let checks = vec![
            Check::Valid { expect: true },
            Check::Executed { expect: true },
            Check::MaxAttempts { value: 1 },
            Check::SqlContains {
                text: "DEPARTMENT".to_string(),
            },
        ];
        let judgment = run_checks(&checks, &session(true, "Produce has the most products."));
        let passed: Vec<bool> = judgment.checks.iter().map(CheckOutcome::passed).collect();
        assert_eq!(passed, vec![true, true, false, true]);
        assert!(!judgment.all_passed());
        assert_eq!(
            judgment.checks[2],
            CheckOutcome::MaxAttempts {
                value: 1,
                actual: 2,
                passed: false,
            }
        );
    }

    #[test]
    fn response_contains_matches_any_needle() {
        let checks = vec![Check::ResponseContains {
            any: vec!["clarification".to_string(), "not available".to_string()],
        }];
        let session = session(false, "I need some Clarification to answer this.");
        assert!(run_checks(&checks, &session).all_passed());
    }

    #[test]
    fn sql_contains_fails_without_sql() {
        let mut session = session(false, "");
        session.sql = None;
        let checks = vec![Check::SqlContains {
            text: "select".to_string(),
        }];
        assert!(!run_checks(&checks, &session).all_passed());
    }
}

//! Shared deterministic types for the agent core.
//!
//! These types define stable contracts between the control loop, the policy,
//! and the gateways. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SQL-generation approach in effect for a generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// First generation straight from the question and active schema.
    Direct,
    /// Repair of the previous candidate given its failure reason.
    Correct,
    /// Structurally simpler query, single table preferred.
    Simplified,
    /// Different table or aggregation approach.
    Alternative,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Correct => "correct",
            Strategy::Simplified => "simplified",
            Strategy::Alternative => "alternative",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed classification produced by failure analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    SyntaxError,
    NoResults,
    ExecutionError,
    SemanticError,
    Unknown,
}

impl FailureType {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureType::SyntaxError => "syntax_error",
            FailureType::NoResults => "no_results",
            FailureType::ExecutionError => "execution_error",
            FailureType::SemanticError => "semantic_error",
            FailureType::Unknown => "unknown",
        }
    }
}

/// Which component produced the current failure.
///
/// Structural causes come from the safety filter and the execution gateway.
/// `Rejected` and `VerdictUnreadable` carry generator-authored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Unsafe,
    Execution,
    EmptyResult,
    Rejected,
    VerdictUnreadable,
}

/// Named step of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Planning,
    GenerateSql,
    ValidateSyntax,
    Execute,
    ValidateAndRespond,
    AnalyzeFailure,
    EscalationDecision,
    CorrectSql,
    GenerateSimplified,
    GenerateAlternative,
    AskClarification,
}

impl Step {
    /// Steps that produce a new candidate and consume one unit of budget.
    pub fn is_generation(self) -> bool {
        matches!(
            self,
            Step::GenerateSql | Step::CorrectSql | Step::GenerateSimplified | Step::GenerateAlternative
        )
    }
}

/// Row set returned by a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First `limit` rows, each as a column-name keyed object.
    pub fn sample(&self, limit: usize) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Combined result-validation verdict and drafted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub valid: bool,
    #[serde(default = "default_verdict_reason")]
    pub reason: String,
    #[serde(default = "default_verdict_response")]
    pub natural_language_response: String,
}

fn default_verdict_reason() -> String {
    "Unknown validation failure".to_string()
}

fn default_verdict_response() -> String {
    "Unable to generate response.".to_string()
}

/// One recorded transition of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub step: Step,
    pub total_attempts: u32,
    pub retries_in_strategy: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Structured record returned to whoever invoked the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub question: String,
    pub sql: Option<String>,
    pub nl_response: String,
    pub valid: bool,
    pub executed: bool,
    pub results: Option<Rows>,
    pub total_attempts: u32,
    pub attempted_strategies: Vec<Strategy>,
    pub failure_type: Option<FailureType>,
    pub planned_tables: Vec<String>,
    pub transcript: Vec<TransitionRecord>,
}

impl SessionResult {
    pub fn answered(&self) -> bool {
        self.valid && self.executed
    }
}

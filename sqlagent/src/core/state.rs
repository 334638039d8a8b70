//! Per-question session state owned by the control loop.
//!
//! Counters only move forward through the methods here: `total_attempts`
//! never decreases and `attempted_strategies` only gains distinct entries.

use crate::core::schema::SchemaCatalog;
use crate::core::types::{
    FailureCause, FailureType, Rows, SessionResult, Step, Strategy, TransitionRecord,
};

/// A failure recorded by the step that detected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub cause: FailureCause,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub question: String,
    pub planned_tables: Vec<String>,
    pub active_schema: SchemaCatalog,
    pub candidate_sql: Option<String>,
    pub syntax_valid: bool,
    pub executed: bool,
    pub result_valid: bool,
    pub failure: Option<Failure>,
    pub failure_type: Option<FailureType>,
    pub results: Option<Rows>,
    pub nl_response: Option<String>,
    pub current_strategy: Strategy,
    retries_in_strategy: u32,
    total_attempts: u32,
    attempted_strategies: Vec<Strategy>,
    transcript: Vec<TransitionRecord>,
}

impl SessionState {
    pub fn new(question: impl Into<String>, full_schema: SchemaCatalog) -> Self {
        Self {
            question: question.into(),
            planned_tables: Vec::new(),
            active_schema: full_schema,
            candidate_sql: None,
            syntax_valid: false,
            executed: false,
            result_valid: false,
            failure: None,
            failure_type: None,
            results: None,
            nl_response: None,
            current_strategy: Strategy::Direct,
            retries_in_strategy: 0,
            total_attempts: 0,
            attempted_strategies: Vec::new(),
            transcript: Vec::new(),
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    pub fn retries_in_strategy(&self) -> u32 {
        self.retries_in_strategy
    }

    pub fn attempted_strategies(&self) -> &[Strategy] {
        &self.attempted_strategies
    }

    pub fn has_attempted(&self, strategy: Strategy) -> bool {
        self.attempted_strategies.contains(&strategy)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.reason.as_str())
    }

    /// Install a freshly generated candidate and invalidate every checkpoint.
    ///
    /// Counts one attempt. `Correct` bumps the per-strategy retry counter;
    /// `Simplified` and `Alternative` adopt a new strategy and reset it.
    pub fn begin_attempt(&mut self, strategy: Strategy, sql: String) {
        self.candidate_sql = Some(sql);
        self.results = None;
        self.syntax_valid = false;
        self.executed = false;
        self.result_valid = false;
        self.total_attempts += 1;

        match strategy {
            Strategy::Direct => {}
            Strategy::Correct => {
                self.retries_in_strategy += 1;
                self.record_strategy(Strategy::Correct);
            }
            Strategy::Simplified | Strategy::Alternative => {
                self.retries_in_strategy = 0;
                self.current_strategy = strategy;
                self.record_strategy(strategy);
            }
        }
    }

    pub fn fail(&mut self, cause: FailureCause, reason: impl Into<String>) {
        self.failure = Some(Failure {
            cause,
            reason: reason.into(),
        });
    }

    pub fn clear_failure(&mut self) {
        self.failure = None;
    }

    pub fn record(&mut self, step: Step, note: Option<String>) {
        self.transcript.push(TransitionRecord {
            step,
            total_attempts: self.total_attempts,
            retries_in_strategy: self.retries_in_strategy,
            note,
        });
    }

    fn record_strategy(&mut self, strategy: Strategy) {
        if !self.has_attempted(strategy) {
            self.attempted_strategies.push(strategy);
        }
    }

    pub fn into_result(self) -> SessionResult {
        let valid = self.result_valid && self.executed;
        SessionResult {
            question: self.question,
            sql: self.candidate_sql,
            nl_response: self.nl_response.unwrap_or_default(),
            valid,
            executed: self.executed,
            results: self.results,
            total_attempts: self.total_attempts,
            attempted_strategies: self.attempted_strategies,
            failure_type: self.failure_type,
            planned_tables: self.planned_tables,
            transcript: self.transcript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("q", SchemaCatalog::default())
    }

    #[test]
    fn attempts_only_move_forward() {
        let mut state = state();
        state.begin_attempt(Strategy::Direct, "select 1".to_string());
        state.begin_attempt(Strategy::Correct, "select 2".to_string());
        state.begin_attempt(Strategy::Simplified, "select 3".to_string());
        assert_eq!(state.total_attempts(), 3);
        assert_eq!(state.retries_in_strategy(), 0);
        assert_eq!(state.current_strategy, Strategy::Simplified);
    }

    #[test]
    fn correct_is_recorded_once() {
        let mut state = state();
        state.begin_attempt(Strategy::Correct, "a".to_string());
        state.begin_attempt(Strategy::Correct, "b".to_string());
        assert_eq!(state.attempted_strategies(), &[Strategy::Correct]);
        assert_eq!(state.retries_in_strategy(), 2);
    }

    #[test]
    fn new_candidate_resets_checkpoints() {
        let mut state = state();
        state.syntax_valid = true;
        state.executed = true;
        state.result_valid = true;
        state.begin_attempt(Strategy::Alternative, "select 1".to_string());
        assert!(!state.syntax_valid && !state.executed && !state.result_valid);
        assert_eq!(state.attempted_strategies(), &[Strategy::Alternative]);
    }
}

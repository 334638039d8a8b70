//! Routing and escalation policy for the control loop.
//!
//! Everything here is a pure function of the session state and the two
//! budget knobs. The escalation ladder is: direct correction, simplification,
//! alternative approach, then handing the question back to the user.

use crate::core::state::SessionState;
use crate::core::types::{FailureCause, FailureType, Step, Strategy};

/// Attempts after which simplification becomes eligible.
pub const SIMPLIFY_AFTER_ATTEMPTS: u32 = 2;
/// Attempts after which the alternative approach becomes eligible.
pub const ALTERNATIVE_AFTER_ATTEMPTS: u32 = 4;

/// Budget knobs for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_retries_per_strategy: u32,
    pub max_total_attempts: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_retries_per_strategy: 2,
            max_total_attempts: 6,
        }
    }
}

impl Policy {
    /// Upper bound on transitions in one session.
    ///
    /// Each attempt costs at most four transitions (generate, validate syntax,
    /// execute, validate result) plus analysis and decision; planning and the
    /// terminal step add a constant.
    pub fn transition_limit(&self) -> usize {
        4 + 6 * self.max_total_attempts as usize
    }

    /// Next step after the safety filter ran.
    pub fn after_syntax_check(&self, state: &SessionState) -> Step {
        if state.syntax_valid {
            return Step::Execute;
        }
        self.retry_or_analyze(state)
    }

    /// Next step after the execution gateway ran.
    pub fn after_execution(&self, state: &SessionState) -> Step {
        if state.executed {
            return Step::ValidateAndRespond;
        }
        self.retry_or_analyze(state)
    }

    /// Next step after result validation; `None` means the session succeeded.
    pub fn after_validation(&self, state: &SessionState) -> Option<Step> {
        if state.result_valid {
            None
        } else {
            Some(Step::AnalyzeFailure)
        }
    }

    /// Direct correction while the current strategy and the global budget
    /// both have room; otherwise hand the failure to the escalation policy.
    fn retry_or_analyze(&self, state: &SessionState) -> Step {
        if state.retries_in_strategy() < self.max_retries_per_strategy
            && state.total_attempts() < self.max_total_attempts
        {
            Step::CorrectSql
        } else {
            Step::AnalyzeFailure
        }
    }

    /// Choose the next strategy after a failure has been analysed.
    ///
    /// Evaluated in order; the budget ceiling takes precedence over everything.
    pub fn escalate(&self, total_attempts: u32, attempted: &[Strategy]) -> Step {
        if total_attempts >= self.max_total_attempts {
            return Step::AskClarification;
        }
        if !attempted.contains(&Strategy::Simplified) && total_attempts >= SIMPLIFY_AFTER_ATTEMPTS {
            return Step::GenerateSimplified;
        }
        if !attempted.contains(&Strategy::Alternative)
            && total_attempts >= ALTERNATIVE_AFTER_ATTEMPTS
        {
            return Step::GenerateAlternative;
        }
        if total_attempts < self.max_total_attempts.saturating_sub(1) {
            return Step::CorrectSql;
        }
        Step::AskClarification
    }
}

/// Classify the current failure.
///
/// Structural causes map directly. Generator-authored reasons fall back to
/// ordered keyword matching (first match wins), then to semantic or unknown.
pub fn classify_failure(state: &SessionState) -> FailureType {
    let Some(failure) = &state.failure else {
        return FailureType::Unknown;
    };
    match failure.cause {
        FailureCause::Unsafe => FailureType::SyntaxError,
        FailureCause::Execution => FailureType::ExecutionError,
        FailureCause::EmptyResult => FailureType::NoResults,
        FailureCause::Rejected | FailureCause::VerdictUnreadable => {
            classify_reason(&failure.reason, state.executed)
        }
    }
}

/// Keyword classifier over free-text failure reasons.
pub fn classify_reason(reason: &str, executed: bool) -> FailureType {
    let reason = reason.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| reason.contains(needle));

    if mentions(&["syntax", "invalid"]) {
        FailureType::SyntaxError
    } else if mentions(&["no results", "empty"]) {
        FailureType::NoResults
    } else if mentions(&["execution", "does not exist"]) {
        FailureType::ExecutionError
    } else if executed {
        FailureType::SemanticError
    } else {
        FailureType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SchemaCatalog;

    fn policy() -> Policy {
        Policy::default()
    }

    #[test]
    fn budget_ceiling_wins_over_everything() {
        assert_eq!(policy().escalate(6, &[]), Step::AskClarification);
        assert_eq!(policy().escalate(9, &[Strategy::Correct]), Step::AskClarification);
    }

    #[test]
    fn simplify_before_correcting_at_two_attempts() {
        assert_eq!(policy().escalate(2, &[]), Step::GenerateSimplified);
        assert_eq!(policy().escalate(2, &[Strategy::Correct]), Step::GenerateSimplified);
    }

    #[test]
    fn correct_while_too_early_to_escalate() {
        assert_eq!(policy().escalate(1, &[]), Step::CorrectSql);
        assert_eq!(
            policy().escalate(3, &[Strategy::Simplified]),
            Step::CorrectSql
        );
    }

    #[test]
    fn alternative_after_simplified_at_four_attempts() {
        assert_eq!(
            policy().escalate(4, &[Strategy::Correct, Strategy::Simplified]),
            Step::GenerateAlternative
        );
    }

    #[test]
    fn gives_up_on_last_attempt_when_ladder_exhausted() {
        let tried = [Strategy::Correct, Strategy::Simplified, Strategy::Alternative];
        assert_eq!(policy().escalate(4, &tried), Step::CorrectSql);
        assert_eq!(policy().escalate(5, &tried), Step::AskClarification);
    }

    #[test]
    fn routes_to_analysis_when_strategy_retries_are_spent() {
        let mut state = SessionState::new("q", SchemaCatalog::default());
        state.begin_attempt(Strategy::Direct, "x".to_string());
        assert_eq!(policy().after_syntax_check(&state), Step::CorrectSql);
        state.begin_attempt(Strategy::Correct, "x".to_string());
        state.begin_attempt(Strategy::Correct, "x".to_string());
        assert_eq!(policy().after_syntax_check(&state), Step::AnalyzeFailure);
        assert_eq!(policy().after_execution(&state), Step::AnalyzeFailure);
    }

    #[test]
    fn routes_to_analysis_when_global_budget_is_spent() {
        let tight = Policy {
            max_retries_per_strategy: 5,
            max_total_attempts: 1,
        };
        let mut state = SessionState::new("q", SchemaCatalog::default());
        state.begin_attempt(Strategy::Direct, "x".to_string());
        assert_eq!(tight.after_execution(&state), Step::AnalyzeFailure);
    }

    #[test]
    fn keyword_classifier_is_first_match() {
        assert_eq!(
            classify_reason("Invalid column: execution failed", true),
            FailureType::SyntaxError
        );
        assert_eq!(
            classify_reason("The result set is empty", true),
            FailureType::NoResults
        );
        assert_eq!(
            classify_reason("relation \"x\" does not exist", false),
            FailureType::ExecutionError
        );
        assert_eq!(
            classify_reason("Counts departments, question asks about aisles", true),
            FailureType::SemanticError
        );
        assert_eq!(classify_reason("odd", false), FailureType::Unknown);
    }

    #[test]
    fn structural_causes_skip_keyword_matching() {
        let mut state = SessionState::new("q", SchemaCatalog::default());
        state.fail(FailureCause::Execution, "Execution error: invalid syntax near x");
        assert_eq!(classify_failure(&state), FailureType::ExecutionError);
        state.fail(FailureCause::Unsafe, "Multiple SQL statements detected");
        assert_eq!(classify_failure(&state), FailureType::SyntaxError);
        state.fail(FailureCause::EmptyResult, "No results to validate");
        assert_eq!(classify_failure(&state), FailureType::NoResults);
    }
}

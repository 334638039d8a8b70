use serde::{Deserialize, Serialize};

use crate::judge::Judgment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
    Error,
}

/// `None` judgment means the agent could not be set up for the run.
pub fn classify_outcome(judgment: Option<&Judgment>) -> Outcome {
    match judgment {
        Some(judgment) if judgment.all_passed() => Outcome::Success,
        Some(_) => Outcome::Fail,
        None => Outcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::CheckOutcome;

    fn judgment(pass: bool) -> Judgment {
        Judgment {
            checks: vec![CheckOutcome::Valid {
                expect: true,
                actual: pass,
                passed: pass,
            }],
        }
    }

    #[test]
    fn success_when_checks_pass() {
        assert_eq!(classify_outcome(Some(&judgment(true))), Outcome::Success);
    }

    #[test]
    fn fail_when_a_check_fails() {
        assert_eq!(classify_outcome(Some(&judgment(false))), Outcome::Fail);
    }

    #[test]
    fn error_when_agent_never_ran() {
        assert_eq!(classify_outcome(None), Outcome::Error);
    }
}

//! Agent configuration merging.
//!
//! Applies case-specific policy overrides to the loaded agent config.

use anyhow::Result;
use sqlagent::io::config::AgentConfig;

use crate::case::PolicyOverride;

/// Apply case policy overrides to the base agent config.
pub fn apply_case_policy(mut base: AgentConfig, overrides: &PolicyOverride) -> Result<AgentConfig> {
    if let Some(max_total_attempts) = overrides.max_total_attempts {
        base.policy.max_total_attempts = max_total_attempts;
    }
    if let Some(max_retries_per_strategy) = overrides.max_retries_per_strategy {
        base.policy.max_retries_per_strategy = max_retries_per_strategy;
    }
    base.validate()?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_policy_when_no_override() {
        let base = AgentConfig::default();
        let merged = apply_case_policy(base.clone(), &PolicyOverride::default()).expect("merge");
        assert_eq!(merged, base);
    }

    #[test]
    fn applies_budget_override() {
        let overrides = PolicyOverride {
            max_retries_per_strategy: Some(1),
            max_total_attempts: None,
        };
        let merged = apply_case_policy(AgentConfig::default(), &overrides).expect("merge");
        assert_eq!(merged.policy.max_retries_per_strategy, 1);
        assert_eq!(merged.policy.max_total_attempts, 6);
    }
}

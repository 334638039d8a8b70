//! Case execution orchestration.
//!
//! Coordinates agent setup, the session itself, checks, and result capture.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlagent::agent::SqlAgent;
use sqlagent::io::config::AgentConfig;
use sqlagent::io::database::Database;
use sqlagent::io::generator::Generator;
use tracing::{debug, info, instrument, warn};

use crate::case::CaseFile;
use crate::config::apply_case_policy;
use crate::judge::{Judgment, run_checks, write_judgment};
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{CaptureInput, capture_results, reserve_run_dir, update_outcome};

/// Result of running a single case.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this eval run.
    pub eval_run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    /// Classified outcome.
    pub outcome: Outcome,
}

/// Run a case against the production gateways described by `base`.
pub fn run_case(
    results_base: &Path,
    base: &AgentConfig,
    case_path: &Path,
    case: &CaseFile,
) -> Result<RunOutcome> {
    let cfg = apply_case_policy(base.clone(), &case.policy).context("apply case policy")?;
    let agent = SqlAgent::from_config(&cfg);
    run_case_with(results_base, &cfg.llm.model, case_path, case, agent)
}

/// Run a case end-to-end with an already constructed agent.
///
/// A setup failure is recorded as an `error` outcome rather than aborting, so
/// a report still shows the run.
#[instrument(skip_all, fields(case_id = %case.case.id))]
pub fn run_case_with<G: Generator, D: Database>(
    results_base: &Path,
    model: &str,
    case_path: &Path,
    case: &CaseFile,
    agent: Result<SqlAgent<G, D>>,
) -> Result<RunOutcome> {
    info!("case run started");
    let started_at = Utc::now();
    let stamp = format!("eval-{}", started_at.format("%Y%m%d_%H%M%S%3f"));
    let (eval_run_id, _) =
        reserve_run_dir(results_base, &case.case.id, &stamp).context("reserve run dir")?;

    let (session, setup_error) = match agent {
        Ok(mut agent) => (Some(agent.ask(&case.case.question)), None),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "agent setup failed");
            (None, Some(format!("agent setup: {err:#}")))
        }
    };
    let finished_at = Utc::now();
    info!(
        duration_secs = (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
        "session finished"
    );

    debug!("capturing results");
    let capture_input = CaptureInput {
        case_id: &case.case.id,
        case_path,
        eval_run_id: &eval_run_id,
        model,
        session: session.as_ref(),
        setup_error,
        started_at,
        finished_at,
    };
    let results_dir = capture_results(results_base, &capture_input).context("capture results")?;

    debug!("running checks");
    let judgment = session
        .as_ref()
        .map(|session| run_checks(&case.checks, session));
    write_judgment(
        &results_dir.join("checks.json"),
        judgment.as_ref().unwrap_or(&Judgment::default()),
    )
    .context("write checks")?;

    let outcome = classify_outcome(judgment.as_ref());
    update_outcome(&results_dir, outcome).context("update outcome")?;

    info!(outcome = ?outcome, results_dir = %results_dir.display(), "case run complete");

    Ok(RunOutcome {
        eval_run_id,
        results_dir,
        outcome,
    })
}

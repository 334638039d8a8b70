//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result, bail};
use sqlagent::io::config::AgentConfig;
use tracing::{debug, info};

use crate::case::{CaseFile, discover_cases};
use crate::report::aggregate;
use crate::run::run_case;

/// List all available cases.
pub fn list_cases(eval_root: &Path) -> Result<()> {
    let cases = discover_cases(&eval_root.join("cases"))?;
    for case in cases {
        println!("{}\t{}", case.case.id, case.case.question);
    }
    Ok(())
}

/// Run a case by id (optionally multiple times).
pub fn run_case_by_id(eval_root: &Path, cfg: &AgentConfig, case_id: &str, runs: u32) -> Result<()> {
    let case_path = eval_root.join("cases").join(format!("{case_id}.toml"));
    if !case_path.exists() {
        bail!("case {} not found at {}", case_id, case_path.display());
    }
    let case = CaseFile::load(&case_path).context("load case")?;
    debug!(case_id, runs, "case loaded");

    let results_base = eval_root.join("results");
    info!(case_id, runs, "starting runs");
    for run_num in 1..=runs {
        debug!(case_id, run_num, runs, "starting run");
        let outcome = run_case(&results_base, cfg, &case_path, &case).context("run case")?;
        println!(
            "run: case={} eval_run_id={} outcome={:?} results={}",
            case_id,
            outcome.eval_run_id,
            outcome.outcome,
            outcome.results_dir.display()
        );
    }
    Ok(())
}

/// Show aggregated results for a case.
pub fn report_case(eval_root: &Path, case_id: &str) -> Result<()> {
    let (summary, warnings) = aggregate(&eval_root.join("results").join(case_id))?;
    println!("report: case={} runs={}", case_id, summary.runs);
    println!(
        "report: success={} fail={} error={}",
        summary.success, summary.fail, summary.error
    );
    if let Some(avg) = summary.avg_attempts {
        println!("report: avg_attempts={avg:.2}");
    }
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={avg:.2}");
    }
    for (label, (passed, total)) in summary.check_pass_rates {
        println!("report: check {label} {passed}/{total}");
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

/// Remove stored results for a case.
pub fn clean_case(eval_root: &Path, case_id: &str) -> Result<()> {
    let case_results = eval_root.join("results").join(case_id);
    if case_results.exists() {
        std::fs::remove_dir_all(&case_results)
            .with_context(|| format!("remove {}", case_results.display()))?;
    }
    println!("clean: case={} results={}", case_id, case_results.display());
    Ok(())
}

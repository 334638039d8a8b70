use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::judge::Judgment;
use crate::outcome::Outcome;
use crate::results::read_meta;

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub success: usize,
    pub fail: usize,
    pub error: usize,
    pub avg_duration_secs: Option<f64>,
    /// Mean attempts over runs that produced a session.
    pub avg_attempts: Option<f64>,
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
}

pub fn load_run_dirs(case_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !case_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(case_results_dir)
        .with_context(|| format!("read {}", case_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(case_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut attempts = Vec::new();
    let mut durations = Vec::new();

    for run_dir in load_run_dirs(case_results_dir)? {
        let meta = match read_meta(&run_dir.join("meta.json")) {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err})",
                    run_dir.display()
                ));
                continue;
            }
        };

        let checks_path = run_dir.join("checks.json");
        let judgment: Judgment = match fs::read_to_string(&checks_path)
            .with_context(|| format!("read {}", checks_path.display()))
            .and_then(|contents| serde_json::from_str(&contents).context("parse checks"))
        {
            Ok(checks) => checks,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: checks.json invalid ({err})",
                    run_dir.display()
                ));
                continue;
            }
        };

        summary.runs += 1;
        match meta.outcome {
            Some(Outcome::Success) => summary.success += 1,
            Some(Outcome::Fail) => summary.fail += 1,
            Some(Outcome::Error) | None => summary.error += 1,
        }
        durations.push(meta.duration_secs);
        if let Some(total_attempts) = meta.total_attempts {
            attempts.push(f64::from(total_attempts));
        }

        for check in &judgment.checks {
            let entry = summary.check_pass_rates.entry(check.label()).or_insert((0, 0));
            if check.passed() {
                entry.0 += 1;
            }
            entry.1 += 1;
        }
    }

    summary.avg_duration_secs = mean(&durations);
    summary.avg_attempts = mean(&attempts);
    Ok((summary, warnings))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::CheckOutcome;
    use crate::results::EvalMeta;
    use tempfile::tempdir;

    fn write_meta(path: &Path, outcome: Outcome, duration: f64, attempts: Option<u32>) {
        let meta = EvalMeta {
            case_id: "case".to_string(),
            eval_run_id: "run".to_string(),
            case_hash: "hash".to_string(),
            model: "gpt-4o-mini".to_string(),
            outcome: Some(outcome),
            start_time: "now".to_string(),
            end_time: "later".to_string(),
            duration_secs: duration,
            total_attempts: attempts,
            valid: attempts.map(|_| outcome == Outcome::Success),
            errors: Vec::new(),
        };
        let contents = serde_json::to_string_pretty(&meta).expect("meta json");
        fs::write(path, format!("{contents}\n")).expect("write meta");
    }

    fn write_checks(path: &Path, passed: bool) {
        let judgment = Judgment {
            checks: vec![CheckOutcome::Valid {
                expect: true,
                actual: passed,
                passed,
            }],
        };
        let contents = serde_json::to_string_pretty(&judgment).expect("checks json");
        fs::write(path, format!("{contents}\n")).expect("write checks");
    }

    #[test]
    fn aggregates_runs() {
        let temp = tempdir().expect("tempdir");
        for name in ["run1", "run2", "run3"] {
            fs::create_dir_all(temp.path().join(name)).expect("run dir");
        }
        let run = |name: &str| temp.path().join(name);

        write_meta(&run("run1").join("meta.json"), Outcome::Success, 5.0, Some(1));
        write_checks(&run("run1").join("checks.json"), true);
        write_meta(&run("run2").join("meta.json"), Outcome::Fail, 15.0, Some(5));
        write_checks(&run("run2").join("checks.json"), false);
        write_meta(&run("run3").join("meta.json"), Outcome::Error, 1.0, None);
        fs::write(run("run3").join("checks.json"), "{\"checks\": []}\n").expect("checks");

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert!(warnings.is_empty());
        assert_eq!(summary.runs, 3);
        assert_eq!((summary.success, summary.fail, summary.error), (1, 1, 1));
        assert_eq!(summary.avg_duration_secs, Some(7.0));
        assert_eq!(summary.avg_attempts, Some(3.0));
        assert_eq!(
            summary.check_pass_rates.get("valid(true)"),
            Some(&(1, 2))
        );
    }

    #[test]
    fn skips_runs_with_broken_meta() {
        let temp = tempdir().expect("tempdir");
        let run = temp.path().join("run1");
        fs::create_dir_all(&run).expect("run dir");
        fs::write(run.join("meta.json"), "not json").expect("meta");

        let (summary, warnings) = aggregate(temp.path()).expect("aggregate");
        assert_eq!(summary.runs, 0);
        assert_eq!(warnings.len(), 1);
    }
}

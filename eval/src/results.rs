//! Result capture and persistence.
//!
//! Writes the session record and run metadata to the results directory for
//! later aggregation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlagent::core::types::SessionResult;
use sqlagent::io::transcript::write_transcript;
use tracing::{debug, instrument, warn};

use crate::outcome::Outcome;

/// Input for capturing results from a completed run.
#[derive(Debug)]
pub struct CaptureInput<'a> {
    pub case_id: &'a str,
    pub case_path: &'a Path,
    pub eval_run_id: &'a str,
    pub model: &'a str,
    pub session: Option<&'a SessionResult>,
    pub setup_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Metadata for an eval run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvalMeta {
    pub case_id: String,
    pub eval_run_id: String,
    /// SHA-256 hash of the case file for reproducibility tracking.
    pub case_hash: String,
    pub model: String,
    pub outcome: Option<Outcome>,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub total_attempts: Option<u32>,
    pub valid: Option<bool>,
    /// Non-fatal errors encountered during the run or capture.
    pub errors: Vec<String>,
}

/// Capture results from a completed run to the results directory.
#[instrument(skip_all, fields(case_id = %input.case_id, eval_run_id = %input.eval_run_id))]
pub fn capture_results(base_dir: &Path, input: &CaptureInput<'_>) -> Result<PathBuf> {
    let results_dir = results_dir(base_dir, input.case_id, input.eval_run_id);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;

    let mut errors: Vec<String> = input.setup_error.iter().cloned().collect();

    let case_hash = match file_sha256(input.case_path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("case hash: {err}"));
            String::new()
        }
    };

    if let Some(session) = input.session
        && let Err(err) = write_transcript(&results_dir.join("session.json"), session)
    {
        errors.push(format!("session.json: {err:#}"));
    }

    if !errors.is_empty() {
        warn!(errors = ?errors, "run had errors");
    }

    let duration = input.finished_at - input.started_at;
    let meta = EvalMeta {
        case_id: input.case_id.to_string(),
        eval_run_id: input.eval_run_id.to_string(),
        case_hash,
        model: input.model.to_string(),
        outcome: None,
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        total_attempts: input.session.map(|session| session.total_attempts),
        valid: input.session.map(|session| session.valid),
        errors,
    };

    write_meta(&results_dir.join("meta.json"), &meta)?;
    debug!(results_dir = %results_dir.display(), "results captured");
    Ok(results_dir)
}

pub fn update_outcome(results_dir: &Path, outcome: Outcome) -> Result<()> {
    let meta_path = results_dir.join("meta.json");
    let mut meta = read_meta(&meta_path)?;
    meta.outcome = Some(outcome);
    write_meta(&meta_path, &meta)?;
    Ok(())
}

pub fn read_meta(path: &Path) -> Result<EvalMeta> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).context("parse meta")
}

/// Claim a fresh results directory for `stamp`, suffixing `-2`, `-3`, ...
/// when an earlier run already owns it. Returns the eval run id and the path.
pub fn reserve_run_dir(base_dir: &Path, case_id: &str, stamp: &str) -> Result<(String, PathBuf)> {
    let case_dir = base_dir.join(case_id);
    fs::create_dir_all(&case_dir)
        .with_context(|| format!("create results dir {}", case_dir.display()))?;
    for attempt in 1u32.. {
        let eval_run_id = if attempt == 1 {
            stamp.to_string()
        } else {
            format!("{stamp}-{attempt}")
        };
        let dir = case_dir.join(&eval_run_id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((eval_run_id, dir)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("create run dir {}", dir.display()));
            }
        }
    }
    bail!("no free run directory for {stamp}")
}

pub fn results_dir(base_dir: &Path, case_id: &str, eval_run_id: &str) -> PathBuf {
    base_dir.join(case_id).join(eval_run_id)
}

fn write_meta(path: &Path, meta: &EvalMeta) -> Result<()> {
    let contents = serde_json::to_string_pretty(meta).context("serialize meta")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write meta {}", path.display()))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn results_dir_is_stable() {
        let base = Path::new("/tmp/results");
        let dir = results_dir(base, "case", "run-1");
        assert_eq!(dir, PathBuf::from("/tmp/results/case/run-1"));
    }

    #[test]
    fn reserved_run_dirs_never_collide() {
        let temp = tempdir().expect("tempdir");
        let (first, first_dir) =
            reserve_run_dir(temp.path(), "case", "eval-1").expect("first");
        let (second, second_dir) =
            reserve_run_dir(temp.path(), "case", "eval-1").expect("second");
        let (third, _) = reserve_run_dir(temp.path(), "case", "eval-1").expect("third");
        assert_eq!(first, "eval-1");
        assert_eq!(second, "eval-1-2");
        assert_eq!(third, "eval-1-3");
        assert_ne!(first_dir, second_dir);
        assert!(second_dir.is_dir());
    }

    #[test]
    fn records_setup_error_without_session() {
        let temp = tempdir().expect("tempdir");
        let case_path = temp.path().join("case.toml");
        fs::write(&case_path, "[case]\nid='case'\nquestion='q'\n").expect("case");

        let input = CaptureInput {
            case_id: "case",
            case_path: &case_path,
            eval_run_id: "eval-1",
            model: "gpt-4o-mini",
            session: None,
            setup_error: Some("environment variable OPENAI_API_KEY is not set".to_string()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let output_dir = capture_results(&temp.path().join("results"), &input).expect("capture");
        assert!(!output_dir.join("session.json").exists());

        update_outcome(&output_dir, Outcome::Error).expect("outcome");
        let meta = read_meta(&output_dir.join("meta.json")).expect("meta");
        assert_eq!(meta.outcome, Some(Outcome::Error));
        assert_eq!(meta.case_hash.len(), 64);
        assert_eq!(meta.total_attempts, None);
        assert_eq!(meta.errors.len(), 1);
    }
}

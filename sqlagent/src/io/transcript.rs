//! Session transcript persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::SessionResult;

/// Path for a new transcript under `dir`, named by wall-clock milliseconds.
pub fn transcript_path(dir: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    dir.join(format!("session-{millis}.json"))
}

/// Atomically write the session record as pretty JSON (temp file + rename).
pub fn write_transcript(path: &Path, result: &SessionResult) -> Result<()> {
    debug!(path = %path.display(), attempts = result.total_attempts, "writing transcript");
    let mut buf = serde_json::to_string_pretty(result).context("serialize session result")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("transcript path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp transcript {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace transcript {}", path.display()))?;
    Ok(())
}

/// Load a transcript written by [`write_transcript`].
pub fn load_transcript(path: &Path) -> Result<SessionResult> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read transcript {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

//! Daemon configuration loaded from a JSON file.
//!
//! Loading never fails: a missing or malformed file falls back to the
//! built-in defaults, and a single bad value falls back to that key's default.
//! Every fallback is logged as a warning. Unknown keys are ignored.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub watch_directory: PathBuf,
    pub done_directory: PathBuf,
    pub download_directory: PathBuf,
    pub scan_interval: Duration,
    pub parallel_proc_max: usize,
    pub fetch_timeout: Duration,
    pub analyze_delay: Duration,
    /// Time a graceful drain may take before queued work is cancelled.
    /// `None` waits for a second signal instead.
    pub shutdown_grace: Option<Duration>,
    /// Second log sink next to stdout. `None` logs to stdout only.
    pub log_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            watch_directory: PathBuf::from("/tmp/"),
            done_directory: PathBuf::from("/tmp/done"),
            download_directory: PathBuf::from("/tmp/downloads"),
            scan_interval: Duration::from_secs(5),
            parallel_proc_max: 4,
            fetch_timeout: Duration::from_secs(10),
            analyze_delay: Duration::from_secs(2),
            shutdown_grace: None,
            log_file: None,
        }
    }
}

impl DaemonConfig {
    /// Load from `path`, substituting defaults for anything unusable.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config not readable, using defaults");
                return Self::default();
            }
        };

        let config = Self::from_json_str(&text).unwrap_or_else(|reason| {
            warn!(path = %path.display(), %reason, "config malformed, using defaults");
            Self::default()
        });
        info!(path = %path.display(), ?config, "config loaded");
        config
    }

    /// Parse a config document. Only a document that is not a JSON object is
    /// rejected; bad individual values are replaced by defaults.
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let Value::Object(map) = value else {
            return Err("top level is not a JSON object".to_string());
        };

        let defaults = Self::default();
        Ok(Self {
            watch_directory: field(&map, "watchDirectory", non_empty_path)
                .unwrap_or(defaults.watch_directory),
            done_directory: field(&map, "doneDirectory", non_empty_path)
                .unwrap_or(defaults.done_directory),
            download_directory: field(&map, "downloadDirectory", non_empty_path)
                .unwrap_or(defaults.download_directory),
            scan_interval: field(&map, "scanIntervalSeconds", positive_seconds)
                .unwrap_or(defaults.scan_interval),
            parallel_proc_max: field(&map, "parallelProcMax", positive_count)
                .unwrap_or(defaults.parallel_proc_max),
            fetch_timeout: field(&map, "fetchTimeoutSeconds", positive_seconds)
                .unwrap_or(defaults.fetch_timeout),
            analyze_delay: field(&map, "analyzeDelaySeconds", non_negative_seconds)
                .unwrap_or(defaults.analyze_delay),
            shutdown_grace: field(&map, "shutdownGraceSeconds", non_negative_seconds)
                .or(defaults.shutdown_grace),
            log_file: field(&map, "logFile", non_empty_path).or(defaults.log_file),
        })
    }
}

/// Decode `key` with `check`. Absent → `None` quietly; invalid → `None` with
/// a warning.
fn field<T, U>(map: &Map<String, Value>, key: &str, check: fn(T) -> Result<U, String>) -> Option<U>
where
    T: DeserializeOwned,
{
    let raw = map.get(key)?;
    let decoded = T::deserialize(raw)
        .map_err(|e| e.to_string())
        .and_then(check);
    match decoded {
        Ok(v) => Some(v),
        Err(reason) => {
            warn!(key, value = %raw, %reason, "invalid config value, using default");
            None
        }
    }
}

fn non_empty_path(s: String) -> Result<PathBuf, String> {
    if s.trim().is_empty() {
        return Err("empty path".to_string());
    }
    Ok(PathBuf::from(s))
}

fn positive_seconds(secs: f64) -> Result<Duration, String> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err("must be a positive number".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn non_negative_seconds(secs: f64) -> Result<Duration, String> {
    if !(secs.is_finite() && secs >= 0.0) {
        return Err("must be zero or a positive number".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn positive_count(n: u64) -> Result<usize, String> {
    match usize::try_from(n) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err("must be a positive integer".to_string()),
    }
}

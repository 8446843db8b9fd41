use crate::errors::RereError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), RereError> {
        if let Some(parent) = non_empty_parent(&self.path) {
            fs::create_dir_all(parent).map_err(|e| RereError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| RereError::Io(e.to_string()))?;

        let mut record = line.into_bytes();
        record.push(b'\n');

        // Workers log concurrently; one writer at a time keeps lines whole
        // and keeps pruning from racing itself.
        let _guard = APPEND_LOCK.lock().expect("run log append lock poisoned");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RereError::Io(e.to_string()))?;
        file.write_all(&record)
            .map_err(|e| RereError::Io(e.to_string()))?;

        // A bare file name has no log directory of its own to prune.
        if let Some(dir) = non_empty_parent(&self.path) {
            enforce_total_budget(dir, self.budget_bytes)?;
        }

        Ok(())
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

static APPEND_LOCK: Mutex<()> = Mutex::new(());

static RUN_LOGGER: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();

fn logger_slot() -> &'static Mutex<Option<JsonlLogger>> {
    RUN_LOGGER.get_or_init(|| Mutex::new(None))
}

pub fn init_run_logger(logger: JsonlLogger) {
    *logger_slot().lock().expect("run logger lock") = Some(logger);
}

pub fn clear_run_logger() {
    *logger_slot().lock().expect("run logger lock") = None;
}

/// Appends to the run log if one is installed. Logging never fails a run.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let logger = logger_slot().lock().expect("run logger lock").clone();
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

#[cfg(test)]
mod tests {
    use super::{append_run_log, clear_run_logger, init_run_logger, JsonlLogger, LogEvent};
    use serde_json::json;

    #[test]
    fn logger_truncates_large_payloads_and_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 20;
        logger.budget_bytes = 1024;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "command.captured",
                payload: json!({"stdout": "abcdefghijklmnopqrstuvwxyz"}),
            })
            .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"event_type\":\"command.captured\""));
        assert!(text.contains("..."));
    }

    #[test]
    fn concurrent_appends_keep_every_line_parseable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("workers.jsonl");
        let logger = JsonlLogger::new(&path);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let logger = &logger;
                scope.spawn(move || {
                    for index in 0..100 {
                        logger
                            .append(&LogEvent {
                                level: "debug",
                                event_type: "command.captured",
                                payload: json!({
                                    "worker": worker,
                                    "index": index,
                                    "stdout": "x".repeat(200),
                                }),
                            })
                            .expect("append");
                    }
                });
            }
        });

        let text = std::fs::read_to_string(&path).expect("read");
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 800);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).expect("valid json line");
        }
    }

    #[test]
    fn bare_file_name_skips_pruning() {
        let cwd = std::env::current_dir().expect("cwd");
        let path = cwd.join("rere-bare-name-logging.jsonl");
        let mut logger = JsonlLogger::new("rere-bare-name-logging.jsonl");
        logger.budget_bytes = 1;
        logger
            .append(&LogEvent {
                level: "info",
                event_type: "logging.bare",
                payload: json!({}),
            })
            .expect("append");

        let kept = path.exists();
        let _ = std::fs::remove_file(&path);
        assert!(kept, "over-budget log in the working directory was pruned");
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let value = super::truncate_json(json!("ééééééééé"), 8);
        let text = value.as_str().expect("string");
        assert!(text.ends_with("..."));
    }

    #[test]
    fn run_log_is_a_no_op_until_installed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("global.jsonl");
        append_run_log("info", "ignored", json!({}));
        assert!(!path.exists());

        init_run_logger(JsonlLogger::new(&path));
        append_run_log("info", "logging.selftest", json!({"drifts": 0}));
        clear_run_logger();
        append_run_log("info", "ignored", json!({}));

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(
            text.lines()
                .filter(|line| line.contains("logging.selftest"))
                .count(),
            1
        );
        assert!(!text.contains("\"ignored\""));
    }
}

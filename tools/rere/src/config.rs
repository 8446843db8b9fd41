use crate::errors::RereError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::snapshot::DEFAULT_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub execution: ExecutionConfig,
    pub snapshot: SnapshotConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// 0 runs commands one at a time, in order.
    pub jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotConfig {
    pub suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    pub fail_fast: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig { jobs: 0 },
            snapshot: SnapshotConfig {
                suffix: DEFAULT_SUFFIX.to_string(),
            },
            replay: ReplayConfig { fail_fast: false },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    execution: Option<PartialExecutionConfig>,
    snapshot: Option<PartialSnapshotConfig>,
    replay: Option<PartialReplayConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialExecutionConfig {
    jobs: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialSnapshotConfig {
    suffix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialReplayConfig {
    fail_fast: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(overrides: &CliOverrides, fs: &dyn FileSystem) -> Result<AppConfig, RereError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| RereError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(execution) = partial.execution {
        if let Some(jobs) = execution.jobs {
            cfg.execution.jobs = jobs;
        }
    }

    if let Some(snapshot) = partial.snapshot {
        if let Some(suffix) = snapshot.suffix {
            cfg.snapshot.suffix = suffix;
        }
    }

    if let Some(replay) = partial.replay {
        if let Some(fail_fast) = replay.fail_fast {
            cfg.replay.fail_fast = fail_fast;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(jobs) = overrides.jobs {
        cfg.execution.jobs = jobs;
    }
    if overrides.fail_fast {
        cfg.replay.fail_fast = true;
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), RereError> {
    let suffix = cfg.snapshot.suffix.as_str();
    if suffix.is_empty() {
        return Err(RereError::InvalidConfig(
            "snapshot.suffix must not be empty".to_string(),
        ));
    }
    if suffix.contains('/') || suffix.contains(std::path::MAIN_SEPARATOR) {
        return Err(RereError::InvalidConfig(
            "snapshot.suffix must not contain a path separator".to_string(),
        ));
    }

    if cfg.logging.max_payload_bytes == 0 {
        return Err(RereError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

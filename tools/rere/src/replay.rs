//! Re-runs a recorded command list and compares every command against its
//! snapshot on exit code, stdout and stderr.

use crate::command_list::load_command_list;
use crate::config::AppConfig;
use crate::errors::RereError;
use crate::logging::append_run_log;
use crate::runner::{capture, command_token};
use crate::runtime::{ProductionRuntime, Terminal};
use crate::scheduler::run_all;
use crate::snapshot::{load_snapshot, snapshot_path};
use crate::types::{Mode, ProcessResult};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Outputs longer than this are reported by digest instead of verbatim.
pub const LARGE_OUTPUT_THRESHOLD: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftKind {
    Command { expected: String, actual: String },
    ExitCode { expected: i32, actual: i32 },
    Stdout { expected: Vec<u8>, actual: Vec<u8> },
    Stderr { expected: Vec<u8>, actual: Vec<u8> },
}

impl DriftKind {
    pub fn axis(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::ExitCode { .. } => "returncode",
            Self::Stdout { .. } => "stdout",
            Self::Stderr { .. } => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub index: usize,
    pub command: String,
    pub kind: DriftKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandCheck {
    Checked(Vec<Drift>),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub list_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub checked: usize,
    /// Commands never started because fail-fast tripped.
    pub skipped: usize,
    pub drifts: Vec<Drift>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Compares a live run with its recording. Every axis is checked on its own
/// and byte for byte.
pub fn compare(
    index: usize,
    command: &str,
    recorded: &ProcessResult,
    observed: &ProcessResult,
) -> Vec<Drift> {
    let mut kinds = Vec::new();
    if recorded.exit_code != observed.exit_code {
        kinds.push(DriftKind::ExitCode {
            expected: recorded.exit_code,
            actual: observed.exit_code,
        });
    }
    if recorded.stdout != observed.stdout {
        kinds.push(DriftKind::Stdout {
            expected: recorded.stdout.clone(),
            actual: observed.stdout.clone(),
        });
    }
    if recorded.stderr != observed.stderr {
        kinds.push(DriftKind::Stderr {
            expected: recorded.stderr.clone(),
            actual: observed.stderr.clone(),
        });
    }
    kinds
        .into_iter()
        .map(|kind| Drift {
            index,
            command: command.to_string(),
            kind,
        })
        .collect()
}

pub fn replay(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    list_path: &Path,
) -> Result<ReplayReport, RereError> {
    let commands = load_command_list(runtime.file_system.as_ref(), list_path)?;
    let snapshot = snapshot_path(list_path, &cfg.snapshot.suffix);
    let recorded = load_snapshot(runtime.file_system.as_ref(), &snapshot)?;

    if recorded.len() != commands.len() {
        return Err(RereError::LengthMismatch {
            list: list_path.display().to_string(),
            snapshot: snapshot.display().to_string(),
            expected: recorded.len(),
            actual: commands.len(),
        });
    }

    append_run_log(
        "info",
        "replay.started",
        json!({
            "list": list_path.display().to_string(),
            "commands": commands.len(),
            "jobs": cfg.execution.jobs,
            "fail_fast": cfg.replay.fail_fast,
        }),
    );

    let runner = runtime.process_runner.as_ref();
    let fail_fast = cfg.replay.fail_fast;
    let halted = AtomicBool::new(false);
    let checks = run_all(
        &commands,
        cfg.execution.jobs,
        Mode::Replay,
        runtime.terminal.as_ref(),
        |index, command| {
            if fail_fast && halted.load(Ordering::SeqCst) {
                return CommandCheck::Skipped;
            }
            let expected = &recorded[index];
            let mut drifts = Vec::new();
            let token = command_token(command);
            if token != expected.shell {
                drifts.push(Drift {
                    index,
                    command: command.to_string(),
                    kind: DriftKind::Command {
                        expected: expected.shell.clone(),
                        actual: token.to_string(),
                    },
                });
            }

            let (outcome, observed) = capture(runner, command);
            drifts.extend(compare(index, command, expected, &observed));
            append_run_log(
                "debug",
                "command.replayed",
                json!({
                    "index": index,
                    "command": command,
                    "outcome": outcome.kind(),
                    "exit_code": observed.exit_code,
                    "drifts": drifts.iter().map(|d| d.kind.axis()).collect::<Vec<_>>(),
                }),
            );
            if fail_fast && !drifts.is_empty() {
                halted.store(true, Ordering::SeqCst);
            }
            CommandCheck::Checked(drifts)
        },
    )?;

    let mut report = ReplayReport {
        list_path: list_path.to_path_buf(),
        snapshot_path: snapshot,
        checked: 0,
        skipped: 0,
        drifts: Vec::new(),
    };
    for check in checks {
        match check {
            CommandCheck::Checked(drifts) => {
                report.checked += 1;
                report.drifts.extend(drifts);
            }
            CommandCheck::Skipped => report.skipped += 1,
        }
    }

    for drift in &report.drifts {
        append_run_log(
            "warn",
            "replay.drift",
            json!({ "index": drift.index, "command": drift.command, "axis": drift.kind.axis() }),
        );
    }
    append_run_log(
        "info",
        "replay.completed",
        json!({
            "checked": report.checked,
            "skipped": report.skipped,
            "drifts": report.drifts.len(),
        }),
    );
    Ok(report)
}

/// Human-readable lines for one drift, written to the error stream.
pub fn render_drift(drift: &Drift, report: &ReplayReport) -> Vec<String> {
    match &drift.kind {
        DriftKind::Command { expected, actual } => vec![
            "UNEXPECTED: shell command".to_string(),
            format!("    EXPECTED: {expected}"),
            format!("    ACTUAL:   {actual}"),
            format!(
                "NOTE: You may want to do `rere record {}` to update {}",
                report.list_path.display(),
                report.snapshot_path.display()
            ),
        ],
        DriftKind::ExitCode { expected, actual } => vec![
            format!("UNEXPECTED: return code in {}", drift.command),
            format!("    EXPECTED: {expected}"),
            format!("    ACTUAL: {actual}"),
        ],
        DriftKind::Stdout { expected, actual } => vec![
            format!("UNEXPECTED: stdout in {}", drift.command),
            format!("    EXPECTED: {}", show_bytes(expected)),
            format!("    ACTUAL: {}", show_bytes(actual)),
        ],
        DriftKind::Stderr { expected, actual } => vec![
            format!("UNEXPECTED: stderr in {}", drift.command),
            format!("    EXPECTED: {}", show_bytes(expected)),
            format!("    ACTUAL: {}", show_bytes(actual)),
        ],
    }
}

pub fn print_report(terminal: &dyn Terminal, report: &ReplayReport) -> Result<(), RereError> {
    for drift in &report.drifts {
        for line in render_drift(drift, report) {
            terminal.write_error_line(&line)?;
        }
    }
    if report.skipped > 0 {
        terminal.write_error_line(&format!(
            "NOTE: {} command(s) skipped after the first drift (fail-fast)",
            report.skipped
        ))?;
    }
    Ok(())
}

fn show_bytes(bytes: &[u8]) -> String {
    if bytes.len() > LARGE_OUTPUT_THRESHOLD {
        let hash = Sha256::digest(bytes);
        let prefix = hash[..8]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        return format!("<hash:sha256:{prefix}> ({} bytes)", bytes.len());
    }
    String::from_utf8_lossy(bytes).into_owned()
}

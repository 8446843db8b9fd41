use crate::command_list::load_command_list;
use crate::config::AppConfig;
use crate::errors::RereError;
use crate::logging::append_run_log;
use crate::runner::capture;
use crate::runtime::ProductionRuntime;
use crate::scheduler::run_all;
use crate::snapshot::{snapshot_path, write_snapshot};
use crate::types::Mode;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub snapshot_path: PathBuf,
    pub recorded: usize,
    pub nonzero_exits: usize,
}

/// Runs every command in the list and overwrites its snapshot.
pub fn record(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    list_path: &Path,
) -> Result<RecordSummary, RereError> {
    let commands = load_command_list(runtime.file_system.as_ref(), list_path)?;
    let target = snapshot_path(list_path, &cfg.snapshot.suffix);
    append_run_log(
        "info",
        "record.started",
        json!({
            "list": list_path.display().to_string(),
            "commands": commands.len(),
            "jobs": cfg.execution.jobs,
        }),
    );
    if commands.is_empty() {
        append_run_log(
            "warn",
            "record.empty_list",
            json!({ "list": list_path.display().to_string() }),
        );
    }

    let runner = runtime.process_runner.as_ref();
    let results = run_all(
        &commands,
        cfg.execution.jobs,
        Mode::Capture,
        runtime.terminal.as_ref(),
        |index, command| {
            let (outcome, result) = capture(runner, command);
            append_run_log(
                "debug",
                "command.captured",
                json!({
                    "index": index,
                    "command": command,
                    "outcome": outcome.kind(),
                    "exit_code": result.exit_code,
                    "stdout_bytes": result.stdout.len(),
                    "stderr_bytes": result.stderr.len(),
                }),
            );
            result
        },
    )?;

    write_snapshot(runtime.file_system.as_ref(), &target, &results)?;
    let nonzero_exits = results.iter().filter(|r| r.exit_code != 0).count();
    append_run_log(
        "info",
        "snapshot.written",
        json!({
            "snapshot": target.display().to_string(),
            "results": results.len(),
            "nonzero_exits": nonzero_exits,
        }),
    );

    Ok(RecordSummary {
        snapshot_path: target,
        recorded: results.len(),
        nonzero_exits,
    })
}

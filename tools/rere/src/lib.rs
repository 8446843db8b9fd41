pub mod command_list;
pub mod config;
pub mod errors;
pub mod log_retention;
pub mod logging;
pub mod record;
pub mod replay;
pub mod runner;
pub mod runtime;
pub mod scheduler;
pub mod snapshot;
pub mod types;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use config::{load_config, AppConfig, CliOverrides};
use errors::RereError;
use logging::{clear_run_logger, init_run_logger, JsonlLogger};
use runtime::ProductionRuntime;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "rere")]
#[command(about = "Record the behavior of shell commands and replay them to detect drift")]
pub struct Cli {
    /// Run up to N commands at once; 0 runs them one at a time
    #[arg(short = 'j', value_name = "N")]
    pub jobs: Option<usize>,
    /// TOML file with execution, snapshot, replay and logging settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run every command in the list and write its snapshot
    Record {
        /// File with one command line per line
        list: PathBuf,
    },
    /// Re-run every command and compare it against the snapshot
    Replay {
        /// File with one command line per line
        list: PathBuf,
        /// Stop starting new commands after the first drift
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
}

pub fn run() -> Result<i32, RereError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    runtime: &ProductionRuntime,
) -> Result<i32, RereError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(RereError::Cli(usage_error_message(&error))),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        jobs: cli.jobs,
        fail_fast: matches!(cli.command, CliCommand::Replay { fail_fast: true, .. }),
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;

    if let Some(path) = &cfg.logging.path {
        let mut logger = JsonlLogger::new(path);
        logger.max_payload_bytes = cfg.logging.max_payload_bytes;
        logger.budget_bytes = cfg.logging.budget_bytes;
        init_run_logger(logger);
    }
    let outcome = dispatch(&cli.command, &cfg, runtime);
    if cfg.logging.path.is_some() {
        clear_run_logger();
    }
    outcome
}

fn dispatch(
    command: &CliCommand,
    cfg: &AppConfig,
    runtime: &ProductionRuntime,
) -> Result<i32, RereError> {
    match command {
        CliCommand::Record { list } => {
            record::record(runtime, cfg, list)?;
            Ok(0)
        }
        CliCommand::Replay { list, .. } => {
            let report = replay::replay(runtime, cfg, list)?;
            replay::print_report(runtime.terminal.as_ref(), &report)?;
            if report.is_clean() {
                runtime.terminal.write_line("OK")?;
                Ok(0)
            } else {
                Ok(1)
            }
        }
    }
}

/// First line of clap's rendered error; the usage block that follows is dropped.
fn usage_error_message(error: &clap::Error) -> String {
    let rendered = error.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    first.trim_start_matches("error: ").trim_end().to_string()
}

pub fn render_help() -> String {
    let mut cmd = Cli::command();
    cmd.render_long_help().to_string()
}

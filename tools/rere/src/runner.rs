use crate::runtime::{ProcessRequest, ProcessRunner};
use crate::types::ProcessResult;

/// What happened when a command line was run, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed {
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    Signaled {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    LaunchFailed {
        reason: String,
    },
}

/// Exit code recorded for commands that never exited normally.
pub const ABNORMAL_EXIT_CODE: i32 = 1;

impl CommandOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Signaled { .. } => "signaled",
            Self::LaunchFailed { .. } => "launch_failed",
        }
    }

    /// Collapses launch failures and signals into exit code 1 so every
    /// command yields a comparable result. The distinction is lost.
    pub fn into_result(self, shell: &str) -> ProcessResult {
        let (exit_code, stdout, stderr) = match self {
            Self::Completed {
                exit_code,
                stdout,
                stderr,
            } => (exit_code, stdout, stderr),
            Self::Signaled { stdout, stderr } => (ABNORMAL_EXIT_CODE, stdout, stderr),
            Self::LaunchFailed { .. } => (ABNORMAL_EXIT_CODE, Vec::new(), Vec::new()),
        };
        ProcessResult {
            shell: shell.to_string(),
            stdout,
            stderr,
            exit_code,
        }
    }
}

/// Splits on single spaces. No quoting: `a  b` yields an empty argument.
pub fn split_command(command_line: &str) -> ProcessRequest {
    let mut parts = command_line.split(' ').map(str::to_string);
    let program = parts.next().unwrap_or_default();
    ProcessRequest {
        program,
        args: parts.collect(),
    }
}

pub fn command_token(command_line: &str) -> &str {
    command_line.split(' ').next().unwrap_or_default()
}

pub fn execute_command(runner: &dyn ProcessRunner, command_line: &str) -> CommandOutcome {
    let request = split_command(command_line);
    let handle = match runner.spawn(request) {
        Ok(handle) => handle,
        Err(error) => {
            return CommandOutcome::LaunchFailed {
                reason: error.to_string(),
            }
        }
    };
    match runner.wait(handle) {
        Ok(output) => match output.exit_code {
            Some(exit_code) => CommandOutcome::Completed {
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            },
            None => CommandOutcome::Signaled {
                stdout: output.stdout,
                stderr: output.stderr,
            },
        },
        Err(error) => CommandOutcome::LaunchFailed {
            reason: error.to_string(),
        },
    }
}

/// Runs one command and normalizes the outcome into a snapshot record.
pub fn capture(runner: &dyn ProcessRunner, command_line: &str) -> (CommandOutcome, ProcessResult) {
    let outcome = execute_command(runner, command_line);
    let result = outcome.clone().into_result(command_token(command_line));
    (outcome, result)
}

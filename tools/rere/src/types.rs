use serde::{Deserialize, Serialize};

/// Which engine is driving the scheduler. Only affects progress notices and
/// log event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Capture,
    Replay,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Replay => "replay",
        }
    }

    pub fn notice_label(self) -> &'static str {
        match self {
            Self::Capture => "CAPTURING",
            Self::Replay => "REPLAYING",
        }
    }
}

/// Observable behavior of one command, as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// First token of the command line.
    pub shell: String,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RereError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("snapshot format error in field `{field}`: expected {expected}, found {found}")]
    Format {
        field: String,
        expected: String,
        found: String,
    },
    #[error("snapshot truncated: unexpected end of file while reading field `{field}`")]
    UnexpectedEof { field: String },
    #[error("unsupported snapshot version {found} (this build reads version {supported})")]
    UnsupportedVersion { found: i64, supported: i64 },
    #[error(
        "snapshot {snapshot} holds {expected} results but {list} lists {actual} commands; \
         run `rere record {list}` to update it"
    )]
    LengthMismatch {
        list: String,
        snapshot: String,
        expected: usize,
        actual: usize,
    },
}

impl RereError {
    pub fn format(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Format {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn eof(field: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            field: field.into(),
        }
    }
}

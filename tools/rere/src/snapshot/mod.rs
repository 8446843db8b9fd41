//! Snapshot file encoding.
//!
//! A snapshot is `:i version 1`, `:i count N`, then N records of
//! `shell` (blob), `returncode` (int), `stdout` (blob), `stderr` (blob).
//! Files without the version line are read as version 0; their layout is
//! otherwise identical.

pub mod field;

use crate::errors::RereError;
use crate::types::ProcessResult;
use field::{has_prefix, parse_int_line, write_blob_field, write_int_field, FieldReader};
use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: i64 = 1;
pub const DEFAULT_SUFFIX: &str = ".bi";

/// Snapshot location for a command list: the list path with `suffix` appended.
pub fn snapshot_path(list_path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(list_path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

pub fn encode_snapshot(out: &mut impl Write, results: &[ProcessResult]) -> Result<(), RereError> {
    write_int_field(out, "version", SNAPSHOT_VERSION)?;
    write_int_field(out, "count", results.len() as i64)?;
    for result in results {
        write_blob_field(out, "shell", result.shell.as_bytes())?;
        write_int_field(out, "returncode", i64::from(result.exit_code))?;
        write_blob_field(out, "stdout", &result.stdout)?;
        write_blob_field(out, "stderr", &result.stderr)?;
    }
    out.flush().map_err(|e| RereError::Io(e.to_string()))
}

pub fn encode_to_vec(results: &[ProcessResult]) -> Result<Vec<u8>, RereError> {
    let mut out = Vec::new();
    encode_snapshot(&mut out, results)?;
    Ok(out)
}

pub fn decode_snapshot(input: impl BufRead) -> Result<Vec<ProcessResult>, RereError> {
    let mut fields = FieldReader::new(input);

    let first = fields.next_line("count")?;
    let count = if has_prefix(&first, "i", "version") {
        let version = parse_int_line(&first, "version")?;
        if version != SNAPSHOT_VERSION {
            return Err(RereError::UnsupportedVersion {
                found: version,
                supported: SNAPSHOT_VERSION,
            });
        }
        fields.read_int("count")?
    } else {
        parse_int_line(&first, "count")?
    };
    let count = usize::try_from(count)
        .map_err(|_| RereError::format("count", "a non-negative record count", count.to_string()))?;

    // The count is untrusted until the records are actually there.
    let mut results = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let shell = fields.read_blob("shell")?;
        let shell = String::from_utf8(shell)
            .map_err(|_| RereError::format("shell", "utf-8 command token", "invalid utf-8"))?;
        let exit_code = fields.read_int("returncode")?;
        let exit_code = i32::try_from(exit_code).map_err(|_| {
            RereError::format("returncode", "a 32-bit exit code", exit_code.to_string())
        })?;
        let stdout = fields.read_blob("stdout")?;
        let stderr = fields.read_blob("stderr")?;
        results.push(ProcessResult {
            shell,
            stdout,
            stderr,
            exit_code,
        });
    }
    Ok(results)
}

pub fn load_snapshot(
    fs: &dyn crate::runtime::FileSystem,
    path: &Path,
) -> Result<Vec<ProcessResult>, RereError> {
    let bytes = fs.read_bytes(path)?;
    decode_snapshot(bytes.as_slice())
}

pub fn write_snapshot(
    fs: &dyn crate::runtime::FileSystem,
    path: &Path,
    results: &[ProcessResult],
) -> Result<(), RereError> {
    let bytes = encode_to_vec(results)?;
    fs.write_bytes(path, &bytes)
}

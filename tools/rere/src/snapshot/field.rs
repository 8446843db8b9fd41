//! Line-oriented field encoding shared by every record in a snapshot.
//!
//! `:i <name> <value>\n` carries an integer. `:b <name> <len>\n` is followed
//! by exactly `len` raw bytes and a single `\n`; the length prefix decides
//! where the blob ends, so blobs may contain any byte.

use crate::errors::RereError;
use std::io::{BufRead, Read, Write};

pub fn write_int_field(out: &mut impl Write, name: &str, value: i64) -> Result<(), RereError> {
    writeln!(out, ":i {name} {value}").map_err(|e| RereError::Io(e.to_string()))
}

pub fn write_blob_field(out: &mut impl Write, name: &str, blob: &[u8]) -> Result<(), RereError> {
    writeln!(out, ":b {name} {}", blob.len()).map_err(|e| RereError::Io(e.to_string()))?;
    out.write_all(blob)
        .map_err(|e| RereError::Io(e.to_string()))?;
    out.write_all(b"\n").map_err(|e| RereError::Io(e.to_string()))
}

pub struct FieldReader<R> {
    inner: R,
}

impl<R: BufRead> FieldReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads one raw header line, newline included.
    pub fn next_line(&mut self, field: &str) -> Result<Vec<u8>, RereError> {
        let mut line = Vec::new();
        let read = self
            .inner
            .read_until(b'\n', &mut line)
            .map_err(|e| RereError::Io(e.to_string()))?;
        if read == 0 {
            return Err(RereError::eof(field));
        }
        Ok(line)
    }

    pub fn read_int(&mut self, name: &str) -> Result<i64, RereError> {
        let line = self.next_line(name)?;
        parse_int_line(&line, name)
    }

    pub fn read_blob(&mut self, name: &str) -> Result<Vec<u8>, RereError> {
        let line = self.next_line(name)?;
        let size_text = field_value(&line, "b", name)?;
        let size = size_text.parse::<u64>().map_err(|_| {
            RereError::format(name, "a non-negative decimal byte length", quote(size_text))
        })?;

        let mut blob = Vec::new();
        let read = (&mut self.inner)
            .take(size)
            .read_to_end(&mut blob)
            .map_err(|e| RereError::Io(e.to_string()))?;
        if (read as u64) < size {
            return Err(RereError::eof(name));
        }

        let mut terminator = [0u8; 1];
        match self.inner.read_exact(&mut terminator) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(RereError::eof(name));
            }
            Err(e) => return Err(RereError::Io(e.to_string())),
        }
        if terminator[0] != b'\n' {
            return Err(RereError::format(
                name,
                "final newline after blob",
                format!("byte 0x{:02x}", terminator[0]),
            ));
        }
        Ok(blob)
    }

    /// True once every byte has been consumed.
    pub fn is_exhausted(&mut self) -> Result<bool, RereError> {
        self.inner
            .fill_buf()
            .map(|buf| buf.is_empty())
            .map_err(|e| RereError::Io(e.to_string()))
    }
}

/// Parses an already-read `:i <name> <value>\n` line.
pub fn parse_int_line(line: &[u8], name: &str) -> Result<i64, RereError> {
    let text = field_value(line, "i", name)?;
    text.parse::<i64>()
        .map_err(|_| RereError::format(name, "a decimal integer", quote(text)))
}

pub fn has_prefix(line: &[u8], marker: &str, name: &str) -> bool {
    line.starts_with(prefix(marker, name).as_bytes())
}

fn prefix(marker: &str, name: &str) -> String {
    format!(":{marker} {name} ")
}

fn field_value<'a>(line: &'a [u8], marker: &str, name: &str) -> Result<&'a str, RereError> {
    let expected = prefix(marker, name);
    if !line.starts_with(expected.as_bytes()) {
        let shown = line.len().min(expected.len());
        return Err(RereError::format(
            name,
            quote(&expected),
            quote(&String::from_utf8_lossy(&line[..shown])),
        ));
    }
    let Some(body) = line.strip_suffix(b"\n") else {
        return Err(RereError::eof(name));
    };
    let value = &body[expected.len()..];
    std::str::from_utf8(value)
        .map_err(|_| RereError::format(name, "ascii digits", "non-utf8 bytes"))
}

fn quote(text: &str) -> String {
    format!("{text:?}")
}

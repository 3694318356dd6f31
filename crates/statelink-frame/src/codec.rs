use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;

use crate::error::{FrameError, Result};

/// Frame delimiter: every record is one line.
pub const DELIMITER: u8 = b'\n';

/// Default maximum line length: 16 MiB.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// A decoded wire record. The structure is self-describing JSON; protocol
/// semantics live one layer up.
pub type Record = Value;

/// Decode one record from the accumulating buffer.
///
/// Returns `Ok(None)` if no complete line is buffered yet (caller keeps
/// buffering). On success the line and its delimiter are consumed from the
/// buffer. Blank lines are consumed and skipped in place.
///
/// A line that fails to parse is consumed and reported as
/// [`FrameError::Malformed`]; the buffer is left positioned at the next
/// line, so decoding can simply continue.
pub fn decode_record(src: &mut BytesMut, max_line_len: usize) -> Result<Option<Record>> {
    loop {
        let Some(pos) = src.iter().position(|&b| b == DELIMITER) else {
            if src.len() > max_line_len {
                return Err(FrameError::LineTooLong {
                    len: src.len(),
                    max: max_line_len,
                });
            }
            return Ok(None); // Need more data
        };

        let line = src.split_to(pos);
        src.advance(1); // delimiter

        // Tolerate CRLF producers.
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => &line[..],
        };
        if line.is_empty() {
            continue;
        }

        if line.len() > max_line_len {
            return Err(FrameError::LineTooLong {
                len: line.len(),
                max: max_line_len,
            });
        }

        let text = std::str::from_utf8(line).map_err(|e| FrameError::Malformed {
            reason: format!("invalid UTF-8: {e}"),
        })?;
        return serde_json::from_str(text)
            .map(Some)
            .map_err(|e| FrameError::Malformed {
                reason: e.to_string(),
            });
    }
}

/// Encode one record as a single line into the destination buffer.
pub fn encode_record(record: &Record, dst: &mut BytesMut) -> Result<()> {
    let body = serde_json::to_vec(record).map_err(|e| FrameError::Malformed {
        reason: e.to_string(),
    })?;
    dst.reserve(body.len() + 1);
    dst.put_slice(&body);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Configuration for the record codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 16 MiB.
    pub max_line_len: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

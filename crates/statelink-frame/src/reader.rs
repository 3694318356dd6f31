use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::BytesMut;
use tracing::warn;

use crate::codec::{decode_record, FrameConfig, Record};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete records from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete records.
/// Malformed lines are dropped with a warning and scanning continues; a read
/// timeout surfaces as `Ok(None)` so the caller can run its own liveness
/// check between records.
pub struct RecordReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> RecordReader<T> {
    /// Create a new record reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new record reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete record (blocking, bounded by the stream's
    /// read timeout if one is set).
    ///
    /// Returns `Ok(None)` when the read timed out before a complete record
    /// arrived, and `Err(FrameError::ConnectionClosed)` at EOF.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        loop {
            match decode_record(&mut self.buf, self.config.max_line_len) {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(FrameError::Malformed { reason }) => {
                    warn!(%reason, "dropping malformed record");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None)
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl RecordReader<TcpStream> {
    /// Create a record reader for a `TcpStream` and apply the read timeout
    /// from config.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

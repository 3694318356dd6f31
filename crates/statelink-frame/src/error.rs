/// Errors that can occur during record encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is not a parseable UTF-8 JSON document.
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },

    /// The buffered line exceeds the configured maximum without a delimiter.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },

    /// An I/O error occurred while reading or writing records.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete record was received.
    #[error("connection closed (incomplete record)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

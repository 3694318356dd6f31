/// Errors produced while giving a decoded record its protocol shape.
///
/// All of these are recovered by the caller the same way a framing error is:
/// log, skip the record, keep the connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A mandatory field is absent.
    #[error("missing mandatory field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("field `{field}` has invalid shape: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// The record's `type` is not a known message kind.
    #[error("unknown message kind `{0}`")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

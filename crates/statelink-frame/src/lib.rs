//! Newline-delimited JSON record framing for telemetry streams.
//!
//! Every frame on the wire is one UTF-8 JSON document terminated by `\n`.
//! This layer turns a byte stream into complete, parsed records and back;
//! it carries no protocol semantics. A malformed line is dropped with a
//! warning and decoding resumes at the next delimiter — framing errors are
//! never fatal to the connection.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_record, encode_record, FrameConfig, Record, DEFAULT_MAX_LINE, DELIMITER};
pub use error::{FrameError, Result};
pub use reader::RecordReader;
pub use writer::RecordWriter;

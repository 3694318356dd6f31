//! Telemetry protocol envelope, timing metadata, and command records.
//!
//! A decoded wire record is just JSON; this layer gives it a typed shape:
//! message kind, sequence/frame counters, per-channel timing metadata, and
//! the opaque per-channel payload map. Legacy (v2.0) producers are
//! normalized to the same shape as v2.1 ones at parse time.

pub mod command;
pub mod envelope;
pub mod error;
pub mod timing;

pub use command::{CommandRecord, COMMAND_RECORD_TYPE};
pub use envelope::{CommandOutcome, Envelope, GameEvent, MessageKind, LEGACY_VERSION};
pub use error::{ProtocolError, Result};
pub use timing::{ChannelTiming, IntervalClass, DEFAULT_STALE_MULTIPLIER};

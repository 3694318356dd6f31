//! Synchronized, freshness-checked view over a pushed game telemetry stream.
//!
//! A real-time producer pushes multiplexed channel updates over one duplex
//! TCP connection; statelink turns that stream into per-channel state a
//! decision loop can read without ever blocking on the network, with an
//! honest answer about whether a multi-channel read is internally
//! consistent.
//!
//! # Crate Structure
//!
//! - [`frame`] — Newline-delimited JSON record framing
//! - [`proto`] — Envelope, timing metadata, command records
//! - [`server`] — Single-peer TCP connection server
//! - [`sync`] — Timing anomaly monitor + channel-state store
//!
//! [`StateLink`] composes all four behind one object.

/// Re-export frame types.
pub mod frame {
    pub use statelink_frame::*;
}

/// Re-export protocol types.
pub mod proto {
    pub use statelink_proto::*;
}

/// Re-export server types.
pub mod server {
    pub use statelink_server::*;
}

/// Re-export monitor/store types.
pub mod sync {
    pub use statelink_sync::*;
}

mod link;
mod subscribers;

pub use link::{LinkConfig, StateLink};

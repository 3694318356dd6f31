//! Single-peer TCP server for the telemetry stream.
//!
//! Owns the listening socket, accepts exactly one producer at a time (a new
//! peer replaces the old one), runs the receive loop through the record
//! codec and envelope parser, and hands parsed envelopes to registered
//! handlers. Socket trouble is never fatal: the server logs, drops the
//! peer, and keeps listening. The only error `start()` can return is a
//! failed bind.

pub mod error;
pub mod events;
pub mod server;

pub use error::{Result, ServerError};
pub use server::{
    ConnectionServer, ConnectionState, ServerConfig, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};

//! Timing anomaly detection and synchronized channel-state storage.
//!
//! [`TimingMonitor`] watches sequence/frame counters for regressions, gaps,
//! jumps, and stale channels, reporting them as [`TimingIssue`] values —
//! never as errors. [`ChannelStateStore`] keeps the latest value plus
//! bounded history per channel and answers freshness and cross-channel
//! consistency questions without ever blocking on the network.
//!
//! Both are safe under one writer thread (the network side) and arbitrary
//! concurrent readers; each is guarded by a single coarse lock.

pub mod monitor;
pub mod store;

pub use monitor::{
    IssueKind, MonitorConfig, MonitorStats, Severity, TimingIssue, TimingMonitor,
    DEFAULT_FRAME_JUMP_THRESHOLD,
};
pub use store::{ChannelState, ChannelStateStore, DEFAULT_HISTORY_CAPACITY};

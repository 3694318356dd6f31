use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{json, Value};
use statelink_proto::{Envelope, DEFAULT_STALE_MULTIPLIER};

/// Default threshold (in frames) above which a frame advance is reported as
/// a jump.
pub const DEFAULT_FRAME_JUMP_THRESHOLD: u64 = 5;

/// Configuration for the timing monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Frame advance beyond which a `FrameJump` is reported.
    pub frame_jump_threshold: u64,
    /// Multiplier applied to each channel's expected period when deciding
    /// staleness.
    pub stale_multiplier: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            frame_jump_threshold: DEFAULT_FRAME_JUMP_THRESHOLD,
            stale_multiplier: DEFAULT_STALE_MULTIPLIER,
        }
    }
}

/// Kind of timing anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    OutOfOrder,
    FrameGap,
    FrameJump,
    StaleData,
}

/// How concerning an issue is. Purely informational; issues are never
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One detected timing anomaly. Immutable; delivered through the normal
/// event stream and aggregated only into rolling counters.
#[derive(Debug, Clone, Serialize)]
pub struct TimingIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub frame: u64,
    /// Free-form context for the specific anomaly.
    pub details: Value,
}

/// Rolling counters over everything the monitor has seen.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MonitorStats {
    pub total_messages: u64,
    pub out_of_order: u64,
    pub frame_gaps: u64,
    pub frame_jumps: u64,
    pub stale_reports: u64,
}

impl MonitorStats {
    pub fn total_issues(&self) -> u64 {
        self.out_of_order + self.frame_gaps + self.frame_jumps + self.stale_reports
    }

    pub fn issue_rate(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            self.total_issues() as f64 / self.total_messages as f64
        }
    }
}

#[derive(Default)]
struct MonitorInner {
    last_seq: u64,
    last_frame: u64,
    /// False until the first envelope after construction or `reset()`. The
    /// seeding envelope is exempt from out-of-order/gap/jump checks so a
    /// producer (re)starting at any seq/frame trips nothing.
    initialized: bool,
    stats: MonitorStats,
}

/// Stateful anomaly detector over the envelope stream.
///
/// Consumes only envelopes that carry timing metadata (v2.1-capable
/// producers). One coarse lock guards the watermarks; the network thread
/// writes, consumer threads read stats.
pub struct TimingMonitor {
    config: MonitorConfig,
    inner: Mutex<MonitorInner>,
}

impl TimingMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(MonitorInner::default()),
        }
    }

    /// Inspect one envelope and report any anomalies, in check order:
    /// sequence regression, sequence gap, frame jump, stale channels.
    ///
    /// A regressed (out-of-order) envelope never moves the watermarks, and
    /// suppresses the gap/jump checks for itself — its counters are history,
    /// not progress.
    pub fn check(&self, envelope: &Envelope) -> Vec<TimingIssue> {
        if !envelope.has_timing_metadata() {
            return Vec::new();
        }

        let mut inner = self.lock();
        let mut issues = Vec::new();
        inner.stats.total_messages += 1;

        let seq = envelope.seq;
        let frame = envelope.frame;

        if inner.initialized {
            if seq < inner.last_seq {
                issues.push(TimingIssue {
                    kind: IssueKind::OutOfOrder,
                    severity: Severity::Error,
                    frame,
                    details: json!({"seq": seq, "last_seq": inner.last_seq}),
                });
                inner.stats.out_of_order += 1;
            } else {
                if seq - inner.last_seq > 1 {
                    issues.push(TimingIssue {
                        kind: IssueKind::FrameGap,
                        severity: Severity::Warning,
                        frame,
                        details: json!({
                            "seq": seq,
                            "last_seq": inner.last_seq,
                            "missing_count": seq - inner.last_seq - 1,
                        }),
                    });
                    inner.stats.frame_gaps += 1;
                }
                let frame_gap = frame.saturating_sub(inner.last_frame);
                if frame_gap > self.config.frame_jump_threshold {
                    issues.push(TimingIssue {
                        kind: IssueKind::FrameJump,
                        severity: Severity::Warning,
                        frame,
                        details: json!({"frame_gap": frame_gap, "last_frame": inner.last_frame}),
                    });
                    inner.stats.frame_jumps += 1;
                }
            }
        } else {
            inner.initialized = true;
        }

        for (name, timing) in &envelope.channel_meta {
            if timing.is_stale(self.config.stale_multiplier) {
                issues.push(TimingIssue {
                    kind: IssueKind::StaleData,
                    severity: Severity::Info,
                    frame,
                    details: json!({"channel": name, "stale_frames": timing.stale_frames}),
                });
                inner.stats.stale_reports += 1;
            }
        }

        inner.last_seq = inner.last_seq.max(seq);
        inner.last_frame = inner.last_frame.max(frame);

        issues
    }

    /// Forget the watermarks. Called on every fresh connection so the new
    /// producer's counters are accepted as the baseline.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.last_seq = 0;
        inner.last_frame = 0;
        inner.initialized = false;
    }

    /// Snapshot of the rolling counters. Never mutates.
    pub fn stats(&self) -> MonitorStats {
        self.lock().stats
    }

    /// Highest (seq, frame) observed since the last reset.
    pub fn watermarks(&self) -> (u64, u64) {
        let inner = self.lock();
        (inner.last_seq, inner.last_frame)
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TimingMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

use serde::{Deserialize, Serialize};

/// Default multiplier applied to a channel's expected period when deciding
/// staleness.
pub const DEFAULT_STALE_MULTIPLIER: u64 = 2;

/// Nominal sampling-rate category of a channel.
///
/// The producer samples each channel on its own cadence; the class scales
/// the staleness threshold accordingly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalClass {
    /// Sampled every frame.
    High,
    /// Sampled every few frames.
    Medium,
    /// Sampled rarely (periodic background refresh).
    Low,
    /// Sampled only when the underlying state changes.
    #[default]
    OnChange,
}

impl IntervalClass {
    /// Expected refresh period in frames. `None` for event-driven channels,
    /// which have no cadence to fall behind.
    pub fn expected_period(self) -> Option<u64> {
        match self {
            IntervalClass::High => Some(1),
            IntervalClass::Medium => Some(5),
            IntervalClass::Low => Some(15),
            IntervalClass::OnChange => None,
        }
    }
}

/// Per-channel timing metadata reported by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTiming {
    /// Channel name. May be empty on the wire (the map key carries it);
    /// normalized during envelope parsing.
    #[serde(default)]
    pub channel: String,
    /// Frame at which the producer sampled this channel.
    pub collect_frame: u64,
    /// Producer clock at sampling time.
    #[serde(default)]
    pub collect_time: i64,
    /// Sampling class, used to scale the staleness threshold.
    #[serde(default)]
    pub interval: IntervalClass,
    /// Frames since the producer itself last refreshed this channel.
    #[serde(default)]
    pub stale_frames: u64,
}

impl ChannelTiming {
    /// Whether the producer-side age exceeds what this channel's sampling
    /// class tolerates. Event-driven channels are never stale by this rule.
    pub fn is_stale(&self, multiplier: u64) -> bool {
        match self.interval.expected_period() {
            Some(period) => self.stale_frames > multiplier.saturating_mul(period),
            None => false,
        }
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use statelink_proto::ChannelTiming;

/// Default bounded-history capacity per channel.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// One stored observation of a channel. Owned copies only — callers can
/// never alias what the store keeps.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Last payload for the channel (opaque at this layer).
    pub data: Value,
    /// Frame at which the producer sampled this payload.
    pub collect_frame: u64,
    /// Producer clock at sampling time.
    pub collect_time: i64,
    /// Local monotonic timestamp of receipt.
    pub received_at: Instant,
}

struct ChannelSlot {
    latest: ChannelState,
    /// Past states, oldest first. `latest` is not in here.
    history: VecDeque<ChannelState>,
}

#[derive(Default)]
struct StoreInner {
    channels: HashMap<String, ChannelSlot>,
    /// Highest frame number any update has reported. Ages and freshness are
    /// measured against this.
    current_frame: u64,
}

/// Per-channel latest value + bounded history, with freshness queries and
/// the synchronized multi-channel snapshot.
///
/// One coarse lock guards everything; every update is a single atomic
/// replace-and-push-history operation. Channels are never deleted.
pub struct ChannelStateStore {
    capacity: usize,
    inner: Mutex<StoreInner>,
}

impl ChannelStateStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a store with an explicit per-channel history capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Overwrite the channel's latest state; the previous latest moves into
    /// the channel's history (oldest entry evicted at capacity).
    ///
    /// This is the store's only mutator. Absent timing metadata is
    /// synthesized as "sampled now".
    pub fn update_channel(
        &self,
        name: &str,
        data: Value,
        timing: Option<&ChannelTiming>,
        current_frame: u64,
    ) {
        let (collect_frame, collect_time) = match timing {
            Some(t) => (t.collect_frame, t.collect_time),
            None => (current_frame, 0),
        };
        let state = ChannelState {
            data,
            collect_frame,
            collect_time,
            received_at: Instant::now(),
        };

        let mut inner = self.lock();
        inner.current_frame = inner.current_frame.max(current_frame);
        match inner.channels.get_mut(name) {
            Some(slot) => {
                let prev = std::mem::replace(&mut slot.latest, state);
                if self.capacity > 0 {
                    if slot.history.len() == self.capacity {
                        slot.history.pop_front();
                    }
                    slot.history.push_back(prev);
                }
            }
            None => {
                inner.channels.insert(
                    name.to_string(),
                    ChannelSlot {
                        latest: state,
                        history: VecDeque::new(),
                    },
                );
            }
        }
    }

    /// Latest payload for the channel, if it has ever been updated.
    pub fn get_channel_data(&self, name: &str) -> Option<Value> {
        self.lock()
            .channels
            .get(name)
            .map(|slot| slot.latest.data.clone())
    }

    /// Latest full state (payload + timing) for the channel.
    pub fn get_channel_state(&self, name: &str) -> Option<ChannelState> {
        self.lock().channels.get(name).map(|slot| slot.latest.clone())
    }

    /// Whether the channel's latest state is at most `max_stale_frames`
    /// behind the store's current frame. A channel that has never been
    /// updated is simply not fresh.
    pub fn is_fresh(&self, name: &str, max_stale_frames: u64) -> bool {
        let inner = self.lock();
        match inner.channels.get(name) {
            Some(slot) => {
                inner.current_frame.saturating_sub(slot.latest.collect_frame) <= max_stale_frames
            }
            None => false,
        }
    }

    /// Age of the channel's latest state in frames.
    pub fn get_age(&self, name: &str) -> Option<u64> {
        let inner = self.lock();
        inner
            .channels
            .get(name)
            .map(|slot| inner.current_frame.saturating_sub(slot.latest.collect_frame))
    }

    /// Payload whose `collect_frame` is closest to `target_frame`, scanning
    /// history plus latest. Ties go to the more recent entry.
    pub fn get_state_at_frame(&self, name: &str, target_frame: u64) -> Option<Value> {
        let inner = self.lock();
        let slot = inner.channels.get(name)?;

        let mut best: Option<(&ChannelState, u64)> = None;
        for state in slot.history.iter().chain(std::iter::once(&slot.latest)) {
            let distance = state.collect_frame.abs_diff(target_frame);
            match best {
                Some((_, best_distance)) if distance > best_distance => {}
                _ => best = Some((state, distance)),
            }
        }
        best.map(|(state, _)| state.data.clone())
    }

    /// Latest payloads for all requested channels, but only if every channel
    /// is present and their `collect_frame` values lie within
    /// `max_frame_diff` of each other.
    ///
    /// `None` means the view would not be internally consistent right now;
    /// the caller decides whether to skip the cycle, fall back to
    /// per-channel reads, or wait.
    pub fn get_synchronized_snapshot(
        &self,
        names: &[&str],
        max_frame_diff: u64,
    ) -> Option<HashMap<String, Value>> {
        let inner = self.lock();

        let mut min_frame = u64::MAX;
        let mut max_frame = 0u64;
        let mut slots = Vec::with_capacity(names.len());
        for name in names {
            let slot = inner.channels.get(*name)?;
            min_frame = min_frame.min(slot.latest.collect_frame);
            max_frame = max_frame.max(slot.latest.collect_frame);
            slots.push((*name, slot));
        }

        if !names.is_empty() && max_frame - min_frame > max_frame_diff {
            return None;
        }

        Some(
            slots
                .into_iter()
                .map(|(name, slot)| (name.to_string(), slot.latest.data.clone()))
                .collect(),
        )
    }

    /// Names of every channel that has ever been updated.
    pub fn channel_names(&self) -> Vec<String> {
        self.lock().channels.keys().cloned().collect()
    }

    /// Number of distinct channels stored.
    pub fn len(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().channels.is_empty()
    }

    /// Current history length for the channel.
    pub fn history_len(&self, name: &str) -> Option<usize> {
        self.lock().channels.get(name).map(|slot| slot.history.len())
    }

    /// Highest frame number any update has reported.
    pub fn current_frame(&self) -> u64 {
        self.lock().current_frame
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChannelStateStore {
    fn default() -> Self {
        Self::new()
    }
}

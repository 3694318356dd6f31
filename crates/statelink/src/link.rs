use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use statelink_proto::{CommandOutcome, CommandRecord, Envelope, GameEvent, MessageKind};
use statelink_server::{ConnectionServer, ConnectionState, ServerConfig, ServerError};
use statelink_sync::{
    ChannelStateStore, MonitorConfig, MonitorStats, TimingIssue, TimingMonitor,
    DEFAULT_HISTORY_CAPACITY,
};
use tracing::debug;

use crate::subscribers::Subscribers;

/// Configuration for a [`StateLink`] instance.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub server: ServerConfig,
    pub monitor: MonitorConfig,
    /// Per-channel bounded history capacity.
    pub history_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            monitor: MonitorConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Override the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.server.bind_addr = addr;
        self
    }

    /// Override the server configuration wholesale.
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Override the monitor configuration wholesale.
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Override the per-channel history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

/// The one object a decision loop talks to.
///
/// Composes the connection server, timing monitor, and channel store:
/// incoming `DATA`/`FULL` payloads land in the store, every
/// timing-capable envelope runs through the monitor, and `EVENT`/
/// `COMMAND_RESULT` messages go straight to subscribers without touching
/// the store. All read accessors are synchronous and never wait on the
/// network.
pub struct StateLink {
    server: ConnectionServer,
    monitor: Arc<TimingMonitor>,
    store: Arc<ChannelStateStore>,
    subscribers: Arc<Subscribers>,
}

impl StateLink {
    pub fn new(config: LinkConfig) -> Self {
        let server = ConnectionServer::new(config.server);
        let monitor = Arc::new(TimingMonitor::new(config.monitor));
        let store = Arc::new(ChannelStateStore::with_capacity(config.history_capacity));
        let subscribers = Arc::new(Subscribers::default());

        {
            // A fresh producer gets a fresh baseline: reconnects must not be
            // judged against the previous connection's counters.
            let monitor = Arc::clone(&monitor);
            let subscribers = Arc::clone(&subscribers);
            server.on_connected(move |addr| {
                monitor.reset();
                subscribers.notify_connected(addr);
            });
        }
        {
            let subscribers = Arc::clone(&subscribers);
            server.on_disconnected(move || subscribers.notify_disconnected());
        }
        {
            let monitor = Arc::clone(&monitor);
            let store = Arc::clone(&store);
            let subscribers = Arc::clone(&subscribers);
            server.on_envelope(move |envelope| {
                route_envelope(&monitor, &store, &subscribers, envelope);
            });
        }

        Self {
            server,
            monitor,
            store,
            subscribers,
        }
    }

    /// Start listening for the producer. See [`ConnectionServer::start`].
    pub fn start(&self) -> Result<(), ServerError> {
        self.server.start()
    }

    /// Stop everything. See [`ConnectionServer::stop`].
    pub fn stop(&self) {
        self.server.stop();
    }

    // --- subscriptions -------------------------------------------------

    /// A producer attached.
    pub fn on_connected(&self, handler: impl Fn(SocketAddr) + Send + Sync + 'static) {
        self.subscribers.on_connected(handler);
    }

    /// The current producer was lost.
    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.subscribers.on_disconnected(handler);
    }

    /// A `DATA`/`FULL` envelope was stored; the handler sees the frame
    /// number and the channel payloads that envelope updated.
    pub fn on_frame(&self, handler: impl Fn(u64, &HashMap<String, Value>) + Send + Sync + 'static) {
        self.subscribers.on_frame(handler);
    }

    /// Every parsed envelope, before kind-specific routing.
    pub fn on_message(&self, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.subscribers.on_message(handler);
    }

    /// A timing anomaly was detected.
    pub fn on_issue(&self, handler: impl Fn(&TimingIssue) + Send + Sync + 'static) {
        self.subscribers.on_issue(handler);
    }

    /// A game event with the given name arrived.
    pub fn on_event(&self, name: &str, handler: impl Fn(&GameEvent) + Send + Sync + 'static) {
        self.subscribers.on_event(name, handler);
    }

    /// A result for a previously sent command arrived.
    pub fn on_command_result(&self, handler: impl Fn(&CommandOutcome) + Send + Sync + 'static) {
        self.subscribers.on_command_result(handler);
    }

    // --- outbound ------------------------------------------------------

    /// Send a command to the producer. Returns `false` when no producer is
    /// attached — check it.
    pub fn send_command(&self, name: &str, args: Value) -> bool {
        self.server.send(&CommandRecord::new(name, args).to_value())
    }

    // --- reads (synchronous, never block on the network) ---------------

    /// Latest payload for a channel.
    pub fn channel_data(&self, name: &str) -> Option<Value> {
        self.store.get_channel_data(name)
    }

    /// Whether a channel is at most `max_stale_frames` behind.
    pub fn is_fresh(&self, name: &str, max_stale_frames: u64) -> bool {
        self.store.is_fresh(name, max_stale_frames)
    }

    /// Age of a channel's latest state, in frames.
    pub fn age(&self, name: &str) -> Option<u64> {
        self.store.get_age(name)
    }

    /// Payload closest to the given frame, from bounded history.
    pub fn state_at_frame(&self, name: &str, target_frame: u64) -> Option<Value> {
        self.store.get_state_at_frame(name, target_frame)
    }

    /// Cross-channel consistent read; `None` when the channels' sample
    /// frames are spread wider than `max_frame_diff` or any channel is
    /// missing.
    pub fn synchronized_snapshot(
        &self,
        names: &[&str],
        max_frame_diff: u64,
    ) -> Option<HashMap<String, Value>> {
        self.store.get_synchronized_snapshot(names, max_frame_diff)
    }

    /// Rolling anomaly counters.
    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor.stats()
    }

    /// Connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.server.state()
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Direct access to the channel store.
    pub fn store(&self) -> &Arc<ChannelStateStore> {
        &self.store
    }
}

fn route_envelope(
    monitor: &TimingMonitor,
    store: &ChannelStateStore,
    subscribers: &Subscribers,
    envelope: &Envelope,
) {
    subscribers.notify_message(envelope);

    for issue in monitor.check(envelope) {
        subscribers.notify_issue(&issue);
    }

    match envelope.kind {
        MessageKind::Data | MessageKind::Full => {
            let mut updated = HashMap::with_capacity(envelope.channels.len());
            for name in &envelope.channels {
                let Some(data) = envelope.payload.get(name) else {
                    debug!(channel = %name, "channel listed without payload entry");
                    continue;
                };
                store.update_channel(
                    name,
                    data.clone(),
                    envelope.channel_meta.get(name),
                    envelope.frame,
                );
                updated.insert(name.clone(), data.clone());
            }
            subscribers.notify_frame(envelope.frame, &updated);
        }
        MessageKind::Event => match envelope.as_event() {
            Some(event) => subscribers.notify_event(&event),
            None => debug!("EVENT envelope without an event name"),
        },
        MessageKind::CommandResult => match envelope.as_command_outcome() {
            Some(outcome) => subscribers.notify_command_result(&outcome),
            None => debug!("COMMAND_RESULT envelope without a command name"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn link() -> StateLink {
        StateLink::new(LinkConfig::default())
    }

    fn envelope(value: Value) -> Envelope {
        Envelope::parse(&value).unwrap()
    }

    fn route(link: &StateLink, value: Value) {
        route_envelope(
            &link.monitor,
            &link.store,
            &link.subscribers,
            &envelope(value),
        );
    }

    #[test]
    fn data_envelope_lands_in_store() {
        let link = link();
        route(
            &link,
            json!({
                "version": "2.1",
                "type": "DATA",
                "seq": 1,
                "frame": 10,
                "channel_meta": {
                    "PLAYER_POSITION": {"collect_frame": 10, "interval": "HIGH"}
                },
                "payload": {"PLAYER_POSITION": {"x": 1, "y": 2}},
                "channels": ["PLAYER_POSITION"]
            }),
        );

        assert_eq!(
            link.channel_data("PLAYER_POSITION"),
            Some(json!({"x": 1, "y": 2}))
        );
        assert_eq!(link.age("PLAYER_POSITION"), Some(0));
        assert!(link.is_fresh("PLAYER_POSITION", 0));
    }

    #[test]
    fn full_envelope_updates_every_channel() {
        let link = link();
        route(
            &link,
            json!({
                "version": "2.1",
                "type": "FULL",
                "seq": 1,
                "frame": 20,
                "payload": {"A": 1, "B": 2, "C": 3}
            }),
        );

        assert_eq!(link.store().len(), 3);
        let snapshot = link.synchronized_snapshot(&["A", "B", "C"], 0).unwrap();
        assert_eq!(snapshot["B"], json!(2));
    }

    #[test]
    fn channel_without_meta_is_synthesized_as_sampled_now() {
        let link = link();
        route(
            &link,
            json!({
                "version": "2.1",
                "type": "DATA",
                "seq": 1,
                "frame": 30,
                "payload": {"CHAT": ["hi"]},
                "channels": ["CHAT"]
            }),
        );

        let state = link.store().get_channel_state("CHAT").unwrap();
        assert_eq!(state.collect_frame, 30);
    }

    #[test]
    fn event_bypasses_the_store() {
        let link = link();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            link.on_event("match_start", move |event| {
                seen.lock().unwrap().push(event.clone());
            });
        }

        route(
            &link,
            json!({
                "version": "2.1",
                "type": "EVENT",
                "seq": 1,
                "frame": 40,
                "event": "match_start",
                "data": {"map": "arena"}
            }),
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].data, json!({"map": "arena"}));
        assert!(link.store().is_empty(), "events are never stored");
    }

    #[test]
    fn event_subscribers_are_filtered_by_name() {
        let link = link();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            link.on_event("other_event", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        route(
            &link,
            json!({
                "version": "2.1",
                "type": "EVENT",
                "seq": 1,
                "frame": 41,
                "event": "match_start"
            }),
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn command_result_bypasses_the_store() {
        let link = link();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            link.on_command_result(move |outcome| {
                seen.lock().unwrap().push(outcome.clone());
            });
        }

        route(
            &link,
            json!({
                "version": "2.1",
                "type": "COMMAND_RESULT",
                "seq": 1,
                "frame": 50,
                "command": "move",
                "success": true,
                "result": {"steps": 4}
            }),
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].success);
        assert!(link.store().is_empty());
    }

    #[test]
    fn issues_flow_to_subscribers() {
        let link = link();
        let issues = Arc::new(Mutex::new(Vec::new()));
        {
            let issues = Arc::clone(&issues);
            link.on_issue(move |issue| {
                issues.lock().unwrap().push(issue.clone());
            });
        }

        route(&link, json!({"version": "2.1", "type": "DATA", "seq": 1, "frame": 1}));
        route(&link, json!({"version": "2.1", "type": "DATA", "seq": 5, "frame": 2}));

        let issues = issues.lock().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].details["missing_count"], 3);
        assert_eq!(link.monitor_stats().frame_gaps, 1);
    }

    #[test]
    fn frame_subscriber_sees_updated_channels_only() {
        let link = link();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            link.on_frame(move |frame, updated| {
                let mut names: Vec<String> = updated.keys().cloned().collect();
                names.sort();
                seen.lock().unwrap().push((frame, names));
            });
        }

        route(
            &link,
            json!({
                "version": "2.1",
                "type": "DATA",
                "seq": 1,
                "frame": 60,
                "payload": {"A": 1, "B": 2},
                "channels": ["A", "GHOST"]
            }),
        );

        let seen = seen.lock().unwrap();
        // GHOST has no payload entry and is skipped; B is not listed.
        assert_eq!(seen[0], (60, vec!["A".to_string()]));
    }

    #[test]
    fn send_command_without_producer_is_false() {
        let link = link();
        assert!(!link.send_command("move", json!({"x": 1})));
    }
}

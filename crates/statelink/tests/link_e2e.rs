//! End-to-end tests over real TCP sockets: a fake producer pushes
//! newline-delimited JSON records and the consumer-facing surface is
//! observed from the outside.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use statelink::sync::IssueKind;
use statelink::{LinkConfig, StateLink};

fn fast_config() -> LinkConfig {
    let server = statelink::server::ServerConfig::default()
        .with_bind_addr("127.0.0.1:0".parse().unwrap())
        .with_read_timeout(Duration::from_millis(25))
        .with_accept_poll(Duration::from_millis(10));
    LinkConfig::default().with_server(server)
}

fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).expect("producer should connect")
}

fn send_line(stream: &mut TcpStream, record: Value) {
    let mut line = serde_json::to_vec(&record).unwrap();
    line.push(b'\n');
    stream.write_all(&line).unwrap();
    stream.flush().unwrap();
}

/// Poll until the closure yields `Some`, or panic at the deadline.
fn wait_for<T>(what: &str, mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn data_flows_from_producer_to_reads() {
    let link = StateLink::new(fast_config());
    link.start().unwrap();
    let addr = link.local_addr().unwrap();

    let mut producer = connect(addr);
    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "DATA",
            "seq": 1,
            "frame": 10,
            "game_time": 1000,
            "prev_frame": 9,
            "channel_meta": {
                "PLAYER_POSITION": {
                    "collect_frame": 10,
                    "collect_time": 1000,
                    "interval": "HIGH",
                    "stale_frames": 0
                }
            },
            "payload": {"PLAYER_POSITION": {"x": 1, "y": 2}},
            "channels": ["PLAYER_POSITION"]
        }),
    );

    let data = wait_for("PLAYER_POSITION data", || {
        link.channel_data("PLAYER_POSITION")
    });
    assert_eq!(data, json!({"x": 1, "y": 2}));
    assert!(link.is_fresh("PLAYER_POSITION", 0));

    link.stop();
}

#[test]
fn reconnect_resets_counters_and_trips_nothing() {
    let link = StateLink::new(fast_config());

    let (conn_tx, conn_rx) = mpsc::channel();
    link.on_connected(move |addr| {
        let _ = conn_tx.send(addr);
    });
    let (disc_tx, disc_rx) = mpsc::channel();
    link.on_disconnected(move || {
        let _ = disc_tx.send(());
    });
    let (issue_tx, issue_rx) = mpsc::channel();
    link.on_issue(move |issue| {
        let _ = issue_tx.send(issue.clone());
    });

    link.start().unwrap();
    let addr = link.local_addr().unwrap();

    // First producer session at frame 10.
    let mut producer = connect(addr);
    conn_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "DATA",
            "seq": 5,
            "frame": 10,
            "payload": {"PLAYER_POSITION": {"x": 1, "y": 2}},
            "channels": ["PLAYER_POSITION"]
        }),
    );
    wait_for("first session data", || link.channel_data("PLAYER_POSITION"));

    drop(producer);
    disc_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("disconnected event");

    // Stored state survives the disconnect.
    assert_eq!(
        link.channel_data("PLAYER_POSITION"),
        Some(json!({"x": 1, "y": 2}))
    );

    // Second session restarts its counters far away from the first.
    let mut producer = connect(addr);
    conn_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "DATA",
            "seq": 0,
            "frame": 50,
            "payload": {"PLAYER_POSITION": {"x": 9, "y": 9}},
            "channels": ["PLAYER_POSITION"]
        }),
    );
    wait_for("second session data", || {
        link.channel_data("PLAYER_POSITION")
            .filter(|v| v == &json!({"x": 9, "y": 9}))
    });

    // The fresh counters must not be judged against the old session.
    for issue in issue_rx.try_iter() {
        assert_ne!(
            issue.kind,
            IssueKind::FrameJump,
            "reconnect misread as a frame jump: {issue:?}"
        );
        assert_ne!(
            issue.kind,
            IssueKind::OutOfOrder,
            "reconnect misread as a regression: {issue:?}"
        );
    }

    link.stop();
}

#[test]
fn command_round_trip() {
    let link = StateLink::new(fast_config());
    let (conn_tx, conn_rx) = mpsc::channel();
    link.on_connected(move |_| {
        let _ = conn_tx.send(());
    });
    let (result_tx, result_rx) = mpsc::channel();
    link.on_command_result(move |outcome| {
        let _ = result_tx.send(outcome.clone());
    });

    link.start().unwrap();
    let addr = link.local_addr().unwrap();

    // No producer yet: capability unavailable, not an error.
    assert!(!link.send_command("move", json!({"x": 3})));

    let mut producer = connect(addr);
    conn_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    assert!(wait_for("command accepted", || {
        link.send_command("move", json!({"x": 3})).then_some(true)
    }));

    // The producer sees the CMD record on the wire…
    producer
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut reader = statelink::frame::RecordReader::new(
        producer.try_clone().unwrap(),
    );
    let record = wait_for("CMD on the wire", || reader.read_record().ok().flatten());
    assert_eq!(record["type"], "CMD");
    assert_eq!(record["command"], "move");
    assert_eq!(record["args"], json!({"x": 3}));

    // …and answers with a COMMAND_RESULT, which bypasses the store.
    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "COMMAND_RESULT",
            "seq": 1,
            "frame": 20,
            "command": "move",
            "success": true,
            "result": {"steps": 2}
        }),
    );

    let outcome = result_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(outcome.command, "move");
    assert!(outcome.success);
    assert!(link.store().is_empty());

    link.stop();
}

#[test]
fn events_reach_named_subscribers_only() {
    let link = StateLink::new(fast_config());
    let (event_tx, event_rx) = mpsc::channel();
    link.on_event("match_start", move |event| {
        let _ = event_tx.send(event.clone());
    });
    let (other_tx, other_rx) = mpsc::channel();
    link.on_event("match_end", move |event| {
        let _ = other_tx.send(event.clone());
    });

    link.start().unwrap();
    let mut producer = connect(link.local_addr().unwrap());

    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "EVENT",
            "seq": 1,
            "frame": 7,
            "event": "match_start",
            "data": {"map": "arena"}
        }),
    );

    let event = event_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.name, "match_start");
    assert_eq!(event.frame, 7);
    assert!(other_rx.try_recv().is_err());
    assert!(link.store().is_empty(), "events never touch the store");

    link.stop();
}

#[test]
fn synchronized_snapshot_over_live_stream() {
    let link = StateLink::new(fast_config());
    link.start().unwrap();
    let mut producer = connect(link.local_addr().unwrap());

    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "DATA",
            "seq": 1,
            "frame": 103,
            "channel_meta": {
                "A": {"collect_frame": 100, "interval": "MEDIUM"},
                "B": {"collect_frame": 103, "interval": "HIGH"}
            },
            "payload": {"A": "a", "B": "b"},
            "channels": ["A", "B"]
        }),
    );

    wait_for("both channels stored", || {
        (link.store().len() == 2).then_some(())
    });

    // Spread 3 ≤ 5: consistent.
    let snapshot = link.synchronized_snapshot(&["A", "B"], 5).unwrap();
    assert_eq!(snapshot["A"], json!("a"));

    // Push B far ahead; the pair is no longer consistent.
    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "DATA",
            "seq": 2,
            "frame": 110,
            "channel_meta": {"B": {"collect_frame": 110, "interval": "HIGH"}},
            "payload": {"B": "b2"},
            "channels": ["B"]
        }),
    );
    wait_for("B advanced", || {
        link.channel_data("B").filter(|v| v == &json!("b2"))
    });

    assert!(link.synchronized_snapshot(&["A", "B"], 5).is_none());
    assert!(link.synchronized_snapshot(&["A", "MISSING"], 100).is_none());
    // Per-channel reads still work as the fallback.
    assert_eq!(link.channel_data("A"), Some(json!("a")));

    link.stop();
}

#[test]
fn legacy_producer_is_accepted() {
    let link = StateLink::new(fast_config());
    link.start().unwrap();
    let mut producer = connect(link.local_addr().unwrap());

    send_line(
        &mut producer,
        json!({
            "version": "2.0",
            "type": "DATA",
            "frame": 5,
            "payload": {"UNITS": [{"id": 1}]},
            "channels": ["UNITS"]
        }),
    );

    let data = wait_for("legacy data stored", || link.channel_data("UNITS"));
    assert_eq!(data, json!([{"id": 1}]));
    // Legacy envelopes carry no timing metadata to monitor.
    assert_eq!(link.monitor_stats().total_messages, 0);

    link.stop();
}

#[test]
fn stop_then_restart_keeps_store() {
    let link = StateLink::new(fast_config());
    link.start().unwrap();
    let mut producer = connect(link.local_addr().unwrap());

    send_line(
        &mut producer,
        json!({
            "version": "2.1",
            "type": "DATA",
            "seq": 1,
            "frame": 1,
            "payload": {"A": 1},
            "channels": ["A"]
        }),
    );
    wait_for("data stored", || link.channel_data("A"));

    link.stop();
    link.stop(); // idempotent

    assert_eq!(link.channel_data("A"), Some(json!(1)));

    link.start().unwrap();
    assert_eq!(
        link.connection_state(),
        statelink::server::ConnectionState::Listening
    );
    link.stop();
}

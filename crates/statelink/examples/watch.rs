//! Minimal consumer — listens for a producer and narrates what arrives.
//!
//! Run with:
//!   cargo run --example watch
//!
//! In another terminal:
//!   cargo run --example feed

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use statelink::{LinkConfig, StateLink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let link = StateLink::new(LinkConfig::default());

    link.on_connected(|addr| eprintln!("producer connected from {addr}"));
    link.on_disconnected(|| eprintln!("producer lost; waiting for the next one"));
    link.on_frame(|frame, updated: &HashMap<String, Value>| {
        let mut names: Vec<&str> = updated.keys().map(String::as_str).collect();
        names.sort_unstable();
        eprintln!("frame {frame}: updated {names:?}");
    });
    link.on_issue(|issue| eprintln!("timing issue: {:?} {}", issue.kind, issue.details));
    link.on_event("match_start", |event| {
        eprintln!("match started at frame {}: {}", event.frame, event.data);
    });

    link.start()?;
    eprintln!(
        "listening on {}",
        link.local_addr().map(|a| a.to_string()).unwrap_or_default()
    );

    loop {
        std::thread::sleep(Duration::from_secs(2));
        match link.synchronized_snapshot(&["PLAYER_POSITION", "UNITS"], 5) {
            Some(snapshot) => eprintln!("consistent view: {snapshot:?}"),
            None => eprintln!("no consistent view right now; stats: {:?}", link.monitor_stats()),
        }
    }
}

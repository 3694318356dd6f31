//! Synthetic producer — connects to a running `watch` example and pushes a
//! telemetry stream in the wire format.
//!
//! Run with:
//!   cargo run --example feed

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect("127.0.0.1:9527")?;
    eprintln!("connected to consumer");

    for frame in 1u64.. {
        let record = json!({
            "version": "2.1",
            "type": "DATA",
            "seq": frame,
            "frame": frame,
            "game_time": frame * 33,
            "prev_frame": frame.saturating_sub(1),
            "channel_meta": {
                "PLAYER_POSITION": {
                    "collect_frame": frame,
                    "collect_time": frame * 33,
                    "interval": "HIGH",
                    "stale_frames": 0
                },
                "UNITS": {
                    "collect_frame": frame - frame % 5,
                    "collect_time": (frame - frame % 5) * 33,
                    "interval": "MEDIUM",
                    "stale_frames": frame % 5
                }
            },
            "payload": {
                "PLAYER_POSITION": {"x": frame % 100, "y": (frame * 2) % 100},
                "UNITS": [{"id": 1, "hp": 100 - (frame % 100)}]
            },
            "channels": ["PLAYER_POSITION", "UNITS"]
        });

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        stream.write_all(&line)?;
        stream.flush()?;

        if frame % 30 == 0 {
            eprintln!("sent frame {frame}");
        }
        std::thread::sleep(Duration::from_millis(33));
    }
    Ok(())
}

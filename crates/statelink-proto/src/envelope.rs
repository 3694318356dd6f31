use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::timing::ChannelTiming;

/// Protocol version string of legacy producers.
pub const LEGACY_VERSION: &str = "2.0";

/// Message kind carried in the record's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Partial/incremental payload: only the listed channels changed.
    Data,
    /// Snapshot across all known channels.
    Full,
    /// One-shot notification; forwarded to subscribers, never stored.
    Event,
    /// Reply correlated to a previously sent outbound command.
    CommandResult,
}

/// One parsed protocol message.
///
/// Legacy (v2.0) records are normalized at parse time: `seq` 0, `prev_frame`
/// one behind `frame`, empty `channel_meta`. Channel payloads stay opaque
/// `Value`s at this layer; structural decoding belongs to channel-specific
/// parsers downstream.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Producer protocol version, e.g. "2.1". Preserved verbatim.
    pub version: String,
    pub kind: MessageKind,
    /// Monotonic message counter. 0 for legacy producers.
    pub seq: u64,
    /// Game tick number at send time.
    pub frame: u64,
    /// Opaque producer-side clock.
    pub game_time: i64,
    /// Frame the producer believes it sent previously.
    pub prev_frame: u64,
    /// Per-channel timing metadata, keyed by channel name.
    pub channel_meta: HashMap<String, ChannelTiming>,
    /// Opaque per-channel payloads, keyed by channel name.
    pub payload: HashMap<String, Value>,
    /// Ordered list of channels present in this message.
    pub channels: Vec<String>,
    event: Option<String>,
    event_data: Option<Value>,
    command: Option<String>,
    success: Option<bool>,
    result: Option<Value>,
    error: Option<String>,
}

/// Typed view of an EVENT envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub name: String,
    pub data: Value,
    pub frame: u64,
}

/// Typed view of a COMMAND_RESULT envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    pub result: Value,
    pub error: Option<String>,
    pub frame: u64,
}

impl Envelope {
    /// Give a decoded record its protocol shape.
    ///
    /// Only `type` and `frame` are mandatory; everything else is defaulted.
    /// Failures here are recovered by the caller exactly like framing
    /// errors: log, skip, continue.
    pub fn parse(record: &Value) -> Result<Envelope> {
        let obj = record
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidField {
                field: "record",
                reason: "not a JSON object".to_string(),
            })?;

        let kind_name = require_str(obj, "type")?;
        let kind = match kind_name {
            "DATA" => MessageKind::Data,
            "FULL" => MessageKind::Full,
            "EVENT" => MessageKind::Event,
            "COMMAND_RESULT" => MessageKind::CommandResult,
            other => return Err(ProtocolError::UnknownKind(other.to_string())),
        };
        let frame = require_u64(obj, "frame")?;

        let version = opt_str(obj, "version")
            .unwrap_or(LEGACY_VERSION)
            .to_string();
        let legacy = version == LEGACY_VERSION;

        let seq = if legacy {
            0
        } else {
            opt_u64(obj, "seq").unwrap_or(0)
        };
        let game_time = opt_i64(obj, "game_time").unwrap_or(0);
        let prev_frame = if legacy {
            frame.saturating_sub(1)
        } else {
            opt_u64(obj, "prev_frame").unwrap_or_else(|| frame.saturating_sub(1))
        };

        let channel_meta = if legacy {
            HashMap::new()
        } else {
            parse_channel_meta(obj.get("channel_meta"))
        };

        let payload: HashMap<String, Value> = match obj.get("payload").and_then(Value::as_object) {
            Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => HashMap::new(),
        };

        let channels = match obj.get("channels").and_then(Value::as_array) {
            Some(list) => list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            None => {
                // Producers that omit the list still get every payload entry.
                let mut names: Vec<String> = payload.keys().cloned().collect();
                names.sort();
                names
            }
        };

        Ok(Envelope {
            version,
            kind,
            seq,
            frame,
            game_time,
            prev_frame,
            channel_meta,
            payload,
            channels,
            event: opt_str(obj, "event").map(str::to_string),
            event_data: obj.get("data").cloned(),
            command: opt_str(obj, "command").map(str::to_string),
            success: obj.get("success").and_then(Value::as_bool),
            result: obj.get("result").cloned(),
            error: opt_str(obj, "error").map(str::to_string),
        })
    }

    /// Whether this envelope carries sequence/timing metadata worth
    /// monitoring. Legacy producers do not.
    pub fn has_timing_metadata(&self) -> bool {
        self.version != LEGACY_VERSION
    }

    /// Typed view of an EVENT envelope, if this is one.
    pub fn as_event(&self) -> Option<GameEvent> {
        if self.kind != MessageKind::Event {
            return None;
        }
        let name = self.event.clone()?;
        Some(GameEvent {
            name,
            data: self.event_data.clone().unwrap_or(Value::Null),
            frame: self.frame,
        })
    }

    /// Typed view of a COMMAND_RESULT envelope, if this is one.
    pub fn as_command_outcome(&self) -> Option<CommandOutcome> {
        if self.kind != MessageKind::CommandResult {
            return None;
        }
        let command = self.command.clone()?;
        Some(CommandOutcome {
            command,
            success: self.success.unwrap_or(false),
            result: self.result.clone().unwrap_or(Value::Null),
            error: self.error.clone(),
            frame: self.frame,
        })
    }
}

/// Parse the `channel_meta` map leniently: entries that fail to deserialize
/// are dropped, not fatal — a producer bug in one channel's metadata must
/// not cost the whole message.
fn parse_channel_meta(value: Option<&Value>) -> HashMap<String, ChannelTiming> {
    let Some(map) = value.and_then(Value::as_object) else {
        return HashMap::new();
    };

    let mut meta = HashMap::with_capacity(map.len());
    for (name, entry) in map {
        match serde_json::from_value::<ChannelTiming>(entry.clone()) {
            Ok(mut timing) => {
                if timing.channel.is_empty() {
                    timing.channel = name.clone();
                }
                meta.insert(name.clone(), timing);
            }
            Err(err) => {
                debug!(channel = %name, error = %err, "skipping malformed channel_meta entry");
            }
        }
    }
    meta
}

fn require_str<'a>(obj: &'a serde_json::Map<String, Value>, field: &'static str) -> Result<&'a str> {
    match obj.get(field) {
        None => Err(ProtocolError::MissingField(field)),
        Some(value) => value.as_str().ok_or_else(|| ProtocolError::InvalidField {
            field,
            reason: format!("expected string, got {value}"),
        }),
    }
}

fn require_u64(obj: &serde_json::Map<String, Value>, field: &'static str) -> Result<u64> {
    match obj.get(field) {
        None => Err(ProtocolError::MissingField(field)),
        Some(value) => value.as_u64().ok_or_else(|| ProtocolError::InvalidField {
            field,
            reason: format!("expected non-negative integer, got {value}"),
        }),
    }
}

fn opt_str<'a>(obj: &'a serde_json::Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

fn opt_u64(obj: &serde_json::Map<String, Value>, field: &str) -> Option<u64> {
    obj.get(field).and_then(Value::as_u64)
}

fn opt_i64(obj: &serde_json::Map<String, Value>, field: &str) -> Option<i64> {
    obj.get(field).and_then(Value::as_i64)
}

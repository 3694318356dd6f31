use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire `type` of outbound command records.
pub const COMMAND_RECORD_TYPE: &str = "CMD";

/// Outbound command frame written back to the producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl CommandRecord {
    /// Create a command record with arguments.
    pub fn new(command: impl Into<String>, args: Value) -> Self {
        Self {
            record_type: COMMAND_RECORD_TYPE.to_string(),
            command: command.into(),
            args: Some(args),
        }
    }

    /// Create a command record with no arguments.
    pub fn bare(command: impl Into<String>) -> Self {
        Self {
            record_type: COMMAND_RECORD_TYPE.to_string(),
            command: command.into(),
            args: None,
        }
    }

    /// The record as a generic wire value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

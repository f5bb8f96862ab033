//! Command messages carried inside protocol frames.
//!
//! A [`CommandMessage`] is the logical instruction sent to the camera (or to
//! the relay server that forwards to it). On the wire it is a JSON object
//! whose `code` field selects the command and whose optional `devTarget`
//! field names the target device. Any other fields are carried through
//! untouched in [`CommandMessage::extra`].
//!
//! # Example
//!
//! ```
//! use camwire_core::message::{CommandMessage, CODE_START_STREAMING};
//!
//! let msg = CommandMessage::start_streaming("deadbeef");
//! assert_eq!(msg.code, CODE_START_STREAMING);
//! assert_eq!(msg.to_string(), r#"{"code":3,"devTarget":"deadbeef"}"#);
//! ```

use std::fmt;

use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Command code that asks the camera to start streaming.
pub const CODE_START_STREAMING: i64 = 3;

/// JSON key holding the command code.
pub const KEY_CODE: &str = "code";

/// JSON key holding the target device identifier.
pub const KEY_DEV_TARGET: &str = "devTarget";

/// A command sent to (or received from) the camera control channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandMessage {
    /// Command identifier.
    pub code: i64,

    /// Target device identifier (typically 8 hex characters).
    #[serde(rename = "devTarget", default)]
    pub dev_target: Option<String>,

    /// Any further fields, serialized after `code` and `devTarget`.
    ///
    /// Must not contain `code` or `devTarget`; encoding such a message fails.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandMessage {
    /// Create a message with the given code and no other fields.
    pub fn new(code: i64) -> Self {
        Self {
            code,
            dev_target: None,
            extra: Map::new(),
        }
    }

    /// The start-streaming command for the given device.
    pub fn start_streaming(dev_target: impl Into<String>) -> Self {
        Self::new(CODE_START_STREAMING).with_dev_target(dev_target)
    }

    /// Set the target device.
    pub fn with_dev_target(mut self, dev_target: impl Into<String>) -> Self {
        self.dev_target = Some(dev_target.into());
        self
    }

    /// Add an extra field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a field by its JSON key, including `code` and `devTarget`.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            KEY_CODE => Some(Value::from(self.code)),
            KEY_DEV_TARGET => self.dev_target.clone().map(Value::from),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Returns `true` if this is a start-streaming command.
    pub fn is_start_streaming(&self) -> bool {
        self.code == CODE_START_STREAMING
    }
}

impl Serialize for CommandMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(key) = [KEY_CODE, KEY_DEV_TARGET]
            .into_iter()
            .find(|k| self.extra.contains_key(*k))
        {
            return Err(S::Error::custom(format!(
                "extra fields must not repeat reserved key `{key}`"
            )));
        }

        let len = 1 + usize::from(self.dev_target.is_some()) + self.extra.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(KEY_CODE, &self.code)?;
        if let Some(target) = &self.dev_target {
            map.serialize_entry(KEY_DEV_TARGET, target)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Display for CommandMessage {
    /// Compact JSON, or a `key=value` rendering when the message cannot be
    /// encoded because `extra` repeats a reserved key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => {
                write!(f, "code={}", self.code)?;
                if let Some(target) = &self.dev_target {
                    write!(f, " devTarget={target}")?;
                }
                write!(f, " extra={}", Value::Object(self.extra.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_streaming_serializes_code_then_target() {
        let msg = CommandMessage::start_streaming("deadbeef");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"code":3,"devTarget":"deadbeef"}"#);
    }

    #[test]
    fn missing_dev_target_is_omitted() {
        let json = serde_json::to_string(&CommandMessage::new(101)).unwrap();
        assert_eq!(json, r#"{"code":101}"#);
    }

    #[test]
    fn extra_fields_follow_reserved_ones() {
        let msg = CommandMessage::new(301)
            .with_dev_target("00112233")
            .with_field("status", 200);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"code":301,"devTarget":"00112233","status":200}"#);
    }

    #[test]
    fn reserved_key_in_extra_fails_to_serialize() {
        let msg = CommandMessage::new(3).with_field("code", 4);
        let err = serde_json::to_string(&msg).unwrap_err();
        assert!(err.to_string().contains("reserved key `code`"));
    }

    #[test]
    fn display_of_unencodable_message_does_not_fail() {
        let msg = CommandMessage::start_streaming("deadbeef").with_field("code", 4);
        assert_eq!(
            msg.to_string(),
            r#"code=3 devTarget=deadbeef extra={"code":4}"#
        );
    }

    #[test]
    fn deserializes_unknown_fields_into_extra() {
        let msg: CommandMessage = serde_json::from_value(json!({
            "code": 101,
            "status": 200,
            "content": {"unixTimer": 1700000000}
        }))
        .unwrap();
        assert_eq!(msg.code, 101);
        assert_eq!(msg.dev_target, None);
        assert_eq!(msg.get("status"), Some(json!(200)));
        assert_eq!(msg.get("content"), Some(json!({"unixTimer": 1700000000})));
    }

    #[test]
    fn rejects_object_without_code() {
        let result = serde_json::from_value::<CommandMessage>(json!({"devTarget": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_integer_code() {
        let result = serde_json::from_value::<CommandMessage>(json!({"code": "3"}));
        assert!(result.is_err());
    }

    #[test]
    fn get_covers_reserved_keys() {
        let msg = CommandMessage::start_streaming("deadbeef");
        assert_eq!(msg.get("code"), Some(json!(3)));
        assert_eq!(msg.get("devTarget"), Some(json!("deadbeef")));
        assert_eq!(msg.get("missing"), None);
        assert!(msg.is_start_streaming());
    }
}

//! Argument parsing helpers and output rendering for the `camwire` binary.

use camwire_core::message::CommandMessage;
use camwire_core::protocol::{parse_payload, split_frame, Frame, ProtocolError};
use serde_json::Value;

/// Parse hex input, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = input.split_whitespace().collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits)
}

/// clap value parser for `--forward-id`: exactly 16 hex digits.
pub fn parse_forward_id(input: &str) -> Result<[u8; 8], String> {
    let bytes = parse_hex(input).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 8 bytes (16 hex digits), got {}", b.len()))
}

/// clap value parser for `--field key=value`.
///
/// The value is read as JSON when it parses, otherwise as a plain string, so
/// `--field status=200` gives a number and `--field name=front` a string.
pub fn parse_field(input: &str) -> Result<(String, Value), String> {
    let (key, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{input}`"))?;
    if key.is_empty() {
        return Err("field name must not be empty".to_string());
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Result of decoding every frame in a buffer.
#[derive(Debug)]
pub struct DecodedBuffer {
    /// Frames in wire order; malformed payloads are kept as errors.
    pub frames: Vec<Result<Frame, ProtocolError>>,
    /// Bytes left over that do not form a complete frame.
    pub trailing: usize,
}

/// Decode all complete frames in `data`.
pub fn decode_all(data: &[u8]) -> DecodedBuffer {
    let mut frames = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let Ok((header, payload, tail)) = split_frame(rest) else {
            break;
        };
        let frame = parse_payload::<CommandMessage>(payload, header.frame_len())
            .map(|message| Frame { header, message });
        frames.push(frame);
        rest = tail;
    }
    DecodedBuffer {
        frames,
        trailing: rest.len(),
    }
}

/// One-line text rendering of a frame.
pub fn frame_line(frame: &Frame) -> String {
    let h = &frame.header;
    format!(
        "len={} flag={} package={} deal={} forward={} {}",
        h.length,
        h.message_flag,
        h.package_id,
        h.deal_flag,
        hex::encode(h.forward_id),
        frame.message
    )
}

/// JSON rendering of a frame.
pub fn frame_json(frame: &Frame) -> Value {
    let h = &frame.header;
    serde_json::json!({
        "length": h.length,
        "message_flag": h.message_flag,
        "package_id": h.package_id,
        "deal_flag": h.deal_flag,
        "forward_id": hex::encode(h.forward_id),
        "message": serde_json::to_value(&frame.message).unwrap_or(Value::Null),
    })
}

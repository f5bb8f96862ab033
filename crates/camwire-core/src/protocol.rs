//! Binary wire framing for the camera control channel.
//!
//! Every message exchanged with the camera (or the relay server in front of
//! it) is a fixed 18-byte header followed by a JSON payload.
//!
//! # Frame Structure (Little Endian)
//!
//! ```text
//! offset  size  field
//! 0       4     length       u32 LE, payload byte count (header excluded)
//! 4       1     message_flag
//! 5       4     package_id   u32 LE, request/response correlation
//! 9       1     deal_flag
//! 10      8     forward_id   routing token
//! 18      len   payload      UTF-8 JSON text
//! ```
//!
//! The explicit length lets a receiver pull discrete frames out of a TCP
//! byte stream without scanning the JSON for a terminator.
//!
//! # Example
//!
//! ```
//! use camwire_core::message::CommandMessage;
//! use camwire_core::protocol::{decode, encode, HEADER_LEN};
//!
//! let msg = CommandMessage::start_streaming("deadbeef");
//! let wire = encode(&msg).unwrap();
//! assert_eq!(wire.len(), HEADER_LEN + msg.to_string().len());
//!
//! let (decoded, rest) = decode(&wire).unwrap();
//! assert_eq!(decoded, msg);
//! assert!(rest.is_empty());
//! ```

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::CommandMessage;

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 18;

/// Default ceiling on a single frame payload accepted by [`FrameCodec`].
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during frame encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message could not be serialized as JSON.
    #[error("failed to encode message: {0}")]
    Encoding(String),

    /// The buffer holds less than one full frame. Not fatal: read more
    /// bytes and retry.
    #[error("incomplete frame: {needed} more bytes required")]
    IncompleteFrame {
        /// Minimum number of additional bytes before a retry can succeed.
        needed: usize,
    },

    /// The frame was complete but its payload is not a valid command.
    ///
    /// `frame_len` is the full size of the offending frame (header included)
    /// so a receiver can skip it and carry on with the remainder.
    #[error("malformed payload in {frame_len}-byte frame: {reason}")]
    MalformedPayload {
        /// Parser diagnostic.
        reason: String,
        /// Total bytes occupied by the bad frame.
        frame_len: usize,
    },

    /// The declared payload length exceeds the configured ceiling.
    #[error("payload of {length} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Declared or actual payload length.
        length: usize,
        /// Configured ceiling.
        limit: usize,
    },
}

impl ProtocolError {
    /// Returns `true` for the recoverable "need more bytes" signal.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::IncompleteFrame { .. })
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The fixed 18-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub length: u32,
    /// Message flag byte (observed 0).
    pub message_flag: u8,
    /// Correlation id (observed 0).
    pub package_id: u32,
    /// Deal flag byte (observed 0).
    pub deal_flag: u8,
    /// Forwarding token (observed all zero).
    pub forward_id: [u8; 8],
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = HEADER_LEN;

    /// Build the header for a payload of `length` bytes.
    pub fn for_payload(length: u32, options: &FrameOptions) -> Self {
        Self {
            length,
            message_flag: options.message_flag,
            package_id: options.package_id,
            deal_flag: options.deal_flag,
            forward_id: options.forward_id,
        }
    }

    /// Parse a header from the start of `data`.
    ///
    /// Returns [`ProtocolError::IncompleteFrame`] if fewer than 18 bytes are
    /// available.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::SIZE {
            return Err(ProtocolError::IncompleteFrame {
                needed: Self::SIZE - data.len(),
            });
        }

        let mut buf = &data[..Self::SIZE];
        let length = buf.get_u32_le();
        let message_flag = buf.get_u8();
        let package_id = buf.get_u32_le();
        let deal_flag = buf.get_u8();
        let mut forward_id = [0u8; 8];
        buf.copy_to_slice(&mut forward_id);

        Ok(Self {
            length,
            message_flag,
            package_id,
            deal_flag,
            forward_id,
        })
    }

    /// Append the encoded header to `buf`.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.length);
        buf.put_u8(self.message_flag);
        buf.put_u32_le(self.package_id);
        buf.put_u8(self.deal_flag);
        buf.put_slice(&self.forward_id);
    }

    /// Encode the header into a fixed array.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        self.write_to(&mut &mut out[..]);
        out
    }

    /// Total frame size (header plus payload).
    pub fn frame_len(&self) -> usize {
        Self::SIZE.saturating_add(self.length as usize)
    }
}

// ---------------------------------------------------------------------------
// Encoding options
// ---------------------------------------------------------------------------

/// How the JSON payload is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadStyle {
    /// No insignificant whitespace.
    #[default]
    Compact,
    /// `", "` between items and `": "` after keys, matching the frames seen
    /// in packet captures of the vendor tooling.
    Spaced,
}

/// Header fields and payload layout used when encoding a frame.
///
/// Everything defaults to zero / [`PayloadStyle::Compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameOptions {
    pub message_flag: u8,
    pub package_id: u32,
    pub deal_flag: u8,
    pub forward_id: [u8; 8],
    pub style: PayloadStyle,
}

impl FrameOptions {
    /// Set the correlation id.
    pub fn with_package_id(mut self, package_id: u32) -> Self {
        self.package_id = package_id;
        self
    }

    /// Set the payload layout.
    pub fn with_style(mut self, style: PayloadStyle) -> Self {
        self.style = style;
        self
    }
}

/// serde_json formatter emitting `", "` and `": "` separators.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serialize `message` to JSON bytes in the requested style.
pub fn encode_payload<T>(message: &T, style: PayloadStyle) -> Result<Vec<u8>, ProtocolError>
where
    T: Serialize + ?Sized,
{
    let result = match style {
        PayloadStyle::Compact => serde_json::to_vec(message),
        PayloadStyle::Spaced => {
            let mut buf = Vec::with_capacity(128);
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
            message.serialize(&mut ser).map(|()| buf)
        }
    };
    result.map_err(|e| ProtocolError::Encoding(e.to_string()))
}

/// Encode any serializable message into a complete frame.
///
/// The result is `18 + payload.len()` bytes, ready to be written to a socket.
pub fn encode_frame<T>(message: &T, options: &FrameOptions) -> Result<Vec<u8>, ProtocolError>
where
    T: Serialize + ?Sized,
{
    let payload = encode_payload(message, options.style)?;
    let length = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        length: payload.len(),
        limit: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    FrameHeader::for_payload(length, options).write_to(&mut frame);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Encode a [`CommandMessage`] with all header fields zeroed.
pub fn encode(message: &CommandMessage) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(message, &FrameOptions::default())
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// A decoded frame: its header and the command it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub message: CommandMessage,
}

/// Split the first frame off `data` without interpreting the payload.
///
/// Returns the header, the payload slice and the bytes following the frame.
pub fn split_frame(data: &[u8]) -> Result<(FrameHeader, &[u8], &[u8]), ProtocolError> {
    let header = FrameHeader::parse(data)?;
    let total = header.frame_len();
    if data.len() < total {
        return Err(ProtocolError::IncompleteFrame {
            needed: total - data.len(),
        });
    }
    Ok((header, &data[HEADER_LEN..total], &data[total..]))
}

/// Parse a payload as JSON into `T`.
///
/// `frame_len` is reported back in [`ProtocolError::MalformedPayload`].
pub fn parse_payload<T: DeserializeOwned>(
    payload: &[u8],
    frame_len: usize,
) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedPayload {
        reason: e.to_string(),
        frame_len,
    })
}

/// Decode the first frame in `data`, returning it with the unread remainder.
pub fn decode_frame(data: &[u8]) -> Result<(Frame, &[u8]), ProtocolError> {
    let (header, payload, rest) = split_frame(data)?;
    let message = parse_payload(payload, header.frame_len())?;
    Ok((Frame { header, message }, rest))
}

/// Decode the first command in `data`, returning it with the unread remainder.
pub fn decode(data: &[u8]) -> Result<(CommandMessage, &[u8]), ProtocolError> {
    decode_frame(data).map(|(frame, rest)| (frame.message, rest))
}

// ---------------------------------------------------------------------------
// Streaming codec
// ---------------------------------------------------------------------------

/// Errors raised by [`FrameCodec`] that end the stream.
#[derive(Error, Debug)]
pub enum CodecError {
    /// An I/O error occurred on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame violated the protocol in a way the stream cannot recover from.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The stream ended partway through a frame.
    #[error("stream closed with {0} bytes of an unfinished frame")]
    Truncated(usize),
}

/// [`Decoder`]/[`Encoder`] pair for the framed protocol.
///
/// Decoded items are `Result<Frame, ProtocolError>`: a frame with a bad
/// payload is consumed and reported as an item, leaving the stream usable.
/// Only an oversized length prefix is fatal, since the stream cannot be
/// resynchronised after it.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    options: FrameOptions,
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            options: FrameOptions::default(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Use `options` for every encoded frame.
    pub fn with_options(mut self, options: FrameOptions) -> Self {
        self.options = options;
        self
    }

    /// Change the payload ceiling.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }

    /// Largest payload accepted in either direction.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Decoder for FrameCodec {
    type Item = Result<Frame, ProtocolError>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match FrameHeader::parse(&src[..]) {
            Ok(header) => header,
            Err(ProtocolError::IncompleteFrame { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let length = header.length as usize;
        if length > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                length,
                limit: self.max_payload,
            }
            .into());
        }

        let total = header.frame_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        let item = parse_payload(&frame[HEADER_LEN..], total).map(|message| Frame { header, message });
        Ok(Some(item))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(item) => Ok(Some(item)),
            None if buf.is_empty() => Ok(None),
            None => Err(CodecError::Truncated(buf.len())),
        }
    }
}

impl<T: Serialize> Encoder<T> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = encode_payload(&item, self.options.style)?;
        if payload.len() > self.max_payload {
            return Err(ProtocolError::FrameTooLarge {
                length: payload.len(),
                limit: self.max_payload,
            }
            .into());
        }

        let length = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            length: payload.len(),
            limit: u32::MAX as usize,
        })?;
        let header = FrameHeader::for_payload(length, &self.options);
        dst.reserve(HEADER_LEN + payload.len());
        header.write_to(dst);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    const STREAM_JSON: &[u8] = br#"{"code":3,"devTarget":"deadbeef"}"#;

    fn stream_msg() -> CommandMessage {
        CommandMessage::start_streaming("deadbeef")
    }

    // -- Wire format verification -------------------------------------------

    #[test]
    fn start_streaming_wire_format() {
        let wire = encode(&stream_msg()).unwrap();

        assert_eq!(&wire[..4], &(STREAM_JSON.len() as u32).to_le_bytes());
        assert_eq!(wire[4], 0, "message flag");
        assert_eq!(&wire[5..9], &[0, 0, 0, 0], "package id");
        assert_eq!(wire[9], 0, "deal flag");
        assert_eq!(&wire[10..18], &[0u8; 8], "forward id");
        assert_eq!(&wire[18..], STREAM_JSON);
        assert_eq!(wire.len(), HEADER_LEN + STREAM_JSON.len());
    }

    #[test]
    fn spaced_style_matches_captured_payload() {
        let opts = FrameOptions::default().with_style(PayloadStyle::Spaced);
        let wire = encode_frame(&stream_msg(), &opts).unwrap();
        let expected = br#"{"code": 3, "devTarget": "deadbeef"}"#;
        assert_eq!(&wire[..4], &(expected.len() as u32).to_le_bytes());
        assert_eq!(&wire[18..], expected);
    }

    #[test]
    fn spaced_style_nested_values() {
        let value = json!({"a": [1, 2], "b": {"c": null}});
        let payload = encode_payload(&value, PayloadStyle::Spaced).unwrap();
        assert_eq!(payload, br#"{"a": [1, 2], "b": {"c": null}}"#);
    }

    #[test]
    fn header_fields_are_little_endian() {
        let opts = FrameOptions {
            message_flag: 0xFF,
            package_id: 0x0403_0201,
            deal_flag: 0x7E,
            forward_id: [1, 2, 3, 4, 5, 6, 7, 8],
            style: PayloadStyle::Compact,
        };
        let wire = encode_frame(&stream_msg(), &opts).unwrap();
        assert_eq!(wire[4], 0xFF);
        assert_eq!(&wire[5..9], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(wire[9], 0x7E);
        assert_eq!(&wire[10..18], &[1, 2, 3, 4, 5, 6, 7, 8]);

        let (frame, _) = decode_frame(&wire).unwrap();
        assert_eq!(frame.header, FrameHeader::for_payload(STREAM_JSON.len() as u32, &opts));
    }

    #[test]
    fn header_to_bytes_matches_write_to() {
        let header = FrameHeader {
            length: 513,
            message_flag: 1,
            package_id: 9,
            deal_flag: 2,
            forward_id: [0xAA; 8],
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(buf.as_slice(), &header.to_bytes()[..]);
        assert_eq!(FrameHeader::parse(&buf).unwrap(), header);
    }

    // -- Size and length invariants -----------------------------------------

    #[test]
    fn frame_is_header_plus_json() {
        let messages = [
            CommandMessage::new(0),
            stream_msg(),
            CommandMessage::new(301)
                .with_dev_target("00112233445566778899aabbccddeeff")
                .with_field("content", json!({"code": 4, "unixTimer": 1_700_000_000})),
            CommandMessage::new(-1).with_field("text", "caf\u{e9} \u{1F600}"),
        ];
        for msg in &messages {
            let json = serde_json::to_vec(msg).unwrap();
            let wire = encode(msg).unwrap();
            assert_eq!(wire.len(), HEADER_LEN + json.len());

            let header = FrameHeader::parse(&wire).unwrap();
            assert_eq!(header.length as usize, wire.len() - HEADER_LEN);

            let (decoded, rest) = decode(&wire).unwrap();
            assert_eq!(&decoded, msg);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn arbitrary_serializable_value_can_be_framed() {
        let value = json!({"code": 50});
        let wire = encode_frame(&value, &FrameOptions::default()).unwrap();
        let (header, payload, rest) = split_frame(&wire).unwrap();
        assert_eq!(header.length, 11);
        assert_eq!(payload, br#"{"code":50}"#);
        assert!(rest.is_empty());
    }

    // -- Error cases --------------------------------------------------------

    #[test]
    fn encoding_error_for_reserved_key_clash() {
        let msg = CommandMessage::new(3).with_field("devTarget", "x");
        let err = encode(&msg).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding(_)), "got {err:?}");
    }

    #[test]
    fn encoding_error_for_non_string_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8, 2], 3);
        let err = encode_frame(&map, &FrameOptions::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding(_)), "got {err:?}");
    }

    #[test]
    fn short_header_is_incomplete() {
        let err = decode(&[0x21, 0, 0]).unwrap_err();
        assert_eq!(err, ProtocolError::IncompleteFrame { needed: 15 });
        assert!(decode(&[]).unwrap_err().is_incomplete());
    }

    #[test]
    fn every_strict_prefix_is_incomplete() {
        let wire = encode(&stream_msg()).unwrap();
        for cut in 0..wire.len() {
            let err = decode(&wire[..cut]).unwrap_err();
            assert!(err.is_incomplete(), "prefix {cut} gave {err:?}");
        }
    }

    #[test]
    fn incomplete_reports_missing_payload_bytes() {
        let wire = encode(&stream_msg()).unwrap();
        let err = decode(&wire[..HEADER_LEN + 10]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::IncompleteFrame {
                needed: STREAM_JSON.len() - 10
            }
        );
    }

    #[test]
    fn malformed_payload_reports_frame_len() {
        let payload = b"{not json";
        let mut wire = Vec::new();
        FrameHeader::for_payload(payload.len() as u32, &FrameOptions::default()).write_to(&mut wire);
        wire.extend_from_slice(payload);
        let good = encode(&stream_msg()).unwrap();
        wire.extend_from_slice(&good);

        let err = decode(&wire).unwrap_err();
        let ProtocolError::MalformedPayload { frame_len, .. } = err else {
            panic!("expected MalformedPayload, got {err:?}");
        };
        assert_eq!(frame_len, HEADER_LEN + payload.len());

        let (msg, rest) = decode(&wire[frame_len..]).unwrap();
        assert_eq!(msg, stream_msg());
        assert!(rest.is_empty());
    }

    #[test]
    fn json_that_is_not_a_command_is_malformed() {
        let wire = encode_frame(&json!([1, 2, 3]), &FrameOptions::default()).unwrap();
        assert!(matches!(
            decode(&wire),
            Err(ProtocolError::MalformedPayload { .. })
        ));
    }

    // -- Multi-frame streams ------------------------------------------------

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let first = stream_msg();
        let second = CommandMessage::new(101).with_field("status", 200);
        let mut wire = encode(&first).unwrap();
        let first_len = wire.len();
        wire.extend(encode(&second).unwrap());

        let (a, rest) = decode(&wire).unwrap();
        assert_eq!(a, first);
        assert_eq!(rest.len(), wire.len() - first_len);

        let (b, rest) = decode(rest).unwrap();
        assert_eq!(b, second);
        assert!(rest.is_empty());
    }

    #[test]
    fn empty_payload_frame_splits_cleanly() {
        let mut wire = FrameHeader::default().to_bytes().to_vec();
        wire.extend_from_slice(b"tail");
        let (header, payload, rest) = split_frame(&wire).unwrap();
        assert_eq!(header.length, 0);
        assert!(payload.is_empty());
        assert_eq!(rest, b"tail");
    }

    // -- Codec ---------------------------------------------------------------

    #[test]
    fn codec_decodes_byte_by_byte() {
        let wire = encode(&stream_msg()).unwrap();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            let item = codec.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(item.is_none(), "frame emitted early at byte {i}");
            } else {
                let frame = item.expect("frame after last byte").unwrap();
                assert_eq!(frame.message, stream_msg());
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_skips_malformed_and_continues() {
        let mut buf = BytesMut::new();
        let bad = b"]]";
        FrameHeader::for_payload(bad.len() as u32, &FrameOptions::default()).write_to(&mut buf);
        buf.extend_from_slice(bad);
        buf.extend_from_slice(&encode(&stream_msg()).unwrap());

        let mut codec = FrameCodec::new();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Err(ProtocolError::MalformedPayload { .. })));
        let second = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(second.message, stream_msg());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn codec_rejects_oversized_length() {
        let mut buf = BytesMut::new();
        FrameHeader::for_payload(1024, &FrameOptions::default()).write_to(&mut buf);
        let mut codec = FrameCodec::new().with_max_payload(512);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Protocol(ProtocolError::FrameTooLarge { length: 1024, limit: 512 })
        ));
    }

    #[test]
    fn codec_eof_with_partial_frame_is_truncated() {
        let wire = encode(&stream_msg()).unwrap();
        let mut buf = BytesMut::from(&wire[..20]);
        let mut codec = FrameCodec::new();
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::Truncated(20)));
    }

    #[test]
    fn codec_encoder_matches_encode_frame() {
        let opts = FrameOptions::default().with_package_id(7);
        let mut codec = FrameCodec::new().with_options(opts);
        let mut buf = BytesMut::new();
        codec.encode(&stream_msg(), &mut buf).unwrap();
        assert_eq!(&buf[..], encode_frame(&stream_msg(), &opts).unwrap().as_slice());
    }
}

//! Line-delimited framing.
//!
//! Every message on the wire is one line: the message bytes followed by a
//! single `\n`. There is no length prefix, no checksum and no escaping, so a
//! message must not contain a raw `\n` of its own. Compact JSON never does.
//!
//! Inbound bytes arrive in arbitrary pieces (one BLE notification or write at
//! a time), so the receiving side keeps a [`FrameBuffer`] that accumulates
//! pieces and hands out complete lines.

use bytes::{Bytes, BytesMut};
use serde_json::Value;

use crate::error::Result;

/// Byte that terminates every frame.
pub const FRAME_DELIMITER: u8 = b'\n';

/// A message ready to be framed for sending.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A structured document, sent as compact JSON.
    Json(Value),
    /// Free text, sent as-is.
    Text(String),
}

impl From<Value> for OutboundMessage {
    fn from(doc: Value) -> Self {
        Self::Json(doc)
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Encode a message into one delimiter-terminated frame.
///
/// JSON is serialized compactly. Text passes through unchanged. The
/// delimiter is appended only if the bytes do not already end with it.
///
/// # Example
///
/// ```
/// use ble_line_link::protocol::{encode, OutboundMessage};
///
/// let frame = encode(&OutboundMessage::from("PING")).unwrap();
/// assert_eq!(frame, b"PING\n");
/// ```
pub fn encode(message: &OutboundMessage) -> Result<Vec<u8>> {
    let mut bytes = match message {
        OutboundMessage::Json(doc) => serde_json::to_vec(doc)?,
        OutboundMessage::Text(text) => text.as_bytes().to_vec(),
    };

    if bytes.last() != Some(&FRAME_DELIMITER) {
        bytes.push(FRAME_DELIMITER);
    }

    Ok(bytes)
}

/// Encode a structured document as a frame.
pub fn encode_json(doc: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(doc)?;
    bytes.push(FRAME_DELIMITER);
    Ok(bytes)
}

/// Encode free text as a frame.
pub fn encode_text(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    if bytes.last() != Some(&FRAME_DELIMITER) {
        bytes.push(FRAME_DELIMITER);
    }
    bytes
}

/// Split `input` into complete frames and the trailing remainder.
///
/// Each returned frame excludes its delimiter. The remainder is everything
/// after the last delimiter and is empty when `input` ends on a frame
/// boundary.
pub fn decode(input: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let mut frames = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.iter().position(|b| *b == FRAME_DELIMITER) {
        frames.push(&rest[..pos]);
        rest = &rest[pos + 1..];
    }

    (frames, rest)
}

/// Result of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// The trimmed text parsed as JSON.
    Structured(Value),
    /// The trimmed text did not parse as JSON.
    Raw(String),
    /// Nothing but whitespace.
    Empty,
}

impl Classified {
    /// Check if this frame carries nothing to deliver.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Decode a frame as text and decide whether it is JSON or free text.
///
/// Invalid UTF-8 sequences are replaced rather than rejected, so a
/// corrupted frame still reaches the raw handler.
pub fn classify(frame: &[u8]) -> Classified {
    let text = String::from_utf8_lossy(frame);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Classified::Empty;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(doc) => Classified::Structured(doc),
        Err(_) => Classified::Raw(trimmed.to_string()),
    }
}

/// Receive accumulator for one connection.
///
/// Holds at most one partial frame between calls; complete frames are
/// removed as soon as they are taken.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received piece.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete frame, without its delimiter.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let len = decode(&self.buf).0.first()?.len();
        Some(self.split_frame(len))
    }

    /// Take every complete frame currently buffered.
    ///
    /// The remainder [`decode`] leaves behind stays buffered.
    pub fn drain_frames(&mut self) -> Vec<Bytes> {
        let lengths: Vec<usize> = decode(&self.buf).0.iter().map(|f| f.len()).collect();
        lengths.into_iter().map(|len| self.split_frame(len)).collect()
    }

    /// Detach `len` frame bytes plus their delimiter from the front.
    fn split_frame(&mut self, len: usize) -> Bytes {
        let mut line = self.buf.split_to(len + 1);
        line.truncate(len);
        line.freeze()
    }

    /// Bytes of the partial frame still waiting for its delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop everything, including a partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_json_is_compact_and_terminated() {
        let frame = encode(&json!({"op": "echo", "msg": "hi"}).into()).unwrap();
        assert_eq!(frame, b"{\"op\":\"echo\",\"msg\":\"hi\"}\n".to_vec());
    }

    #[test]
    fn test_encode_text_appends_delimiter_once() {
        assert_eq!(encode(&"PONG".into()).unwrap(), b"PONG\n".to_vec());
        assert_eq!(encode(&"PONG\n".into()).unwrap(), b"PONG\n".to_vec());
        assert_eq!(encode_text("PONG\n"), b"PONG\n".to_vec());
    }

    #[test]
    fn test_encode_empty_text() {
        assert_eq!(encode_text(""), b"\n".to_vec());
    }

    #[test]
    fn test_decode_splits_frames_and_keeps_remainder() {
        let (frames, rest) = decode(b"one\ntwo\nthr");
        assert_eq!(frames, vec![&b"one"[..], &b"two"[..]]);
        assert_eq!(rest, b"thr");
    }

    #[test]
    fn test_decode_without_delimiter() {
        let (frames, rest) = decode(b"partial");
        assert!(frames.is_empty());
        assert_eq!(rest, b"partial");
    }

    #[test]
    fn test_decode_empty_lines() {
        let (frames, rest) = decode(b"\n\n");
        assert_eq!(frames, vec![&b""[..], &b""[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(b"{\"op\":\"echo\"}"),
            Classified::Structured(json!({"op": "echo"}))
        );
        assert_eq!(classify(b"  PONG \r"), Classified::Raw("PONG".to_string()));
        assert_eq!(classify(b" \t\r "), Classified::Empty);
        assert_eq!(classify(b""), Classified::Empty);
    }

    #[test]
    fn test_classify_broken_json_is_raw() {
        assert_eq!(
            classify(b"{\"op\":\"ec"),
            Classified::Raw("{\"op\":\"ec".to_string())
        );
    }

    #[test]
    fn test_classify_bare_json_values() {
        assert_eq!(classify(b"42"), Classified::Structured(json!(42)));
        assert_eq!(classify(b"[1,2]"), Classified::Structured(json!([1, 2])));
    }

    #[test]
    fn test_round_trip() {
        let doc = json!({"from": "esp32", "uptime_ms": 1234, "nested": {"ok": true}});
        let frame = encode_json(&doc).unwrap();
        let (frames, rest) = decode(&frame);
        assert!(rest.is_empty());
        assert_eq!(classify(frames[0]), Classified::Structured(doc));

        let frame = encode_text("hello there");
        let (frames, _) = decode(&frame);
        assert_eq!(classify(frames[0]), Classified::Raw("hello there".to_string()));
    }

    #[test]
    fn test_frame_buffer_completes_partial_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"{\"a\":1}\n{\"b\"");

        let frames = buffer.drain_frames();
        assert_eq!(frames, vec![Bytes::from_static(b"{\"a\":1}")]);
        assert_eq!(buffer.pending(), b"{\"b\"");

        buffer.extend(b":2}\n");
        let frames = buffer.drain_frames();
        assert_eq!(frames, vec![Bytes::from_static(b"{\"b\":2}")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_buffer_clear() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(b"half a fr");
        assert_eq!(buffer.len(), 9);
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.next_frame().is_none());
    }

    #[test]
    fn test_frame_buffer_matches_decode() {
        let input = b"PING\n\n{\"op\":\"echo\"}\ntail";
        let (frames, rest) = decode(input);

        let mut buffer = FrameBuffer::new();
        buffer.extend(input);
        assert_eq!(buffer.next_frame(), Some(Bytes::from_static(b"PING")));
        let mut drained = vec![Bytes::from_static(b"PING")];
        drained.extend(buffer.drain_frames());

        let drained: Vec<&[u8]> = drained.iter().map(|f| f.as_ref()).collect();
        assert_eq!(drained, frames);
        assert_eq!(buffer.pending(), rest);
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_change_frames(
            lines in proptest::collection::vec("[a-zA-Z0-9 {}\":,]{0,40}", 1..6),
            cuts in proptest::collection::vec(0usize..200, 0..8),
        ) {
            let mut stream = Vec::new();
            for line in &lines {
                stream.extend_from_slice(&encode_text(line));
            }

            let mut whole = FrameBuffer::new();
            whole.extend(&stream);
            let expected = whole.drain_frames();

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (stream.len() + 1)).collect();
            cuts.sort_unstable();
            let mut pieces = FrameBuffer::new();
            let mut got = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(stream.len())) {
                pieces.extend(&stream[start..cut]);
                got.extend(pieces.drain_frames());
                start = cut;
            }

            prop_assert_eq!(got, expected);
            prop_assert!(pieces.is_empty());
        }
    }
}

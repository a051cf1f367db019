//! NDJSON frame codec.
//!
//! One JSON object per line in each direction:
//! - inbound: `{"event": "lock:acquire", "id": 7, "headers": {...}, "data": {...}}`
//! - ack: `{"ack": 7, "ok": true, ...}`
//! - broadcast: `{"event": "task:locked", "data": {...}}`

use crate::error::{Result, TaskLockError};
use crate::protocol::ServerEvent;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    pub event: String,

    /// Opaque request id echoed back in the ack.
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame exceeds limit of {max} bytes")]
    TooLarge { max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Decode one line into a request frame.
pub fn decode(line: &str, max_frame_bytes: usize) -> std::result::Result<InboundFrame, FrameError> {
    if line.len() > max_frame_bytes {
        return Err(FrameError::TooLarge { max: max_frame_bytes });
    }
    serde_json::from_str(line).map_err(|e| FrameError::Malformed(e.to_string()))
}

#[derive(Serialize)]
struct AckFrame<'a, T: Serialize> {
    ack: Option<&'a Value>,
    #[serde(flatten)]
    body: &'a T,
}

/// Encode an acknowledgement. `id` is the request's id, or null if it had none.
pub fn encode_ack<T: Serialize>(id: Option<&Value>, body: &T) -> Result<String> {
    serde_json::to_string(&AckFrame { ack: id, body })
        .map_err(|e| TaskLockError::TransportError(format!("failed to encode ack: {}", e)))
}

/// Encode a broadcast.
pub fn encode_event(event: &ServerEvent) -> Result<String> {
    serde_json::to_string(event)
        .map_err(|e| TaskLockError::TransportError(format!("failed to encode event: {}", e)))
}

/// One item produced by [`FrameCodec`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameItem {
    Line(String),
    /// A line that cannot become a frame. The codec has moved past it.
    Rejected(FrameError),
}

/// Newline-delimited framing with a per-line byte limit.
///
/// Wraps [`LinesCodec`] so that an oversized or non-UTF-8 line becomes a
/// [`FrameItem::Rejected`] instead of a stream error, and the connection keeps
/// reading from the next line. The limit excludes the line terminator, so a
/// `\r\n` line of exactly `max_frame_bytes` is accepted.
#[derive(Debug)]
pub struct FrameCodec {
    lines: LinesCodec,
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            // One extra byte for a `\r` that LinesCodec counts before stripping.
            lines: LinesCodec::new_with_max_length(max_frame_bytes.saturating_add(1)),
            max_frame_bytes,
        }
    }

    fn classify(
        &self,
        decoded: std::result::Result<Option<String>, LinesCodecError>,
    ) -> std::result::Result<Option<FrameItem>, LinesCodecError> {
        let too_large = || FrameItem::Rejected(FrameError::TooLarge { max: self.max_frame_bytes });
        match decoded {
            Ok(Some(line)) if line.len() > self.max_frame_bytes => Ok(Some(too_large())),
            Ok(line) => Ok(line.map(FrameItem::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(too_large())),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => Ok(Some(
                FrameItem::Rejected(FrameError::Malformed("frame is not valid UTF-8".to_string())),
            )),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = FrameItem;
    type Error = LinesCodecError;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<FrameItem>, LinesCodecError> {
        let decoded = self.lines.decode(buf);
        self.classify(decoded)
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<FrameItem>, LinesCodecError> {
        let decoded = self.lines.decode_eof(buf);
        self.classify(decoded)
    }
}

impl Encoder<String> for FrameCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        self.lines.encode(line, buf)
    }
}

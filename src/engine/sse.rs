//! Routing of engine Server-Sent Events onto session channels.
//!
//! Frame decoding is done by `eventsource_stream`; this module bounds what it
//! may buffer and decides which channel an event belongs to.

use crate::model::EngineChannel;
use serde_json::Value;

/// Event name the SSE decoder reports for frames without an `event:` field.
const UNNAMED_EVENT: &str = "message";

/// Largest `data` payload forwarded to the session.
pub(crate) const MAX_EVENT_DATA: usize = 64 * 1024;

/// Largest undelimited frame the decoder may buffer before the stream is cut.
pub(crate) const MAX_FRAME_BYTES: usize = 4 * MAX_EVENT_DATA;

/// Counts bytes since the last blank line so a stream that never ends its
/// frame cannot grow the decoder's buffer without limit.
#[derive(Debug, Default)]
pub(crate) struct FrameLimit {
    pending: usize,
    at_line_start: bool,
}

impl FrameLimit {
    /// Returns `false` once the current frame exceeds [`MAX_FRAME_BYTES`].
    pub(crate) fn admit(&mut self, chunk: &[u8]) -> bool {
        for &b in chunk {
            match b {
                b'\n' if self.at_line_start => self.pending = 0,
                b'\n' => {
                    self.at_line_start = true;
                    self.pending += 1;
                }
                b'\r' => {}
                _ => {
                    self.at_line_start = false;
                    self.pending += 1;
                }
            }
        }
        self.pending <= MAX_FRAME_BYTES
    }
}

/// Payload of an event for `channel`, or `None` when it belongs elsewhere.
///
/// Unnamed events belong to whichever channel the stream was opened for.
/// Rate data is parsed as JSON. Algorithm data is a label: a JSON string is
/// unquoted, anything else is taken verbatim, so `data: 2` reads as `"2"`.
pub(crate) fn payload_for(channel: EngineChannel, event: &str, data: &str) -> Option<Value> {
    if !event.is_empty() && event != UNNAMED_EVENT && event != channel.as_str() {
        return None;
    }
    if data.len() > MAX_EVENT_DATA {
        tracing::debug!(channel = channel.as_str(), len = data.len(), "dropping oversized event");
        return None;
    }
    let payload = match channel {
        EngineChannel::Rate => {
            serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()))
        }
        EngineChannel::Algorithm => match serde_json::from_str::<Value>(data) {
            Ok(Value::String(label)) => Value::String(label),
            _ => Value::String(data.to_string()),
        },
    };
    Some(payload)
}

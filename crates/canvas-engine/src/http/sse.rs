//! Incremental server-sent-events decoder
//!
//! Bytes arrive in arbitrary chunks; frames, lines and even UTF-8 sequences
//! may be split across chunk boundaries. The decoder buffers partial lines
//! and emits a frame on each blank line.

use canvas_model::StreamEvent;
use serde_json::Value;

/// One dispatched SSE frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field; `None` means the default `message`
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
    /// `id:` field
    pub id: Option<String>,
    /// `retry:` field, milliseconds
    pub retry_ms: Option<u64>,
}

impl SseFrame {
    /// Decode the frame into a lifecycle event
    ///
    /// The data payload is a JSON object; its `type` tag defaults to the
    /// frame's event name. Returns `None` for frames that are not lifecycle
    /// events (heartbeats, unknown names, malformed payloads).
    #[must_use]
    pub fn to_event(&self) -> Option<StreamEvent> {
        let mut value: Value = if self.data.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.data).ok()?
        };
        let obj = value.as_object_mut()?;
        if !obj.contains_key("type") {
            let name = self.event.as_deref().unwrap_or("message");
            obj.insert("type".to_string(), Value::String(name.to_string()));
        }
        match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(err) => {
                tracing::debug!(event = ?self.event, "ignoring sse frame: {err}");
                None
            }
        }
    }
}

/// Streaming SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    frame: SseFrame,
    has_data: bool,
    has_fields: bool,
}

impl SseDecoder {
    /// Empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame when the body ends without a blank line
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.frame.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.frame.data.push('\n');
                }
                self.frame.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.frame.id = Some(value.to_string()),
            "retry" => self.frame.retry_ms = value.parse().ok(),
            _ => return None,
        }
        self.has_fields = true;
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if !self.has_fields {
            return None;
        }
        self.has_data = false;
        self.has_fields = false;
        Some(std::mem::take(&mut self.frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: tick\nda").is_empty());
        assert!(decoder.push(b"ta: {\"index\":").is_empty());
        let frames = decoder.push(b" 3}\nid: 7\n\nevent: hello\r\ndata: {\"response_id\":\"r\"}\r\n\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].to_event(), Some(StreamEvent::Tick { index: 3 }));
        assert_eq!(
            frames[1].to_event(),
            Some(StreamEvent::Hello {
                response_id: "r".into()
            })
        );
    }

    #[test]
    fn multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keepalive\n\ndata: {\"type\":\"tick\",\ndata: \"index\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"type\":\"tick\",\n\"index\":1}");
        assert_eq!(frames[0].to_event(), Some(StreamEvent::Tick { index: 1 }));
    }

    #[test]
    fn utf8_split_inside_character() {
        let payload = "data: {\"type\":\"hello\",\"response_id\":\"é\"}\n\n".as_bytes();
        let split = payload.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&payload[..split]).is_empty());
        let frames = decoder.push(&payload[split..]);
        assert_eq!(
            frames[0].to_event(),
            Some(StreamEvent::Hello {
                response_id: "é".into()
            })
        );
    }

    #[test]
    fn unknown_events_are_skipped() {
        let frame = SseFrame {
            event: Some("heartbeat".into()),
            ..SseFrame::default()
        };
        assert_eq!(frame.to_event(), None);
    }

    #[test]
    fn finish_flushes_trailing_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: tick\ndata: {\"index\":2}").is_empty());
        let frame = decoder.finish().unwrap();
        assert_eq!(frame.to_event(), Some(StreamEvent::Tick { index: 2 }));
        assert!(decoder.finish().is_none());
    }
}

//! Event-stream decoding
//!
//! The hosted database streams changes as server-sent events:
//!
//! ```text
//! event: put
//! data: {"path": "/", "data": {"tds": 120.5}}
//!
//! event: keep-alive
//! data: null
//! ```
//!
//! `SseDecoder` turns arbitrary byte chunks into complete events and
//! `StreamEvent` interprets them against a local tree.

use serde::Deserialize;
use serde_json::Value;

use super::error::{StoreError, StoreResult};
use super::tree;

/// One raw server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental decoder for a `text/event-stream` body
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: SseEvent,
    has_fields: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes.
    ///
    /// Chunks may split lines and UTF-8 sequences anywhere.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if self.has_fields {
                    events.push(std::mem::take(&mut self.pending));
                    self.has_fields = false;
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (&*line, ""),
            };

            match field {
                "event" => {
                    self.pending.event = value.to_string();
                    self.has_fields = true;
                }
                "data" => {
                    if !self.pending.data.is_empty() {
                        self.pending.data.push('\n');
                    }
                    self.pending.data.push_str(value);
                    self.has_fields = true;
                }
                _ => {}
            }
        }

        events
    }
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Interpreted database stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Replace the value at `path` (relative to the subscription)
    Put { path: String, data: Value },
    /// Merge children into the value at `path`
    Patch { path: String, data: Value },
    KeepAlive,
    /// The server stopped the stream, typically a rules denial
    Cancel(String),
    /// Credentials expired or were revoked
    AuthRevoked,
    Unknown(String),
}

impl StreamEvent {
    pub fn parse(raw: &SseEvent) -> StoreResult<Self> {
        match raw.event.as_str() {
            "put" | "patch" => {
                let body: PathData = serde_json::from_str(&raw.data)?;
                if raw.event == "put" {
                    Ok(StreamEvent::Put {
                        path: body.path,
                        data: body.data,
                    })
                } else {
                    Ok(StreamEvent::Patch {
                        path: body.path,
                        data: body.data,
                    })
                }
            }
            "keep-alive" => Ok(StreamEvent::KeepAlive),
            "cancel" => Ok(StreamEvent::Cancel(raw.data.clone())),
            "auth_revoked" => Ok(StreamEvent::AuthRevoked),
            other => Ok(StreamEvent::Unknown(other.to_string())),
        }
    }

    /// Apply a data event to `local`. Returns whether the tree changed.
    pub fn apply(&self, local: &mut Value) -> StoreResult<bool> {
        match self {
            StreamEvent::Put { path, data } => {
                let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                tree::set_at(local, &segments, data.clone());
                Ok(true)
            }
            StreamEvent::Patch { path, data } => {
                let fields = data.as_object().ok_or_else(|| {
                    StoreError::Malformed(format!("patch at {} is not an object", path))
                })?;
                let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                tree::merge_at(local, &segments, fields);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: put\nda").is_empty());
        assert!(decoder.feed(b"ta: {\"path\":\"/\",\"data\":1}\n").is_empty());
        let events = decoder.feed(b"\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "put".to_string(),
                data: "{\"path\":\"/\",\"data\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn test_decoder_multiple_events_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(
            b"event: keep-alive\r\ndata: null\r\n\r\n: comment\nevent: cancel\ndata: denied\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "keep-alive");
        assert_eq!(events[1].event, "cancel");
        assert_eq!(events[1].data, "denied");
    }

    #[test]
    fn test_decoder_utf8_split() {
        let mut decoder = SseDecoder::new();
        let bytes = "event: put\ndata: \"é\"\n\n".as_bytes();
        // Split inside the two-byte sequence for 'é'.
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).is_empty());
        let events = decoder.feed(&bytes[split..]);
        assert_eq!(events[0].data, "\"é\"");
    }

    #[test]
    fn test_put_replaces_and_patch_merges() {
        let mut local = Value::Null;

        let put = StreamEvent::parse(&SseEvent {
            event: "put".into(),
            data: r#"{"path":"/","data":{"tds":100,"status":"NORMAL"}}"#.into(),
        })
        .unwrap();
        assert!(put.apply(&mut local).unwrap());
        assert_eq!(local, json!({"tds": 100, "status": "NORMAL"}));

        let patch = StreamEvent::parse(&SseEvent {
            event: "patch".into(),
            data: r#"{"path":"/","data":{"tds":650}}"#.into(),
        })
        .unwrap();
        patch.apply(&mut local).unwrap();
        assert_eq!(local, json!({"tds": 650, "status": "NORMAL"}));

        let delete = StreamEvent::Put {
            path: "/status".into(),
            data: Value::Null,
        };
        delete.apply(&mut local).unwrap();
        assert_eq!(local, json!({"tds": 650}));
    }

    #[test]
    fn test_control_events() {
        let keep = StreamEvent::parse(&SseEvent {
            event: "keep-alive".into(),
            data: "null".into(),
        })
        .unwrap();
        assert_eq!(keep, StreamEvent::KeepAlive);
        let mut local = json!({"a": 1});
        assert!(!keep.apply(&mut local).unwrap());

        let revoked = StreamEvent::parse(&SseEvent {
            event: "auth_revoked".into(),
            data: "credential is no longer valid".into(),
        })
        .unwrap();
        assert_eq!(revoked, StreamEvent::AuthRevoked);
    }

    #[test]
    fn test_malformed_put_is_error() {
        let result = StreamEvent::parse(&SseEvent {
            event: "put".into(),
            data: "not json".into(),
        });
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }
}

//! # Wire types exchanged between clients and the service.
//!
//! All frames are JSON payloads inside 4-byte length-delimited frames
//! (see [`server`](crate::transport::Server) / [`Client`](crate::transport::Client)).
//!
//! - [`Message`] — a work submission: an id plus an opaque `extras` map the
//!   application manager validates and interprets.
//! - [`Request`] — what a client sends after authenticating: submit a
//!   message or cancel a live petition by id.
//! - [`OutputFrame`] — what the service streams back per petition: output
//!   lines followed by exactly one final `Done` frame. `Done { code: None }`
//!   and plain connection closure both read as success (code 0).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::petitions::PetitionId;

/// Client-submitted work request.
///
/// `extras` carries subtype-specific fields (counters, durations, resource
/// names); the application [`Manager`](crate::Manager) validates presence
/// and type during conversion. A message is purely a transport artifact —
/// it is never scheduled directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Petition identifier; must be unique among live petitions.
    pub id: PetitionId,
    /// Opaque key→value payload interpreted by the manager.
    #[serde(default)]
    pub extras: Map<String, Value>,
}

impl Message {
    /// Creates a message with an empty payload.
    pub fn new(id: impl Into<PetitionId>) -> Self {
        Self {
            id: id.into(),
            extras: Map::new(),
        }
    }

    /// Adds one payload entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Authenticated client request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Submit a work message for scheduling.
    Submit {
        /// The message to convert and enqueue.
        message: Message,
    },
    /// Cancel a live petition. The service replies with a single
    /// [`OutputFrame::Done`] once the petition reaches its terminal state.
    Cancel {
        /// Identifier of the petition to cancel.
        id: PetitionId,
    },
}

/// One frame of a petition's reply stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum OutputFrame {
    /// One line of worker output.
    Line {
        /// The output text, without trailing newline.
        text: String,
    },
    /// Final status. `None` means success; clients map it to exit code 0.
    Done {
        /// Worker exit code, when one was produced.
        code: Option<i32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_shape() {
        let m = Message::new("a").with_extra("counter", 3).with_extra("sleep_time", 0);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["extras"]["counter"], 3);

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_message_without_extras_decodes() {
        let m: Message = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(m.id, PetitionId::Num(7));
        assert!(m.extras.is_empty());
    }

    #[test]
    fn test_request_tagging() {
        let cancel = Request::Cancel { id: "a".into() };
        let json = serde_json::to_string(&cancel).unwrap();
        assert!(json.contains(r#""type":"cancel"#));
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cancel);
    }

    #[test]
    fn test_output_frame_roundtrip() {
        for frame in [
            OutputFrame::Line { text: "hi".into() },
            OutputFrame::Done { code: Some(3) },
            OutputFrame::Done { code: None },
        ] {
            let json = serde_json::to_string(&frame).unwrap();
            let back: OutputFrame = serde_json::from_str(&json).unwrap();
            assert_eq!(back, frame);
        }
    }
}

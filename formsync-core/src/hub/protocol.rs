//! Hub wire format.
//!
//! Each message is a JSON object terminated by the ASCII record separator
//! (0x1E). One websocket text frame may carry several records. The
//! connection opens with a handshake record in each direction; after that
//! every record carries a numeric `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid hub record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("hub record has no message type")]
    MissingType,

    #[error("malformed hub record: {0}")]
    Malformed(&'static str),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("hub connection closed")]
    ConnectionClosed,

    #[error("hub invocation failed: {0}")]
    Invocation(String),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a method on the other side. Without an id no completion is sent.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
    },
    /// A message type this client does not handle (streaming, cancel, ...).
    Unsupported(u8),
}

impl HubMessage {
    pub fn invocation(id: impl Into<String>, target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            invocation_id: Some(id.into()),
            target: target.into(),
            arguments,
        }
    }

    pub fn push(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self::Invocation {
            invocation_id: None,
            target: target.into(),
            arguments,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&HubMessage> for Record {
    fn from(message: &HubMessage) -> Self {
        match message {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => Record {
                kind: Some(INVOCATION),
                invocation_id: invocation_id.clone(),
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                ..Record::default()
            },
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => Record {
                kind: Some(COMPLETION),
                invocation_id: Some(invocation_id.clone()),
                result: result.clone(),
                error: error.clone(),
                ..Record::default()
            },
            HubMessage::Ping => Record {
                kind: Some(PING),
                ..Record::default()
            },
            HubMessage::Close { error } => Record {
                kind: Some(CLOSE),
                error: error.clone(),
                ..Record::default()
            },
            HubMessage::Unsupported(kind) => Record {
                kind: Some(*kind),
                ..Record::default()
            },
        }
    }
}

impl TryFrom<Record> for HubMessage {
    type Error = ProtocolError;

    fn try_from(record: Record) -> Result<Self, ProtocolError> {
        match record.kind.ok_or(ProtocolError::MissingType)? {
            INVOCATION => Ok(HubMessage::Invocation {
                invocation_id: record.invocation_id,
                target: record
                    .target
                    .ok_or(ProtocolError::Malformed("invocation without target"))?,
                arguments: record.arguments.unwrap_or_default(),
            }),
            COMPLETION => Ok(HubMessage::Completion {
                invocation_id: record
                    .invocation_id
                    .ok_or(ProtocolError::Malformed("completion without invocation id"))?,
                result: record.result,
                error: record.error,
            }),
            PING => Ok(HubMessage::Ping),
            CLOSE => Ok(HubMessage::Close {
                error: record.error,
            }),
            other => Ok(HubMessage::Unsupported(other)),
        }
    }
}

/// One record, separator included.
pub fn encode(message: &HubMessage) -> Result<String, ProtocolError> {
    let mut text = serde_json::to_string(&Record::from(message))?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

/// Split a text frame into its records. Empty records are skipped.
pub fn split_records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

pub fn decode(record: &str) -> Result<HubMessage, ProtocolError> {
    let record: Record = serde_json::from_str(record)?;
    HubMessage::try_from(record)
}

/// Decode every record in a text frame.
pub fn decode_frame(frame: &str) -> Result<Vec<HubMessage>, ProtocolError> {
    split_records(frame).map(decode).collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct Handshake {
    protocol: String,
    version: u32,
}

#[derive(Debug, Deserialize)]
struct HandshakeReply {
    #[serde(default)]
    error: Option<String>,
}

pub fn handshake_request() -> String {
    let mut text = serde_json::json!({ "protocol": "json", "version": 1 }).to_string();
    text.push(RECORD_SEPARATOR);
    text
}

/// Check the server's handshake record; an `error` field means rejection.
pub fn check_handshake(record: &str) -> Result<(), ProtocolError> {
    let reply: HandshakeReply = serde_json::from_str(record)?;
    match reply.error {
        Some(error) => Err(ProtocolError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

/// Parse a client's handshake record, as a server would.
pub fn parse_handshake_request(record: &str) -> Result<(String, u32), ProtocolError> {
    let handshake: Handshake = serde_json::from_str(record)?;
    Ok((handshake.protocol, handshake.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invocation_wire_shape() {
        let text = encode(&HubMessage::invocation("4", "JoinGroup", vec![json!(12)])).unwrap();
        assert!(text.ends_with(RECORD_SEPARATOR));

        let value: Value = serde_json::from_str(text.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(
            value,
            json!({"type": 1, "invocationId": "4", "target": "JoinGroup", "arguments": [12]})
        );
    }

    #[test]
    fn frame_with_several_records() {
        let frame = format!(
            "{}{}{}",
            encode(&HubMessage::push("ReceiveError", vec![json!("boom")])).unwrap(),
            encode(&HubMessage::Ping).unwrap(),
            r#"{"type":3,"invocationId":"1","result":null}"#.to_string() + "\u{1e}",
        );

        let messages = decode_frame(&frame).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], HubMessage::push("ReceiveError", vec![json!("boom")]));
        assert_eq!(messages[1], HubMessage::Ping);
        assert_eq!(
            messages[2],
            HubMessage::Completion {
                invocation_id: "1".into(),
                result: None,
                error: None
            }
        );
    }

    #[test]
    fn unknown_types_are_unsupported() {
        assert_eq!(decode(r#"{"type":2,"item":5}"#).unwrap(), HubMessage::Unsupported(2));
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(matches!(decode(r#"{"target":"x"}"#), Err(ProtocolError::MissingType)));
        assert!(matches!(decode(r#"{"type":1}"#), Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode("not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn handshake_round() {
        let request = handshake_request();
        let record = split_records(&request).next().unwrap();
        assert_eq!(parse_handshake_request(record).unwrap(), ("json".to_string(), 1));

        assert!(check_handshake("{}").is_ok());
        assert!(matches!(
            check_handshake(r#"{"error":"unsupported protocol"}"#),
            Err(ProtocolError::HandshakeRejected(e)) if e == "unsupported protocol"
        ));
    }
}

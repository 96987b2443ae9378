//! Newline-delimited JSON wire protocol.
//!
//! Each frame is one JSON object per line. Clients send [`ClientFrame`]s:
//! numbered requests plus acknowledgements for pushed messages. The server
//! answers every request with a [`ServerFrame::Reply`] carrying the same
//! sequence number, and pushes [`ServerFrame::Message`] frames at any time
//! for messages addressed to the account logged in on this connection.
//!
//! Requests on one connection are handled concurrently (one task per
//! request), so replies may arrive out of order; the sequence number is the
//! correlation key.

use serde::{Deserialize, Serialize};

use rookery_core::ChatError;

/// One remote operation, mirroring the RPC surface of the chat server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Does `name` exist (as a user or a group)?
    CheckForAccount { name: String },
    /// Bind `name` to this connection and flush any queued messages.
    Login { name: String },
    /// Mark `name` offline.
    Logout { name: String },
    /// Create a user account.
    AddAccount { name: String },
    /// Create an empty group.
    AddGroup { name: String },
    /// Add an existing non-group account to a group.
    AddGroupMember { group: String, member: String },
    /// List user accounts matching `pattern` (empty matches all).
    ListAccounts {
        #[serde(default)]
        pattern: String,
    },
    /// List groups matching `pattern` (empty matches all).
    ListGroups {
        #[serde(default)]
        pattern: String,
    },
    /// Send `message` to an account or group.
    SendMessage { target: String, message: String },
    /// Delete an account; replies with a 0/-1 sentinel code.
    DeleteAccount { name: String },
}

/// Frames a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A numbered request.
    Request { seq: u64, op: Request },
    /// Acknowledgement for a pushed message.
    Ack {
        id: String,
        #[serde(default = "ack_ok_default")]
        ok: bool,
    },
}

fn ack_ok_default() -> bool {
    true
}

/// Result payload of a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// Operation completed.
    Ok,
    /// Boolean result (`check_for_account`).
    Bool { value: bool },
    /// Name list result (`list_accounts` / `list_groups`).
    Names { names: Vec<String> },
    /// Sentinel code result (`delete_account`).
    Code { code: i32 },
    /// Reported failure with a human-readable reason.
    Error { kind: String, reason: String },
}

impl From<ChatError> for Reply {
    fn from(error: ChatError) -> Self {
        Reply::Error {
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Frames the server may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Answer to the request with the same sequence number.
    Reply { seq: u64, result: Reply },
    /// A message pushed to the account bound to this connection; the
    /// client must answer with an ack carrying the same id.
    Message { id: String, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frames_round_trip() {
        let frame = ClientFrame::Request {
            seq: 7,
            op: Request::SendMessage {
                target: "team".to_string(),
                message: "hello".to_string(),
            },
        };
        let encoded = serde_json::to_string(&frame).unwrap();
        assert!(encoded.contains("\"type\":\"request\""));
        assert!(encoded.contains("\"op\":\"send_message\""));

        let decoded: ClientFrame = serde_json::from_str(&encoded).unwrap();
        match decoded {
            ClientFrame::Request { seq, op } => {
                assert_eq!(seq, 7);
                assert!(matches!(op, Request::SendMessage { .. }));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn ack_defaults_to_ok() {
        let decoded: ClientFrame =
            serde_json::from_str(r#"{"type":"ack","id":"abc"}"#).unwrap();
        match decoded {
            ClientFrame::Ack { id, ok } => {
                assert_eq!(id, "abc");
                assert!(ok);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn list_pattern_defaults_to_empty() {
        let decoded: ClientFrame =
            serde_json::from_str(r#"{"type":"request","seq":1,"op":{"op":"list_accounts"}}"#)
                .unwrap();
        match decoded {
            ClientFrame::Request {
                op: Request::ListAccounts { pattern },
                ..
            } => assert_eq!(pattern, ""),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn errors_map_to_kind_and_reason() {
        let reply: Reply = ChatError::AlreadyExists("alice".to_string()).into();
        match reply {
            Reply::Error { kind, reason } => {
                assert_eq!(kind, "already_exists");
                assert!(reason.contains("alice"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}

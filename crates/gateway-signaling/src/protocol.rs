//! Wire protocol: request-correlation over a single duplex JSON channel.
//!
//! Each client request carries a `correlation_id`; the matching response
//! references it. Server-initiated events carry none, so they can
//! interleave freely with RPC responses on the same socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First frame sent by the client, before any [`ClientRequest`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub agent_id: String,
    pub tenant_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub correlation_id: String,
    pub event: String,
    #[serde(default = "Value::default")]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcOutcome {
    Ok { result: Value },
    Err { error: RpcError },
}

/// Everything the server may write to the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Response {
        correlation_id: String,
        #[serde(flatten)]
        outcome: RpcOutcome,
    },
    Event {
        event: String,
        data: Value,
    },
}

impl ServerMessage {
    pub fn ok(correlation_id: impl Into<String>, result: Value) -> Self {
        ServerMessage::Response {
            correlation_id: correlation_id.into(),
            outcome: RpcOutcome::Ok { result },
        }
    }

    pub fn err(correlation_id: impl Into<String>, error: RpcError) -> Self {
        ServerMessage::Response {
            correlation_id: correlation_id.into(),
            outcome: RpcOutcome::Err { error },
        }
    }

    pub fn event(event: impl Into<String>, data: Value) -> Self {
        ServerMessage::Event {
            event: event.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let json = r#"{"correlation_id":"c1","event":"call:dial","data":{"phone":"+15551234567"}}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.correlation_id, "c1");
        assert_eq!(request.event, "call:dial");
    }

    #[test]
    fn request_without_data_defaults_to_null() {
        let json = r#"{"correlation_id":"c1","event":"webrtc:get-router-capabilities"}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert!(request.data.is_null());
    }

    #[test]
    fn response_ok_serializes_flat() {
        let message = ServerMessage::ok("c1", serde_json::json!({"ok": true}));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "response");
        assert_eq!(value["correlation_id"], "c1");
        assert_eq!(value["result"]["ok"], true);
    }

    #[test]
    fn response_err_serializes_flat() {
        let message = ServerMessage::err("c1", RpcError::new("busy", "peer already has an active call"));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["error"]["code"], "busy");
    }

    #[test]
    fn event_has_no_correlation() {
        let message = ServerMessage::event("call:ringing", serde_json::json!({"call_id": "x"}));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "event");
        assert!(value.get("correlation_id").is_none());
    }
}

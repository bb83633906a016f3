//! Server-initiated events pushed to a connected peer. These carry no
//! correlation id and may interleave freely with RPC responses on the
//! same socket.

use crate::call::CallId;
use gateway_media::PeerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    #[serde(rename = "connected")]
    Connected {
        user_id: String,
        agent_id: String,
        ts: String,
    },
    #[serde(rename = "webrtc:peer-connected")]
    PeerConnected { peer_id: PeerId },
    #[serde(rename = "webrtc:peer-disconnected")]
    PeerDisconnected { peer_id: PeerId, reason: String },
    #[serde(rename = "call:incoming")]
    CallIncoming {
        call_id: CallId,
        phone_number: String,
        caller_id: Option<String>,
        queue_id: Option<String>,
    },
    #[serde(rename = "call:ringing")]
    CallRinging { call_id: CallId },
    #[serde(rename = "call:answered")]
    CallAnswered { call_id: CallId, ts: String },
    #[serde(rename = "call:ended")]
    CallEnded {
        call_id: CallId,
        reason: String,
        duration: i64,
    },
    #[serde(rename = "call:failed")]
    CallFailed { call_id: CallId, error: String },
    #[serde(rename = "call:held")]
    CallHeld { call_id: CallId, is_on_hold: bool },
    #[serde(rename = "call:muted")]
    CallMuted { call_id: CallId, is_muted: bool },
    #[serde(rename = "call:transferred")]
    CallTransferred { call_id: CallId, target: String },
}

impl GatewayEvent {
    /// Splits into the `(event, data)` pair the signaling wire protocol
    /// expects (`gateway_signaling::ServerMessage::event`).
    pub fn into_wire(self) -> (String, Value) {
        let value = serde_json::to_value(&self).expect("GatewayEvent always serializes");
        let event = value["event"]
            .as_str()
            .expect("tagged enum always carries `event`")
            .to_string();
        let data = value.get("data").cloned().unwrap_or(Value::Null);
        (event, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_splits_tag_from_payload() {
        let event = GatewayEvent::CallRinging {
            call_id: CallId::new(),
        };
        let (name, data) = event.into_wire();
        assert_eq!(name, "call:ringing");
        assert!(data.get("call_id").is_some());
    }
}

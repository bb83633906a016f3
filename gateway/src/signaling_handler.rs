//! Bridges `gateway_signaling`'s generic RPC dispatch to the
//! [`PeerManager`]: maps each socket connection to a peer and translates
//! wire events (`webrtc:*`, `call:*`) into peer-manager calls.

use async_trait::async_trait;
use dashmap::DashMap;
use gateway_core::{CallId, GatewayEvent, PeerManager, TransferType};
use gateway_media::{
    ConsumerId, DtlsParameters, MediaKind, PeerId, ProducerId, RtpClientCapabilities,
    RtpParameters, TransportDirection, TransportId,
};
use gateway_signaling::{AuthPayload, ConnectionId, RpcError, RpcHandler, ServerMessage};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Per-RPC deadline. A peer that times out gets a `timeout` error reply and
/// stays connected; the next RPC on the same connection proceeds normally.
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SignalingHandler {
    manager: Arc<PeerManager>,
    connections: DashMap<ConnectionId, PeerId>,
}

impl SignalingHandler {
    pub fn new(manager: Arc<PeerManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            connections: DashMap::new(),
        })
    }

}

#[async_trait]
impl RpcHandler for SignalingHandler {
    async fn on_connect(
        &self,
        connection_id: ConnectionId,
        auth: AuthPayload,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let peer = self.manager.connect_peer(auth.agent_id, auth.tenant_id);
        self.connections.insert(connection_id, peer.id);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = self.manager.subscribe();
        let manager = self.manager.clone();
        let peer_id = peer.id;
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let owned = match &event {
                    GatewayEvent::PeerConnected { peer_id: p } | GatewayEvent::PeerDisconnected { peer_id: p, .. } => {
                        *p == peer_id
                    }
                    GatewayEvent::CallIncoming { call_id, .. }
                    | GatewayEvent::CallRinging { call_id }
                    | GatewayEvent::CallAnswered { call_id, .. }
                    | GatewayEvent::CallEnded { call_id, .. }
                    | GatewayEvent::CallFailed { call_id, .. }
                    | GatewayEvent::CallHeld { call_id, .. }
                    | GatewayEvent::CallMuted { call_id, .. }
                    | GatewayEvent::CallTransferred { call_id, .. } => manager
                        .calls()
                        .get(*call_id)
                        .map(|c| c.peer_id == peer_id)
                        .unwrap_or(false),
                    GatewayEvent::Connected { .. } => false,
                };
                if !owned {
                    continue;
                }
                let (name, data) = event.into_wire();
                if tx.send(ServerMessage::event(name, data)).is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn on_request(&self, connection_id: ConnectionId, event: &str, data: Value) -> Result<Value, RpcError> {
        let peer_id = *self
            .connections
            .get(&connection_id)
            .ok_or_else(|| RpcError::new("peer-not-found", "no peer bound to this connection"))?;
        match tokio::time::timeout(RPC_TIMEOUT, dispatch(&self.manager, peer_id, event, data)).await {
            Ok(result) => result.map_err(|e| e.to_rpc_error()),
            Err(_) => Err(gateway_core::GatewayError::Timeout.to_rpc_error()),
        }
    }

    async fn on_disconnect(&self, connection_id: ConnectionId) {
        if let Some((_, peer_id)) = self.connections.remove(&connection_id) {
            self.manager.disconnect_peer(peer_id);
        }
    }
}

async fn dispatch(
    manager: &Arc<PeerManager>,
    peer_id: PeerId,
    event: &str,
    data: Value,
) -> gateway_core::GatewayResult<Value> {
    use gateway_core::GatewayError;

    match event {
        "webrtc:get-router-capabilities" => {
            let caps = manager.get_router_capabilities(peer_id).await?;
            Ok(json!({ "capabilities": caps }))
        }
        "webrtc:create-transport" => {
            let direction = match data.get("direction").and_then(Value::as_str) {
                Some("send") => TransportDirection::Send,
                Some("recv") => TransportDirection::Recv,
                _ => return Err(GatewayError::Internal("invalid direction".into())),
            };
            let created = manager.create_transport(peer_id, direction).await?;
            Ok(json!({
                "transport_id": created.id,
                "iceParameters": created.ice_parameters,
                "iceCandidates": created.ice_candidates,
                "dtlsParameters": created.dtls_parameters,
            }))
        }
        "webrtc:connect-transport" => {
            let transport_id = parse_field::<TransportId>(&data, "transport_id")?;
            let dtls: DtlsParameters = serde_json::from_value(
                data.get("dtlsParameters")
                    .cloned()
                    .ok_or_else(|| GatewayError::Internal("missing dtlsParameters".into()))?,
            )
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
            manager.connect_transport(peer_id, transport_id, dtls)?;
            Ok(json!({ "ok": true }))
        }
        "webrtc:produce" => {
            let transport_id = parse_field::<TransportId>(&data, "transport_id")?;
            let kind: MediaKind = serde_json::from_value(
                data.get("kind")
                    .cloned()
                    .ok_or_else(|| GatewayError::Internal("missing kind".into()))?,
            )
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
            let rtp: RtpParameters = serde_json::from_value(
                data.get("rtp")
                    .cloned()
                    .ok_or_else(|| GatewayError::Internal("missing rtp".into()))?,
            )
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
            let producer_id = manager.produce(peer_id, transport_id, kind, rtp)?;
            Ok(json!({ "producer_id": producer_id }))
        }
        "webrtc:consume" => {
            let transport_id = parse_field::<TransportId>(&data, "transport_id")?;
            let producer_id = parse_field::<ProducerId>(&data, "producer_id")?;
            let caps: RtpClientCapabilities = serde_json::from_value(
                data.get("rtp_capabilities").cloned().unwrap_or_default(),
            )
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
            let created = manager.consume(peer_id, transport_id, producer_id, &caps)?;
            Ok(json!({
                "consumer_id": created.id,
                "producer_id": created.producer_id,
                "kind": created.kind,
                "rtp_parameters": created.rtp_parameters,
            }))
        }
        "webrtc:resume-consumer" => {
            let consumer_id = parse_field::<ConsumerId>(&data, "consumer_id")?;
            manager.resume_consumer(peer_id, consumer_id)?;
            Ok(json!({ "ok": true }))
        }
        "webrtc:pause-consumer" => {
            let consumer_id = parse_field::<ConsumerId>(&data, "consumer_id")?;
            manager.pause_consumer(peer_id, consumer_id)?;
            Ok(json!({ "ok": true }))
        }
        "call:dial" => {
            let phone = data
                .get("phone")
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::Internal("missing phone".into()))?;
            let lead_id = data.get("lead_id").and_then(Value::as_str).map(str::to_string);
            let campaign_id = data
                .get("campaign_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            let call_id = manager.dial(peer_id, phone, lead_id, campaign_id).await?;
            Ok(json!({ "call_id": call_id }))
        }
        "call:answer" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            manager.answer(peer_id, call_id).await?;
            Ok(json!({ "call_id": call_id }))
        }
        "call:hangup" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            manager.hangup(peer_id, call_id).await?;
            Ok(json!({ "ok": true }))
        }
        "call:hold" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            manager.hold(peer_id, call_id).await?;
            Ok(json!({ "ok": true }))
        }
        "call:unhold" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            manager.unhold(peer_id, call_id).await?;
            Ok(json!({ "ok": true }))
        }
        "call:mute" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            let muted = data.get("muted").and_then(Value::as_bool).unwrap_or(false);
            manager.mute(peer_id, call_id, muted)?;
            Ok(json!({ "ok": true }))
        }
        "call:transfer" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            let target = data
                .get("target")
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::Internal("missing target".into()))?;
            let kind = data
                .get("type")
                .and_then(Value::as_str)
                .and_then(TransferType::parse)
                .ok_or_else(|| GatewayError::Internal("invalid transfer type".into()))?;
            manager.transfer(peer_id, call_id, target, kind).await?;
            Ok(json!({ "ok": true }))
        }
        "call:dtmf" => {
            let call_id = parse_field::<CallId>(&data, "call_id")?;
            let tone = data
                .get("tone")
                .and_then(Value::as_str)
                .and_then(|s| s.chars().next())
                .ok_or_else(|| GatewayError::Internal("missing tone".into()))?;
            let duration = data
                .get("duration")
                .and_then(Value::as_u64)
                .map(|d| d as u32);
            manager.dtmf(peer_id, call_id, tone, duration).await?;
            Ok(json!({ "ok": true }))
        }
        other => {
            warn!(event = other, "unrecognized signaling event");
            Err(GatewayError::Internal(format!("unrecognized event: {other}")))
        }
    }
}

fn parse_field<T: serde::de::DeserializeOwned>(
    data: &Value,
    field: &str,
) -> gateway_core::GatewayResult<T> {
    serde_json::from_value(
        data.get(field)
            .cloned()
            .ok_or_else(|| gateway_core::GatewayError::Internal(format!("missing {field}")))?,
    )
    .map_err(|e| gateway_core::GatewayError::Internal(e.to_string()))
}

//! Peer Manager: binds a signaling connection to an agent identity, to a
//! transport set, and to at most one live call; routes client RPCs into
//! the media and SIP layers and enforces the invariants tying them
//! together.

use crate::call::{CallId, CallRegistry, CallSession, CallState};
use crate::error::{GatewayError, GatewayResult};
use crate::events::GatewayEvent;
use crate::peer::{Peer, PeerEvent, PeerRegistry};
use gateway_media::{
    ConsumerId, DtlsParameters, MediaKind, MediaRegistry, MediaRegistryEvent, PeerId, ProducerId,
    RtpCapabilities, RtpClientCapabilities, RtpParameters, TransportDirection, TransportId,
};
use gateway_sip::{Direction as SipDirection, SipEvent, SipGateway, SipSessionId, TransferKind};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// `warm`/`cold`/`blind` as carried on the `call:transfer` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Warm,
    Cold,
    Blind,
}

impl TransferType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "warm" => Some(TransferType::Warm),
            "cold" => Some(TransferType::Cold),
            "blind" => Some(TransferType::Blind),
            _ => None,
        }
    }

    fn to_sip(self) -> TransferKind {
        match self {
            TransferType::Warm | TransferType::Cold => TransferKind::Attended,
            TransferType::Blind => TransferKind::Blind,
        }
    }
}

pub struct PeerManager {
    media: Arc<MediaRegistry>,
    sip: Arc<SipGateway>,
    peers: Arc<PeerRegistry>,
    calls: Arc<CallRegistry>,
    events_tx: broadcast::Sender<GatewayEvent>,
}

impl PeerManager {
    pub fn new(media: Arc<MediaRegistry>, sip: Arc<SipGateway>) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(1024);
        let manager = Arc::new(Self {
            media,
            sip,
            peers: PeerRegistry::new(),
            calls: CallRegistry::new().into(),
            events_tx,
        });
        manager.clone().spawn_media_watcher();
        manager.clone().spawn_sip_watcher();
        manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events_tx.subscribe()
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    pub fn calls(&self) -> &Arc<CallRegistry> {
        &self.calls
    }

    fn emit(&self, event: GatewayEvent) {
        let _ = self.events_tx.send(event);
    }

    // ---- connection lifecycle -----------------------------------------

    /// Binds a new peer to `agent`/`tenant`, superseding (and fully
    /// tearing down) any existing peer for the same agent.
    pub fn connect_peer(&self, agent: String, tenant: String) -> Peer {
        let (peer, superseded) = self.peers.connect(agent, tenant);
        if let Some(old_peer_id) = superseded {
            self.teardown_peer(old_peer_id, "superseded");
        }
        self.emit(GatewayEvent::PeerConnected { peer_id: peer.id });
        peer
    }

    pub fn disconnect_peer(&self, peer_id: PeerId) {
        self.teardown_peer(peer_id, "disconnected");
    }

    fn teardown_peer(&self, peer_id: PeerId, reason: &str) {
        if let Some(call_id) = self.calls.active_for_peer(peer_id) {
            let _ = self.sip_hangup_for_call(call_id, "peer-disconnected");
        }
        self.media.close_peer_transports(peer_id);
        if self.peers.disconnect(peer_id).is_some() {
            self.emit(GatewayEvent::PeerDisconnected {
                peer_id,
                reason: reason.to_string(),
            });
        }
    }

    // ---- webrtc:* RPCs --------------------------------------------------

    pub async fn get_router_capabilities(&self, peer_id: PeerId) -> GatewayResult<RtpCapabilities> {
        let peer = self.peer_or_not_found(peer_id)?;
        Ok(self.media.get_or_create_router_capabilities(&peer.tenant).await)
    }

    pub async fn create_transport(
        &self,
        peer_id: PeerId,
        direction: TransportDirection,
    ) -> GatewayResult<gateway_media::CreatedTransport> {
        let peer = self.peer_or_not_found(peer_id)?;
        let created = self
            .media
            .create_transport(&peer.tenant, peer_id, direction)
            .await?;
        match direction {
            TransportDirection::Send => self.peers.set_send_transport(peer_id, created.id),
            TransportDirection::Recv => self.peers.set_recv_transport(peer_id, created.id),
        }
        self.peers.touch(peer_id);
        Ok(created)
    }

    pub fn connect_transport(
        &self,
        peer_id: PeerId,
        transport_id: TransportId,
        dtls: DtlsParameters,
    ) -> GatewayResult<()> {
        self.require_transport_owner(peer_id, transport_id)?;
        self.media.connect_transport(transport_id, dtls)?;
        self.peers.touch(peer_id);
        Ok(())
    }

    pub fn produce(
        &self,
        peer_id: PeerId,
        transport_id: TransportId,
        kind: MediaKind,
        rtp: RtpParameters,
    ) -> GatewayResult<ProducerId> {
        self.require_transport_owner(peer_id, transport_id)?;
        let producer_id = self.media.produce(transport_id, kind, rtp)?;
        self.peers.set_producer(peer_id, producer_id);
        self.peers.touch(peer_id);
        Ok(producer_id)
    }

    pub fn consume(
        &self,
        peer_id: PeerId,
        transport_id: TransportId,
        producer_id: ProducerId,
        client_caps: &RtpClientCapabilities,
    ) -> GatewayResult<gateway_media::CreatedConsumer> {
        self.require_transport_owner(peer_id, transport_id)?;
        let created = self.media.consume(transport_id, producer_id, client_caps)?;
        self.peers.set_consumer(peer_id, created.id);
        self.peers.touch(peer_id);
        Ok(created)
    }

    pub fn resume_consumer(&self, peer_id: PeerId, consumer_id: ConsumerId) -> GatewayResult<()> {
        self.peers.touch(peer_id);
        Ok(self.media.resume_consumer(consumer_id)?)
    }

    pub fn pause_consumer(&self, peer_id: PeerId, consumer_id: ConsumerId) -> GatewayResult<()> {
        self.peers.touch(peer_id);
        Ok(self.media.pause_consumer(consumer_id)?)
    }

    fn require_transport_owner(&self, peer_id: PeerId, transport_id: TransportId) -> GatewayResult<()> {
        match self.media.transport_peer(transport_id) {
            Some(owner) if owner == peer_id => Ok(()),
            _ => Err(GatewayError::Media(gateway_media::MediaError::TransportNotFound(
                transport_id,
            ))),
        }
    }

    // ---- call:* RPCs ----------------------------------------------------

    pub async fn dial(
        &self,
        peer_id: PeerId,
        phone: &str,
        lead_id: Option<String>,
        campaign_id: Option<String>,
    ) -> GatewayResult<CallId> {
        let peer = self.peer_or_not_found(peer_id)?;
        if self.calls.active_for_peer(peer_id).is_some() {
            return Err(GatewayError::Busy);
        }

        let mut session = CallSession::new(
            peer.tenant.clone(),
            peer.agent.clone(),
            SipDirection::Outbound,
            phone.to_string(),
            peer_id,
        );
        session.lead_id = lead_id;
        session.campaign_id = campaign_id;
        let call_id = self.calls.try_insert(session).map_err(|_| GatewayError::Busy)?;

        let sip_session_id = match self
            .sip
            .make_call(peer.agent.clone(), peer.tenant.clone(), phone)
            .await
        {
            Ok(sip_session_id) => sip_session_id,
            Err(e) => {
                // make_call failed before any dialog exists; roll back the
                // just-inserted call so the peer isn't stuck busy and no
                // zombie session lingers in the registry.
                self.calls.mutate(call_id, |c| c.enter(CallState::Failed));
                self.calls.remove_if_terminal(call_id);
                return Err(e.into());
            }
        };
        self.calls.mutate(call_id, |c| {
            c.sip_session_id = Some(sip_session_id);
        });

        info!(call_id = %call_id, agent = %peer.agent, "call dialed");
        Ok(call_id)
    }

    pub async fn answer(&self, peer_id: PeerId, call_id: CallId) -> GatewayResult<()> {
        let call = self.call_owned_by(peer_id, call_id)?;
        let sip_session_id = call
            .sip_session_id
            .ok_or_else(|| GatewayError::Internal("call has no sip session".into()))?;
        self.sip.answer_call(sip_session_id).await?;
        Ok(())
    }

    /// Idempotent: a duplicate hangup on a terminal call is a no-op success.
    pub async fn hangup(&self, peer_id: PeerId, call_id: CallId) -> GatewayResult<()> {
        let call = self.call_owned_by(peer_id, call_id)?;
        if call.state.is_terminal() {
            return Ok(());
        }
        self.sip_hangup_for_call(call_id, "hangup")
    }

    fn sip_hangup_for_call(&self, call_id: CallId, reason: &'static str) -> GatewayResult<()> {
        let sip_session_id = self.calls.get(call_id).and_then(|c| c.sip_session_id);
        let sip = self.sip.clone();
        if let Some(sip_session_id) = sip_session_id {
            tokio::spawn(async move {
                let _ = sip.hangup(sip_session_id).await;
            });
        }
        self.calls.mutate(call_id, |c| c.enter(CallState::Ending));
        let _ = reason;
        Ok(())
    }

    pub async fn shutdown_call(&self, call_id: CallId) {
        let sip_session_id = self.calls.get(call_id).and_then(|c| c.sip_session_id);
        if let Some(sip_session_id) = sip_session_id {
            let _ = self.sip.hangup(sip_session_id).await;
        }
        let duration = self
            .calls
            .mutate(call_id, |c| {
                c.enter(CallState::Ended);
                c.duration().num_seconds()
            })
            .unwrap_or(0);
        self.emit(GatewayEvent::CallEnded {
            call_id,
            reason: "shutdown".into(),
            duration,
        });
        self.calls.remove_if_terminal(call_id);
    }

    pub async fn hold(&self, peer_id: PeerId, call_id: CallId) -> GatewayResult<()> {
        let call = self.call_owned_by(peer_id, call_id)?;
        let sip_session_id = call
            .sip_session_id
            .ok_or(GatewayError::CallNotFound(call_id.as_uuid()))?;
        self.sip.hold(sip_session_id).await?;
        Ok(())
    }

    pub async fn unhold(&self, peer_id: PeerId, call_id: CallId) -> GatewayResult<()> {
        let call = self.call_owned_by(peer_id, call_id)?;
        let sip_session_id = call
            .sip_session_id
            .ok_or(GatewayError::CallNotFound(call_id.as_uuid()))?;
        self.sip.unhold(sip_session_id).await?;
        Ok(())
    }

    /// Mute is local-only: it updates the call's flag and emits
    /// `call:muted`, never touching the SIP dialog.
    pub fn mute(&self, peer_id: PeerId, call_id: CallId, muted: bool) -> GatewayResult<()> {
        self.call_owned_by(peer_id, call_id)?;
        self.calls.mutate(call_id, |c| c.muted = muted);
        self.emit(GatewayEvent::CallMuted {
            call_id,
            is_muted: muted,
        });
        Ok(())
    }

    pub async fn transfer(
        &self,
        peer_id: PeerId,
        call_id: CallId,
        target: &str,
        kind: TransferType,
    ) -> GatewayResult<()> {
        let call = self.call_owned_by(peer_id, call_id)?;
        let sip_session_id = call
            .sip_session_id
            .ok_or(GatewayError::CallNotFound(call_id.as_uuid()))?;
        self.sip.transfer(sip_session_id, target, kind.to_sip()).await?;
        self.emit(GatewayEvent::CallTransferred {
            call_id,
            target: target.to_string(),
        });
        Ok(())
    }

    pub async fn dtmf(
        &self,
        peer_id: PeerId,
        call_id: CallId,
        tone: char,
        duration_ms: Option<u32>,
    ) -> GatewayResult<()> {
        let call = self.call_owned_by(peer_id, call_id)?;
        let sip_session_id = call
            .sip_session_id
            .ok_or(GatewayError::CallNotFound(call_id.as_uuid()))?;
        self.sip.send_dtmf(sip_session_id, tone, duration_ms).await?;
        Ok(())
    }

    fn peer_or_not_found(&self, peer_id: PeerId) -> GatewayResult<Peer> {
        self.peers.get(peer_id).ok_or(GatewayError::PeerNotFound)
    }

    fn call_owned_by(&self, peer_id: PeerId, call_id: CallId) -> GatewayResult<CallSession> {
        let call = self
            .calls
            .get(call_id)
            .ok_or(GatewayError::CallNotFound(call_id.as_uuid()))?;
        if call.peer_id != peer_id {
            return Err(GatewayError::CallNotFound(call_id.as_uuid()));
        }
        Ok(call)
    }

    // ---- background watchers -------------------------------------------

    fn spawn_media_watcher(self: Arc<Self>) {
        let mut events = self.media.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let MediaRegistryEvent::PeersLostMediaWorker { peer_ids } = event;
                for peer_id in peer_ids {
                    warn!(peer_id = %peer_id, "peer lost its media worker; tearing down");
                    self.teardown_peer(peer_id, "media-worker-lost");
                }
            }
        });
    }

    fn spawn_sip_watcher(self: Arc<Self>) {
        let mut events = self.sip.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                self.handle_sip_event(event).await;
            }
        });
    }

    async fn handle_sip_event(&self, event: SipEvent) {
        match event {
            SipEvent::SessionCreated {
                session_id,
                agent,
                direction: SipDirection::Inbound,
                remote_identity,
            } => self.handle_inbound_invite(session_id, agent, remote_identity).await,
            SipEvent::CallRinging { session_id } => {
                if let Some(call_id) = self.calls.by_sip_session(session_id) {
                    self.calls.mutate(call_id, |c| c.enter(CallState::Ringing));
                    self.emit(GatewayEvent::CallRinging { call_id });
                }
            }
            SipEvent::CallAnswered { session_id } => {
                if let Some(call_id) = self.calls.by_sip_session(session_id) {
                    self.calls.mutate(call_id, |c| c.enter(CallState::Answered));
                    self.emit(GatewayEvent::CallAnswered {
                        call_id,
                        ts: chrono::Utc::now().to_rfc3339(),
                    });
                }
            }
            SipEvent::SessionFailed {
                session_id,
                status,
                reason,
            } => {
                if let Some(call_id) = self.calls.by_sip_session(session_id) {
                    self.calls.mutate(call_id, |c| c.enter(CallState::Failed));
                    self.emit(GatewayEvent::CallFailed {
                        call_id,
                        error: format!("{status}: {reason}"),
                    });
                    self.calls.remove_if_terminal(call_id);
                }
            }
            SipEvent::SessionTerminated { session_id, reason } => {
                if let Some(call_id) = self.calls.by_sip_session(session_id) {
                    let duration = self
                        .calls
                        .mutate(call_id, |c| {
                            c.enter(CallState::Ended);
                            c.duration().num_seconds()
                        })
                        .unwrap_or(0);
                    self.emit(GatewayEvent::CallEnded {
                        call_id,
                        reason: reason.to_string(),
                        duration,
                    });
                    self.calls.remove_if_terminal(call_id);
                }
            }
            SipEvent::CallHeld {
                session_id,
                is_on_hold,
            } => {
                if let Some(call_id) = self.calls.by_sip_session(session_id) {
                    self.calls.mutate(call_id, |c| {
                        c.on_hold = is_on_hold;
                        c.enter(if is_on_hold {
                            CallState::OnHold
                        } else {
                            CallState::Answered
                        });
                    });
                    self.emit(GatewayEvent::CallHeld { call_id, is_on_hold });
                }
            }
            _ => {}
        }
    }

    async fn handle_inbound_invite(&self, session_id: SipSessionId, agent: String, remote_identity: String) {
        let Some(peer) = self.peers.peer_for_agent(&agent) else {
            self.sip.reject_no_peer(session_id).await;
            return;
        };
        let mut session = CallSession::new(
            peer.tenant.clone(),
            agent,
            SipDirection::Inbound,
            remote_identity.clone(),
            peer.id,
        );
        session.sip_session_id = Some(session_id);
        let Ok(call_id) = self.calls.try_insert(session) else {
            self.sip.reject_no_peer(session_id).await;
            return;
        };
        self.emit(GatewayEvent::CallIncoming {
            call_id,
            phone_number: remote_identity,
            caller_id: None,
            queue_id: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_media::{MediaConfig, RouterRegistry, WorkerPool};
    use gateway_sip::{LoopbackSipTransport, SipGatewayConfig};

    async fn manager() -> Arc<PeerManager> {
        let pool = WorkerPool::start(MediaConfig::default()).unwrap();
        let routers = Arc::new(RouterRegistry::new(MediaConfig::default(), pool.clone()));
        let media = MediaRegistry::new(routers, pool);
        let sip = SipGateway::new(SipGatewayConfig::default(), Arc::new(LoopbackSipTransport::new()));
        PeerManager::new(media, sip)
    }

    #[tokio::test]
    async fn connecting_second_time_supersedes_first() {
        let manager = manager().await;
        let first = manager.connect_peer("agent-1".into(), "tenant-1".into());
        let second = manager.connect_peer("agent-1".into(), "tenant-1".into());
        assert_ne!(first.id, second.id);
        assert!(manager.peers().get(first.id).is_none());
    }

    #[tokio::test]
    async fn dial_without_peer_fails() {
        let manager = manager().await;
        let result = manager
            .dial(PeerId::new(), "+15551234567", None, None)
            .await;
        assert!(matches!(result, Err(GatewayError::PeerNotFound)));
    }

    #[tokio::test]
    async fn second_dial_while_busy_fails() {
        let manager = manager().await;
        let peer = manager.connect_peer("agent-1".into(), "tenant-1".into());
        manager
            .sip
            .register_agent(
                "agent-1".into(),
                "tenant-1".into(),
                gateway_sip::SipAgentConfig {
                    display_name: "agent-1".into(),
                    contact_uri: "sip:agent-1@gw".into(),
                },
            )
            .await
            .unwrap();
        manager.dial(peer.id, "+15551234567", None, None).await.unwrap();
        let result = manager.dial(peer.id, "+15559999999", None, None).await;
        assert!(matches!(result, Err(GatewayError::Busy)));
    }

    #[tokio::test]
    async fn transport_owned_by_other_peer_is_rejected() {
        let manager = manager().await;
        let owner = manager.connect_peer("agent-1".into(), "tenant-1".into());
        let other = manager.connect_peer("agent-2".into(), "tenant-1".into());
        let transport = manager
            .create_transport(owner.id, TransportDirection::Send)
            .await
            .unwrap();
        let result = manager.connect_transport(
            other.id,
            transport.id,
            DtlsParameters {
                role: "client".into(),
                fingerprints: vec![],
            },
        );
        assert!(result.is_err());
    }
}

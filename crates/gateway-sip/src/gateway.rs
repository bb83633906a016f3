//! Per-agent SIP user agent: registration, call origination/termination,
//! and mid-call primitives.

use crate::config::{SipAgentConfig, SipGatewayConfig};
use crate::dtmf::{clamp_duration, dtmf_relay_body, Tone};
use crate::error::{SipError, SipResult};
use crate::events::{RegistrationState, SipEvent};
use crate::ids::{AgentId, SipSessionId, TenantId};
use crate::phone::normalize;
use crate::session::{Direction, SipSession, SipSessionState};
use crate::transport::{LinkState, SipTransport, SipWireMessage};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Incoming INVITE left unanswered for this long is auto-rejected `480`.
pub const RING_TIMEOUT: Duration = Duration::from_secs(30);
/// Outbound INVITE with no final response for this long is cancelled.
pub const ESTABLISHING_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Blind,
    /// `warm` and `cold` in the client RPC both map here.
    Attended,
}

pub struct SipGateway {
    config: SipGatewayConfig,
    transport: Arc<dyn SipTransport>,
    registrations: DashMap<AgentId, RegistrationState>,
    sessions: DashMap<SipSessionId, SipSession>,
    events_tx: broadcast::Sender<SipEvent>,
}

impl SipGateway {
    pub fn new(config: SipGatewayConfig, transport: Arc<dyn SipTransport>) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(1024);
        Arc::new(Self {
            config,
            transport,
            registrations: DashMap::new(),
            sessions: DashMap::new(),
            events_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SipEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: SipEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn config(&self) -> &SipGatewayConfig {
        &self.config
    }

    pub fn session(&self, id: SipSessionId) -> Option<SipSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn is_registered(&self, agent: &str) -> bool {
        matches!(
            self.registrations.get(agent).map(|r| r.clone()),
            Some(RegistrationState::Registered)
        )
    }

    // ---- registration -------------------------------------------------

    pub async fn register_agent(
        &self,
        agent: AgentId,
        _tenant: TenantId,
        _sip_config: SipAgentConfig,
    ) -> SipResult<()> {
        if self.is_registered(&agent) {
            return Err(SipError::AlreadyRegistered);
        }
        self.transport
            .send(SipWireMessage::Register {
                agent: agent.clone(),
                expires: self.config.registration_expires_secs,
            })
            .await
            .map_err(SipError::Internal)?;
        self.registrations
            .insert(agent.clone(), RegistrationState::Registered);
        info!(agent, "sip user agent registered");
        self.emit(SipEvent::RegistrationStateChanged {
            agent,
            state: RegistrationState::Registered,
        });
        Ok(())
    }

    pub async fn unregister_agent(&self, agent: &str) -> SipResult<()> {
        if !self.is_registered(agent) {
            return Err(SipError::NotRegistered);
        }
        let _ = self
            .transport
            .send(SipWireMessage::Register {
                agent: agent.to_string(),
                expires: 0,
            })
            .await;
        self.registrations.remove(agent);
        self.emit(SipEvent::RegistrationStateChanged {
            agent: agent.to_string(),
            state: RegistrationState::Unregistered,
        });
        Ok(())
    }

    // ---- outbound -------------------------------------------------------

    pub async fn make_call(
        self: &Arc<Self>,
        agent: AgentId,
        tenant: TenantId,
        e164: &str,
    ) -> SipResult<SipSessionId> {
        if !self.is_registered(&agent) {
            return Err(SipError::NotRegistered);
        }
        let normalized = normalize(e164)?;
        if self.transport.link_state() != LinkState::Connected {
            return Err(SipError::TransportUnavailable);
        }

        let local_identity = format!("sip:{agent}@{}", self.config.host);
        let mut session = SipSession::new(
            agent,
            tenant,
            Direction::Outbound,
            normalized.clone(),
            local_identity.clone(),
        );
        session.transition(SipSessionState::Establishing);
        let session_id = session.id;
        self.sessions.insert(session_id, session);

        self.transport
            .send(SipWireMessage::Invite {
                call_id: session_id.to_string(),
                to: normalized.clone(),
                from: local_identity,
            })
            .await
            .map_err(SipError::Internal)?;

        self.emit(SipEvent::SessionCreated {
            session_id,
            agent: self.sessions.get(&session_id).unwrap().agent.clone(),
            direction: Direction::Outbound,
            remote_identity: normalized,
        });

        self.clone().schedule_establishing_timeout(session_id);
        Ok(session_id)
    }

    fn schedule_establishing_timeout(self: Arc<Self>, session_id: SipSessionId) {
        tokio::spawn(async move {
            tokio::time::sleep(ESTABLISHING_TIMEOUT).await;
            let timed_out = self
                .sessions
                .get(&session_id)
                .map(|s| s.state == SipSessionState::Establishing)
                .unwrap_or(false);
            if !timed_out {
                return;
            }
            let _ = self
                .transport
                .send(SipWireMessage::Cancel {
                    call_id: session_id.to_string(),
                })
                .await;
            if let Some(mut s) = self.sessions.get_mut(&session_id) {
                s.transition(SipSessionState::Terminated);
            }
            let err = SipError::NoAnswer;
            warn!(session_id = %session_id, %err, "outbound call timed out");
            self.emit(SipEvent::SessionFailed {
                session_id,
                status: 408,
                reason: err.code().into(),
            });
        });
    }

    // ---- inbound ----------------------------------------------------------

    /// Delivers an incoming INVITE for `agent`'s registered URI. Returns the
    /// new session id; the caller (Peer Manager) decides whether a peer is
    /// attached and, if not, must call [`Self::reject_no_peer`].
    pub fn receive_invite(
        self: &Arc<Self>,
        agent: AgentId,
        tenant: TenantId,
        remote_identity: String,
    ) -> SipSessionId {
        let local_identity = format!("sip:{agent}@{}", self.config.host);
        let mut session = SipSession::new(
            agent.clone(),
            tenant,
            Direction::Inbound,
            remote_identity.clone(),
            local_identity,
        );
        session.transition(SipSessionState::Establishing);
        let session_id = session.id;
        self.sessions.insert(session_id, session);

        self.emit(SipEvent::SessionCreated {
            session_id,
            agent,
            direction: Direction::Inbound,
            remote_identity,
        });
        self.clone().schedule_ring_timeout(session_id);
        session_id
    }

    fn schedule_ring_timeout(self: Arc<Self>, session_id: SipSessionId) {
        tokio::spawn(async move {
            tokio::time::sleep(RING_TIMEOUT).await;
            let still_ringing = self
                .sessions
                .get(&session_id)
                .map(|s| s.state == SipSessionState::Establishing)
                .unwrap_or(false);
            if !still_ringing {
                return;
            }
            self.reject_no_peer(session_id).await;
        });
    }

    /// `480 Temporarily Unavailable`: no peer attached for the agent, or
    /// the ring timeout elapsed.
    pub async fn reject_no_peer(&self, session_id: SipSessionId) {
        let _ = self
            .transport
            .send(SipWireMessage::Reject {
                call_id: session_id.to_string(),
                status: 480,
            })
            .await;
        if let Some(mut s) = self.sessions.get_mut(&session_id) {
            s.transition(SipSessionState::Terminated);
        }
        self.emit(SipEvent::SessionFailed {
            session_id,
            status: 480,
            reason: "Temporarily Unavailable".into(),
        });
    }

    pub async fn answer_call(&self, session_id: SipSessionId) -> SipResult<()> {
        let direction = {
            let session = self
                .sessions
                .get(&session_id)
                .ok_or(SipError::SessionNotFound(session_id))?;
            if session.state != SipSessionState::Establishing {
                return Err(SipError::AlreadyTerminated(session_id));
            }
            session.direction
        };
        if direction != Direction::Inbound {
            return Err(SipError::Internal("answer on non-inbound session".into()));
        }
        self.transport
            .send(SipWireMessage::Ok200 {
                call_id: session_id.to_string(),
            })
            .await
            .map_err(SipError::Internal)?;
        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(SipError::SessionNotFound(session_id))?;
        session.transition(SipSessionState::Established);
        drop(session);
        self.emit(SipEvent::CallAnswered { session_id });
        Ok(())
    }

    // ---- mid-call -----------------------------------------------------

    /// Idempotent: a duplicate hangup on a terminal session is a no-op
    /// success.
    pub async fn hangup(&self, session_id: SipSessionId) -> SipResult<()> {
        let (state, direction) = {
            let session = match self.sessions.get(&session_id) {
                Some(s) => s,
                None => return Ok(()),
            };
            (session.state, session.direction)
        };

        match state {
            SipSessionState::Terminated => return Ok(()),
            SipSessionState::Establishing if direction == Direction::Outbound => {
                let _ = self
                    .transport
                    .send(SipWireMessage::Cancel {
                        call_id: session_id.to_string(),
                    })
                    .await;
            }
            SipSessionState::Establishing => {
                let _ = self
                    .transport
                    .send(SipWireMessage::Reject {
                        call_id: session_id.to_string(),
                        status: 487,
                    })
                    .await;
            }
            _ => {
                let _ = self
                    .transport
                    .send(SipWireMessage::Bye {
                        call_id: session_id.to_string(),
                    })
                    .await;
            }
        }

        if let Some(mut s) = self.sessions.get_mut(&session_id) {
            s.transition(SipSessionState::Terminated);
        }
        self.emit(SipEvent::SessionTerminated {
            session_id,
            reason: "hangup",
        });
        Ok(())
    }

    /// Entry point for a BYE arriving from the peer mid-call.
    pub fn remote_terminated(&self, session_id: SipSessionId) {
        if let Some(mut s) = self.sessions.get_mut(&session_id) {
            if s.state == SipSessionState::Terminated {
                return;
            }
            s.transition(SipSessionState::Terminated);
        } else {
            return;
        }
        self.emit(SipEvent::SessionTerminated {
            session_id,
            reason: "terminated",
        });
    }

    pub async fn hold(&self, session_id: SipSessionId) -> SipResult<()> {
        self.set_hold(session_id, true, "sendonly").await
    }

    pub async fn unhold(&self, session_id: SipSessionId) -> SipResult<()> {
        self.set_hold(session_id, false, "sendrecv").await
    }

    async fn set_hold(
        &self,
        session_id: SipSessionId,
        on: bool,
        direction: &'static str,
    ) -> SipResult<()> {
        {
            let session = self
                .sessions
                .get(&session_id)
                .ok_or(SipError::SessionNotFound(session_id))?;
            if session.state != SipSessionState::Established {
                return Err(SipError::NotEstablished(session_id));
            }
        }
        self.transport
            .send(SipWireMessage::ReInvite {
                call_id: session_id.to_string(),
                direction,
            })
            .await
            .map_err(SipError::Internal)?;
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.on_hold = on;
        }
        self.emit(SipEvent::CallHeld {
            session_id,
            is_on_hold: on,
        });
        Ok(())
    }

    pub async fn send_dtmf(
        &self,
        session_id: SipSessionId,
        tone: char,
        duration_ms: Option<u32>,
    ) -> SipResult<()> {
        {
            let session = self
                .sessions
                .get(&session_id)
                .ok_or(SipError::SessionNotFound(session_id))?;
            if session.state != SipSessionState::Established {
                return Err(SipError::NotEstablished(session_id));
            }
        }
        let parsed = Tone::parse(tone)?;
        let duration = clamp_duration(duration_ms);
        self.transport
            .send(SipWireMessage::Info {
                call_id: session_id.to_string(),
                body: dtmf_relay_body(parsed, duration),
            })
            .await
            .map_err(SipError::Internal)?;
        self.emit(SipEvent::DtmfSent { session_id, tone });
        Ok(())
    }

    pub async fn transfer(
        &self,
        session_id: SipSessionId,
        target: &str,
        kind: TransferKind,
    ) -> SipResult<()> {
        {
            let session = self
                .sessions
                .get(&session_id)
                .ok_or(SipError::SessionNotFound(session_id))?;
            if session.state != SipSessionState::Established {
                return Err(SipError::NotEstablished(session_id));
            }
        }
        match kind {
            TransferKind::Blind => {
                self.transport
                    .send(SipWireMessage::Refer {
                        call_id: session_id.to_string(),
                        target: target.to_string(),
                    })
                    .await
                    .map_err(SipError::Internal)?;
                Ok(())
            }
            TransferKind::Attended => Err(SipError::NotImplemented(
                "attended transfer requires a second established dialog".into(),
            )),
        }
    }

    // ---- simulation hooks for the opaque remote peer ---------------------
    // A production build replaces these with parsed responses off the
    // WebSocket (see `crate::transport`).

    pub fn simulate_ringing(&self, session_id: SipSessionId) {
        if self
            .sessions
            .get(&session_id)
            .map(|s| s.state == SipSessionState::Establishing)
            .unwrap_or(false)
        {
            self.emit(SipEvent::CallRinging { session_id });
        }
    }

    pub async fn simulate_remote_answer(&self, session_id: SipSessionId) -> SipResult<()> {
        let mut session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(SipError::SessionNotFound(session_id))?;
        if session.state != SipSessionState::Establishing {
            return Ok(());
        }
        session.transition(SipSessionState::Established);
        drop(session);
        self.emit(SipEvent::CallAnswered { session_id });
        Ok(())
    }

    pub fn simulate_remote_failure(&self, session_id: SipSessionId, status: u16, reason: &str) {
        if let Some(mut s) = self.sessions.get_mut(&session_id) {
            if s.state == SipSessionState::Terminated {
                return;
            }
            s.transition(SipSessionState::Terminated);
        } else {
            return;
        }
        let err = SipError::Rejected {
            status,
            reason: reason.to_string(),
        };
        warn!(session_id = %session_id, %err, "remote party rejected call");
        let SipError::Rejected { status, reason } = err else {
            unreachable!()
        };
        self.emit(SipEvent::SessionFailed {
            session_id,
            status,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackSipTransport;

    fn gateway() -> Arc<SipGateway> {
        SipGateway::new(SipGatewayConfig::default(), Arc::new(LoopbackSipTransport::new()))
    }

    async fn registered(gw: &Arc<SipGateway>, agent: &str) {
        gw.register_agent(
            agent.to_string(),
            "tenant-1".to_string(),
            SipAgentConfig {
                display_name: agent.to_string(),
                contact_uri: format!("sip:{agent}@gw"),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn double_registration_rejected() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let result = gw
            .register_agent(
                "agent-1".into(),
                "tenant-1".into(),
                SipAgentConfig {
                    display_name: "agent-1".into(),
                    contact_uri: "sip:agent-1@gw".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(SipError::AlreadyRegistered)));
    }

    #[tokio::test]
    async fn make_call_requires_registration() {
        let gw = gateway();
        let result = gw
            .make_call("agent-1".into(), "tenant-1".into(), "+15551234567")
            .await;
        assert!(matches!(result, Err(SipError::NotRegistered)));
    }

    #[tokio::test]
    async fn happy_path_outbound_call() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let mut events = gw.subscribe();
        let session_id = gw
            .make_call("agent-1".into(), "tenant-1".into(), "+1 555 123 4567")
            .await
            .unwrap();

        gw.simulate_ringing(session_id);
        gw.simulate_remote_answer(session_id).await.unwrap();
        gw.hangup(session_id).await.unwrap();

        // Drain and check ordering: created -> ringing -> answered -> terminated
        let mut saw_ringing = false;
        let mut saw_answered = false;
        let mut saw_terminated = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SipEvent::CallRinging { .. } => saw_ringing = true,
                SipEvent::CallAnswered { .. } => {
                    assert!(saw_ringing);
                    saw_answered = true;
                }
                SipEvent::SessionTerminated { .. } => {
                    assert!(saw_answered);
                    saw_terminated = true;
                }
                _ => {}
            }
        }
        assert!(saw_terminated);
    }

    #[tokio::test]
    async fn double_hangup_is_idempotent() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let session_id = gw
            .make_call("agent-1".into(), "tenant-1".into(), "+15551234567")
            .await
            .unwrap();
        gw.hangup(session_id).await.unwrap();
        gw.hangup(session_id).await.unwrap();
    }

    #[tokio::test]
    async fn hold_requires_established() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let session_id = gw
            .make_call("agent-1".into(), "tenant-1".into(), "+15551234567")
            .await
            .unwrap();
        assert!(matches!(
            gw.hold(session_id).await,
            Err(SipError::NotEstablished(_))
        ));
    }

    #[tokio::test]
    async fn attended_transfer_not_implemented() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let session_id = gw
            .make_call("agent-1".into(), "tenant-1".into(), "+15551234567")
            .await
            .unwrap();
        gw.simulate_remote_answer(session_id).await.unwrap();
        assert!(matches!(
            gw.transfer(session_id, "+15559999999", TransferKind::Attended)
                .await,
            Err(SipError::NotImplemented(_))
        ));
    }

    #[tokio::test]
    async fn blind_transfer_sends_refer() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let session_id = gw
            .make_call("agent-1".into(), "tenant-1".into(), "+15551234567")
            .await
            .unwrap();
        gw.simulate_remote_answer(session_id).await.unwrap();
        assert!(gw
            .transfer(session_id, "+15559999999", TransferKind::Blind)
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn ring_timeout_rejects_after_30s() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let mut events = gw.subscribe();
        let session_id = gw.receive_invite(
            "agent-1".into(),
            "tenant-1".into(),
            "+15550001".into(),
        );
        tokio::task::yield_now().await;

        tokio::time::advance(RING_TIMEOUT + Duration::from_millis(50)).await;
        tokio::task::yield_now().await;

        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            if let SipEvent::SessionFailed { status, session_id: sid, .. } = event {
                assert_eq!(sid, session_id);
                assert_eq!(status, 480);
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_before_ring_timeout_succeeds() {
        let gw = gateway();
        registered(&gw, "agent-1").await;
        let session_id = gw.receive_invite(
            "agent-1".into(),
            "tenant-1".into(),
            "+15550001".into(),
        );
        tokio::time::advance(RING_TIMEOUT - Duration::from_millis(100)).await;
        assert!(gw.answer_call(session_id).await.is_ok());
    }
}

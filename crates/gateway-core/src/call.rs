//! The logical call session that unifies a WebRTC peer and a SIP dialog.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_media::PeerId;
use gateway_sip::{Direction, SipSessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CallId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// `initiating -> ringing -> answered <-> on_hold -> transferring -> ending
/// -> ended`; `failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Initiating,
    Ringing,
    Answered,
    OnHold,
    Transferring,
    Ending,
    Ended,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: CallId,
    pub tenant: String,
    pub agent: String,
    pub direction: Direction,
    pub phone_number: String,
    pub state: CallState,
    pub peer_id: PeerId,
    pub sip_session_id: Option<SipSessionId>,
    pub campaign_id: Option<String>,
    pub lead_id: Option<String>,
    pub queue_id: Option<String>,
    pub on_hold: bool,
    pub muted: bool,
    pub recording_enabled: bool,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(
        tenant: String,
        agent: String,
        direction: Direction,
        phone_number: String,
        peer_id: PeerId,
    ) -> Self {
        Self {
            id: CallId::new(),
            tenant,
            agent,
            direction,
            phone_number,
            state: CallState::Initiating,
            peer_id,
            sip_session_id: None,
            campaign_id: None,
            lead_id: None,
            queue_id: None,
            on_hold: false,
            muted: false,
            recording_enabled: false,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
        }
    }

    pub fn enter(&mut self, next: CallState) {
        if self.state.is_terminal() {
            return;
        }
        if next == CallState::Answered && self.answered_at.is_none() {
            self.answered_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.state = next;
    }

    /// `end - answer` if the call was ever answered, else zero.
    pub fn duration(&self) -> chrono::Duration {
        match (self.answered_at, self.ended_at) {
            (Some(answered), Some(ended)) => ended - answered,
            _ => chrono::Duration::zero(),
        }
    }
}

/// Flat call registry keyed by call ID, with a secondary index enforcing
/// at most one non-terminal call per peer.
#[derive(Default)]
pub struct CallRegistry {
    calls: DashMap<CallId, CallSession>,
    active_by_peer: DashMap<PeerId, CallId>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new call for `peer_id`, failing if one is already active.
    pub fn try_insert(&self, session: CallSession) -> Result<CallId, ()> {
        let peer_id = session.peer_id;
        let call_id = session.id;
        match self.active_by_peer.entry(peer_id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if self
                    .calls
                    .get(existing.get())
                    .map(|c| c.state.is_terminal())
                    .unwrap_or(true)
                {
                    // Stale active index entry for an already-terminal call;
                    // fall through and replace it.
                } else {
                    return Err(());
                }
            }
            dashmap::mapref::entry::Entry::Vacant(_) => {}
        }
        self.active_by_peer.insert(peer_id, call_id);
        self.calls.insert(call_id, session);
        Ok(call_id)
    }

    pub fn get(&self, call_id: CallId) -> Option<CallSession> {
        self.calls.get(&call_id).map(|c| c.clone())
    }

    pub fn active_for_peer(&self, peer_id: PeerId) -> Option<CallId> {
        let call_id = *self.active_by_peer.get(&peer_id)?;
        match self.calls.get(&call_id) {
            Some(call) if !call.state.is_terminal() => Some(call_id),
            _ => None,
        }
    }

    pub fn by_sip_session(&self, sip_session_id: SipSessionId) -> Option<CallId> {
        self.calls
            .iter()
            .find(|entry| entry.value().sip_session_id == Some(sip_session_id))
            .map(|entry| *entry.key())
    }

    /// Applies `f` to the call if present, returning its result.
    pub fn mutate<R>(&self, call_id: CallId, f: impl FnOnce(&mut CallSession) -> R) -> Option<R> {
        self.calls.get_mut(&call_id).map(|mut c| f(&mut c))
    }

    /// Removes a terminal call from the registry (called after its final
    /// event is emitted).
    pub fn remove_if_terminal(&self, call_id: CallId) {
        if let Some(call) = self.calls.get(&call_id) {
            if !call.state.is_terminal() {
                return;
            }
        } else {
            return;
        }
        self.calls.remove(&call_id);
        self.active_by_peer.retain(|_, v| *v != call_id);
    }

    pub fn calls_for_agent(&self, agent: &str) -> Vec<CallSession> {
        self.calls
            .iter()
            .filter(|entry| entry.value().agent == agent)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn all(&self) -> Vec<CallSession> {
        self.calls.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(peer: PeerId) -> CallSession {
        CallSession::new(
            "tenant-1".into(),
            "agent-1".into(),
            Direction::Outbound,
            "+15551234567".into(),
            peer,
        )
    }

    #[test]
    fn second_active_call_on_same_peer_rejected() {
        let registry = CallRegistry::new();
        let peer = PeerId::new();
        registry.try_insert(session(peer)).unwrap();
        assert!(registry.try_insert(session(peer)).is_err());
    }

    #[test]
    fn new_call_allowed_after_previous_terminal() {
        let registry = CallRegistry::new();
        let peer = PeerId::new();
        let first = registry.try_insert(session(peer)).unwrap();
        registry.mutate(first, |c| c.enter(CallState::Ended));
        assert!(registry.try_insert(session(peer)).is_ok());
    }

    #[test]
    fn duration_is_zero_when_never_answered() {
        let mut call = session(PeerId::new());
        call.enter(CallState::Failed);
        assert_eq!(call.duration(), chrono::Duration::zero());
    }

    #[test]
    fn duration_is_positive_once_answered() {
        let mut call = session(PeerId::new());
        call.enter(CallState::Answered);
        call.enter(CallState::Ended);
        assert!(call.duration() >= chrono::Duration::zero());
    }

    #[test]
    fn double_terminal_transition_is_noop() {
        let mut call = session(PeerId::new());
        call.enter(CallState::Ended);
        let first_end = call.ended_at;
        call.enter(CallState::Failed);
        assert_eq!(call.state, CallState::Ended);
        assert_eq!(call.ended_at, first_end);
    }
}

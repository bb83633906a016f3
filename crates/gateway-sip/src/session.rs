//! SIP session: one per SIP dialog.

use crate::ids::{AgentId, SipSessionId, TenantId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// `initial -> establishing -> established -> terminating -> terminated`.
/// Regressive edges are forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SipSessionState {
    Initial,
    Establishing,
    Established,
    Terminating,
    Terminated,
}

impl SipSessionState {
    fn rank(self) -> u8 {
        match self {
            SipSessionState::Initial => 0,
            SipSessionState::Establishing => 1,
            SipSessionState::Established => 2,
            SipSessionState::Terminating => 3,
            SipSessionState::Terminated => 4,
        }
    }

    /// Forward-only transition check; `terminated` may be entered from any
    /// non-terminal state directly (e.g. CANCEL while establishing).
    pub fn can_advance_to(self, next: SipSessionState) -> bool {
        if next == SipSessionState::Terminated {
            return self != SipSessionState::Terminated;
        }
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone)]
pub struct SipSession {
    pub id: SipSessionId,
    pub agent: AgentId,
    pub tenant: TenantId,
    pub correlated_call_id: Option<String>,
    pub direction: Direction,
    pub remote_identity: String,
    pub local_identity: String,
    pub state: SipSessionState,
    pub on_hold: bool,
    pub muted: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SipSession {
    pub fn new(
        agent: AgentId,
        tenant: TenantId,
        direction: Direction,
        remote_identity: String,
        local_identity: String,
    ) -> Self {
        Self {
            id: SipSessionId::new(),
            agent,
            tenant,
            correlated_call_id: None,
            direction,
            remote_identity,
            local_identity,
            state: SipSessionState::Initial,
            on_hold: false,
            muted: false,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Applies a forward state transition, returning `false` (no-op) if the
    /// transition is regressive or the session is already terminal.
    pub fn transition(&mut self, next: SipSessionState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        self.state = next;
        if next == SipSessionState::Terminated {
            self.ended_at = Some(Utc::now());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        let mut s = SipSession::new(
            "agent-1".into(),
            "tenant-1".into(),
            Direction::Outbound,
            "+15551234567".into(),
            "sip:agent-1@gw".into(),
        );
        assert!(s.transition(SipSessionState::Establishing));
        assert!(s.transition(SipSessionState::Established));
        assert!(s.transition(SipSessionState::Terminating));
        assert!(s.transition(SipSessionState::Terminated));
    }

    #[test]
    fn regressive_transition_rejected() {
        let mut s = SipSession::new(
            "agent-1".into(),
            "tenant-1".into(),
            Direction::Outbound,
            "+15551234567".into(),
            "sip:agent-1@gw".into(),
        );
        s.transition(SipSessionState::Establishing);
        s.transition(SipSessionState::Established);
        assert!(!s.transition(SipSessionState::Establishing));
        assert_eq!(s.state, SipSessionState::Established);
    }

    #[test]
    fn terminated_is_final() {
        let mut s = SipSession::new(
            "agent-1".into(),
            "tenant-1".into(),
            Direction::Outbound,
            "+15551234567".into(),
            "sip:agent-1@gw".into(),
        );
        s.transition(SipSessionState::Terminated);
        assert!(!s.transition(SipSessionState::Establishing));
    }
}

//! Dialog events the SIP gateway surfaces to the Peer Manager.

use crate::ids::{AgentId, SipSessionId};
use crate::session::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Registered,
    Unregistered,
    Failed,
}

#[derive(Debug, Clone)]
pub enum SipEvent {
    RegistrationStateChanged {
        agent: AgentId,
        state: RegistrationState,
    },
    /// Fires for both directions: on `make_call` (outbound) and on an
    /// incoming INVITE when a peer is attached (inbound).
    SessionCreated {
        session_id: SipSessionId,
        agent: AgentId,
        direction: Direction,
        remote_identity: String,
    },
    CallRinging {
        session_id: SipSessionId,
    },
    CallAnswered {
        session_id: SipSessionId,
    },
    SessionFailed {
        session_id: SipSessionId,
        status: u16,
        reason: String,
    },
    SessionTerminated {
        session_id: SipSessionId,
        reason: &'static str,
    },
    CallHeld {
        session_id: SipSessionId,
        is_on_hold: bool,
    },
    DtmfSent {
        session_id: SipSessionId,
        tone: char,
    },
}

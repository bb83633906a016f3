//! Error types for the SIP gateway.

use crate::ids::SipSessionId;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SipError {
    #[error("agent is not registered")]
    NotRegistered,

    #[error("agent already has a registered user agent")]
    AlreadyRegistered,

    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("sip session not found: {0}")]
    SessionNotFound(SipSessionId),

    #[error("session is not established: {0}")]
    NotEstablished(SipSessionId),

    #[error("session already terminated: {0}")]
    AlreadyTerminated(SipSessionId),

    /// `make_call` attempted on a closed/reconnecting signaling socket.
    #[error("sip transport unavailable")]
    TransportUnavailable,

    /// Establishing outbound call timed out after 60s with no final response.
    #[error("no answer")]
    NoAnswer,

    /// Remote party rejected the call (4xx-6xx).
    #[error("call rejected: {status} {reason}")]
    Rejected { status: u16, reason: String },

    /// Attended transfer is explicitly unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// DTMF tone outside the `0-9 * # A-D` grammar.
    #[error("invalid dtmf tone: {0}")]
    InvalidTone(char),

    #[error("internal sip error: {0}")]
    Internal(String),
}

impl SipError {
    pub fn code(&self) -> &'static str {
        match self {
            SipError::NotRegistered => "not-registered",
            SipError::AlreadyRegistered => "already-registered",
            SipError::InvalidPhoneNumber(_) => "invalid-phone-number",
            SipError::SessionNotFound(_) => "call-not-found",
            SipError::NotEstablished(_) => "not-established",
            SipError::AlreadyTerminated(_) => "already-terminated",
            SipError::TransportUnavailable => "transport-unavailable",
            SipError::NoAnswer => "no-answer",
            SipError::Rejected { .. } => "rejected",
            SipError::NotImplemented(_) => "not-implemented",
            SipError::InvalidTone(_) => "invalid",
            SipError::Internal(_) => "internal",
        }
    }
}

pub type SipResult<T> = Result<T, SipError>;

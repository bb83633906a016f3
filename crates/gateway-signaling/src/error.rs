use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SignalingError {
    #[error("authentication failed")]
    AuthFailed,

    #[error("missing credentials")]
    MissingCredentials,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("socket idle timeout")]
    IdleTimeout,

    #[error("internal signaling error: {0}")]
    Internal(String),
}

impl SignalingError {
    pub fn code(&self) -> &'static str {
        match self {
            SignalingError::AuthFailed => "auth-failed",
            SignalingError::MissingCredentials => "missing-credentials",
            SignalingError::ProtocolViolation(_) => "protocol-violation",
            SignalingError::IdleTimeout => "timeout",
            SignalingError::Internal(_) => "internal",
        }
    }
}

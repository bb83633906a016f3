//! Top-level error type: the union of every failure an RPC can surface,
//! classified to stable wire codes for the `{code, message}` error reply.

use gateway_media::MediaError;
use gateway_sip::SipError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Sip(#[from] SipError),

    #[error("peer not found")]
    PeerNotFound,

    #[error("call not found: {0}")]
    CallNotFound(Uuid),

    #[error("peer already has an active call")]
    Busy,

    #[error("rpc exceeded its deadline")]
    Timeout,

    #[error("internal gateway error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Media(e) => e.code(),
            GatewayError::Sip(e) => e.code(),
            GatewayError::PeerNotFound => "peer-not-found",
            GatewayError::CallNotFound(_) => "call-not-found",
            GatewayError::Busy => "busy",
            GatewayError::Timeout => "timeout",
            GatewayError::Internal(_) => "internal",
            GatewayError::Config(_) => "internal",
        }
    }

    pub fn to_rpc_error(&self) -> gateway_signaling::RpcError {
        gateway_signaling::RpcError::new(self.code(), self.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

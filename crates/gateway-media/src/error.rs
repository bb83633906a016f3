//! Error types for the media worker pool and registries.

use crate::ids::{ConsumerId, ProducerId, RouterId, TransportId};
use thiserror::Error;

/// Failures raised by [`crate::config::MediaConfig`] validation, the worker
/// pool, and the transport/producer/consumer registries.
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// `RTC_MAX_PORT - RTC_MIN_PORT < 100`, or `min >= max`. Fatal at startup.
    #[error("port range invalid: [{min}, {max}) must span at least 100 ports")]
    PortRangeInvalid { min: u16, max: u16 },

    /// A worker process could not be spawned. Transient; the pool retries.
    #[error("worker spawn failed: {reason}")]
    WorkerSpawnFailed { reason: String },

    /// The router's codec set does not include a codec the caller requested.
    /// Fatal at router creation.
    #[error("codec unsupported: {codec}")]
    CodecUnsupported { codec: String },

    #[error("transport not found: {0}")]
    TransportNotFound(TransportId),

    #[error("producer not found: {0}")]
    ProducerNotFound(ProducerId),

    #[error("consumer not found: {0}")]
    ConsumerNotFound(ConsumerId),

    #[error("router not found: {0}")]
    RouterNotFound(RouterId),

    /// `connect_transport` called twice on the same transport.
    #[error("transport already connected: {0}")]
    AlreadyConnected(TransportId),

    /// The router cannot produce a consumer compatible with the client's
    /// RTP capabilities.
    #[error("incompatible capabilities for producer {0}")]
    IncompatibleCapabilities(ProducerId),

    /// The tenant's router lived on a worker that died and no replacement
    /// has taken over its transports yet.
    #[error("media worker lost")]
    MediaWorkerLost,

    #[error("internal media error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Wire error code, matching the `{code, message, details?}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::PortRangeInvalid { .. } => "port-range-invalid",
            MediaError::WorkerSpawnFailed { .. } => "worker-spawn-failed",
            MediaError::CodecUnsupported { .. } => "codec-unsupported",
            MediaError::TransportNotFound(_) => "transport-not-found",
            MediaError::ProducerNotFound(_) => "producer-not-found",
            MediaError::ConsumerNotFound(_) => "consumer-not-found",
            MediaError::RouterNotFound(_) => "router-not-found",
            MediaError::AlreadyConnected(_) => "already-connected",
            MediaError::IncompatibleCapabilities(_) => "incompatible-capabilities",
            MediaError::MediaWorkerLost => "media-worker-lost",
            MediaError::Internal(_) => "internal",
        }
    }
}

pub type MediaResult<T> = Result<T, MediaError>;

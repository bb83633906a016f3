//! Media-plane SFU primitives for the gateway: a supervised worker pool, a
//! per-tenant router registry, and the transport/producer/consumer
//! lifecycle that sits on top of them.

pub mod config;
pub mod consumer;
pub mod error;
pub mod ids;
pub mod producer;
pub mod registry;
pub mod router;
pub mod rtp;
pub mod transport;
pub mod worker;

pub use config::{Codec, MediaConfig, WorkerLogLevel};
pub use consumer::Consumer;
pub use error::{MediaError, MediaResult};
pub use ids::{ConsumerId, PeerId, ProducerId, RouterId, TenantId, TransportId, WorkerId};
pub use producer::Producer;
pub use registry::{CreatedConsumer, CreatedTransport, MediaRegistry, MediaRegistryEvent};
pub use router::{Router, RouterRegistry};
pub use rtp::{MediaKind, RtpCapabilities, RtpClientCapabilities, RtpCodecCapability, RtpParameters};
pub use transport::{DtlsParameters, DtlsState, IceCandidate, IceParameters, Transport, TransportDirection};
pub use worker::{Worker, WorkerPool, WorkerPoolEvent};

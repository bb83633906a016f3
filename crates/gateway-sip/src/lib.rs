//! Per-agent SIP-over-WebSocket user agent, session registry, and dialog
//! state machine bridging the gateway to the carrier-side SIP peer.

pub mod config;
pub mod dtmf;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ids;
pub mod phone;
pub mod session;
pub mod transport;

pub use config::{SipAgentConfig, SipGatewayConfig};
pub use dtmf::Tone;
pub use error::{SipError, SipResult};
pub use events::{RegistrationState, SipEvent};
pub use gateway::{SipGateway, TransferKind, ESTABLISHING_TIMEOUT, RING_TIMEOUT};
pub use ids::{AgentId, SipSessionId, TenantId};
pub use phone::normalize;
pub use session::{Direction, SipSession, SipSessionState};
pub use transport::{LinkState, LoopbackSipTransport, SipTransport, SipWireMessage};

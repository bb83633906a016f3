//! Peer lifecycle, call session state machine, and the peer manager that
//! binds signaling connections to the media and SIP layers.

pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod peer;
pub mod peer_manager;
pub mod shutdown;

pub use call::{CallId, CallRegistry, CallSession, CallState};
pub use config::{GatewayConfig, RedisConfig};
pub use error::{GatewayError, GatewayResult};
pub use events::GatewayEvent;
pub use peer::{Peer, PeerEvent, PeerRegistry};
pub use peer_manager::{PeerManager, TransferType};
pub use shutdown::{graceful_shutdown, ShutdownGuard, SHUTDOWN_DEADLINE};

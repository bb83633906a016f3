//! Signaling protocol types and the WebSocket connection handler that
//! authenticates agent clients and dispatches their RPCs.

pub mod auth;
pub mod error;
pub mod ids;
pub mod protocol;
pub mod server;

pub use auth::{AllowAllVerifier, IdentityVerifier};
pub use error::SignalingError;
pub use ids::ConnectionId;
pub use protocol::{AuthPayload, ClientRequest, RpcError, RpcOutcome, ServerMessage};
pub use server::{serve_connection, RpcHandler, IDLE_TIMEOUT, PING_INTERVAL};

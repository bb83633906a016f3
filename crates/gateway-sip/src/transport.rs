//! Abstraction over the SIP-over-WebSocket link to the (opaque) SIP peer.
//!
//! The peer, a PBX or media server, is an external collaborator this
//! crate does not reimplement. [`SipTransport`] is the seam: a real
//! implementation would open a `tokio-tungstenite` WebSocket to
//! `SIP_WS_URL` and frame SIP messages over text frames, reconnecting
//! with bounded backoff. [`LoopbackSipTransport`] is the deterministic
//! stand-in used here and in tests.

use async_trait::async_trait;
use std::fmt;

#[derive(Debug, Clone)]
pub enum SipWireMessage {
    Register { agent: String, expires: u32 },
    Invite { call_id: String, to: String, from: String },
    Cancel { call_id: String },
    Reject { call_id: String, status: u16 },
    Ok200 { call_id: String },
    Bye { call_id: String },
    ReInvite { call_id: String, direction: &'static str },
    Info { call_id: String, body: String },
    Refer { call_id: String, target: String },
}

/// Whether the transport can currently accept new requests. `make_call`
/// fails `transport-unavailable` when this is `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Reconnecting,
    Disconnected,
}

#[async_trait]
pub trait SipTransport: Send + Sync {
    async fn send(&self, message: SipWireMessage) -> Result<(), String>;
    fn link_state(&self) -> LinkState;
}

impl fmt::Debug for dyn SipTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SipTransport(link_state={:?})", self.link_state())
    }
}

/// Records sent messages instead of putting anything on the wire. Treats
/// the peer as always reachable and always accepting; dialog progress is
/// driven explicitly via [`crate::gateway::SipGateway`]'s simulation
/// hooks, not by this transport guessing at peer behavior.
#[derive(Default)]
pub struct LoopbackSipTransport {
    sent: parking_lot::Mutex<Vec<SipWireMessage>>,
}

impl LoopbackSipTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_messages(&self) -> Vec<SipWireMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl SipTransport for LoopbackSipTransport {
    async fn send(&self, message: SipWireMessage) -> Result<(), String> {
        self.sent.lock().push(message);
        Ok(())
    }

    fn link_state(&self) -> LinkState {
        LinkState::Connected
    }
}

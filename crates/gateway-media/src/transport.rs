//! Transport: a DTLS+ICE endpoint owned by exactly one peer.

use crate::ids::{PeerId, RouterId, TenantId, TransportId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportDirection {
    Send,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsState {
    New,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl DtlsState {
    /// A transport in either of these states is unconditionally closed
    /// and removed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DtlsState::Closed | DtlsState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    pub foundation: String,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub priority: u32,
    pub r#type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtlsParameters {
    pub role: String,
    pub fingerprints: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Transport {
    pub id: TransportId,
    pub router_id: RouterId,
    pub tenant: TenantId,
    pub peer_id: PeerId,
    pub direction: TransportDirection,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
    pub dtls_state: DtlsState,
}

fn random_hex(bytes: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

impl Transport {
    pub fn new(
        router_id: RouterId,
        tenant: TenantId,
        peer_id: PeerId,
        direction: TransportDirection,
    ) -> Self {
        Self {
            id: TransportId::new(),
            router_id,
            tenant,
            peer_id,
            direction,
            ice_parameters: IceParameters {
                username_fragment: random_hex(4),
                password: random_hex(16),
                ice_lite: true,
            },
            ice_candidates: vec![IceCandidate {
                foundation: "udpcandidate".into(),
                ip: "0.0.0.0".into(),
                port: 0,
                protocol: "udp".into(),
                priority: 1_076_558_079,
                r#type: "host".into(),
            }],
            dtls_parameters: DtlsParameters {
                role: "auto".into(),
                fingerprints: vec![("sha-256".into(), random_hex(32))],
            },
            dtls_state: DtlsState::New,
        }
    }
}

//! Peer: the gateway's view of one authenticated agent client.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_media::{ConsumerId, PeerId, ProducerId, TransportId};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub agent: String,
    pub tenant: String,
    pub send_transport: Option<TransportId>,
    pub recv_transport: Option<TransportId>,
    pub producer: Option<ProducerId>,
    pub consumer: Option<ConsumerId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Peer {
    fn new(agent: String, tenant: String) -> Self {
        let now = Utc::now();
        Self {
            id: PeerId::new(),
            agent,
            tenant,
            send_transport: None,
            recv_transport: None,
            producer: None,
            consumer: None,
            created_at: now,
            last_activity_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A second connection for the same agent superseded an earlier one;
    /// the old peer must be torn down in full.
    Superseded { old_peer_id: PeerId },
}

/// Enforces `(agent identity) -> peer` as a partial function: a second
/// successful connection for the same agent supersedes the first.
pub struct PeerRegistry {
    peers: DashMap<PeerId, Peer>,
    by_agent: DashMap<String, PeerId>,
    events_tx: broadcast::Sender<PeerEvent>,
}

impl PeerRegistry {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            peers: DashMap::new(),
            by_agent: DashMap::new(),
            events_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events_tx.subscribe()
    }

    /// Creates a peer for `agent`, superseding and returning the
    /// previously-bound peer id for that agent, if any.
    pub fn connect(&self, agent: String, tenant: String) -> (Peer, Option<PeerId>) {
        let peer = Peer::new(agent.clone(), tenant);
        let superseded = self.by_agent.insert(agent, peer.id);
        if let Some(old_peer_id) = superseded {
            self.peers.remove(&old_peer_id);
            let _ = self
                .events_tx
                .send(PeerEvent::Superseded { old_peer_id });
        }
        self.peers.insert(peer.id, peer.clone());
        (peer, superseded)
    }

    pub fn disconnect(&self, peer_id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&peer_id).map(|(_, p)| p)?;
        self.by_agent.remove_if(&peer.agent, |_, id| *id == peer_id);
        Some(peer)
    }

    pub fn get(&self, peer_id: PeerId) -> Option<Peer> {
        self.peers.get(&peer_id).map(|p| p.clone())
    }

    pub fn peer_for_agent(&self, agent: &str) -> Option<Peer> {
        let peer_id = *self.by_agent.get(agent)?;
        self.peers.get(&peer_id).map(|p| p.clone())
    }

    pub fn touch(&self, peer_id: PeerId) {
        if let Some(mut peer) = self.peers.get_mut(&peer_id) {
            peer.last_activity_at = Utc::now();
        }
    }

    pub fn set_send_transport(&self, peer_id: PeerId, transport_id: TransportId) {
        if let Some(mut peer) = self.peers.get_mut(&peer_id) {
            peer.send_transport = Some(transport_id);
        }
    }

    pub fn set_recv_transport(&self, peer_id: PeerId, transport_id: TransportId) {
        if let Some(mut peer) = self.peers.get_mut(&peer_id) {
            peer.recv_transport = Some(transport_id);
        }
    }

    pub fn set_producer(&self, peer_id: PeerId, producer_id: ProducerId) {
        if let Some(mut peer) = self.peers.get_mut(&peer_id) {
            peer.producer = Some(producer_id);
        }
    }

    pub fn set_consumer(&self, peer_id: PeerId, consumer_id: ConsumerId) {
        if let Some(mut peer) = self.peers.get_mut(&peer_id) {
            peer.consumer = Some(consumer_id);
        }
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_connect_for_same_agent_supersedes_first() {
        let registry = PeerRegistry::new();
        let (first, superseded) = registry.connect("agent-1".into(), "tenant-1".into());
        assert!(superseded.is_none());
        let (second, superseded) = registry.connect("agent-1".into(), "tenant-1".into());
        assert_eq!(superseded, Some(first.id));
        assert!(registry.get(first.id).is_none());
        assert_eq!(registry.peer_for_agent("agent-1").unwrap().id, second.id);
    }

    #[test]
    fn distinct_agents_get_distinct_peers() {
        let registry = PeerRegistry::new();
        let (a, _) = registry.connect("agent-1".into(), "tenant-1".into());
        let (b, _) = registry.connect("agent-2".into(), "tenant-1".into());
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn disconnect_clears_agent_index() {
        let registry = PeerRegistry::new();
        let (peer, _) = registry.connect("agent-1".into(), "tenant-1".into());
        registry.disconnect(peer.id);
        assert!(registry.peer_for_agent("agent-1").is_none());
    }
}

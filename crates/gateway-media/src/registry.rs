//! Flat, process-wide transport/producer/consumer maps plus the operations
//! the Peer Manager drives them with.
//!
//! Cascade rule: closing a transport removes every producer and consumer
//! that references it; closing a producer removes every consumer that
//! references it. Both the explicit `close_transport` path and the DTLS
//! state watcher funnel into the same cleanup routine.

use crate::consumer::Consumer;
use crate::error::{MediaError, MediaResult};
use crate::ids::{ConsumerId, PeerId, ProducerId, TenantId, TransportId};
use crate::producer::Producer;
use crate::router::RouterRegistry;
use crate::rtp::{MediaKind, RtpClientCapabilities, RtpParameters};
use crate::transport::{DtlsParameters, DtlsState, IceCandidate, IceParameters, Transport, TransportDirection};
use crate::worker::{WorkerPool, WorkerPoolEvent};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CreatedTransport {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

pub struct CreatedConsumer {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Event surfaced when cascade cleanup removes resources the owner didn't
/// explicitly ask to close (DTLS failure, upstream worker loss).
#[derive(Debug, Clone)]
pub enum MediaRegistryEvent {
    /// All transports (and therefore producers/consumers) owned by these
    /// peers were torn down because their router's worker died.
    PeersLostMediaWorker { peer_ids: Vec<PeerId> },
}

pub struct MediaRegistry {
    routers: Arc<RouterRegistry>,
    worker_pool: Arc<WorkerPool>,
    transports: DashMap<TransportId, Transport>,
    producers: DashMap<ProducerId, Producer>,
    consumers: DashMap<ConsumerId, Consumer>,
    events_tx: tokio::sync::broadcast::Sender<MediaRegistryEvent>,
}

impl MediaRegistry {
    pub fn new(routers: Arc<RouterRegistry>, worker_pool: Arc<WorkerPool>) -> Arc<Self> {
        let (events_tx, _) = tokio::sync::broadcast::channel(256);
        let registry = Arc::new(Self {
            routers,
            worker_pool,
            transports: DashMap::new(),
            producers: DashMap::new(),
            consumers: DashMap::new(),
            events_tx,
        });
        registry.clone().spawn_worker_watcher();
        registry
    }

    fn spawn_worker_watcher(self: Arc<Self>) {
        let mut worker_events = self.worker_pool.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = worker_events.recv().await {
                if let WorkerPoolEvent::WorkerLost { old_worker_id, .. } = event {
                    self.handle_worker_lost(old_worker_id).await;
                }
            }
        });
    }

    async fn handle_worker_lost(&self, worker_id: crate::ids::WorkerId) {
        let tenants = self.routers.tenants_on_worker(worker_id);
        if tenants.is_empty() {
            return;
        }
        let mut affected_peers = Vec::new();
        let dead_transports: Vec<TransportId> = self
            .transports
            .iter()
            .filter(|entry| tenants.contains(&entry.value().tenant))
            .map(|entry| *entry.key())
            .collect();
        for transport_id in dead_transports {
            if let Some(transport) = self.transports.get(&transport_id) {
                affected_peers.push(transport.peer_id);
            }
            self.close_transport(transport_id);
        }
        for tenant in &tenants {
            self.routers.recreate(tenant).await;
        }
        affected_peers.sort_by_key(|p| p.to_string());
        affected_peers.dedup_by_key(|p| p.to_string());
        if !affected_peers.is_empty() {
            warn!(count = affected_peers.len(), "peers lost media worker");
            let _ = self.events_tx.send(MediaRegistryEvent::PeersLostMediaWorker {
                peer_ids: affected_peers,
            });
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MediaRegistryEvent> {
        self.events_tx.subscribe()
    }

    pub async fn create_transport(
        &self,
        tenant: &str,
        peer_id: PeerId,
        direction: TransportDirection,
    ) -> MediaResult<CreatedTransport> {
        let router = self.routers.get_or_create(tenant).await;
        let transport = Transport::new(router.id, tenant.to_string(), peer_id, direction);
        let created = CreatedTransport {
            id: transport.id,
            ice_parameters: transport.ice_parameters.clone(),
            ice_candidates: transport.ice_candidates.clone(),
            dtls_parameters: transport.dtls_parameters.clone(),
        };
        self.transports.insert(transport.id, transport);
        Ok(created)
    }

    pub fn connect_transport(
        &self,
        transport_id: TransportId,
        _client_dtls_parameters: DtlsParameters,
    ) -> MediaResult<()> {
        let mut transport = self
            .transports
            .get_mut(&transport_id)
            .ok_or(MediaError::TransportNotFound(transport_id))?;
        if transport.dtls_state != DtlsState::New {
            return Err(MediaError::AlreadyConnected(transport_id));
        }
        transport.dtls_state = DtlsState::Connected;
        Ok(())
    }

    pub fn produce(
        &self,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> MediaResult<ProducerId> {
        if !self.transports.contains_key(&transport_id) {
            return Err(MediaError::TransportNotFound(transport_id));
        }
        let producer = Producer {
            id: ProducerId::new(),
            transport_id,
            kind,
            rtp_parameters,
        };
        let id = producer.id;
        self.producers.insert(id, producer);
        Ok(id)
    }

    pub fn consume(
        &self,
        transport_id: TransportId,
        producer_id: ProducerId,
        client_rtp_capabilities: &RtpClientCapabilities,
    ) -> MediaResult<CreatedConsumer> {
        if !self.transports.contains_key(&transport_id) {
            return Err(MediaError::TransportNotFound(transport_id));
        }
        let producer = self
            .producers
            .get(&producer_id)
            .ok_or(MediaError::ProducerNotFound(producer_id))?;
        if !client_rtp_capabilities.is_compatible_with(&producer.rtp_parameters) {
            return Err(MediaError::IncompatibleCapabilities(producer_id));
        }
        let consumer = Consumer {
            id: ConsumerId::new(),
            transport_id,
            producer_id,
            kind: producer.kind,
            rtp_parameters: producer.rtp_parameters.clone(),
            paused: true,
        };
        let created = CreatedConsumer {
            id: consumer.id,
            producer_id,
            kind: consumer.kind,
            rtp_parameters: consumer.rtp_parameters.clone(),
        };
        self.consumers.insert(consumer.id, consumer);
        Ok(created)
    }

    pub fn resume_consumer(&self, consumer_id: ConsumerId) -> MediaResult<()> {
        let mut consumer = self
            .consumers
            .get_mut(&consumer_id)
            .ok_or(MediaError::ConsumerNotFound(consumer_id))?;
        consumer.paused = false;
        Ok(())
    }

    pub fn pause_consumer(&self, consumer_id: ConsumerId) -> MediaResult<()> {
        let mut consumer = self
            .consumers
            .get_mut(&consumer_id)
            .ok_or(MediaError::ConsumerNotFound(consumer_id))?;
        consumer.paused = true;
        Ok(())
    }

    /// DTLS state transition entry point. Auto-closes the transport on
    /// `{closed, failed}`.
    pub fn set_dtls_state(&self, transport_id: TransportId, state: DtlsState) {
        let should_close = {
            if let Some(mut transport) = self.transports.get_mut(&transport_id) {
                transport.dtls_state = state;
                state.is_terminal()
            } else {
                false
            }
        };
        if should_close {
            self.close_transport(transport_id);
        }
    }

    /// Idempotent cascade close: removes all dependent producers/consumers
    /// first, then the transport itself.
    pub fn close_transport(&self, transport_id: TransportId) {
        let producer_ids: Vec<ProducerId> = self
            .producers
            .iter()
            .filter(|entry| entry.value().transport_id == transport_id)
            .map(|entry| *entry.key())
            .collect();
        for producer_id in &producer_ids {
            self.close_producer(*producer_id);
        }
        let consumer_ids: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|entry| entry.value().transport_id == transport_id)
            .map(|entry| *entry.key())
            .collect();
        for consumer_id in consumer_ids {
            self.consumers.remove(&consumer_id);
        }
        if self.transports.remove(&transport_id).is_some() {
            info!(transport_id = %transport_id, "transport closed");
        }
    }

    /// Cascades `producer close -> consumer close`.
    pub fn close_producer(&self, producer_id: ProducerId) {
        let consumer_ids: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|entry| entry.value().producer_id == producer_id)
            .map(|entry| *entry.key())
            .collect();
        for consumer_id in consumer_ids {
            self.consumers.remove(&consumer_id);
        }
        self.producers.remove(&producer_id);
    }

    pub fn transport_peer(&self, transport_id: TransportId) -> Option<PeerId> {
        self.transports.get(&transport_id).map(|t| t.peer_id)
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn tenant_capabilities(&self, tenant: &str) -> Option<crate::rtp::RtpCapabilities> {
        self.routers.get(tenant).map(|r| r.capabilities)
    }

    pub async fn get_or_create_router_capabilities(
        &self,
        tenant: &str,
    ) -> crate::rtp::RtpCapabilities {
        self.routers.get_or_create(tenant).await.capabilities
    }

    /// Closes every transport owned by `peer_id`. Used by the Peer Manager
    /// when a peer is torn down (disconnect, supersession, admin action).
    pub fn close_peer_transports(&self, peer_id: PeerId) {
        let transport_ids: Vec<TransportId> = self
            .transports
            .iter()
            .filter(|entry| entry.value().peer_id == peer_id)
            .map(|entry| *entry.key())
            .collect();
        for transport_id in transport_ids {
            self.close_transport(transport_id);
        }
    }

    pub fn tenant_for(&self, transport_id: TransportId) -> Option<TenantId> {
        self.transports.get(&transport_id).map(|t| t.tenant.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;

    async fn registry() -> Arc<MediaRegistry> {
        let pool = WorkerPool::start(MediaConfig::default()).unwrap();
        let routers = Arc::new(RouterRegistry::new(MediaConfig::default(), pool.clone()));
        MediaRegistry::new(routers, pool)
    }

    fn params(mime: &str) -> RtpParameters {
        RtpParameters {
            mime_type: mime.to_string(),
            payload_type: 111,
            clock_rate: 48_000,
            extra: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn consumer_starts_paused() {
        let reg = registry().await;
        let peer = PeerId::new();
        let transport = reg
            .create_transport("tenant-a", peer, TransportDirection::Send)
            .await
            .unwrap();
        let producer_id = reg
            .produce(transport.id, MediaKind::Audio, params("audio/opus"))
            .unwrap();
        let caps = RtpClientCapabilities {
            codecs: vec!["audio/opus".into()],
        };
        let consumer = reg.consume(transport.id, producer_id, &caps).unwrap();
        assert!(reg.consumers.get(&consumer.id).unwrap().paused);
        reg.resume_consumer(consumer.id).unwrap();
        assert!(!reg.consumers.get(&consumer.id).unwrap().paused);
    }

    #[tokio::test]
    async fn incompatible_capabilities_rejected() {
        let reg = registry().await;
        let peer = PeerId::new();
        let transport = reg
            .create_transport("tenant-a", peer, TransportDirection::Send)
            .await
            .unwrap();
        let producer_id = reg
            .produce(transport.id, MediaKind::Audio, params("audio/opus"))
            .unwrap();
        let caps = RtpClientCapabilities {
            codecs: vec!["video/VP8".into()],
        };
        assert!(matches!(
            reg.consume(transport.id, producer_id, &caps),
            Err(MediaError::IncompatibleCapabilities(_))
        ));
    }

    #[tokio::test]
    async fn closing_transport_cascades() {
        let reg = registry().await;
        let peer = PeerId::new();
        let transport = reg
            .create_transport("tenant-a", peer, TransportDirection::Send)
            .await
            .unwrap();
        let producer_id = reg
            .produce(transport.id, MediaKind::Audio, params("audio/opus"))
            .unwrap();
        let caps = RtpClientCapabilities {
            codecs: vec!["audio/opus".into()],
        };
        let consumer = reg.consume(transport.id, producer_id, &caps).unwrap();

        reg.close_transport(transport.id);

        assert_eq!(reg.transport_count(), 0);
        assert!(reg.producers.get(&producer_id).is_none());
        assert!(reg.consumers.get(&consumer.id).is_none());
    }

    #[tokio::test]
    async fn dtls_failed_auto_closes_transport() {
        let reg = registry().await;
        let peer = PeerId::new();
        let transport = reg
            .create_transport("tenant-a", peer, TransportDirection::Send)
            .await
            .unwrap();
        reg.set_dtls_state(transport.id, DtlsState::Failed);
        assert_eq!(reg.transport_count(), 0);
    }

    #[tokio::test]
    async fn connect_twice_fails() {
        let reg = registry().await;
        let peer = PeerId::new();
        let transport = reg
            .create_transport("tenant-a", peer, TransportDirection::Send)
            .await
            .unwrap();
        let dtls = DtlsParameters {
            role: "client".into(),
            fingerprints: vec![],
        };
        reg.connect_transport(transport.id, dtls.clone()).unwrap();
        assert!(matches!(
            reg.connect_transport(transport.id, dtls),
            Err(MediaError::AlreadyConnected(_))
        ));
    }
}

//! Router registry: one router per tenant, lazily created on first use.

use crate::config::{Codec, MediaConfig};
use crate::ids::{RouterId, TenantId, WorkerId};
use crate::rtp::{MediaKind, RtpCapabilities, RtpCodecCapability};
use crate::worker::WorkerPool;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Router {
    pub id: RouterId,
    pub tenant: TenantId,
    pub worker_id: WorkerId,
    pub capabilities: RtpCapabilities,
}

fn capabilities_for(config: &MediaConfig) -> RtpCapabilities {
    let mut codecs = Vec::new();
    let mut payload_type = 96u8;
    for codec in &config.codecs {
        let (kind, clock_rate, channels) = match codec {
            Codec::Opus => (MediaKind::Audio, 48_000, Some(2)),
            Codec::Pcmu => (MediaKind::Audio, 8_000, Some(1)),
            Codec::Pcma => (MediaKind::Audio, 8_000, Some(1)),
            Codec::Vp8 => (MediaKind::Video, 90_000, None),
            Codec::H264 => (MediaKind::Video, 90_000, None),
        };
        let pt = match codec {
            Codec::Pcmu => 0,
            Codec::Pcma => 8,
            _ => {
                payload_type += 1;
                payload_type - 1
            }
        };
        codecs.push(RtpCodecCapability {
            mime_type: codec.mime_type().to_string(),
            kind,
            clock_rate,
            channels,
            payload_type: pt,
        });
    }
    RtpCapabilities { codecs }
}

/// Keyed by tenant. Once created a router is cached for the life of the
/// process; it is only ever replaced if its worker dies.
pub struct RouterRegistry {
    config: MediaConfig,
    worker_pool: Arc<WorkerPool>,
    routers: DashMap<TenantId, Router>,
}

impl RouterRegistry {
    pub fn new(config: MediaConfig, worker_pool: Arc<WorkerPool>) -> Self {
        Self {
            config,
            worker_pool,
            routers: DashMap::new(),
        }
    }

    /// Returns the tenant's router, creating it on a freshly chosen worker
    /// if this is the first access.
    pub async fn get_or_create(&self, tenant: &str) -> Router {
        if let Some(existing) = self.routers.get(tenant) {
            return existing.clone();
        }
        let worker = self.worker_pool.next_worker().await;
        let router = Router {
            id: RouterId::new(),
            tenant: tenant.to_string(),
            worker_id: worker.id,
            capabilities: capabilities_for(&self.config),
        };
        info!(tenant, router_id = %router.id, worker_id = %worker.id, "router created");
        self.routers.insert(tenant.to_string(), router.clone());
        router
    }

    pub fn get(&self, tenant: &str) -> Option<Router> {
        self.routers.get(tenant).map(|r| r.clone())
    }

    /// Replaces the cached router for `tenant` with a freshly placed one.
    /// Called after the tenant's worker dies; pre-existing transports
    /// under the old router are considered lost.
    pub async fn recreate(&self, tenant: &str) -> Router {
        self.routers.remove(tenant);
        self.get_or_create(tenant).await
    }

    /// Tenants whose router currently lives on `worker_id`.
    pub fn tenants_on_worker(&self, worker_id: WorkerId) -> Vec<TenantId> {
        self.routers
            .iter()
            .filter(|entry| entry.value().worker_id == worker_id)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_tenant_reuses_router() {
        let pool = WorkerPool::start(MediaConfig::default()).unwrap();
        let registry = RouterRegistry::new(MediaConfig::default(), pool);
        let a = registry.get_or_create("tenant-a").await;
        let b = registry.get_or_create("tenant-a").await;
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn different_tenants_get_different_routers() {
        let pool = WorkerPool::start(MediaConfig::default()).unwrap();
        let registry = RouterRegistry::new(MediaConfig::default(), pool);
        let a = registry.get_or_create("tenant-a").await;
        let b = registry.get_or_create("tenant-b").await;
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn capabilities_include_mandatory_codecs() {
        let pool = WorkerPool::start(MediaConfig::default()).unwrap();
        let registry = RouterRegistry::new(MediaConfig::default(), pool);
        let router = registry.get_or_create("tenant-a").await;
        assert!(router.capabilities.supports("audio/opus"));
        assert!(router.capabilities.supports("audio/PCMU"));
        assert!(router.capabilities.supports("audio/PCMA"));
    }
}

//! The media worker pool: owns N worker slots, load-balances router
//! creation round-robin across them, and supervises restarts on death.
//!
//! A real deployment forks one `mediasoup-worker` OS process per slot and
//! talks to it over a request/response IPC channel; that process is an
//! external collaborator this crate does not reimplement. The
//! request/response shape is preserved here so a subprocess-backed
//! `Worker` can be dropped in later without touching the pool's public
//! API.

use crate::config::MediaConfig;
use crate::error::MediaResult;
use crate::ids::WorkerId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// Backoff before a dead worker's slot is respawned.
pub const WORKER_RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// A single media worker slot. The worker's identity changes across
/// restarts; the slot index is stable for the pool's lifetime.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: WorkerId,
    pub slot: usize,
}

/// Broadcast to interested subsystems (the router registry, the peer
/// manager) when a worker dies and is replaced.
#[derive(Debug, Clone)]
pub enum WorkerPoolEvent {
    WorkerLost { old_worker_id: WorkerId, slot: usize },
    WorkerRestarted { worker: Worker },
}

struct Slot {
    worker: Mutex<Worker>,
}

pub struct WorkerPool {
    config: MediaConfig,
    slots: Vec<Slot>,
    next: AtomicUsize,
    death_tx: tokio::sync::mpsc::UnboundedSender<usize>,
    events_tx: broadcast::Sender<WorkerPoolEvent>,
}

impl WorkerPool {
    /// Validates the configuration and spawns `worker_count` workers. The
    /// port-range and codec checks (`port-range-invalid`,
    /// `codec-unsupported`) are fatal at startup.
    pub fn start(config: MediaConfig) -> MediaResult<Arc<Self>> {
        config.validate()?;

        let slots = (0..config.worker_count)
            .map(|slot| Slot {
                worker: Mutex::new(Worker {
                    id: WorkerId::new(),
                    slot,
                }),
            })
            .collect();

        let (death_tx, mut death_rx) = tokio::sync::mpsc::unbounded_channel::<usize>();
        let (events_tx, _) = broadcast::channel(256);

        let pool = Arc::new(Self {
            config,
            slots,
            next: AtomicUsize::new(0),
            death_tx,
            events_tx,
        });

        let supervisor_pool = pool.clone();
        tokio::spawn(async move {
            while let Some(slot) = death_rx.recv().await {
                let pool = supervisor_pool.clone();
                // Unbounded restarts must never block the scheduler or the
                // dispatch loop above it, so each restart runs detached.
                tokio::spawn(async move {
                    pool.restart_slot(slot).await;
                });
            }
        });

        info!(workers = pool.slots.len(), "media worker pool started");
        Ok(pool)
    }

    async fn restart_slot(&self, slot: usize) {
        tokio::time::sleep(WORKER_RESTART_BACKOFF).await;
        let mut guard = self.slots[slot].worker.lock().await;
        let new_worker = Worker {
            id: WorkerId::new(),
            slot,
        };
        *guard = new_worker.clone();
        drop(guard);
        info!(slot, worker_id = %new_worker.id, "media worker restarted");
        let _ = self
            .events_tx
            .send(WorkerPoolEvent::WorkerRestarted { worker: new_worker });
    }

    /// Round-robin worker selection for router placement.
    pub async fn next_worker(&self) -> Worker {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[idx].worker.lock().await.clone()
    }

    /// Report that `worker_id` has died. Triggers replacement after
    /// `WORKER_RESTART_BACKOFF`. Safe to call more than once for the same
    /// death; a stale report for an already-replaced worker is ignored.
    pub async fn report_death(&self, worker_id: WorkerId) {
        for slot in &self.slots {
            let guard = slot.worker.lock().await;
            if guard.id == worker_id {
                let slot_idx = guard.slot;
                drop(guard);
                warn!(worker_id = %worker_id, slot = slot_idx, "media worker died");
                let _ = self.events_tx.send(WorkerPoolEvent::WorkerLost {
                    old_worker_id: worker_id,
                    slot: slot_idx,
                });
                let _ = self.death_tx.send(slot_idx);
                return;
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerPoolEvent> {
        self.events_tx.subscribe()
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    #[cfg(any(test, feature = "test-util"))]
    pub async fn worker_at(&self, slot: usize) -> Worker {
        self.slots[slot].worker.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_port_range_is_fatal() {
        let cfg = MediaConfig {
            rtc_min_port: 1000,
            rtc_max_port: 1010,
            ..Default::default()
        };
        assert!(WorkerPool::start(cfg).is_err());
    }

    #[tokio::test]
    async fn next_worker_round_robins() {
        let pool = WorkerPool::start(MediaConfig {
            worker_count: 3,
            ..Default::default()
        })
        .unwrap();
        let a = pool.next_worker().await;
        let b = pool.next_worker().await;
        let c = pool.next_worker().await;
        let d = pool.next_worker().await;
        assert_eq!(a.slot, 0);
        assert_eq!(b.slot, 1);
        assert_eq!(c.slot, 2);
        assert_eq!(d.slot, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_worker_is_replaced_after_backoff() {
        let pool = WorkerPool::start(MediaConfig {
            worker_count: 1,
            ..Default::default()
        })
        .unwrap();
        let mut events = pool.subscribe();
        let original = pool.next_worker().await;

        pool.report_death(original.id).await;
        match events.recv().await.unwrap() {
            WorkerPoolEvent::WorkerLost { old_worker_id, slot } => {
                assert_eq!(old_worker_id, original.id);
                assert_eq!(slot, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        tokio::time::advance(WORKER_RESTART_BACKOFF + Duration::from_millis(10)).await;
        match events.recv().await.unwrap() {
            WorkerPoolEvent::WorkerRestarted { worker } => {
                assert_eq!(worker.slot, 0);
                assert_ne!(worker.id, original.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

//! Graceful shutdown coordinator: hangs up every active call, then waits
//! for the call registry to drain or a fixed deadline, whichever comes
//! first.

use crate::call::CallRegistry;
use crate::peer_manager::PeerManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Default)]
pub struct ShutdownGuard {
    draining: AtomicBool,
}

impl ShutdownGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn begin_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}

/// Hangs up every active call with reason `"shutdown"`, then waits for the
/// call registry to empty or the deadline to elapse. Returns `true` if the
/// registry drained cleanly.
pub async fn graceful_shutdown(manager: &Arc<PeerManager>, calls: &Arc<CallRegistry>) -> bool {
    info!("graceful shutdown: hanging up active calls");
    for call in calls.all() {
        if call.state.is_terminal() {
            continue;
        }
        manager.shutdown_call(call.id).await;
    }

    let deadline = tokio::time::Instant::now() + SHUTDOWN_DEADLINE;
    while tokio::time::Instant::now() < deadline {
        if calls.is_empty() {
            info!("graceful shutdown: all calls drained");
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    warn!(
        remaining = calls.len(),
        "graceful shutdown deadline elapsed with calls still active"
    );
    false
}

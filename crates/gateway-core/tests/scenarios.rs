//! End-to-end scenarios exercising the full peer/media/SIP stack together:
//! outbound happy path, inbound accept, hold/unhold, busy rejection,
//! worker death recovery, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use gateway_core::{graceful_shutdown, GatewayError, GatewayEvent, PeerManager};
use gateway_media::{MediaConfig, MediaRegistry, RouterRegistry, TransportDirection, WorkerPool};
use gateway_sip::{LoopbackSipTransport, SipAgentConfig, SipGateway, SipGatewayConfig};
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;

async fn harness() -> (Arc<PeerManager>, Arc<SipGateway>, Arc<WorkerPool>, Arc<RouterRegistry>) {
    let pool = WorkerPool::start(MediaConfig::default()).unwrap();
    let routers = Arc::new(RouterRegistry::new(MediaConfig::default(), pool.clone()));
    let media = MediaRegistry::new(routers.clone(), pool.clone());
    let sip = SipGateway::new(SipGatewayConfig::default(), Arc::new(LoopbackSipTransport::new()));
    let manager = PeerManager::new(media, sip.clone());
    (manager, sip, pool, routers)
}

async fn register(sip: &Arc<SipGateway>, agent: &str, tenant: &str) {
    sip.register_agent(
        agent.to_string(),
        tenant.to_string(),
        SipAgentConfig {
            display_name: agent.to_string(),
            contact_uri: format!("sip:{agent}@gw"),
        },
    )
    .await
    .unwrap();
}

/// Drains events until `matcher` accepts one, or panics after 2s. Events
/// not matched are discarded, mirroring a client that only cares about
/// certain event types.
async fn wait_for(events: &mut Receiver<GatewayEvent>, matcher: impl Fn(&GatewayEvent) -> bool) -> GatewayEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if matcher(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for expected event")
}

#[tokio::test]
async fn outbound_happy_path() {
    let (manager, sip, _pool, _routers) = harness().await;
    let peer = manager.connect_peer("agent-1".into(), "tenant-1".into());
    register(&sip, "agent-1", "tenant-1").await;

    let mut events = manager.subscribe();
    let call_id = manager.dial(peer.id, "+15551234567", None, None).await.unwrap();
    let sip_session_id = manager.calls().get(call_id).unwrap().sip_session_id.unwrap();

    sip.simulate_ringing(sip_session_id);
    wait_for(&mut events, |e| matches!(e, GatewayEvent::CallRinging { call_id: c } if *c == call_id)).await;
    assert_eq!(manager.calls().get(call_id).unwrap().state, gateway_core::CallState::Ringing);

    sip.simulate_remote_answer(sip_session_id).await.unwrap();
    wait_for(&mut events, |e| matches!(e, GatewayEvent::CallAnswered { call_id: c, .. } if *c == call_id)).await;
    assert_eq!(manager.calls().get(call_id).unwrap().state, gateway_core::CallState::Answered);

    manager.hangup(peer.id, call_id).await.unwrap();
    let ended = wait_for(&mut events, |e| matches!(e, GatewayEvent::CallEnded { call_id: c, .. } if *c == call_id)).await;
    match ended {
        GatewayEvent::CallEnded { reason, duration, .. } => {
            assert_eq!(reason, "hangup");
            assert!(duration >= 0);
        }
        _ => unreachable!(),
    }
    assert!(manager.calls().get(call_id).is_none());
}

#[tokio::test]
async fn inbound_invite_attaches_to_registered_peer() {
    let (manager, sip, _pool, _routers) = harness().await;
    let peer = manager.connect_peer("agent-2".into(), "tenant-1".into());
    register(&sip, "agent-2", "tenant-1").await;

    let mut events = manager.subscribe();
    sip.receive_invite("agent-2".into(), "tenant-1".into(), "+15557654321".into());

    let incoming = wait_for(&mut events, |e| matches!(e, GatewayEvent::CallIncoming { .. })).await;
    let call_id = match incoming {
        GatewayEvent::CallIncoming { call_id, phone_number, .. } => {
            assert_eq!(phone_number, "+15557654321");
            call_id
        }
        _ => unreachable!(),
    };
    let call = manager.calls().get(call_id).unwrap();
    assert_eq!(call.peer_id, peer.id);
    assert_eq!(call.direction, gateway_sip::Direction::Inbound);
}

#[tokio::test]
async fn inbound_invite_with_no_peer_is_rejected_without_a_call() {
    let (manager, sip, _pool, _routers) = harness().await;
    register(&sip, "agent-ghost", "tenant-1").await;

    let session_id = sip.receive_invite("agent-ghost".into(), "tenant-1".into(), "+15559990000".into());
    // no connect_peer for agent-ghost, so the inbound watcher should reject
    // rather than create a call.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(manager.calls().all().is_empty());
    assert!(sip.session(session_id).is_none() || sip.session(session_id).unwrap().ended_at.is_some());
}

#[tokio::test]
async fn hold_then_unhold_round_trips() {
    let (manager, sip, _pool, _routers) = harness().await;
    let peer = manager.connect_peer("agent-3".into(), "tenant-1".into());
    register(&sip, "agent-3", "tenant-1").await;

    let mut events = manager.subscribe();
    let call_id = manager.dial(peer.id, "+15551230000", None, None).await.unwrap();
    let sip_session_id = manager.calls().get(call_id).unwrap().sip_session_id.unwrap();
    sip.simulate_remote_answer(sip_session_id).await.unwrap();
    wait_for(&mut events, |e| matches!(e, GatewayEvent::CallAnswered { .. })).await;

    manager.hold(peer.id, call_id).await.unwrap();
    wait_for(&mut events, |e| matches!(e, GatewayEvent::CallHeld { is_on_hold: true, .. })).await;
    assert_eq!(manager.calls().get(call_id).unwrap().state, gateway_core::CallState::OnHold);

    manager.unhold(peer.id, call_id).await.unwrap();
    wait_for(&mut events, |e| matches!(e, GatewayEvent::CallHeld { is_on_hold: false, .. })).await;
    assert_eq!(manager.calls().get(call_id).unwrap().state, gateway_core::CallState::Answered);
}

#[tokio::test]
async fn second_dial_while_busy_is_rejected() {
    let (manager, sip, _pool, _routers) = harness().await;
    let peer = manager.connect_peer("agent-4".into(), "tenant-1".into());
    register(&sip, "agent-4", "tenant-1").await;

    manager.dial(peer.id, "+15551112222", None, None).await.unwrap();
    let second = manager.dial(peer.id, "+15553334444", None, None).await;
    assert!(matches!(second, Err(GatewayError::Busy)));
}

#[tokio::test]
async fn worker_death_disconnects_peers_on_that_worker() {
    let single_worker = MediaConfig {
        worker_count: 1,
        ..MediaConfig::default()
    };
    let pool = WorkerPool::start(single_worker.clone()).unwrap();
    let routers = Arc::new(RouterRegistry::new(single_worker.clone(), pool.clone()));
    let media = MediaRegistry::new(routers.clone(), pool.clone());
    let sip = SipGateway::new(SipGatewayConfig::default(), Arc::new(LoopbackSipTransport::new()));
    let manager = PeerManager::new(media, sip);

    let peer = manager.connect_peer("agent-5".into(), "tenant-1".into());
    manager
        .create_transport(peer.id, TransportDirection::Send)
        .await
        .unwrap();
    let router = routers.get("tenant-1").expect("router created on first transport");

    let mut events = manager.subscribe();
    pool.report_death(router.worker_id).await;

    let disconnect = wait_for(
        &mut events,
        |e| matches!(e, GatewayEvent::PeerDisconnected { reason, .. } if reason == "media-worker-lost"),
    )
    .await;
    match disconnect {
        GatewayEvent::PeerDisconnected { peer_id, .. } => assert_eq!(peer_id, peer.id),
        _ => unreachable!(),
    }
    assert!(manager.peers().get(peer.id).is_none());
}

#[tokio::test]
async fn graceful_shutdown_drains_active_calls() {
    let (manager, sip, _pool, _routers) = harness().await;
    let peer = manager.connect_peer("agent-6".into(), "tenant-1".into());
    register(&sip, "agent-6", "tenant-1").await;

    let call_id = manager.dial(peer.id, "+15551239999", None, None).await.unwrap();
    let sip_session_id = manager.calls().get(call_id).unwrap().sip_session_id.unwrap();
    sip.simulate_remote_answer(sip_session_id).await.unwrap();

    // The watcher task races with this thread to observe the answer and
    // flip the call's state; give it a moment before draining.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let drained = graceful_shutdown(&manager, manager.calls()).await;
    assert!(drained);
    assert!(manager.calls().is_empty());
}

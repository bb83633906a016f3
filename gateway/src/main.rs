//! Process entrypoint: loads configuration, wires the media/SIP/signaling
//! stack together, and runs the HTTP control plane and WebSocket signaling
//! listener until a shutdown signal arrives.

mod http;
mod signaling_handler;

use clap::Parser;
use gateway_core::{graceful_shutdown, GatewayConfig, PeerManager};
use gateway_media::{MediaRegistry, RouterRegistry, WorkerPool};
use gateway_sip::{LoopbackSipTransport, SipGateway};
use gateway_signaling::{AllowAllVerifier, IdentityVerifier};
use signaling_handler::SignalingHandler;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// CLI overrides layered over environment configuration. Every flag is
/// optional; defaults fall through to `GatewayConfig::from_env`.
#[derive(Debug, Parser)]
#[command(name = "gateway", about = "WebRTC-to-SIP media and signaling gateway")]
struct Cli {
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    #[arg(long, env = "HOST")]
    host: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("fatal: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "gateway exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let worker_pool = WorkerPool::start(config.media.clone())?;
    let routers = Arc::new(RouterRegistry::new(config.media.clone(), worker_pool.clone()));
    let media = MediaRegistry::new(routers, worker_pool.clone());

    // The carrier-side SIP peer is an external collaborator this gateway
    // does not reimplement; a production `SipTransport` would dial
    // `config.sip.ws_url` here. `LoopbackSipTransport` stands in until
    // that peer integration exists.
    let sip_transport = Arc::new(LoopbackSipTransport::new());
    let sip = SipGateway::new(config.sip.clone(), sip_transport);

    let manager = PeerManager::new(media.clone(), sip);
    let signaling_handler = SignalingHandler::new(manager.clone());
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(AllowAllVerifier);

    let http_state = http::AppState {
        manager: manager.clone(),
        media: media.clone(),
        worker_pool: worker_pool.clone(),
        started_at: chrono::Utc::now(),
    };
    let http_addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let http_listener = TcpListener::bind(http_addr).await?;
    info!(addr = %http_addr, "control-plane HTTP listening");
    let http_router = http::router(http_state);
    let mut http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, http_router).await {
            error!(error = %e, "http server exited");
        }
    });

    let signaling_addr: SocketAddr = format!("{}:{}", config.host, config.ws_port).parse()?;
    let signaling_listener = TcpListener::bind(signaling_addr).await?;
    info!(addr = %signaling_addr, "signaling websocket listening");
    let mut signaling_task = tokio::spawn(accept_signaling_connections(
        signaling_listener,
        verifier,
        signaling_handler,
    ));

    let shutdown_result = tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received; draining active calls");
            graceful_shutdown(&manager, manager.calls()).await
        }
        _ = &mut http_task => {
            warn!("http server task exited unexpectedly");
            false
        }
        _ = &mut signaling_task => {
            warn!("signaling accept loop exited unexpectedly");
            false
        }
    };

    http_task.abort();
    signaling_task.abort();

    if shutdown_result {
        Ok(())
    } else {
        Err("shutdown did not drain cleanly within the deadline".into())
    }
}

async fn accept_signaling_connections(
    listener: TcpListener,
    verifier: Arc<dyn IdentityVerifier>,
    handler: Arc<SignalingHandler>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "failed to accept signaling connection");
                continue;
            }
        };
        let verifier = verifier.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway_signaling::serve_connection(stream, verifier, handler).await {
                warn!(peer = %peer_addr, error = %e, "signaling connection ended with error");
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

//! WebSocket connection handling: authentication handshake, request
//! dispatch, heartbeat, and idle timeout.

use crate::auth::IdentityVerifier;
use crate::error::SignalingError;
use crate::ids::ConnectionId;
use crate::protocol::{AuthPayload, ClientRequest, RpcError, ServerMessage};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub const PING_INTERVAL: Duration = Duration::from_secs(25);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Dispatches authenticated RPCs and server-initiated events for one
/// connection. Implemented by the peer manager; this crate only owns the
/// socket framing.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Called once the handshake succeeds. Returns the channel the
    /// connection loop drains for server-initiated events, plus a
    /// best-effort close signal the handler can fire to evict the peer
    /// (e.g. on supersession).
    async fn on_connect(
        &self,
        connection_id: ConnectionId,
        auth: AuthPayload,
    ) -> mpsc::UnboundedReceiver<ServerMessage>;

    async fn on_request(
        &self,
        connection_id: ConnectionId,
        event: &str,
        data: Value,
    ) -> Result<Value, RpcError>;

    async fn on_disconnect(&self, connection_id: ConnectionId);
}

/// Runs the authentication handshake then the request/event loop to
/// completion. Returns once the socket closes, times out, or the peer is
/// otherwise torn down.
pub async fn serve_connection<S>(
    stream: S,
    verifier: Arc<dyn IdentityVerifier>,
    handler: Arc<dyn RpcHandler>,
) -> Result<(), SignalingError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| SignalingError::Internal(e.to_string()))?;
    let (mut sink, mut source) = ws_stream.split();

    let auth = match authenticate(&mut sink, &mut source, verifier.as_ref()).await {
        Ok(auth) => auth,
        Err(e) => {
            let _ = sink.send(Message::Close(None)).await;
            return Err(e);
        }
    };

    let connection_id = ConnectionId::new();
    let mut events_rx = handler.on_connect(connection_id, auth.clone()).await;

    let connected = ServerMessage::event(
        "connected",
        serde_json::json!({
            "user_id": auth.user_id,
            "agent_id": auth.agent_id,
            "ts": chrono::Utc::now().to_rfc3339(),
        }),
    );
    send_message(&mut sink, &connected).await?;

    info!(connection_id = %connection_id, agent = %auth.agent_id, "signaling connection authenticated");

    let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
    ping_ticker.tick().await; // first tick fires immediately; discard
    let idle_sleep = tokio::time::sleep(IDLE_TIMEOUT);
    tokio::pin!(idle_sleep);

    let result = loop {
        tokio::select! {
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        idle_sleep.as_mut().reset(tokio::time::Instant::now() + IDLE_TIMEOUT);
                        if let Err(e) = dispatch_request(&mut sink, handler.as_ref(), connection_id, &text).await {
                            warn!(connection_id = %connection_id, error = %e, "dropping malformed request");
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        idle_sleep.as_mut().reset(tokio::time::Instant::now() + IDLE_TIMEOUT);
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(SignalingError::Internal(e.to_string())),
                }
            }
            Some(event) = events_rx.recv() => {
                if send_message(&mut sink, &event).await.is_err() {
                    break Err(SignalingError::Internal("send failed".into()));
                }
            }
            _ = ping_ticker.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break Err(SignalingError::Internal("ping failed".into()));
                }
            }
            () = &mut idle_sleep => {
                break Err(SignalingError::IdleTimeout);
            }
        }
    };

    handler.on_disconnect(connection_id).await;
    debug!(connection_id = %connection_id, "signaling connection closed");
    result
}

async fn authenticate<Sink, Source>(
    sink: &mut Sink,
    source: &mut Source,
    verifier: &dyn IdentityVerifier,
) -> Result<AuthPayload, SignalingError>
where
    Sink: futures_util::Sink<Message> + Unpin,
    Source: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let _ = sink; // reserved: a real handshake may challenge before the payload arrives
    let first = source
        .next()
        .await
        .ok_or_else(|| SignalingError::ProtocolViolation("closed before auth".into()))?
        .map_err(|e| SignalingError::Internal(e.to_string()))?;
    let text = match first {
        Message::Text(t) => t,
        Message::Close(_) => return Err(SignalingError::ProtocolViolation("closed before auth".into())),
        _ => return Err(SignalingError::ProtocolViolation("expected text auth frame".into())),
    };
    let payload: AuthPayload =
        serde_json::from_str(&text).map_err(|_| SignalingError::MissingCredentials)?;
    if payload.token.is_empty() || payload.agent_id.is_empty() {
        return Err(SignalingError::MissingCredentials);
    }
    if !verifier.verify(&payload).await {
        return Err(SignalingError::AuthFailed);
    }
    Ok(payload)
}

async fn dispatch_request<Sink>(
    sink: &mut Sink,
    handler: &dyn RpcHandler,
    connection_id: ConnectionId,
    text: &str,
) -> Result<(), SignalingError>
where
    Sink: futures_util::Sink<Message> + Unpin,
{
    let request: ClientRequest = serde_json::from_str(text)
        .map_err(|e| SignalingError::ProtocolViolation(e.to_string()))?;
    let reply = match handler
        .on_request(connection_id, &request.event, request.data)
        .await
    {
        Ok(result) => ServerMessage::ok(request.correlation_id, result),
        Err(error) => ServerMessage::err(request.correlation_id, error),
    };
    send_message(sink, &reply).await
}

async fn send_message<Sink>(sink: &mut Sink, message: &ServerMessage) -> Result<(), SignalingError>
where
    Sink: futures_util::Sink<Message> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|e| SignalingError::Internal(e.to_string()))?;
    sink.send(Message::Text(text))
        .await
        .map_err(|_| SignalingError::Internal("socket send failed".into()))
}

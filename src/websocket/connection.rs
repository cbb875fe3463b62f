use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{ClientError, PingMessage, SendMessage};
use crate::websocket::router::{ChannelRouter, OutboundSender};

/// Lifecycle of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

/// The tenant slice one socket is subscribed to. One connection carries
/// every channel for this scope; opening a document means opening a new
/// scope, not a new socket per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionScope {
    pub user_id: String,
    pub organization_id: Option<String>,
    pub project_id: Option<String>,
    pub document_id: Option<String>,
}

impl ConnectionScope {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: None,
            project_id: None,
            document_id: None,
        }
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    fn query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("user_id", &self.user_id);
        if let Some(organization_id) = &self.organization_id {
            query.append_pair("organization_id", organization_id);
        }
        if let Some(project_id) = &self.project_id {
            query.append_pair("project_id", project_id);
        }
        if let Some(document_id) = &self.document_id {
            query.append_pair("document_id", document_id);
        }
        query.finish()
    }
}

/// Point-in-time snapshot of connection health
#[derive(Debug, Clone)]
pub struct ConnectionDiagnostics {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub last_pong_at: Option<DateTime<Utc>>,
    pub messages_received: u64,
    pub messages_sent: u64,
}

struct ConnectTuning {
    heartbeat: Duration,
    reconnect_delay: Duration,
    max_attempts: u32,
}

/// One multiplexed WebSocket connection to the realtime endpoint.
///
/// The connection itself lives in a background supervisor task that
/// dials, pumps messages through the router, and redials with a fixed
/// delay after unexpected closes, a bounded number of times. The handle
/// is the embedding application's side: senders, state, teardown.
pub struct RealtimeConnection {
    scope: ConnectionScope,
    sender: OutboundSender,
    router: ChannelRouter,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    attempts: Arc<AtomicU32>,
    messages_sent: Arc<AtomicU64>,
    supervisor: JoinHandle<()>,
}

impl RealtimeConnection {
    /// Open the connection for the router's scope. Returns immediately;
    /// dialing and all reconnects happen in the background. Must be
    /// called from within a tokio runtime.
    pub fn connect(config: &Config, router: ChannelRouter) -> Result<Self, ClientError> {
        let scope = router.scope().clone();
        let url = realtime_url(&config.ws_base_url, &scope)?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (frames_tx, frames_rx) = mpsc::channel::<String>(64);
        let attempts = Arc::new(AtomicU32::new(0));
        let messages_sent = Arc::new(AtomicU64::new(0));

        let sender = OutboundSender::new(
            scope.user_id.clone(),
            frames_tx,
            state_rx.clone(),
            config.cursor_throttle(),
        );

        let tuning = ConnectTuning {
            heartbeat: config.heartbeat_interval(),
            reconnect_delay: config.reconnect_delay(),
            max_attempts: config.max_reconnect_attempts.max(1),
        };

        info!("Opening realtime connection for user {}", scope.user_id);
        let supervisor = tokio::spawn(run_connection(
            url,
            router.clone(),
            state_tx,
            shutdown_rx,
            frames_rx,
            tuning,
            attempts.clone(),
            messages_sent.clone(),
        ));

        Ok(Self {
            scope,
            sender,
            router,
            state_rx,
            shutdown_tx,
            attempts,
            messages_sent,
            supervisor,
        })
    }

    /// A cloneable sender for outbound messages on this connection
    pub fn sender(&self) -> OutboundSender {
        self.sender.clone()
    }

    pub fn scope(&self) -> &ConnectionScope {
        &self.scope
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe state transitions without polling.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn diagnostics(&self) -> ConnectionDiagnostics {
        let stats = self.router.stats();
        ConnectionDiagnostics {
            state: self.state(),
            reconnect_attempts: self.attempts.load(Ordering::Relaxed),
            last_pong_at: stats.last_pong_at.lock().ok().and_then(|last| *last),
            messages_received: stats.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
        }
    }

    /// Tear the connection down for good: close the socket, stop
    /// reconnecting. Safe to call more than once.
    pub fn disconnect(&self) {
        if self.shutdown_tx.send_replace(true) {
            debug!("Disconnect called on an already closed connection");
            return;
        }
        info!("Realtime connection closed by client");
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send_replace(true);
        self.supervisor.abort();
    }
}

/// Build the realtime endpoint URL for a scope.
fn realtime_url(ws_base_url: &str, scope: &ConnectionScope) -> Result<String, ClientError> {
    let base = ws_base_url.trim().trim_end_matches('/');
    if !base.starts_with("ws://") && !base.starts_with("wss://") {
        return Err(ClientError::Transport(format!(
            "WebSocket base URL must start with ws:// or wss://, got '{}'",
            ws_base_url
        )));
    }
    Ok(format!("{}/realtime?{}", base, scope.query_string()))
}

enum SessionEnd {
    Shutdown,
    Lost,
}

/// Supervisor: dial, run the session, and redial on unexpected closes.
///
/// The attempt counter only counts consecutive failed dials; a
/// successful open resets it. Once the budget is spent the supervisor
/// goes quiet without surfacing an error; callers keep working through
/// REST and see `Disconnected` on the state watch.
#[allow(clippy::too_many_arguments)]
async fn run_connection(
    url: String,
    router: ChannelRouter,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: watch::Receiver<bool>,
    mut frames_rx: mpsc::Receiver<String>,
    tuning: ConnectTuning,
    attempts: Arc<AtomicU32>,
    messages_sent: Arc<AtomicU64>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                attempts.store(0, Ordering::Relaxed);
                let _ = state_tx.send(ConnectionState::Connected);
                info!("Realtime connection established");

                let end = run_session(
                    stream,
                    &router,
                    &mut shutdown_rx,
                    &mut frames_rx,
                    tuning.heartbeat,
                    &messages_sent,
                )
                .await;

                // Everything derived from the live socket resets; queued
                // outbound frames must not replay into the next session
                router.connection_lost();
                drain(&mut frames_rx);

                match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost => {
                        warn!(
                            "Realtime connection lost, reconnecting in {:?}",
                            tuning.reconnect_delay
                        );
                        let _ = state_tx.send(ConnectionState::Reconnecting);
                    }
                }
            }
            Err(e) => {
                let failed = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                if failed >= tuning.max_attempts {
                    warn!(
                        "Realtime connection failed (attempt {}/{}), giving up: {}",
                        failed, tuning.max_attempts, e
                    );
                    break;
                }
                warn!(
                    "Realtime connection failed (attempt {}/{}), retrying in {:?}: {}",
                    failed, tuning.max_attempts, tuning.reconnect_delay, e
                );
                let _ = state_tx.send(ConnectionState::Reconnecting);
            }
        }

        // Fixed delay before the next dial, cut short only by disconnect()
        tokio::select! {
            _ = tokio::time::sleep(tuning.reconnect_delay) => {}
            _ = shutdown_rx.changed() => {}
        }
    }

    let _ = state_tx.send(ConnectionState::Disconnected);
    debug!("Connection supervisor stopped");
}

/// Pump one open socket until it closes or the client shuts down.
async fn run_session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    router: &ChannelRouter,
    shutdown_rx: &mut watch::Receiver<bool>,
    frames_rx: &mut mpsc::Receiver<String>,
    heartbeat: Duration,
    messages_sent: &AtomicU64,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();

    // First tick fires immediately, so an open socket pings right away
    let mut heartbeat = tokio::time::interval(heartbeat);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            _ = heartbeat.tick() => {
                let ping = SendMessage::Ping(PingMessage {
                    date: Some(Utc::now().to_rfc3339()),
                });
                let frame = match serde_json::to_string(&ping) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to serialize heartbeat ping: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    warn!("Failed to send heartbeat ping");
                    return SessionEnd::Lost;
                }
                messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            frame = frames_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            warn!("Failed to send outbound message");
                            return SessionEnd::Lost;
                        }
                        messages_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    // All senders dropped; nothing left to forward
                    None => return SessionEnd::Lost,
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => router.dispatch_text(raw.as_str()).await,
                    Some(Ok(Message::Close(_))) => {
                        info!("Server closed the realtime connection");
                        return SessionEnd::Lost;
                    }
                    // Control frames and binary payloads are not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Realtime socket error: {}", e);
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                }
            }
        }
    }
}

fn drain(frames_rx: &mut mpsc::Receiver<String>) {
    while frames_rx.try_recv().is_ok() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_builds_query_string_in_order() {
        let scope = ConnectionScope::new("user-1")
            .organization("org-1")
            .project("proj-1")
            .document("doc-1");
        assert_eq!(
            scope.query_string(),
            "user_id=user-1&organization_id=org-1&project_id=proj-1&document_id=doc-1"
        );
    }

    #[test]
    fn scope_omits_unset_levels() {
        let scope = ConnectionScope::new("user-1").document("doc-1");
        assert_eq!(scope.query_string(), "user_id=user-1&document_id=doc-1");
    }

    #[test]
    fn scope_escapes_reserved_characters() {
        let scope = ConnectionScope::new("user&7 x").document("doc#1");
        assert_eq!(
            scope.query_string(),
            "user_id=user%267+x&document_id=doc%231"
        );
    }

    #[test]
    fn realtime_url_joins_base_and_scope() {
        let scope = ConnectionScope::new("user-1");
        assert_eq!(
            realtime_url("ws://localhost:3000/", &scope).unwrap(),
            "ws://localhost:3000/realtime?user_id=user-1"
        );
        assert_eq!(
            realtime_url("wss://rt.example.org", &scope).unwrap(),
            "wss://rt.example.org/realtime?user_id=user-1"
        );
    }

    #[test]
    fn realtime_url_rejects_non_websocket_schemes() {
        let scope = ConnectionScope::new("user-1");
        let err = realtime_url("http://localhost:3000", &scope).unwrap_err();
        match err {
            ClientError::Transport(message) => assert!(message.contains("ws://")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

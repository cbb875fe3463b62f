#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use scholia_client::{
    Comment, CommentPatch, Config, ConnectionState, NewComment, ReadStatus, ReadStatusBatch,
    RealtimeConnection,
};

/// In-process stand-in for the collaboration backend: the REST endpoints
/// the client calls plus the realtime WebSocket endpoint.
pub struct Backend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
    frames: mpsc::UnboundedReceiver<Value>,
}

pub struct BackendState {
    pub comments: Mutex<Vec<Comment>>,
    pub read_flags: Mutex<HashMap<Uuid, bool>>,
    pub mark_read_calls: Mutex<Vec<Vec<Uuid>>>,
    pub ws_queries: Mutex<Vec<HashMap<String, String>>>,
    pub fail_next_mutation: AtomicBool,
    pub accept_ws: AtomicBool,
    pub connections: AtomicUsize,
    client_frames: mpsc::UnboundedSender<Value>,
    push_tx: broadcast::Sender<String>,
    kick_tx: broadcast::Sender<()>,
}

impl Backend {
    pub async fn start() -> Backend {
        let (client_frames, frames) = mpsc::unbounded_channel();
        let (push_tx, _) = broadcast::channel(64);
        let (kick_tx, _) = broadcast::channel(8);
        let state = Arc::new(BackendState {
            comments: Mutex::new(Vec::new()),
            read_flags: Mutex::new(HashMap::new()),
            mark_read_calls: Mutex::new(Vec::new()),
            ws_queries: Mutex::new(Vec::new()),
            fail_next_mutation: AtomicBool::new(false),
            accept_ws: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
            client_frames,
            push_tx,
            kick_tx,
        });

        let app = Router::new()
            .route("/realtime", get(realtime_handler))
            .route("/api/:resource/:id/comments", get(list_comments))
            .route("/api/comments", post(create_comment))
            .route("/api/comments/:id", patch(update_comment).delete(delete_comment))
            .route("/api/comments/:id/resolve", post(resolve_comment))
            .route("/api/comment-reads/status", post(read_statuses))
            .route("/api/comment-reads/mark-read", post(mark_read))
            .route("/api/comment-reads/mark-unread/:kind/:id", post(mark_unread))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test backend");
        let addr = listener.local_addr().expect("test backend addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Backend { addr, state, frames }
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn ws_base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push one frame to every connected realtime client.
    pub fn push(&self, frame: Value) {
        let _ = self.state.push_tx.send(frame.to_string());
    }

    /// Close every realtime client from the server side.
    pub fn kick_clients(&self) {
        let _ = self.state.kick_tx.send(());
    }

    /// Refuse realtime subscriptions from now on.
    pub fn refuse_connections(&self) {
        self.state.accept_ws.store(false, Ordering::SeqCst);
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Fail the next comment or read mutation with a 500.
    pub fn fail_next_mutation(&self) {
        self.state.fail_next_mutation.store(true, Ordering::SeqCst);
    }

    pub fn seed_comment(&self, comment: Comment) {
        self.state.comments.lock().unwrap().push(comment);
    }

    pub fn seed_read(&self, id: Uuid, read: bool) {
        self.state.read_flags.lock().unwrap().insert(id, read);
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.state.comments.lock().unwrap().clone()
    }

    pub fn clear_comments(&self) {
        self.state.comments.lock().unwrap().clear();
    }

    pub fn read_flag(&self, id: Uuid) -> Option<bool> {
        self.state.read_flags.lock().unwrap().get(&id).copied()
    }

    /// Every batch the mark-read endpoint received, failed calls included
    pub fn mark_read_calls(&self) -> Vec<Vec<Uuid>> {
        self.state.mark_read_calls.lock().unwrap().clone()
    }

    pub fn ws_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.ws_queries.lock().unwrap().clone()
    }

    /// Next frame a realtime client sent us.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client frame channel closed")
    }

    /// Next frame of one type, skipping everything else.
    pub async fn next_frame_of(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }
}

async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BackendState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !state.accept_ws.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    state.ws_queries.lock().unwrap().push(params);
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BackendState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut source) = socket.split();
    let mut push_rx = state.push_tx.subscribe();
    let mut kick_rx = state.kick_tx.subscribe();

    loop {
        tokio::select! {
            frame = push_rx.recv() => {
                match frame {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            _ = kick_rx.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
                            let _ = state.client_frames.send(value);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    state.connections.fetch_sub(1, Ordering::SeqCst);
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_resolved: bool,
}

async fn list_comments(
    State(state): State<Arc<BackendState>>,
    Path((_resource, _id)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Comment>> {
    let comments = state.comments.lock().unwrap();
    let listed = comments
        .iter()
        .filter(|c| query.include_resolved || !c.resolved)
        .cloned()
        .collect();
    Json(listed)
}

async fn create_comment(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<NewComment>,
) -> Response {
    if state.fail_next_mutation.swap(false, Ordering::SeqCst) {
        return mutation_failure();
    }
    let comment = Comment {
        id: Uuid::new_v4(),
        parent_id: body.parent_id,
        author_id: "backend-user".to_string(),
        author_name: Some("Backend User".to_string()),
        content: body.content,
        created_at: Utc::now(),
        resolved: false,
        selection_start: body.selection_start,
        selection_end: body.selection_end,
        selected_text: body.selected_text,
    };
    state.comments.lock().unwrap().push(comment.clone());
    Json(comment).into_response()
}

async fn update_comment(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<Uuid>,
    Json(patch): Json<CommentPatch>,
) -> Response {
    if state.fail_next_mutation.swap(false, Ordering::SeqCst) {
        return mutation_failure();
    }
    let mut comments = state.comments.lock().unwrap();
    match comments.iter_mut().find(|c| c.id == id) {
        Some(comment) => {
            comment.content = patch.content;
            Json(comment.clone()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_comment(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<Uuid>,
) -> Response {
    if state.fail_next_mutation.swap(false, Ordering::SeqCst) {
        return mutation_failure();
    }
    let mut comments = state.comments.lock().unwrap();
    comments.retain(|c| c.id != id && c.parent_id != Some(id));
    StatusCode::NO_CONTENT.into_response()
}

async fn resolve_comment(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<Uuid>,
) -> Response {
    if state.fail_next_mutation.swap(false, Ordering::SeqCst) {
        return mutation_failure();
    }
    let mut comments = state.comments.lock().unwrap();
    match comments.iter_mut().find(|c| c.id == id) {
        Some(comment) => {
            comment.resolved = true;
            Json(comment.clone()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn read_statuses(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<ReadStatusBatch>,
) -> Json<Vec<ReadStatus>> {
    let flags = state.read_flags.lock().unwrap();
    // No receipt for a comment means the backend never saw it read
    let statuses = body
        .comment_ids
        .iter()
        .filter_map(|id| {
            flags.get(id).map(|read| ReadStatus {
                comment_id: *id,
                is_read: *read,
                read_at: None,
            })
        })
        .collect();
    Json(statuses)
}

async fn mark_read(
    State(state): State<Arc<BackendState>>,
    Json(body): Json<ReadStatusBatch>,
) -> Response {
    state
        .mark_read_calls
        .lock()
        .unwrap()
        .push(body.comment_ids.clone());
    if state.fail_next_mutation.swap(false, Ordering::SeqCst) {
        return mutation_failure();
    }
    let mut flags = state.read_flags.lock().unwrap();
    for id in body.comment_ids {
        flags.insert(id, true);
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn mark_unread(
    State(state): State<Arc<BackendState>>,
    Path((_kind, id)): Path<(String, Uuid)>,
) -> Response {
    if state.fail_next_mutation.swap(false, Ordering::SeqCst) {
        return mutation_failure();
    }
    state.read_flags.lock().unwrap().insert(id, false);
    StatusCode::NO_CONTENT.into_response()
}

fn mutation_failure() -> Response {
    let body = serde_json::json!({
        "code": 500,
        "status": "error",
        "error": "backend unavailable"
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Config pointed at the fake backend, tuned so tests run fast.
pub fn test_config(backend: &Backend) -> Config {
    Config {
        api_base_url: backend.api_base_url(),
        ws_base_url: backend.ws_base_url(),
        heartbeat_interval_secs: 1,
        reconnect_delay_secs: 0,
        max_reconnect_attempts: 3,
        request_timeout_secs: 2,
        ..Config::default()
    }
}

pub fn comment(id: u128, parent: Option<u128>, resolved: bool) -> Comment {
    Comment {
        id: Uuid::from_u128(id),
        parent_id: parent.map(Uuid::from_u128),
        author_id: format!("user-{}", id),
        author_name: None,
        content: format!("comment {}", id),
        created_at: Utc::now(),
        resolved,
        selection_start: None,
        selection_end: None,
        selected_text: None,
    }
}

pub async fn wait_for_state(connection: &RealtimeConnection, target: ConnectionState) {
    let mut watch = connection.state_watch();
    tokio::time::timeout(Duration::from_secs(5), watch.wait_for(|state| *state == target))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed");
}

/// Poll a condition until it holds or five seconds pass.
pub async fn wait_until<F: Fn() -> bool>(description: &str, predicate: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting until {}", description);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

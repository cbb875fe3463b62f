use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::cache::QueryCache;
use crate::models::{CursorMoveMessage, CursorPosition, ReceivedMessage, SendMessage};
use crate::presence::PresenceAggregator;
use crate::websocket::connection::{ConnectionScope, ConnectionState};
use crate::websocket::msg_activity_handler::handle_activity_message;
use crate::websocket::msg_document_handler::{
    handle_document_change_message, handle_document_update_message,
};
use crate::websocket::msg_notification_handler::handle_notification_message;
use crate::websocket::msg_pong_handler::handle_pong_message;
use crate::websocket::msg_presence_handler::{handle_cursor_message, handle_presence_message};

/// Callback receiving a forwarded channel payload
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Optional hooks invoked for channel messages the embedding application
/// consumes directly
#[derive(Clone, Default)]
pub struct RouterCallbacks {
    pub on_activity: Option<EventCallback>,
    pub on_notification: Option<EventCallback>,
    pub on_document_change: Option<EventCallback>,
}

#[derive(Default)]
pub(crate) struct RouterStats {
    pub(crate) messages_received: AtomicU64,
    pub(crate) last_pong_at: Mutex<Option<DateTime<Utc>>>,
}

/// Routes messages from the multiplexed socket to one handler per type.
///
/// Every message type has exactly one side effect path; anything the
/// router does not know is logged and dropped, never an error.
#[derive(Clone)]
pub struct ChannelRouter {
    scope: ConnectionScope,
    cache: QueryCache,
    presence: PresenceAggregator,
    callbacks: RouterCallbacks,
    stats: Arc<RouterStats>,
}

impl ChannelRouter {
    pub fn new(scope: ConnectionScope, cache: QueryCache, presence: PresenceAggregator) -> Self {
        Self {
            scope,
            cache,
            presence,
            callbacks: RouterCallbacks::default(),
            stats: Arc::new(RouterStats::default()),
        }
    }

    pub fn with_callbacks(mut self, callbacks: RouterCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Parse one text frame and dispatch it.
    pub async fn dispatch_text(&self, raw: &str) {
        let message: ReceivedMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                log_undispatchable(raw, &e);
                return;
            }
        };
        self.dispatch(message).await;
    }

    /// Dispatch one parsed message to its handler.
    pub async fn dispatch(&self, message: ReceivedMessage) {
        self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        match message {
            ReceivedMessage::Activity(payload) => {
                handle_activity_message(payload, &self.cache, &self.scope, &self.callbacks).await;
            }
            ReceivedMessage::Notification(payload) => {
                handle_notification_message(payload, &self.cache, &self.scope, &self.callbacks)
                    .await;
            }
            ReceivedMessage::Presence(msg) => handle_presence_message(&msg, &self.presence),
            ReceivedMessage::CursorMove(msg) => handle_cursor_message(&msg, &self.presence),
            ReceivedMessage::DocumentChange(payload) => {
                handle_document_change_message(payload, &self.callbacks);
            }
            ReceivedMessage::DocumentUpdate(msg) => {
                handle_document_update_message(&msg, &self.cache, &self.scope).await;
            }
            ReceivedMessage::Ping(_) => debug!("Ping received, nothing to do"),
            ReceivedMessage::Pong(msg) => handle_pong_message(&msg, &self.stats),
        }
    }

    /// Reset state derived from the live connection. Called on every
    /// connection loss, including a deliberate disconnect.
    pub fn connection_lost(&self) {
        self.presence.clear();
    }

    pub fn scope(&self) -> &ConnectionScope {
        &self.scope
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn presence(&self) -> &PresenceAggregator {
        &self.presence
    }

    pub(crate) fn stats(&self) -> &Arc<RouterStats> {
        &self.stats
    }
}

/// Fire-and-forget sender for client to server messages.
///
/// Messages are serialized and queued for the socket task only while the
/// connection is open; otherwise they are dropped silently. There is no
/// buffering and no replay after a reconnect.
#[derive(Clone)]
pub struct OutboundSender {
    user_id: String,
    frames: mpsc::Sender<String>,
    state: watch::Receiver<ConnectionState>,
    cursor_throttle: Duration,
    created: Instant,
    last_cursor_ms: Arc<AtomicU64>,
}

impl OutboundSender {
    pub(crate) fn new(
        user_id: String,
        frames: mpsc::Sender<String>,
        state: watch::Receiver<ConnectionState>,
        cursor_throttle: Duration,
    ) -> Self {
        Self {
            user_id,
            frames,
            state,
            cursor_throttle,
            created: Instant::now(),
            last_cursor_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    /// Queue a message for sending. Returns false when it was dropped.
    pub fn send(&self, message: &SendMessage) -> bool {
        if !self.is_open() {
            debug!("Realtime socket not open, dropping outbound message");
            return false;
        }
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };
        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                debug!("Outbound queue unavailable, dropping message");
                false
            }
        }
    }

    /// Send the local user's cursor position, throttled so a stream of
    /// movements does not flood the socket. Dropped positions are
    /// harmless: the next allowed send carries the latest one.
    pub fn send_cursor(&self, position: CursorPosition) -> bool {
        let now_ms = self.created.elapsed().as_millis() as u64;
        let last_ms = self.last_cursor_ms.load(Ordering::Relaxed);
        if last_ms != 0 && now_ms.saturating_sub(last_ms) < self.cursor_throttle.as_millis() as u64 {
            return false;
        }
        self.last_cursor_ms.store(now_ms.max(1), Ordering::Relaxed);
        self.send(&SendMessage::CursorMove(CursorMoveMessage {
            user_id: self.user_id.clone(),
            position,
        }))
    }

    /// Send a local edit to the document's change stream.
    pub fn send_document_change(&self, changes: Value) -> bool {
        self.send(&SendMessage::DocumentChange(changes))
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
}

const KNOWN_TYPES: [&str; 8] = [
    "activity",
    "notification",
    "presence",
    "cursor_move",
    "document_change",
    "document_update",
    "ping",
    "pong",
];

/// A frame we could not dispatch: an unknown type is expected traffic
/// from newer backends and only worth a warning; a known type that does
/// not parse is a real problem.
fn log_undispatchable(raw: &str, parse_error: &serde_json::Error) {
    match serde_json::from_str::<RawFrame>(raw) {
        Ok(frame) if !KNOWN_TYPES.contains(&frame.kind.as_str()) => {
            warn!("Unknown channel message type '{}', dropping", frame.kind);
        }
        Ok(frame) => {
            error!("Malformed '{}' message, dropping: {}", frame.kind, parse_error);
        }
        Err(_) => {
            error!("Unparseable channel message, dropping: {}", parse_error);
        }
    }
}

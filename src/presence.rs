use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{CursorMoveMessage, PresenceEntry, PresenceEvent, PresenceMessage};

/// Tracks who is active on the connection's document scope and where
/// their cursors are.
///
/// Membership changes only through `presence` events; cursor events only
/// move cursors. The whole state is derived from the live connection, so
/// losing the connection clears it. Clones share one underlying state.
#[derive(Clone)]
pub struct PresenceAggregator {
    inner: Arc<Mutex<PresenceState>>,
    entries_tx: Arc<watch::Sender<Vec<PresenceEntry>>>,
}

struct PresenceState {
    entries: HashMap<String, PresenceEntry>,
    last_seq: Option<u64>,
}

impl PresenceAggregator {
    pub fn new() -> Self {
        let (entries_tx, _rx) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Mutex::new(PresenceState {
                entries: HashMap::new(),
                last_seq: None,
            })),
            entries_tx: Arc::new(entries_tx),
        }
    }

    /// Apply a membership event from the server.
    pub fn apply_presence(&self, msg: &PresenceMessage) {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            Err(_) => return,
        };

        if let Some(seq) = msg.seq {
            if let Some(last_seq) = state.last_seq {
                if seq <= last_seq {
                    debug!("Stale presence event (seq {} <= {}), dropping", seq, last_seq);
                    return;
                }
            }
            state.last_seq = Some(seq);
        }

        match (msg.event, &msg.user_id) {
            (PresenceEvent::UserJoined, Some(user_id)) => info!("User {} joined", user_id),
            (PresenceEvent::UserLeft, Some(user_id)) => info!("User {} left", user_id),
            _ => {}
        }

        if let Some(active_users) = &msg.active_users {
            // The server snapshot wins; keep cursors for users that stay
            state.entries.retain(|user_id, _| active_users.contains(user_id));
            for user_id in active_users {
                state
                    .entries
                    .entry(user_id.clone())
                    .or_insert_with(|| PresenceEntry::new(user_id.clone()));
            }
        } else if let Some(user_id) = &msg.user_id {
            match msg.event {
                PresenceEvent::UserJoined => {
                    state
                        .entries
                        .entry(user_id.clone())
                        .or_insert_with(|| PresenceEntry::new(user_id.clone()));
                }
                PresenceEvent::UserLeft => {
                    state.entries.remove(user_id);
                }
            }
        } else {
            debug!("Presence event without user_id or active_users, dropping");
            return;
        }

        self.publish(&state);
    }

    /// Apply a cursor update. Unknown users are ignored: cursors never
    /// create or remove membership.
    pub fn apply_cursor(&self, msg: &CursorMoveMessage) {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        match state.entries.get_mut(&msg.user_id) {
            Some(entry) => {
                entry.cursor = Some(msg.position);
                self.publish(&state);
            }
            None => debug!("Cursor update for unknown user {}, ignoring", msg.user_id),
        }
    }

    /// Forget everyone. Called when the connection is lost: a dead socket
    /// means nothing is known about who is present.
    pub fn clear(&self) {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if !state.entries.is_empty() {
            info!("Clearing presence ({} users)", state.entries.len());
        }
        state.entries.clear();
        state.last_seq = None;
        self.publish(&state);
    }

    /// Current entries, ordered by user id for stable rendering
    pub fn entries(&self) -> Vec<PresenceEntry> {
        match self.inner.lock() {
            Ok(state) => sorted_entries(&state),
            Err(_) => Vec::new(),
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.inner
            .lock()
            .map(|state| state.entries.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|state| state.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe entry list changes without polling.
    pub fn watch(&self) -> watch::Receiver<Vec<PresenceEntry>> {
        self.entries_tx.subscribe()
    }

    fn publish(&self, state: &PresenceState) {
        let _ = self.entries_tx.send(sorted_entries(state));
    }
}

impl Default for PresenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_entries(state: &PresenceState) -> Vec<PresenceEntry> {
    let mut entries: Vec<PresenceEntry> = state.entries.values().cloned().collect();
    entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    entries
}

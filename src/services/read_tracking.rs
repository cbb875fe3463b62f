use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::{QueryCache, QueryKey};
use crate::clients::ApiClient;
use crate::models::{ClientError, CommentKind};

const DEFAULT_MARK_DELAY: Duration = Duration::from_millis(2000);

/// Tracks which comments the user has read and quietly marks the unread
/// ones as read once they have stayed on screen for a short while.
///
/// The delayed mark is batched: one request covers every comment that was
/// unread when the timer was armed. Each comment is marked at most once
/// per tracker lifetime, explicitly or by the timer, so a comment the
/// user marks unread afterwards stays unread. Every status change is
/// published to the shared query cache under the resource's read-status
/// key, where other holders of the same resource pick it up. Methods
/// that arm the timer must be called from within a tokio runtime.
pub struct ReadTracker {
    api: ApiClient,
    cache: QueryCache,
    kind: CommentKind,
    resource_id: String,
    delay: Duration,
    enabled: bool,
    inner: Arc<Mutex<TrackerState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct TrackerState {
    statuses: HashMap<Uuid, bool>,
    current_ids: Vec<Uuid>,
    marked_once: HashSet<Uuid>,
    loaded: bool,
    generation: u64,
}

impl ReadTracker {
    pub fn new(
        api: ApiClient,
        cache: QueryCache,
        kind: CommentKind,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            cache,
            kind,
            resource_id: resource_id.into(),
            delay: DEFAULT_MARK_DELAY,
            enabled: true,
            inner: Arc::new(Mutex::new(TrackerState::default())),
            timer: Mutex::new(None),
        }
    }

    /// Override how long comments stay on screen before they are marked.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Turn the delayed auto-mark off, keeping explicit marking only.
    pub fn with_auto_mark(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn cache_key(&self) -> QueryKey {
        QueryKey::ReadStatuses {
            kind: self.kind,
            resource_id: self.resource_id.clone(),
        }
    }

    /// Fetch read receipts for the comments on screen and arm the
    /// auto-mark timer. Comments without a receipt read as unread.
    pub async fn load_statuses(&self, ids: &[Uuid]) -> Result<(), ClientError> {
        let statuses = self.api.fetch_read_statuses(self.kind, ids).await?;
        {
            let mut state = match self.inner.lock() {
                Ok(state) => state,
                Err(_) => return Ok(()),
            };
            state.current_ids = ids.to_vec();
            for status in statuses {
                state.statuses.insert(status.comment_id, status.is_read);
            }
            state.loaded = true;
        }
        self.publish_statuses().await;
        self.rearm();
        Ok(())
    }

    /// The set of comments on screen changed. Any pending auto-mark is
    /// cancelled and the timer starts over for the new set.
    pub fn update_ids(&self, ids: &[Uuid]) {
        if let Ok(mut state) = self.inner.lock() {
            state.current_ids = ids.to_vec();
        }
        self.rearm();
    }

    pub fn is_read(&self, id: Uuid) -> bool {
        match self.inner.lock() {
            Ok(state) => state.statuses.get(&id).copied().unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Unread comments among the ones currently on screen
    pub fn unread_count(&self) -> usize {
        match self.inner.lock() {
            Ok(state) => state
                .current_ids
                .iter()
                .filter(|id| !state.statuses.get(*id).copied().unwrap_or(false))
                .count(),
            Err(_) => 0,
        }
    }

    /// Mark comments read right away. The local flags flip before the
    /// request goes out; a failure is reported but the flags stay
    /// flipped, and nothing is retried.
    pub async fn mark_as_read(&self, ids: &[Uuid]) -> Result<(), ClientError> {
        if ids.is_empty() {
            return Ok(());
        }
        if let Ok(mut state) = self.inner.lock() {
            for id in ids {
                state.statuses.insert(*id, true);
                state.marked_once.insert(*id);
            }
        }
        self.publish_statuses().await;
        if let Err(e) = self.api.mark_comments_read(self.kind, ids).await {
            error!("Failed to mark {} comments as read: {}", ids.len(), e);
            return Err(e);
        }
        Ok(())
    }

    /// Mark one comment unread right away, with no delay.
    pub async fn mark_as_unread(&self, id: Uuid) -> Result<(), ClientError> {
        if let Ok(mut state) = self.inner.lock() {
            state.statuses.insert(id, false);
        }
        self.publish_statuses().await;
        if let Err(e) = self.api.mark_comment_unread(self.kind, id).await {
            error!("Failed to mark comment {} as unread: {}", id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Push the current status map to the shared cache so other holders
    /// of this resource read the same flags.
    async fn publish_statuses(&self) {
        let snapshot = match self.inner.lock() {
            Ok(state) => state.statuses.clone(),
            Err(_) => return,
        };
        self.cache.insert(self.cache_key(), snapshot).await;
    }

    /// Restart the debounce: cancel any pending timer and, if on-screen
    /// comments are still unread and were never marked before, schedule
    /// one batched mark-read.
    fn rearm(&self) {
        if !self.enabled {
            return;
        }

        let (generation, pending) = {
            let mut state = match self.inner.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            // Nothing is marked until the backend told us what is unread
            if !state.loaded {
                return;
            }
            state.generation += 1;
            (state.generation, compute_pending(&state))
        };

        self.cancel_timer();
        if pending.is_empty() {
            return;
        }
        debug!("Arming read timer for {} unread comments", pending.len());

        let api = self.api.clone();
        let cache = self.cache.clone();
        let key = self.cache_key();
        let kind = self.kind;
        let delay = self.delay;
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let (due, snapshot) = {
                let mut state = match inner.lock() {
                    Ok(state) => state,
                    Err(_) => return,
                };
                // A newer rearm superseded this timer
                if state.generation != generation {
                    return;
                }
                // Anything marked while the timer ran is no longer due
                let due: Vec<Uuid> = pending
                    .iter()
                    .filter(|id| !state.statuses.get(*id).copied().unwrap_or(false))
                    .filter(|id| !state.marked_once.contains(*id))
                    .copied()
                    .collect();
                if due.is_empty() {
                    return;
                }
                for id in &due {
                    state.statuses.insert(*id, true);
                    state.marked_once.insert(*id);
                }
                (due, state.statuses.clone())
            };

            cache.insert(key, snapshot).await;
            info!("Marking {} comments as read", due.len());
            if let Err(e) = api.mark_comments_read(kind, &due).await {
                error!("Failed to mark comments as read: {}", e);
            }
        });

        if let Ok(mut timer) = self.timer.lock() {
            *timer = Some(handle);
        }
    }

    fn cancel_timer(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }

    #[cfg(test)]
    fn seed_statuses(&self, statuses: &[(Uuid, bool)]) {
        if let Ok(mut state) = self.inner.lock() {
            for (id, read) in statuses {
                state.statuses.insert(*id, *read);
            }
            state.loaded = true;
        }
    }
}

impl Drop for ReadTracker {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

fn compute_pending(state: &TrackerState) -> Vec<Uuid> {
    state
        .current_ids
        .iter()
        .filter(|id| !state.statuses.get(*id).copied().unwrap_or(false))
        .filter(|id| !state.marked_once.contains(*id))
        .copied()
        .collect()
}

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::CommentKind;

/// Identifies one cached query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    ActivityFeed {
        organization_id: Option<String>,
    },
    Notifications {
        user_id: String,
    },
    Document {
        document_id: String,
    },
    DocumentVersions {
        document_id: String,
    },
    Comments {
        kind: CommentKind,
        resource_id: String,
        include_resolved: bool,
    },
    ReadStatuses {
        kind: CommentKind,
        resource_id: String,
    },
}

impl QueryKey {
    /// Every filter variant of one resource's comment list query
    pub fn comment_variants(kind: CommentKind, resource_id: &str) -> [QueryKey; 2] {
        [
            QueryKey::Comments {
                kind,
                resource_id: resource_id.to_string(),
                include_resolved: false,
            },
            QueryKey::Comments {
                kind,
                resource_id: resource_id.to_string(),
                include_resolved: true,
            },
        ]
    }

    /// The queries stale after a backend-side document update
    pub fn document_variants(document_id: &str) -> [QueryKey; 2] {
        [
            QueryKey::Document {
                document_id: document_id.to_string(),
            },
            QueryKey::DocumentVersions {
                document_id: document_id.to_string(),
            },
        ]
    }
}

/// Shared in-memory query cache.
///
/// Values are type-erased so unrelated query results can live in one
/// cache; readers get them back through the typed accessors. Cloning the
/// handle shares the underlying cache. Invalidations are broadcast so
/// any holder of stale data can refetch.
#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<QueryKey, Arc<dyn Any + Send + Sync>>,
    invalidations: broadcast::Sender<QueryKey>,
}

impl QueryCache {
    pub fn new() -> Self {
        let entries = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(300)) // 5 minutes TTL
            .build();
        let (invalidations, _rx) = broadcast::channel(64);
        Self {
            entries,
            invalidations,
        }
    }

    /// Read a cached value. Returns None on a miss or a type mismatch.
    pub async fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let value = self.entries.get(key).await?;
        value.downcast::<T>().ok()
    }

    pub async fn insert<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        self.entries.insert(key, Arc::new(value)).await;
    }

    /// Evict one query and notify subscribers that it went stale.
    pub async fn invalidate(&self, key: &QueryKey) {
        self.entries.invalidate(key).await;
        debug!("Invalidated query {:?}", key);
        let _ = self.invalidations.send(key.clone());
    }

    pub async fn invalidate_all<I>(&self, keys: I)
    where
        I: IntoIterator<Item = QueryKey>,
    {
        for key in keys {
            self.invalidate(&key).await;
        }
    }

    /// Subscribe to invalidation events. A lagged receiver should treat
    /// everything it holds as stale.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

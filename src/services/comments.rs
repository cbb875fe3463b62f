use tracing::info;
use uuid::Uuid;

use crate::cache::{QueryCache, QueryKey};
use crate::clients::ApiClient;
use crate::models::{
    apply_comment_event, ClientError, Comment, CommentDraft, CommentEvent, CommentKind,
    CommentPatch, CommentThreads, NewComment,
};

/// Comment operations for one resource, backed by REST with a
/// read-through cache.
///
/// Cached lists only change after the backend confirms a mutation, so a
/// failed request leaves the threads exactly as they were.
#[derive(Clone)]
pub struct CommentService {
    api: ApiClient,
    cache: QueryCache,
    kind: CommentKind,
    resource_id: String,
}

impl CommentService {
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
        }
    }

    pub fn kind(&self) -> CommentKind {
        self.kind
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn cache_key(&self, include_resolved: bool) -> QueryKey {
        QueryKey::Comments {
            kind: self.kind,
            resource_id: self.resource_id.clone(),
            include_resolved,
        }
    }

    /// Threads for this resource, served from cache when warm.
    pub async fn list(&self, include_resolved: bool) -> Result<CommentThreads, ClientError> {
        let key = self.cache_key(include_resolved);
        if let Some(cached) = self.cache.get::<Vec<Comment>>(&key).await {
            return Ok(CommentThreads::from_comments(&cached));
        }

        info!(
            "Comment cache miss for {} {}. Fetching.",
            self.kind.as_str(),
            self.resource_id
        );
        let comments = self
            .api
            .list_comments(self.kind, &self.resource_id, include_resolved)
            .await?;
        let threads = CommentThreads::from_comments(&comments);
        self.cache.insert(key, comments).await;
        Ok(threads)
    }

    /// Drop both cached filter variants and refetch from the backend.
    pub async fn refresh(&self) -> Result<CommentThreads, ClientError> {
        self.cache
            .invalidate_all(QueryKey::comment_variants(self.kind, &self.resource_id))
            .await;
        self.list(true).await
    }

    pub async fn create(
        &self,
        content: impl Into<String>,
        draft: CommentDraft,
    ) -> Result<Comment, ClientError> {
        let body = NewComment {
            comment_type: self.kind,
            resource_id: self.resource_id.clone(),
            content: content.into(),
            parent_id: draft.parent_id,
            selection_start: draft.selection_start,
            selection_end: draft.selection_end,
            selected_text: draft.selected_text,
        };
        let created = self.api.create_comment(&body).await?;
        self.apply_event(&CommentEvent::Created(created.clone())).await;
        Ok(created)
    }

    pub async fn edit(&self, id: Uuid, content: impl Into<String>) -> Result<Comment, ClientError> {
        let patch = CommentPatch {
            content: content.into(),
        };
        let updated = self.api.update_comment(id, &patch).await?;
        // Fold in the content the backend stored, not the local draft
        self.apply_event(&CommentEvent::Edited {
            id,
            content: updated.content.clone(),
        })
        .await;
        Ok(updated)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), ClientError> {
        self.api.delete_comment(id).await?;
        self.apply_event(&CommentEvent::Removed { id }).await;
        Ok(())
    }

    pub async fn resolve(&self, id: Uuid) -> Result<Comment, ClientError> {
        let resolved = self.api.resolve_comment(id).await?;
        self.apply_event(&CommentEvent::Resolved { id }).await;
        Ok(resolved)
    }

    /// Fold a confirmed mutation into every cached filter variant.
    async fn apply_event(&self, event: &CommentEvent) {
        for key in QueryKey::comment_variants(self.kind, &self.resource_id) {
            if let Some(cached) = self.cache.get::<Vec<Comment>>(&key).await {
                let updated = apply_comment_event(&cached, event);
                self.cache.insert(key, updated).await;
            }
        }
    }
}

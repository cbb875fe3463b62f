use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::comment::CommentKind;

/// Per-user read receipt for one comment.
///
/// The backend only stores receipts for comments a user has read, so a
/// missing record means unread.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReadStatus {
    pub comment_id: Uuid,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

/// Batch body for the read-status fetch and mark-read endpoints
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReadStatusBatch {
    pub comment_type: CommentKind,
    pub comment_ids: Vec<Uuid>,
}

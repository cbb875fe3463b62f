use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Which kind of resource a comment thread hangs off
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Document,
    Task,
    Review,
}

impl CommentKind {
    /// Singular name used in request bodies and read-tracking paths
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentKind::Document => "document",
            CommentKind::Task => "task",
            CommentKind::Review => "review",
        }
    }

    /// Plural path segment of the resource's REST collection
    pub fn path_segment(&self) -> &'static str {
        match self {
            CommentKind::Document => "documents",
            CommentKind::Task => "tasks",
            CommentKind::Review => "reviews",
        }
    }
}

/// One comment as stored by the backend.
///
/// A root comment has no `parent_id`; a reply carries the id of its root.
/// Threads never nest deeper than one level. An inline comment is anchored
/// to a text selection and carries the selected text with it; a general
/// comment has no anchor fields at all.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub author_id: String,
    #[serde(default)]
    pub author_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub selection_start: Option<u32>,
    #[serde(default)]
    pub selection_end: Option<u32>,
    #[serde(default)]
    pub selected_text: Option<String>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_inline(&self) -> bool {
        self.selection_start.is_some()
    }
}

/// Body for creating a comment
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewComment {
    pub comment_type: CommentKind,
    pub resource_id: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub selection_start: Option<u32>,
    #[serde(default)]
    pub selection_end: Option<u32>,
    #[serde(default)]
    pub selected_text: Option<String>,
}

/// Body for editing a comment
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CommentPatch {
    pub content: String,
}

/// Options for a new comment beyond its body text.
///
/// The constructors are the only way to produce an anchored draft, so a
/// selection start always travels with its selected text.
#[derive(Debug, Clone, Default)]
pub struct CommentDraft {
    pub parent_id: Option<Uuid>,
    pub selection_start: Option<u32>,
    pub selection_end: Option<u32>,
    pub selected_text: Option<String>,
}

impl CommentDraft {
    /// A general comment on the whole resource
    pub fn general() -> Self {
        Self::default()
    }

    /// A reply under an existing root comment
    pub fn reply(parent_id: Uuid) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    /// An inline comment anchored to a text selection
    pub fn inline(selection_start: u32, selection_end: u32, selected_text: impl Into<String>) -> Self {
        Self {
            parent_id: None,
            selection_start: Some(selection_start),
            selection_end: Some(selection_end),
            selected_text: Some(selected_text.into()),
        }
    }
}

/// Render-ready view of one resource's comments: roots plus their
/// direct replies, in backend creation order.
#[derive(Debug, Clone, Default)]
pub struct CommentThreads {
    roots: Vec<Comment>,
    replies: HashMap<Uuid, Vec<Comment>>,
}

impl CommentThreads {
    /// Build the view from a flat comment list.
    ///
    /// Duplicate ids are dropped, first occurrence wins. Replies whose
    /// parent is missing from the list, or is itself a reply, are dropped.
    /// Input order is preserved and never re-sorted.
    pub fn from_comments(comments: &[Comment]) -> Self {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut roots: Vec<Comment> = Vec::new();
        let mut replies: HashMap<Uuid, Vec<Comment>> = HashMap::new();

        for comment in comments {
            if comment.is_root() && seen.insert(comment.id) {
                roots.push(comment.clone());
            }
        }
        let root_ids: HashSet<Uuid> = roots.iter().map(|c| c.id).collect();

        for comment in comments {
            if let Some(parent_id) = comment.parent_id {
                if !seen.insert(comment.id) {
                    continue;
                }
                if root_ids.contains(&parent_id) {
                    replies.entry(parent_id).or_default().push(comment.clone());
                } else {
                    debug!(
                        "Dropping reply {} with missing or non-root parent {}",
                        comment.id, parent_id
                    );
                }
            }
        }

        Self { roots, replies }
    }

    pub fn roots(&self) -> &[Comment] {
        &self.roots
    }

    pub fn replies_of(&self, root_id: Uuid) -> &[Comment] {
        self.replies.get(&root_id).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// The same view restricted to unresolved roots (and their replies)
    pub fn unresolved(&self) -> CommentThreads {
        let roots: Vec<Comment> = self.roots.iter().filter(|c| !c.resolved).cloned().collect();
        let kept: HashSet<Uuid> = roots.iter().map(|c| c.id).collect();
        let replies = self
            .replies
            .iter()
            .filter(|(root_id, _)| kept.contains(*root_id))
            .map(|(root_id, list)| (*root_id, list.clone()))
            .collect();
        CommentThreads { roots, replies }
    }

    /// Total number of comments in the view
    pub fn len(&self) -> usize {
        self.roots.len() + self.replies.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// A successful backend mutation, to be folded into cached comment lists
#[derive(Debug, Clone)]
pub enum CommentEvent {
    Created(Comment),
    Edited { id: Uuid, content: String },
    Removed { id: Uuid },
    Resolved { id: Uuid },
}

/// Apply one mutation to a cached comment list, returning the new list.
///
/// Pure: no I/O, and the input list is never modified.
pub fn apply_comment_event(comments: &[Comment], event: &CommentEvent) -> Vec<Comment> {
    match event {
        CommentEvent::Created(comment) => {
            let mut updated = comments.to_vec();
            updated.push(comment.clone());
            updated
        }
        CommentEvent::Edited { id, content } => comments
            .iter()
            .map(|c| {
                if c.id == *id {
                    let mut edited = c.clone();
                    edited.content = content.clone();
                    edited
                } else {
                    c.clone()
                }
            })
            .collect(),
        // Removing a root takes its direct replies with it
        CommentEvent::Removed { id } => comments
            .iter()
            .filter(|c| c.id != *id && c.parent_id != Some(*id))
            .cloned()
            .collect(),
        CommentEvent::Resolved { id } => comments
            .iter()
            .map(|c| {
                if c.id == *id {
                    let mut resolved = c.clone();
                    resolved.resolved = true;
                    resolved
                } else {
                    c.clone()
                }
            })
            .collect(),
    }
}

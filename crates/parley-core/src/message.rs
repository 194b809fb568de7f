//! Unified conversation messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mode::Mode;

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message (status lines, notices)
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

/// Well-known metadata keys attached to messages.
pub mod meta {
    /// Marks a task status line.
    pub const STATUS: &str = "status";
    /// Task id a status line refers to.
    pub const TASK_ID: &str = "task_id";
    /// Approval request id carried by an approval prompt.
    pub const APPROVAL_ID: &str = "approval_id";
    /// Pending transition id carried by a transition proposal.
    pub const TRANSITION_ID: &str = "transition_id";
    /// Recovery suggestions attached to a failure status.
    pub const SUGGESTIONS: &str = "suggestions";
    /// User message an assistant reply answers.
    pub const REPLY_TO: &str = "reply_to";
    /// Set when the reply came from the rule-based fallback.
    pub const FALLBACK: &str = "fallback";
    /// Follow-on action a message refers to.
    pub const FOLLOW_ON_ID: &str = "follow_on_id";
}

/// A message in the unified, mode-agnostic conversation log.
///
/// `origin` records which mode produced the message. Handoffs filter
/// assistant messages by origin; user messages always pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedMessage {
    /// Unique message ID
    pub id: Uuid,
    /// Message role
    pub role: Role,
    /// Plain text content
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Mode that produced the message
    pub origin: Mode,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl UnifiedMessage {
    fn new(role: Role, content: impl Into<String>, origin: Mode) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            origin,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>, origin: Mode) -> Self {
        Self::new(Role::User, content, origin)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>, origin: Mode) -> Self {
        Self::new(Role::Assistant, content, origin)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>, origin: Mode) -> Self {
        Self::new(Role::System, content, origin)
    }

    /// Create a task status line for the given task.
    pub fn status(content: impl Into<String>, origin: Mode, task_id: Uuid) -> Self {
        Self::new(Role::Assistant, content, origin)
            .with_meta(meta::STATUS, true)
            .with_meta(meta::TASK_ID, task_id.to_string())
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether the user authored this message.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// Whether this message is a task status line.
    pub fn is_status(&self) -> bool {
        self.metadata
            .get(meta::STATUS)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Task id referenced by a status line, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        self.metadata
            .get(meta::TASK_ID)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

/// Merge message lists into one chronological list without duplicates.
///
/// Messages are deduplicated by id, keeping the first occurrence, and
/// stably sorted by timestamp so that equal timestamps keep input order.
pub fn merge_chronological<I>(lists: I) -> Vec<UnifiedMessage>
where
    I: IntoIterator<Item = Vec<UnifiedMessage>>,
{
    let mut seen = std::collections::HashSet::new();
    let mut merged: Vec<UnifiedMessage> = lists
        .into_iter()
        .flatten()
        .filter(|m| seen.insert(m.id))
        .collect();
    merged.sort_by_key(|m| m.timestamp);
    merged
}

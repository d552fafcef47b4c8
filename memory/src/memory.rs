use chrono::{DateTime, Utc};
use membot_core::MemoryScope;
use serde::{Deserialize, Serialize};

/// Durable artifact derived from one committed session.
///
/// Owned by the memory index; never mutated after creation and independent of
/// the session's lifecycle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MemoryRecord {
    /// Opaque identifier assigned by the index
    pub id: String,
    pub scope: MemoryScope,
    /// ID of the originating session
    pub session_id: String,
    /// Transcript of the committed turns
    pub content: String,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
}

/// One search hit, ranked by the index
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MemorySnippet {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MemorySnippet {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score: None,
            created_at: None,
            id: None,
        }
    }
}

impl From<&MemoryRecord> for MemorySnippet {
    fn from(record: &MemoryRecord) -> Self {
        Self {
            content: record.content.clone(),
            score: None,
            created_at: Some(record.created_at),
            id: Some(record.id.clone()),
        }
    }
}

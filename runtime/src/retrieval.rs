use async_trait::async_trait;
use membot_memory::{MemoryIndexRef, MemorySnippet};
use tracing::{debug, info, warn};

use crate::hooks::{BeforeTurnHook, TurnRequest};

/// Queries the memory index with the latest user message before generation.
///
/// Owns no storage and no ranking. Search failures degrade to "no memories".
#[derive(Debug)]
pub struct RetrievalHook {
    index: MemoryIndexRef,
    top_k: usize,
}

impl RetrievalHook {
    pub fn new(index: MemoryIndexRef, top_k: usize) -> Self {
        Self { index, top_k }
    }
}

#[async_trait]
impl BeforeTurnHook for RetrievalHook {
    fn name(&self) -> &str {
        "memory_retrieval"
    }

    async fn before_turn(&self, request: &TurnRequest<'_>) -> Vec<MemorySnippet> {
        if self.top_k == 0 || request.message.trim().is_empty() {
            return Vec::new();
        }

        let scope = request.key.scope();
        match self.index.search(&scope, request.message, self.top_k).await {
            Ok(memories) if memories.is_empty() => {
                debug!(user_id = %scope.user_id, "No memories found");
                memories
            }
            Ok(memories) => {
                info!(user_id = %scope.user_id, count = memories.len(), "Retrieved memories");
                memories
            }
            Err(e) => {
                warn!(
                    user_id = %scope.user_id,
                    session_id = %request.key.session_id,
                    error = %e,
                    "Memory search failed, continuing without memories"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMemoryIndex;
    use membot_core::{SessionKey, SessionSnapshot, Turn};
    use membot_memory::MemoryIndex;
    use std::sync::Arc;

    fn request<'a>(key: &'a SessionKey, message: &'a str) -> TurnRequest<'a> {
        TurnRequest {
            key,
            message,
            history: &[],
        }
    }

    #[tokio::test]
    async fn test_no_prior_memories_is_empty() {
        let hook = RetrievalHook::new(Arc::new(RecordingMemoryIndex::new()), 5);
        let key = SessionKey::new("app", "u1", "s1");
        assert!(hook.before_turn(&request(&key, "pizza")).await.is_empty());
    }

    #[tokio::test]
    async fn test_returns_memories_for_own_scope_only() {
        let index = Arc::new(RecordingMemoryIndex::new());
        index
            .ingest(&SessionSnapshot::new(
                SessionKey::new("app", "u1", "old"),
                vec![Turn::user("I love pizza"), Turn::agent("Noted")],
            ))
            .await
            .unwrap();
        let hook = RetrievalHook::new(index, 5);

        let mine = SessionKey::new("app", "u1", "s2");
        let memories = hook.before_turn(&request(&mine, "pizza")).await;
        assert_eq!(memories.len(), 1);
        assert!(memories[0].content.contains("pizza"));

        let theirs = SessionKey::new("app", "u2", "s3");
        assert!(hook.before_turn(&request(&theirs, "pizza")).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_empty() {
        let hook = RetrievalHook::new(Arc::new(RecordingMemoryIndex::failing()), 5);
        let key = SessionKey::new("app", "u1", "s1");
        assert!(hook.before_turn(&request(&key, "pizza")).await.is_empty());
    }
}

use crate::errors::MemoryIndexError;
use crate::memory::MemorySnippet;
use async_trait::async_trait;
use membot_core::{MemoryScope, SessionSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// What the index reports back after accepting an ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    /// Record or operation identifier, opaque to the caller
    pub id: Option<String>,
    /// Number of turns that were handed over
    pub turns: usize,
}

/// Interface to the semantic long-term memory store.
///
/// Implementations must accept concurrent ingests from independent sessions
/// and keep every read and write inside the caller's [`MemoryScope`].
/// Re-ingesting identical content may duplicate records but must not corrupt
/// the index.
#[async_trait]
pub trait MemoryIndex: Send + Sync + Debug {
    /// Ingest the turns of a session, in the order given
    async fn ingest(&self, snapshot: &SessionSnapshot) -> Result<IngestReceipt, MemoryIndexError>;

    /// Ranked memories for `query`; an empty result is a normal outcome
    async fn search(
        &self,
        scope: &MemoryScope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, MemoryIndexError>;
}

/// Type alias for Arc-wrapped MemoryIndex trait objects
pub type MemoryIndexRef = Arc<dyn MemoryIndex>;

//! Hand-written fakes for exercising the runtime without network services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use membot_core::{MemoryScope, ModelError, ModelResult, SessionKey, SessionSnapshot, Turn};
use membot_memory::{InMemoryMemoryIndex, IngestReceipt, MemoryIndex, MemoryIndexError, MemorySnippet};

use crate::llm_client::{GenerationRequest, ReplyGenerator};
use crate::session::{InMemorySessionStore, Session, SessionStore, SessionStoreError};

/// Memory index that records every snapshot it is asked to ingest.
///
/// Search is served by an in-process index fed with the successful ingests.
#[derive(Debug, Default)]
pub struct RecordingMemoryIndex {
    inner: InMemoryMemoryIndex,
    ingested: Mutex<Vec<SessionSnapshot>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ingest and search fails with a transport-style error
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Ingests sleep for `delay` before being recorded
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn ingested(&self) -> Vec<SessionSnapshot> {
        self.ingested.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn ingest_count(&self) -> usize {
        self.ingested.lock().map(|v| v.len()).unwrap_or_default()
    }

    /// Snapshots ingested for one user
    pub fn ingested_for(&self, user_id: &str) -> Vec<SessionSnapshot> {
        self.ingested()
            .into_iter()
            .filter(|s| s.key.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl MemoryIndex for RecordingMemoryIndex {
    async fn ingest(&self, snapshot: &SessionSnapshot) -> Result<IngestReceipt, MemoryIndexError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Ok(mut ingested) = self.ingested.lock() {
            ingested.push(snapshot.clone());
        }
        if self.fail {
            return Err(MemoryIndexError::Request("memory service unavailable".to_string()));
        }
        self.inner.ingest(snapshot).await
    }

    async fn search(
        &self,
        scope: &MemoryScope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, MemoryIndexError> {
        if self.fail {
            return Err(MemoryIndexError::Request("memory service unavailable".to_string()));
        }
        self.inner.search(scope, query, limit).await
    }
}

/// Session store whose reads lag behind its writes: sessions come back with no turns
#[derive(Debug, Default)]
pub struct StaleSessionStore {
    inner: InMemorySessionStore,
    reads: AtomicUsize,
}

impl StaleSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_session` calls served
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for StaleSessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<Session, SessionStoreError> {
        self.inner.create_session(app_name, user_id, session_id).await
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Session, SessionStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let stored = self.inner.get_session(key).await?;
        Ok(Session::new(stored.key))
    }

    async fn append_turns(&self, key: &SessionKey, turns: &[Turn]) -> Result<(), SessionStoreError> {
        self.inner.append_turns(key, turns).await
    }

    async fn end_session(&self, key: &SessionKey) -> Result<(), SessionStoreError> {
        self.inner.end_session(key).await
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), SessionStoreError> {
        self.inner.delete_session(key).await
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionStoreError> {
        let sessions = self.inner.list_sessions(app_name, user_id).await?;
        Ok(sessions.into_iter().map(|s| Session::new(s.key)).collect())
    }
}

/// Reply generator that echoes the message, or always fails
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    fail: bool,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> ModelResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if self.fail {
            return Err(ModelError::HttpError {
                status_code: 503,
                message: "model unavailable".to_string(),
            });
        }
        Ok(format!("echo: {}", request.message))
    }
}

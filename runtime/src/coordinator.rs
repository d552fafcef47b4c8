use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use membot_core::{new_invocation_id, ModelError, SessionKey, Turn};
use membot_memory::{MemoryIndexError, MemoryIndexRef, MemorySnippet};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::commit::{CommitPipeline, CommitReport};
use crate::hooks::{
    AfterTurnHookRef, BeforeTurnHookRef, CompletionPoint, TurnContext, TurnRequest,
};
use crate::llm_client::{non_empty_reply, GenerationRequest, ReplyGenerator};
use crate::retrieval::RetrievalHook;
use crate::session::{Session, SessionState, SessionStoreError, SessionStoreRef};

/// Author recorded on agent turns
pub const AGENT_NAME: &str = "memory_assistant";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Session store error: {0}")]
    Session(#[from] SessionStoreError),
    #[error("Failed to generate a reply: {0}")]
    Generation(#[from] ModelError),
    #[error("Session has ended: {0}")]
    SessionEnded(SessionKey),
    #[error("No active session for user {0}")]
    NoActiveSession(String),
    #[error("No memory index is configured")]
    MemoryDisabled,
    #[error("Memory index error: {0}")]
    Memory(#[from] MemoryIndexError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The agent's answer to one user message
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub key: SessionKey,
    pub reply: String,
    /// Number of memories injected into the generation context
    pub memories_used: usize,
    pub timestamp: DateTime<Utc>,
}

/// Result of re-committing a user's stored sessions
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSaveSummary {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

type LiveSession = Arc<Mutex<Session>>;

/// Drives conversations: generates replies and invokes the turn hooks.
///
/// Every session being executed has one live frame, guarded by its own async
/// mutex, so turns within a session are strictly sequential while different
/// sessions run concurrently. The store receives write-behind copies of the
/// turns; hooks only ever see the live frame.
#[derive(Debug)]
pub struct ConversationRuntime {
    app_name: String,
    system_prompt: String,
    store: SessionStoreRef,
    generator: Arc<dyn ReplyGenerator>,
    before_hooks: Vec<BeforeTurnHookRef>,
    after_hooks: Vec<AfterTurnHookRef>,
    pipeline: Option<Arc<CommitPipeline>>,
    memory: Option<MemoryIndexRef>,
    live: RwLock<HashMap<SessionKey, LiveSession>>,
    current: RwLock<HashMap<String, SessionKey>>,
}

/// Assembles a `ConversationRuntime` from explicitly constructed parts
#[derive(Debug)]
pub struct RuntimeBuilder {
    app_name: String,
    system_prompt: String,
    store: SessionStoreRef,
    generator: Arc<dyn ReplyGenerator>,
    before_hooks: Vec<BeforeTurnHookRef>,
    after_hooks: Vec<AfterTurnHookRef>,
    pipeline: Option<Arc<CommitPipeline>>,
    memory: Option<MemoryIndexRef>,
}

impl RuntimeBuilder {
    pub fn new(
        app_name: impl Into<String>,
        store: SessionStoreRef,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            store,
            generator,
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
            pipeline: None,
            memory: None,
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn before_turn(mut self, hook: BeforeTurnHookRef) -> Self {
        self.before_hooks.push(hook);
        self
    }

    pub fn after_turn(mut self, hook: AfterTurnHookRef) -> Self {
        self.after_hooks.push(hook);
        self
    }

    /// Registers the retrieval hook and the commit pipeline for `index`
    pub fn memory(mut self, index: MemoryIndexRef, pipeline: CommitPipeline, top_k: usize) -> Self {
        let pipeline = Arc::new(pipeline);
        self.before_hooks
            .push(Arc::new(RetrievalHook::new(index.clone(), top_k)));
        self.after_hooks.push(pipeline.clone());
        self.pipeline = Some(pipeline);
        self.memory = Some(index);
        self
    }

    pub fn build(self) -> ConversationRuntime {
        ConversationRuntime {
            app_name: self.app_name,
            system_prompt: self.system_prompt,
            store: self.store,
            generator: self.generator,
            before_hooks: self.before_hooks,
            after_hooks: self.after_hooks,
            pipeline: self.pipeline,
            memory: self.memory,
            live: RwLock::new(HashMap::new()),
            current: RwLock::new(HashMap::new()),
        }
    }
}

impl ConversationRuntime {
    pub fn builder(
        app_name: impl Into<String>,
        store: SessionStoreRef,
        generator: Arc<dyn ReplyGenerator>,
    ) -> RuntimeBuilder {
        RuntimeBuilder::new(app_name, store, generator)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Creates a session in the store and opens its live frame
    async fn open_session(
        &self,
        user_id: &str,
        session_id: Option<String>,
    ) -> RuntimeResult<SessionKey> {
        let session = self
            .store
            .create_session(&self.app_name, user_id, session_id)
            .await?;
        let key = session.key.clone();

        self.live
            .write()
            .await
            .insert(key.clone(), Arc::new(Mutex::new(session)));
        info!(session = %key, "Created session");
        Ok(key)
    }

    /// Creates a session and makes it the user's current one
    pub async fn create_session(
        &self,
        user_id: &str,
        session_id: Option<String>,
    ) -> RuntimeResult<SessionKey> {
        let key = self.open_session(user_id, session_id).await?;
        self.current
            .write()
            .await
            .insert(user_id.to_string(), key.clone());
        Ok(key)
    }

    /// The user's current session, if any
    pub async fn current_session(&self, user_id: &str) -> Option<SessionKey> {
        self.current.read().await.get(user_id).cloned()
    }

    /// Returns the user's current session, creating one when there is none
    pub async fn get_or_create_session(&self, user_id: &str) -> RuntimeResult<SessionKey> {
        // Held across creation so concurrent first messages share one session
        let mut current = self.current.write().await;
        if let Some(key) = current.get(user_id) {
            return Ok(key.clone());
        }
        let key = self.open_session(user_id, None).await?;
        current.insert(user_id.to_string(), key.clone());
        Ok(key)
    }

    /// Ends the user's current session, if any, and starts a new one
    pub async fn new_session(&self, user_id: &str) -> RuntimeResult<SessionKey> {
        if let Some(previous) = self.current_session(user_id).await {
            if let Err(e) = self.end_session(&previous).await {
                warn!(session = %previous, error = %e, "Failed to end previous session");
            }
        }
        self.create_session(user_id, None).await
    }

    /// The live frame for `key`, resuming it from the store when this process has none.
    ///
    /// Ended sessions are not resumed.
    async fn live_session(&self, key: &SessionKey) -> RuntimeResult<LiveSession> {
        if let Some(frame) = self.live.read().await.get(key) {
            return Ok(frame.clone());
        }

        let stored = self.store.get_session(key).await?;
        if stored.state == SessionState::Ended {
            return Err(RuntimeError::SessionEnded(key.clone()));
        }
        debug!(session = %key, turns = stored.turns.len(), "Resumed session from store");
        let mut live = self.live.write().await;
        let frame = live
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(stored)));
        Ok(frame.clone())
    }

    async fn fire_after_hooks(&self, context: &TurnContext<'_>, point: CompletionPoint) {
        for hook in &self.after_hooks {
            debug!(hook = hook.name(), point = %point, "Running after-turn hook");
            hook.after_turn(context, point).await;
        }
    }

    /// Runs one user -> agent exchange in the session identified by `key`.
    ///
    /// A generation failure appends nothing and is returned to the caller.
    /// Failures to persist the turns or to commit them to memory are logged.
    #[instrument(skip(self, key, message), fields(session = %key))]
    pub async fn run_turn(&self, key: &SessionKey, message: &str) -> RuntimeResult<TurnReply> {
        let frame = self.live_session(key).await?;
        let mut session = frame.lock().await;
        if session.state == SessionState::Ended {
            return Err(RuntimeError::SessionEnded(key.clone()));
        }

        let invocation_id = new_invocation_id();
        let user_turn = Turn::user(message).with_invocation_id(invocation_id.clone());

        let request = TurnRequest {
            key: &session.key,
            message,
            history: &session.turns,
        };
        let mut memories: Vec<MemorySnippet> = Vec::new();
        for hook in &self.before_hooks {
            memories.extend(hook.before_turn(&request).await);
        }

        let generation = GenerationRequest {
            system_prompt: self.system_prompt.clone(),
            history: session.turns.clone(),
            memories,
            message: message.to_string(),
        };
        let reply = match self.generator.generate(&generation).await.and_then(non_empty_reply) {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Reply generation failed");
                return Err(RuntimeError::Generation(e));
            }
        };

        let agent_turn = Turn::agent(reply.clone())
            .with_author(AGENT_NAME)
            .with_invocation_id(invocation_id);
        let timestamp = agent_turn.timestamp;
        let new_turns = [user_turn, agent_turn];
        for turn in &new_turns {
            session.append(turn.clone())?;
        }

        if let Err(e) = self.store.append_turns(&session.key, &new_turns).await {
            warn!(error = %e, "Failed to persist turns, continuing with the live session");
        }

        if session.state == SessionState::ExchangeComplete {
            let context = TurnContext::from_session(&session);
            self.fire_after_hooks(&context, CompletionPoint::ExchangeComplete)
                .await;
        }

        Ok(TurnReply {
            key: session.key.clone(),
            reply,
            memories_used: generation.memories.len(),
            timestamp,
        })
    }

    /// Runs a turn in the user's current session, creating one if needed
    pub async fn chat(&self, user_id: &str, message: &str) -> RuntimeResult<TurnReply> {
        let key = self.get_or_create_session(user_id).await?;
        self.run_turn(&key, message).await
    }

    /// Marks the session ended and runs the session-end hooks
    pub async fn end_session(&self, key: &SessionKey) -> RuntimeResult<()> {
        self.close_session(key, true).await
    }

    /// Marks the session ended without running any after-turn hook, so nothing is committed
    pub async fn end_session_without_commit(&self, key: &SessionKey) -> RuntimeResult<()> {
        self.close_session(key, false).await
    }

    async fn close_session(&self, key: &SessionKey, run_hooks: bool) -> RuntimeResult<()> {
        let frame = match self.live_session(key).await {
            Ok(frame) => frame,
            Err(RuntimeError::SessionEnded(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut session = frame.lock().await;
        if session.state != SessionState::Ended {
            session.end();
            if let Err(e) = self.store.end_session(key).await {
                warn!(session = %key, error = %e, "Failed to record session end in store");
            }

            if run_hooks {
                let context = TurnContext::from_session(&session);
                self.fire_after_hooks(&context, CompletionPoint::SessionEnded)
                    .await;
            }
            info!(session = %key, committed = run_hooks, "Ended session");
        }
        drop(session);

        {
            let mut current = self.current.write().await;
            if current.get(&key.user_id) == Some(key) {
                current.remove(&key.user_id);
            }
        }
        // Later reads of this session go to the store
        self.live.write().await.remove(key);
        Ok(())
    }

    /// Ends every user's current session, running the session-end hooks.
    ///
    /// Used at shutdown so sessions committed on end are not lost. Failures are
    /// logged and the remaining sessions are still ended.
    pub async fn end_all_sessions(&self) -> usize {
        let keys: Vec<SessionKey> = self.current.read().await.values().cloned().collect();
        let mut ended = 0;
        for key in keys {
            match self.end_session(&key).await {
                Ok(()) => ended += 1,
                Err(e) => warn!(session = %key, error = %e, "Failed to end session at shutdown"),
            }
        }
        info!(ended, "Ended all current sessions");
        ended
    }

    /// Number of sessions this process holds a live frame for
    pub async fn live_session_count(&self) -> usize {
        self.live.read().await.len()
    }

    /// Drops expired sessions from the store
    pub async fn cleanup_expired_sessions(&self) -> RuntimeResult<usize> {
        Ok(self.store.cleanup_expired_sessions().await?)
    }

    /// Commits the live session to memory now, whatever the commit policy
    pub async fn save_session(&self, key: &SessionKey) -> RuntimeResult<CommitReport> {
        let pipeline = self.pipeline.as_ref().ok_or(RuntimeError::MemoryDisabled)?;
        let frame = self.live_session(key).await?;
        let session = frame.lock().await;
        let context = TurnContext::from_session(&session);
        Ok(pipeline.commit_now(&context).await)
    }

    /// Commits the user's current session
    pub async fn save_current(&self, user_id: &str) -> RuntimeResult<CommitReport> {
        let key = self
            .current_session(user_id)
            .await
            .ok_or_else(|| RuntimeError::NoActiveSession(user_id.to_string()))?;
        self.save_session(&key).await
    }

    /// Searches the user's memories
    pub async fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> RuntimeResult<Vec<MemorySnippet>> {
        let index = self.memory.as_ref().ok_or(RuntimeError::MemoryDisabled)?;
        let scope = membot_core::MemoryScope::new(&self.app_name, user_id);
        Ok(index.search(&scope, query, limit).await?)
    }

    /// The session as this process sees it: the live frame if there is one, else the store's copy
    pub async fn session_info(&self, key: &SessionKey) -> RuntimeResult<Session> {
        let frame = self.live.read().await.get(key).cloned();
        if let Some(frame) = frame {
            return Ok(frame.lock().await.clone());
        }
        Ok(self.store.get_session(key).await?)
    }

    pub async fn list_sessions(&self, user_id: &str) -> RuntimeResult<Vec<Session>> {
        Ok(self.store.list_sessions(&self.app_name, user_id).await?)
    }

    /// Commits every stored session of a user, one at a time.
    ///
    /// Sessions this process is executing are committed from their live frame.
    /// Per-session failures are logged and counted.
    pub async fn save_stored_sessions(&self, user_id: &str) -> RuntimeResult<BulkSaveSummary> {
        let pipeline = self.pipeline.as_ref().ok_or(RuntimeError::MemoryDisabled)?;
        let mut summary = BulkSaveSummary::default();

        for listed in self.list_sessions(user_id).await? {
            let session = match self.session_info(&listed.key).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(session = %listed.key, error = %e, "Failed to load session");
                    summary.failed += 1;
                    continue;
                }
            };

            match pipeline.commit_now(&TurnContext::from_session(&session)).await {
                CommitReport::Ingested(_) => summary.saved += 1,
                CommitReport::Skipped(reason) => {
                    debug!(session = %session.key, reason = %reason, "Skipped session");
                    summary.skipped += 1;
                }
                CommitReport::Failed(_) => summary.failed += 1,
            }
        }

        info!(
            user_id,
            saved = summary.saved,
            skipped = summary.skipped,
            failed = summary.failed,
            "Saved stored sessions to memory"
        );
        Ok(summary)
    }

    /// Waits for background memory commits to finish
    pub async fn drain_commits(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.drain().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::testing::{RecordingMemoryIndex, ScriptedGenerator};
    use membot_core::CommitPolicy;

    fn runtime(
        generator: ScriptedGenerator,
        index: Arc<RecordingMemoryIndex>,
        policy: CommitPolicy,
    ) -> ConversationRuntime {
        ConversationRuntime::builder(
            "app",
            Arc::new(InMemorySessionStore::new()),
            Arc::new(generator),
        )
        .memory(index.clone(), CommitPipeline::new(index, policy), 5)
        .build()
    }

    #[tokio::test]
    async fn test_run_turn_appends_exchange_and_commits() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index.clone(), CommitPolicy::EveryExchange);

        let reply = runtime.chat("u1", "hi").await.unwrap();
        assert_eq!(reply.reply, "echo: hi");
        runtime.drain_commits().await;

        let session = runtime.session_info(&reply.key).await.unwrap();
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[1].author, AGENT_NAME);
        assert_eq!(session.turns[0].invocation_id, session.turns[1].invocation_id);
        assert_eq!(index.ingest_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_appends_nothing() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::failing(), index.clone(), CommitPolicy::EveryExchange);

        let key = runtime.create_session("u1", None).await.unwrap();
        let result = runtime.run_turn(&key, "hi").await;
        assert!(matches!(result, Err(RuntimeError::Generation(_))));

        runtime.drain_commits().await;
        assert!(runtime.session_info(&key).await.unwrap().turns.is_empty());
        assert_eq!(index.ingest_count(), 0);
    }

    #[tokio::test]
    async fn test_memories_reach_the_generator() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let generator = Arc::new(ScriptedGenerator::echo());
        let runtime = ConversationRuntime::builder(
            "app",
            Arc::new(InMemorySessionStore::new()),
            generator.clone(),
        )
        .memory(index.clone(), CommitPipeline::new(index.clone(), CommitPolicy::EveryExchange), 5)
        .build();

        runtime.chat("u1", "I love pizza").await.unwrap();
        runtime.drain_commits().await;

        let key = runtime.new_session("u1").await.unwrap();
        let reply = runtime.run_turn(&key, "pizza ideas?").await.unwrap();
        assert_eq!(reply.memories_used, 1);

        let requests = generator.requests();
        assert!(requests[0].memories.is_empty());
        assert!(requests[1].memories[0].content.contains("I love pizza"));
        assert!(requests[1].history.is_empty());
    }

    #[tokio::test]
    async fn test_generator_receives_the_full_history() {
        let generator = Arc::new(ScriptedGenerator::echo());
        let runtime = ConversationRuntime::builder(
            "app",
            Arc::new(InMemorySessionStore::new()),
            generator.clone(),
        )
        .build();

        for i in 0..12 {
            runtime.chat("u1", &format!("message {}", i)).await.unwrap();
        }
        let requests = generator.requests();
        assert_eq!(requests[11].history.len(), 22);
        assert_eq!(requests[11].history[0].text(), "message 0");
    }

    #[tokio::test]
    async fn test_session_end_policy() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index.clone(), CommitPolicy::SessionEnd);

        let reply = runtime.chat("u1", "hi").await.unwrap();
        runtime.chat("u1", "again").await.unwrap();
        runtime.drain_commits().await;
        assert_eq!(index.ingest_count(), 0);

        runtime.end_session(&reply.key).await.unwrap();
        runtime.drain_commits().await;
        let ingested = index.ingested();
        assert_eq!(ingested.len(), 1);
        assert_eq!(ingested[0].turns.len(), 4);

        assert!(matches!(
            runtime.run_turn(&reply.key, "late").await,
            Err(RuntimeError::SessionEnded(_))
        ));
        assert!(runtime.current_session("u1").await.is_none());
    }

    #[tokio::test]
    async fn test_manual_policy_saves_on_request() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index.clone(), CommitPolicy::Manual);

        assert!(matches!(
            runtime.save_current("u1").await,
            Err(RuntimeError::NoActiveSession(_))
        ));

        runtime.chat("u1", "hi").await.unwrap();
        runtime.drain_commits().await;
        assert_eq!(index.ingest_count(), 0);

        assert!(runtime.save_current("u1").await.unwrap().is_ingested());
        assert_eq!(index.ingest_count(), 1);
    }

    #[tokio::test]
    async fn test_runtime_without_memory() {
        let runtime = ConversationRuntime::builder(
            "app",
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ScriptedGenerator::echo()),
        )
        .build();

        assert_eq!(runtime.chat("u1", "hi").await.unwrap().memories_used, 0);
        assert!(matches!(
            runtime.search_memories("u1", "hi", 5).await,
            Err(RuntimeError::MemoryDisabled)
        ));
    }

    #[tokio::test]
    async fn test_ended_sessions_release_live_frames() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let store = Arc::new(
            InMemorySessionStore::new().with_ended_retention(chrono::Duration::seconds(-1)),
        );
        let runtime = ConversationRuntime::builder("app", store, Arc::new(ScriptedGenerator::echo()))
            .memory(index.clone(), CommitPipeline::new(index, CommitPolicy::EveryExchange), 5)
            .build();

        for _ in 0..10 {
            runtime.chat("u1", "hi").await.unwrap();
            runtime.new_session("u1").await.unwrap();
        }
        assert_eq!(runtime.live_session_count().await, 1);

        let current = runtime.current_session("u1").await.unwrap();
        runtime.end_session(&current).await.unwrap();
        assert_eq!(runtime.live_session_count().await, 0);

        assert_eq!(runtime.cleanup_expired_sessions().await.unwrap(), 11);
        assert_eq!(runtime.live_session_count().await, 0);
        runtime.drain_commits().await;
    }

    #[tokio::test]
    async fn test_end_without_commit_skips_session_end_commit() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index.clone(), CommitPolicy::SessionEnd);

        let reply = runtime.chat("u1", "keep this to yourself").await.unwrap();
        runtime.end_session_without_commit(&reply.key).await.unwrap();
        runtime.drain_commits().await;
        assert_eq!(index.ingest_count(), 0);
        assert!(runtime.current_session("u1").await.is_none());

        // Ending again is a no-op and does not commit either
        runtime.end_session(&reply.key).await.unwrap();
        runtime.drain_commits().await;
        assert_eq!(index.ingest_count(), 0);
    }

    #[tokio::test]
    async fn test_end_all_sessions_commits_under_session_end() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index.clone(), CommitPolicy::SessionEnd);

        runtime.chat("u1", "hi").await.unwrap();
        runtime.chat("u2", "hello").await.unwrap();
        assert_eq!(runtime.end_all_sessions().await, 2);
        runtime.drain_commits().await;

        assert_eq!(index.ingested_for("u1").len(), 1);
        assert_eq!(index.ingested_for("u2").len(), 1);
        assert_eq!(runtime.live_session_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_share_a_session() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index, CommitPolicy::Manual);

        let (a, b) = tokio::join!(
            runtime.get_or_create_session("u1"),
            runtime.get_or_create_session("u1")
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(runtime.list_sessions("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_stored_sessions() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let runtime = runtime(ScriptedGenerator::echo(), index.clone(), CommitPolicy::Manual);

        runtime.chat("u1", "first").await.unwrap();
        runtime.new_session("u1").await.unwrap();
        runtime.new_session("u1").await.unwrap();

        let summary = runtime.save_stored_sessions("u1").await.unwrap();
        assert_eq!(
            summary,
            BulkSaveSummary {
                saved: 1,
                skipped: 2,
                failed: 0
            }
        );
    }
}

// The membot-runtime crate drives conversations:
// - Session store trait with in-process and managed adapters
// - Before/after turn extension points
// - Retrieval hook and session-to-memory commit pipeline
// - Conversation runtime and its HTTP surface

// Export session module - Session state machine and stores
pub mod session;
pub use session::{
    InMemorySessionStore, ManagedSessionStore, Session, SessionState, SessionStore,
    SessionStoreError, SessionStoreRef,
};

// Export hooks module - Turn extension points
pub mod hooks;
pub use hooks::{AfterTurnHook, BeforeTurnHook, CompletionPoint, TurnContext, TurnRequest};

// Export commit module - Session-to-memory commit pipeline
pub mod commit;
pub use commit::{CommitHandle, CommitOutcome, CommitPipeline, CommitReport, SkipReason};

// Export retrieval module - Memory retrieval before generation
pub mod retrieval;
pub use retrieval::RetrievalHook;

// Export llm_client module - Reply generation
pub mod llm_client;
pub use llm_client::{GenerationRequest, ModelReplyGenerator, ReplyGenerator};

// Export coordinator module - Conversation runtime
pub mod coordinator;
pub use coordinator::{
    BulkSaveSummary, ConversationRuntime, RuntimeBuilder, RuntimeError, RuntimeResult, TurnReply,
};

// Export bootstrap module - Runtime assembly from configuration
pub mod bootstrap;
pub use bootstrap::{assemble, build_runtime, RuntimeParts};

pub mod http_server;
mod web_ui;

// Fakes for tests and local experiments
pub mod testing;

//! Extension points the conversation runtime invokes around every turn.
//!
//! Hooks receive typed views borrowed from the runtime's live execution frame.
//! Nothing here reads from the session store.

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use membot_core::{CommitPolicy, SessionKey, SessionSnapshot, Turn};
use membot_memory::MemorySnippet;

use crate::session::{Session, SessionState};

/// The moment at which after-turn hooks are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPoint {
    /// A user -> agent round trip just finished
    ExchangeComplete,
    /// The session was ended and accepts no further turns
    SessionEnded,
    /// The user asked for the session to be saved
    Explicit,
}

impl CompletionPoint {
    /// Whether `policy` commits at this point. Explicit saves always do.
    pub fn fires_under(self, policy: CommitPolicy) -> bool {
        matches!(
            (policy, self),
            (_, CompletionPoint::Explicit)
                | (CommitPolicy::EveryExchange, CompletionPoint::ExchangeComplete)
                | (CommitPolicy::SessionEnd, CompletionPoint::SessionEnded)
        )
    }
}

impl fmt::Display for CompletionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompletionPoint::ExchangeComplete => "exchange_complete",
            CompletionPoint::SessionEnded => "session_ended",
            CompletionPoint::Explicit => "explicit",
        };
        f.write_str(name)
    }
}

/// The live state of the session being executed, as handed to after-turn hooks
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub key: &'a SessionKey,
    pub turns: &'a [Turn],
    pub state: SessionState,
}

impl<'a> TurnContext<'a> {
    pub fn from_session(session: &'a Session) -> Self {
        Self {
            key: &session.key,
            turns: &session.turns,
            state: session.state,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.key.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    /// Owned copy of the live turns, for work that outlives the turn
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(self.key.clone(), self.turns.to_vec())
    }
}

/// What before-turn hooks see of the turn about to be generated
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub key: &'a SessionKey,
    /// The latest user message
    pub message: &'a str,
    /// Turns preceding the message
    pub history: &'a [Turn],
}

/// Runs before reply generation and contributes context to it
#[async_trait]
pub trait BeforeTurnHook: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Must not fail: an empty list is a normal outcome
    async fn before_turn(&self, request: &TurnRequest<'_>) -> Vec<MemorySnippet>;
}

/// Runs after the runtime reaches a completion point
#[async_trait]
pub trait AfterTurnHook: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Must return promptly; long-running work belongs on a background task
    async fn after_turn(&self, context: &TurnContext<'_>, point: CompletionPoint);
}

pub type BeforeTurnHookRef = Arc<dyn BeforeTurnHook>;
pub type AfterTurnHookRef = Arc<dyn AfterTurnHook>;

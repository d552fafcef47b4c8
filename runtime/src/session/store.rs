use std::error::Error;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use membot_core::{Role, SessionKey, SessionSnapshot, Turn};
use serde::{Deserialize, Serialize};

/// Error type for session store operations
#[derive(Debug)]
pub enum SessionStoreError {
    /// Session not found
    NotFound(String),
    /// The session was ended and accepts no further turns
    Ended(String),
    /// A turn older than the last one was appended
    OutOfOrder(String),
    /// Error occurred during a store operation
    StorageError(String),
    /// The managed session service answered with an error status
    Http { status_code: u16, message: String },
}

impl Display for SessionStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStoreError::NotFound(id) => write!(f, "Session not found: {}", id),
            SessionStoreError::Ended(id) => write!(f, "Session already ended: {}", id),
            SessionStoreError::OutOfOrder(id) => write!(f, "Out-of-order turn for session: {}", id),
            SessionStoreError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            SessionStoreError::Http {
                status_code,
                message,
            } => write!(f, "Session service error: {} - {}", status_code, message),
        }
    }
}

impl Error for SessionStoreError {}

impl From<reqwest::Error> for SessionStoreError {
    fn from(e: reqwest::Error) -> Self {
        SessionStoreError::StorageError(e.to_string())
    }
}

/// Lifecycle of a session.
///
/// `Active` accepts turns; `ExchangeComplete` means the last turn closed a
/// user -> agent round trip and the session is eligible for commit; `Ended`
/// accepts nothing and may be garbage-collected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    ExchangeComplete,
    Ended,
}

/// Session data structure
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    /// Turns in append order
    pub turns: Vec<Turn>,
    pub state: SessionState,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last time the session was accessed or modified
    pub updated_at: DateTime<Utc>,
    /// Optional time when the session expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new, empty session
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            turns: Vec::new(),
            state: SessionState::Active,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.key.session_id
    }

    /// Append a turn, keeping chronological order and advancing the state machine
    pub fn append(&mut self, turn: Turn) -> Result<(), SessionStoreError> {
        if self.state == SessionState::Ended {
            return Err(SessionStoreError::Ended(self.key.session_id.clone()));
        }
        if let Some(last) = self.turns.last() {
            if turn.timestamp < last.timestamp {
                return Err(SessionStoreError::OutOfOrder(self.key.session_id.clone()));
            }
        }

        self.state = match turn.role {
            Role::User => SessionState::Active,
            Role::Agent if self.turns.iter().any(|t| t.role == Role::User) => {
                SessionState::ExchangeComplete
            }
            Role::Agent => SessionState::Active,
        };
        self.turns.push(turn);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the session as ended
    pub fn end(&mut self) {
        self.state = SessionState::Ended;
        self.updated_at = Utc::now();
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Utc::now() > expires_at
        } else {
            false
        }
    }

    /// Set the expiration time for this session
    pub fn set_expiry(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    /// Owned copy of the turns for hand-off
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(self.key.clone(), self.turns.clone())
    }

    /// The last `n` turns, oldest first
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

/// Trait defining the interface for session stores
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Create a new session. Stores that assign their own identifiers reject `session_id`.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<Session, SessionStoreError>;

    /// Get a session by key. The read may lag behind recent writes.
    async fn get_session(&self, key: &SessionKey) -> Result<Session, SessionStoreError>;

    /// Persist turns appended to the live session
    async fn append_turns(&self, key: &SessionKey, turns: &[Turn]) -> Result<(), SessionStoreError>;

    /// Record that the session accepts no further turns
    async fn end_session(&self, key: &SessionKey) -> Result<(), SessionStoreError>;

    /// Delete a session by key
    async fn delete_session(&self, key: &SessionKey) -> Result<(), SessionStoreError>;

    /// List a user's sessions. Listings may omit turns; use `get_session` for them.
    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionStoreError>;

    /// Delete expired sessions
    async fn cleanup_expired_sessions(&self) -> Result<usize, SessionStoreError> {
        Ok(0)
    }
}

/// Type alias for Arc-wrapped SessionStore trait objects
pub type SessionStoreRef = Arc<dyn SessionStore>;

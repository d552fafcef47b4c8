use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use membot_core::{SessionKey, Turn};
use tracing::{debug, warn};

use crate::session::store::{Session, SessionStore, SessionStoreError};

/// How long an ended session stays readable before cleanup may drop it
const DEFAULT_ENDED_RETENTION_MINUTES: i64 = 60;

/// In-memory implementation of SessionStore
#[derive(Debug)]
pub struct InMemorySessionStore {
    /// Thread-safe storage of sessions
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
    ended_retention: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    /// Create a new InMemorySessionStore
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ended_retention: Duration::minutes(DEFAULT_ENDED_RETENTION_MINUTES),
        }
    }

    /// Keep ended sessions for `retention` before they count as expired
    pub fn with_ended_retention(mut self, retention: Duration) -> Self {
        self.ended_retention = retention;
        self
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<Session, SessionStoreError> {
        let session_id =
            session_id.unwrap_or_else(|| format!("session_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));
        let key = SessionKey::new(app_name, user_id, session_id);
        let session = Session::new(key.clone());

        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        if sessions.contains_key(&key) {
            return Err(SessionStoreError::StorageError(format!(
                "Session already exists: {}",
                key
            )));
        }

        sessions.insert(key, session.clone());
        debug!("Created session: {}", session.key);

        Ok(session)
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Session, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        let session = sessions
            .get(key)
            .cloned()
            .ok_or_else(|| SessionStoreError::NotFound(key.to_string()))?;

        // Check if session has expired
        if session.is_expired() {
            return Err(SessionStoreError::NotFound(format!("Session expired: {}", key)));
        }

        Ok(session)
    }

    async fn append_turns(&self, key: &SessionKey, turns: &[Turn]) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        let session = sessions
            .get_mut(key)
            .ok_or_else(|| SessionStoreError::NotFound(key.to_string()))?;

        for turn in turns {
            session.append(turn.clone())?;
        }
        Ok(())
    }

    async fn end_session(&self, key: &SessionKey) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        let session = sessions
            .get_mut(key)
            .ok_or_else(|| SessionStoreError::NotFound(key.to_string()))?;

        session.end();
        session.set_expiry(Utc::now() + self.ended_retention);
        debug!("Ended session: {}", key);
        Ok(())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        if sessions.remove(key).is_none() {
            return Err(SessionStoreError::NotFound(key.to_string()));
        }

        debug!("Deleted session: {}", key);
        Ok(())
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionStoreError> {
        let sessions = self.sessions.read().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire read lock: {}", e))
        })?;

        let mut active_sessions: Vec<Session> = sessions
            .values()
            .filter(|s| s.key.app_name == app_name && s.key.user_id == user_id)
            .filter(|s| !s.is_expired())
            .cloned()
            .collect();
        active_sessions.sort_by_key(|s| s.created_at);

        debug!("Listed {} active sessions", active_sessions.len());
        Ok(active_sessions)
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(|e| {
            SessionStoreError::StorageError(format!("Failed to acquire write lock: {}", e))
        })?;

        let expired: Vec<SessionKey> = sessions
            .iter()
            .filter(|(_, session)| session.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            sessions.remove(&key);
            debug!("Cleaned up expired session: {}", key);
        }

        if count > 0 {
            warn!("Cleaned up {} expired sessions", count);
        }

        Ok(count)
    }
}

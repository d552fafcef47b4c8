use async_trait::async_trait;
use chrono::{DateTime, Utc};
use membot_core::{ManagedTarget, Part, Role, SessionKey, Turn};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::store::{Session, SessionStore, SessionStoreError};

/// Page size used when listing events and sessions
const PAGE_SIZE: usize = 100;

/// Session store backed by the managed sessions API of a runtime instance.
///
/// Reads go through the service and may lag behind appends issued moments
/// earlier. The conversation runtime never relies on them for committing.
#[derive(Debug, Clone)]
pub struct ManagedSessionStore {
    client: Client,
    target: ManagedTarget,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    user_id: &'a str,
    session_state: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct Operation {
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    name: String,
    user_id: Option<String>,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
    expire_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListSessionsResponse {
    #[serde(default)]
    sessions: Vec<RemoteSession>,
    next_page_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SessionEvent {
    #[serde(default)]
    author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<EventContent>,
    #[serde(default)]
    invocation_id: String,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug)]
struct EventContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListEventsResponse {
    #[serde(default)]
    session_events: Vec<SessionEvent>,
    next_page_token: Option<String>,
}

impl From<&Turn> for SessionEvent {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Agent => "model",
        };
        SessionEvent {
            author: turn.author.clone(),
            content: Some(EventContent {
                role: Some(role.to_string()),
                parts: turn.parts.clone(),
            }),
            invocation_id: turn.invocation_id.clone(),
            timestamp: Some(turn.timestamp),
        }
    }
}

impl SessionEvent {
    /// Events without content (state deltas, tool bookkeeping) carry no turn
    fn into_turn(self) -> Option<Turn> {
        let content = self.content?;
        if content.parts.is_empty() {
            return None;
        }
        let role = match content.role.as_deref() {
            Some("user") => Role::User,
            Some(_) => Role::Agent,
            None if self.author == "user" => Role::User,
            None => Role::Agent,
        };
        let mut turn = Turn::new(role, self.author, content.parts);
        if !self.invocation_id.is_empty() {
            turn.invocation_id = self.invocation_id;
        }
        if let Some(timestamp) = self.timestamp {
            turn.timestamp = timestamp;
        }
        Some(turn)
    }
}

/// Extracts the session id from an operation or session resource name
fn session_id_from_name(name: &str) -> Option<String> {
    let (_, rest) = name.split_once("sessions/")?;
    let id = rest.split('/').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

impl ManagedSessionStore {
    pub fn new(target: ManagedTarget) -> Self {
        Self {
            client: Client::new(),
            target,
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.target.engine_url())
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/{}", self.sessions_url(), session_id)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.target.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, key: Option<&SessionKey>) -> Result<Response, SessionStoreError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let what = key.map(ToString::to_string).unwrap_or_default();
            return Err(SessionStoreError::NotFound(what));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SessionStoreError::Http {
                status_code: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, SessionStoreError> {
        response
            .json::<T>()
            .await
            .map_err(|e| SessionStoreError::StorageError(format!("Failed to parse response: {}", e)))
    }

    fn session_from_remote(app_name: &str, remote: RemoteSession, turns: Vec<Turn>) -> Option<Session> {
        let session_id = session_id_from_name(&remote.name)?;
        let user_id = remote.user_id.unwrap_or_default();
        let mut session = Session::new(SessionKey::new(app_name, user_id, session_id));
        if let Some(created) = remote.create_time {
            session.created_at = created;
        }
        if let Some(updated) = remote.update_time {
            session.updated_at = updated;
        }
        session.expires_at = remote.expire_time;
        for turn in turns {
            if let Err(e) = session.append(turn) {
                warn!(session_id = %session.key.session_id, error = %e, "Skipping stored event");
            }
        }
        Some(session)
    }

    async fn list_events(&self, key: &SessionKey) -> Result<Vec<Turn>, SessionStoreError> {
        let url = format!("{}/events", self.session_url(&key.session_id));
        let mut turns = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self
                .client
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token)]);
            }
            let page: ListEventsResponse = Self::json(self.send(builder, Some(key)).await?).await?;
            turns.extend(page.session_events.into_iter().filter_map(SessionEvent::into_turn));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(turns)
    }
}

#[async_trait]
impl SessionStore for ManagedSessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<Session, SessionStoreError> {
        if session_id.is_some() {
            return Err(SessionStoreError::StorageError(
                "The managed session service assigns session ids; a caller-supplied id is not supported"
                    .to_string(),
            ));
        }

        let request = CreateSessionRequest {
            user_id,
            session_state: serde_json::Map::new(),
        };
        let builder = self.client.post(self.sessions_url()).json(&request);
        let operation: Operation = Self::json(self.send(builder, None).await?).await?;
        let session_id = session_id_from_name(&operation.name).ok_or_else(|| {
            SessionStoreError::StorageError(format!(
                "No session id in operation name: {}",
                operation.name
            ))
        })?;

        debug!(session_id = %session_id, user_id, "Created managed session");
        Ok(Session::new(SessionKey::new(app_name, user_id, session_id)))
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Session, SessionStoreError> {
        let builder = self.client.get(self.session_url(&key.session_id));
        let remote: RemoteSession = Self::json(self.send(builder, Some(key)).await?).await?;
        if remote.user_id.as_deref() != Some(key.user_id.as_str()) {
            return Err(SessionStoreError::NotFound(key.to_string()));
        }

        let turns = self.list_events(key).await?;
        Self::session_from_remote(&key.app_name, remote, turns)
            .ok_or_else(|| SessionStoreError::NotFound(key.to_string()))
    }

    async fn append_turns(&self, key: &SessionKey, turns: &[Turn]) -> Result<(), SessionStoreError> {
        let url = format!("{}:appendEvent", self.session_url(&key.session_id));
        for turn in turns {
            let builder = self.client.post(&url).json(&SessionEvent::from(turn));
            self.send(builder, Some(key)).await?;
        }
        debug!(session = %key, count = turns.len(), "Appended events");
        Ok(())
    }

    async fn end_session(&self, key: &SessionKey) -> Result<(), SessionStoreError> {
        // The service has no explicit end; the session simply stops receiving events.
        debug!(session = %key, "Managed session ended");
        Ok(())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<(), SessionStoreError> {
        let builder = self.client.delete(self.session_url(&key.session_id));
        self.send(builder, Some(key)).await?;
        debug!(session = %key, "Deleted managed session");
        Ok(())
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionStoreError> {
        let filter = format!("user_id=\"{}\"", user_id);
        let mut sessions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self
                .client
                .get(self.sessions_url())
                .query(&[("filter", filter.as_str())])
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token)]);
            }
            let page: ListSessionsResponse = Self::json(self.send(builder, None).await?).await?;
            sessions.extend(
                page.sessions
                    .into_iter()
                    .filter(|s| s.user_id.as_deref() == Some(user_id))
                    .filter_map(|s| Self::session_from_remote(app_name, s, Vec::new())),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ManagedSessionStore {
        ManagedSessionStore::new(ManagedTarget {
            project_id: "proj".to_string(),
            location: "us-central1".to_string(),
            engine_id: "42".to_string(),
            access_token: Some("token".to_string()),
        })
    }

    #[test]
    fn test_session_urls() {
        let store = store();
        assert_eq!(
            store.session_url("123"),
            "https://us-central1-aiplatform.googleapis.com/v1beta1/projects/proj/locations/us-central1/reasoningEngines/42/sessions/123"
        );
    }

    #[test]
    fn test_session_id_from_name() {
        assert_eq!(
            session_id_from_name("projects/p/locations/l/reasoningEngines/42/sessions/987/operations/1"),
            Some("987".to_string())
        );
        assert_eq!(
            session_id_from_name("projects/p/locations/l/reasoningEngines/42/sessions/987"),
            Some("987".to_string())
        );
        assert_eq!(session_id_from_name("projects/p/operations/1"), None);
    }

    #[tokio::test]
    async fn test_caller_supplied_id_is_rejected() {
        let result = store()
            .create_session("app", "user", Some("mine".to_string()))
            .await;
        assert!(matches!(result, Err(SessionStoreError::StorageError(_))));
    }

    #[test]
    fn test_turn_to_event() {
        let turn = Turn::agent("hello").with_invocation_id("e-1");
        let event = serde_json::to_value(SessionEvent::from(&turn)).unwrap();
        assert_eq!(event["author"], "agent");
        assert_eq!(event["invocationId"], "e-1");
        assert_eq!(
            event["content"],
            json!({"role": "model", "parts": [{"text": "hello"}]})
        );
    }

    #[test]
    fn test_events_to_session_keep_order() {
        let page: ListEventsResponse = serde_json::from_value(json!({
            "sessionEvents": [
                {"author": "user", "invocationId": "e-1", "timestamp": "2025-01-01T00:00:00Z",
                 "content": {"role": "user", "parts": [{"text": "hi"}]}},
                {"author": "memory_assistant", "invocationId": "e-1", "timestamp": "2025-01-01T00:00:01Z",
                 "content": {"role": "model", "parts": [{"text": "hello"}]}},
                {"author": "memory_assistant", "invocationId": "e-1", "timestamp": "2025-01-01T00:00:02Z"}
            ]
        }))
        .unwrap();
        let turns: Vec<Turn> = page
            .session_events
            .into_iter()
            .filter_map(SessionEvent::into_turn)
            .collect();
        assert_eq!(turns.len(), 2);

        let remote: RemoteSession = serde_json::from_value(json!({
            "name": "projects/p/locations/l/reasoningEngines/42/sessions/987",
            "userId": "u1",
            "createTime": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        let session = ManagedSessionStore::session_from_remote("app", remote, turns).unwrap();
        assert_eq!(session.key, SessionKey::new("app", "u1", "987"));
        assert_eq!(session.turns[0].role, Role::User);
        assert_eq!(session.turns[1].text(), "hello");
        assert_eq!(session.state, crate::session::SessionState::ExchangeComplete);
    }
}

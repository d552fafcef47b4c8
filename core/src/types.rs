use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// The managed backends and the generative API spell this `model` or `assistant`.
    #[serde(alias = "model", alias = "assistant")]
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque piece of turn content: text or a structured payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            data: None,
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            text: None,
            data: Some(data),
        }
    }
}

/// One role-tagged message unit within a session.
///
/// Turns are append-only; nothing in the workspace reorders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
    /// Name of the producer (`user` or the agent's name)
    pub author: String,
    /// Both turns of one exchange share an invocation id
    pub invocation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, author: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            author: author.into(),
            invocation_id: new_invocation_id(),
            timestamp: Utc::now(),
        }
    }

    /// A user turn holding a single text part
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, "user", vec![Part::text(text)])
    }

    /// An agent turn holding a single text part
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, "agent", vec![Part::text(text)])
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    /// Concatenated text parts; structured parts are skipped
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Generates an invocation id in the `e-<uuid>` form used by the managed runtime
pub fn new_invocation_id() -> String {
    format!("e-{}", uuid::Uuid::new_v4())
}

/// Identifies a session: `(application_name, user_id, session_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    pub fn scope(&self) -> MemoryScope {
        MemoryScope::new(&self.app_name, &self.user_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// Partition of the memory index. Writes and reads never cross scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryScope {
    pub app_name: String,
    pub user_id: String,
}

impl MemoryScope {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
        }
    }
}

/// Owned copy of a session's turns handed to the memory index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub turns: Vec<Turn>,
}

impl SessionSnapshot {
    pub fn new(key: SessionKey, turns: Vec<Turn>) -> Self {
        Self { key, turns }
    }

    /// At least one user -> agent round trip
    pub fn is_complete_exchange(&self) -> bool {
        self.turns.len() >= 2
    }

    pub fn scope(&self) -> MemoryScope {
        self.key.scope()
    }

    /// `role: text` lines in append order
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.text()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// Wire types for the generateContent API

/// Request body for `generateContent`
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// Content structure for requests and responses
#[derive(Serialize, Clone, Debug, Deserialize, PartialEq)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Content {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart {
                text: Some(text.into()),
            }],
            role: Some(role.to_string()),
        }
    }

    /// Converts a turn to API content; agent turns use the `model` role
    pub fn from_turn(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Agent => "model",
        };
        Self {
            parts: turn
                .parts
                .iter()
                .map(|p| ContentPart {
                    text: p
                        .text
                        .clone()
                        .or_else(|| p.data.as_ref().map(|d| d.to_string())),
                })
                .collect(),
            role: Some(role.to_string()),
        }
    }
}

#[derive(Serialize, Clone, Debug, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Generation configuration options
#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
}

/// Response from `generateContent`
#[derive(Deserialize, Debug, Serialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Serialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_accepts_backend_spellings() {
        let roles: Vec<Role> =
            serde_json::from_str(r#"["user", "agent", "model", "assistant"]"#).unwrap();
        assert_eq!(roles, vec![Role::User, Role::Agent, Role::Agent, Role::Agent]);
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"agent\"");
    }

    #[test]
    fn test_turn_text_skips_structured_parts() {
        let turn = Turn::new(
            Role::Agent,
            "memory_assistant",
            vec![
                Part::text("first"),
                Part::data(serde_json::json!({"k": 1})),
                Part::text("second"),
            ],
        );
        assert_eq!(turn.text(), "first\nsecond");
    }

    #[test]
    fn test_snapshot_exchange_and_transcript() {
        let key = SessionKey::new("app", "u1", "s1");
        let partial = SessionSnapshot::new(key.clone(), vec![Turn::user("hi")]);
        assert!(!partial.is_complete_exchange());

        let full = SessionSnapshot::new(key, vec![Turn::user("hi"), Turn::agent("hello")]);
        assert!(full.is_complete_exchange());
        assert_eq!(full.transcript(), "user: hi\nagent: hello");
        assert_eq!(full.scope(), MemoryScope::new("app", "u1"));
    }

    #[test]
    fn test_content_from_turn_uses_model_role() {
        let content = Content::from_turn(&Turn::agent("hello"));
        assert_eq!(content.role.as_deref(), Some("model"));
        assert_eq!(content.parts[0].text.as_deref(), Some("hello"));
    }
}

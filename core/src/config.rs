use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_APP_NAME: &str = "adk-memory-bot";
pub const DEFAULT_USER_ID: &str = "user_123";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with memory across conversations.

Instructions:
- Relevant context from previous conversations is provided before the user's message
- Naturally reference past conversations when relevant to provide personalized responses
- Build upon previous knowledge about the user to create continuity
- If no relevant memories are provided, focus on the current conversation
- Keep responses concise and focused on the user's needs
- When referencing memories, do so naturally without mentioning a memory search";

/// When the commit pipeline hands a session to the memory index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// After every completed user -> agent exchange
    #[default]
    EveryExchange,
    /// Only when the session is ended
    SessionEnd,
    /// Only on an explicit save
    Manual,
}

impl FromStr for CommitPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "every_exchange" | "exchange" => Ok(Self::EveryExchange),
            "session_end" | "end" => Ok(Self::SessionEnd),
            "manual" => Ok(Self::Manual),
            other => Err(ConfigError::Invalid(format!("unknown commit policy '{}'", other))),
        }
    }
}

impl fmt::Display for CommitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EveryExchange => "every_exchange",
            Self::SessionEnd => "session_end",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Application configuration.
///
/// Values come from defaults, then an optional TOML file, then `.env` and the
/// process environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub app_name: String,
    pub default_user_id: String,
    pub use_managed_backend: bool,
    pub project_id: Option<String>,
    pub location: String,
    pub agent_engine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model_name: String,
    pub system_prompt: String,
    pub commit_policy: CommitPolicy,
    pub memory_top_k: usize,
    pub http_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            default_user_id: DEFAULT_USER_ID.to_string(),
            use_managed_backend: false,
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            agent_engine_id: None,
            access_token: None,
            api_key: None,
            model_name: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            commit_policy: CommitPolicy::default(),
            memory_top_k: 5,
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
        }
    }
}

/// Which implementation backs the session store and memory index
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    /// In-process adapters, for development and tests
    Local,
    /// The managed agent runtime instance
    Managed(ManagedTarget),
}

/// Coordinates of a managed runtime instance
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedTarget {
    pub project_id: String,
    pub location: String,
    pub engine_id: String,
    pub access_token: Option<String>,
}

impl ManagedTarget {
    pub fn api_host(&self) -> String {
        format!("https://{}-aiplatform.googleapis.com", self.location)
    }

    /// `https://{location}-aiplatform.googleapis.com/v1beta1/projects/{p}/locations/{l}`
    pub fn base_url(&self) -> String {
        format!(
            "{}/v1beta1/projects/{}/locations/{}",
            self.api_host(),
            self.project_id,
            self.location
        )
    }

    /// Full resource name of the runtime instance
    pub fn engine_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/reasoningEngines/{}",
            self.project_id, self.location, self.engine_id
        )
    }

    pub fn engine_url(&self) -> String {
        format!("{}/reasoningEngines/{}", self.base_url(), self.engine_id)
    }
}

/// Accepts a bare id or a `projects/.../reasoningEngines/{id}[/...]` resource name
pub fn parse_engine_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if !raw.contains('/') {
        return Some(raw.to_string());
    }
    let segments: Vec<&str> = raw.split('/').collect();
    segments
        .iter()
        .position(|s| *s == "reasoningEngines" || *s == "agentEngines")
        .and_then(|i| segments.get(i + 1))
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

impl AppConfig {
    /// Loads configuration from a file if it exists, otherwise returns the default config
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!(path = %path.display(), "Loaded configuration file");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves configuration to a file
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Full load: file (explicit path or the default location), `.env`, environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => match get_default_config_file() {
                Some(p) => Self::load_from_file(&p)?,
                None => Self::default(),
            },
        };

        if let Ok(env_path) = dotenvy::dotenv() {
            debug!(path = %env_path.display(), "Loaded .env file");
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from environment-style variables
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = get("DEFAULT_USER_ID") {
            self.default_user_id = v;
        }
        if let Some(v) = get("GOOGLE_GENAI_USE_VERTEXAI") {
            self.use_managed_backend = truthy(&v);
        }
        if let Some(v) = get("GOOGLE_CLOUD_PROJECT") {
            self.project_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLOUD_LOCATION") {
            self.location = v;
        }
        if let Some(v) = get("AGENT_ENGINE_ID") {
            self.agent_engine_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")) {
            self.api_key = Some(v);
        }
        if let Some(v) = get("MEMBOT_MODEL") {
            self.model_name = v;
        }
        if let Some(v) = get("MEMBOT_SYSTEM_PROMPT") {
            self.system_prompt = v;
        }
        if let Some(v) = get("MEMBOT_COMMIT_POLICY") {
            self.commit_policy = v.parse()?;
        }
        if let Some(v) = get("MEMBOT_MEMORY_TOP_K") {
            self.memory_top_k = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MEMBOT_MEMORY_TOP_K: '{}'", v)))?;
        }
        if let Some(v) = get("MEMBOT_HTTP_ADDR") {
            self.http_addr = v;
        }
        Ok(())
    }

    /// Resolves the backend. A managed backend with missing identifiers is an error,
    /// never a silent fallback to the local adapters.
    pub fn backend(&self) -> ConfigResult<Backend> {
        if !self.use_managed_backend {
            return Ok(Backend::Local);
        }
        let project_id = self
            .project_id
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or(ConfigError::MissingIdentifier("GOOGLE_CLOUD_PROJECT"))?;
        let engine_id = self
            .agent_engine_id
            .as_deref()
            .and_then(parse_engine_id)
            .ok_or(ConfigError::MissingIdentifier("AGENT_ENGINE_ID"))?;

        Ok(Backend::Managed(ManagedTarget {
            project_id,
            location: self.location.clone(),
            engine_id,
            access_token: self.access_token.clone(),
        }))
    }

    /// Target used by provisioning, which runs before an engine id exists
    pub fn provisioning_target(&self) -> ConfigResult<ManagedTarget> {
        let project_id = self
            .project_id
            .clone()
            .ok_or(ConfigError::MissingIdentifier("GOOGLE_CLOUD_PROJECT"))?;
        Ok(ManagedTarget {
            project_id,
            location: self.location.clone(),
            engine_id: String::new(),
            access_token: self.access_token.clone(),
        })
    }
}

/// Default config file: `<config dir>/membot/config.toml`
pub fn get_default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("membot").join("config.toml"))
}

/// Renders the `.env` written after provisioning a runtime instance
pub fn render_env_file(config: &AppConfig, engine_name: &str, engine_id: &str) -> String {
    format!(
        "# Google Cloud / Vertex AI Configuration
GOOGLE_GENAI_USE_VERTEXAI=TRUE
GOOGLE_CLOUD_PROJECT={}
GOOGLE_CLOUD_LOCATION={}

# Agent Engine Configuration
AGENT_ENGINE_ID={}
AGENT_ENGINE_NAME={}

# Application Configuration
APP_NAME={}
DEFAULT_USER_ID={}
",
        config.project_id.as_deref().unwrap_or_default(),
        config.location,
        engine_id,
        engine_name,
        config.app_name,
        config.default_user_id,
    )
}

/// Writes the provisioning `.env` file
pub fn write_env_file(
    path: &Path,
    config: &AppConfig,
    engine_name: &str,
    engine_id: &str,
) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, render_env_file(config, engine_name, engine_id))?;
    Ok(())
}

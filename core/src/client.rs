use reqwest::Client;
use tracing::debug;

use crate::config::{AppConfig, Backend, ManagedTarget};
use crate::errors::{ModelError, ModelResult};
use crate::types::*;

/// Where `generateContent` requests are sent
#[derive(Debug, Clone)]
enum Endpoint {
    /// Public Generative Language API, authenticated with an API key
    Public { api_key: String },
    /// Managed endpoint in the configured project, authenticated with a bearer token
    Managed(ManagedTarget),
}

/// Client for the `generateContent` API
#[derive(Debug, Clone)]
pub struct ModelClient {
    client: Client,
    endpoint: Endpoint,
    model_name: String,
}

impl ModelClient {
    /// Create a client from the application config
    pub fn new(config: &AppConfig) -> ModelResult<Self> {
        let backend = config
            .backend()
            .map_err(|e| ModelError::ConfigError(e.to_string()))?;

        let endpoint = match backend {
            Backend::Managed(target) => Endpoint::Managed(target),
            Backend::Local => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    ModelError::ConfigError(
                        "GEMINI_API_KEY is required when the managed backend is disabled"
                            .to_string(),
                    )
                })?;
                Endpoint::Public { api_key }
            }
        };

        Ok(Self {
            client: Client::new(),
            endpoint,
            model_name: config.model_name.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn url(&self) -> String {
        match &self.endpoint {
            Endpoint::Public { api_key } => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
                self.model_name, api_key
            ),
            Endpoint::Managed(target) => format!(
                "{}/publishers/google/models/{}:generateContent",
                target.base_url(),
                self.model_name
            ),
        }
    }

    /// Generate content
    pub async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> ModelResult<GenerateContentResponse> {
        let mut builder = self.client.post(self.url()).json(&request);
        if let Endpoint::Managed(target) = &self.endpoint {
            if let Some(token) = &target.access_token {
                builder = builder.bearer_auth(token);
            }
        }

        debug!(model = %self.model_name, contents = request.contents.len(), "Sending generateContent request");
        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::RequestError(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.map_err(|e| {
                ModelError::ResponseError(format!("Failed to read error response: {}", e))
            })?;

            return Err(ModelError::HttpError {
                status_code: status.as_u16(),
                message: format!("API request failed: {}", error_body),
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| ModelError::ResponseError(format!("Failed to parse response: {}", e)))
    }

    /// Extracts the text of the first candidate
    pub fn extract_text_from_response(response: &GenerateContentResponse) -> ModelResult<String> {
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| ModelError::ResponseError("No candidates in response".to_string()))?;

        let content = candidate
            .content
            .as_ref()
            .ok_or_else(|| ModelError::ResponseError("No content in candidate".to_string()))?;

        let text = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ModelError::ResponseError("No text in content".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_backend_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(
            ModelClient::new(&config),
            Err(ModelError::ConfigError(_))
        ));
    }

    #[test]
    fn test_managed_url() {
        let mut config = AppConfig::default();
        config.use_managed_backend = true;
        config.project_id = Some("proj".to_string());
        config.agent_engine_id = Some("1".to_string());

        let client = ModelClient::new(&config).unwrap();
        assert_eq!(
            client.url(),
            "https://us-central1-aiplatform.googleapis.com/v1beta1/projects/proj/locations/us-central1/publishers/google/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_extract_text() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(ModelClient::extract_text_from_response(&response).unwrap(), "Hello");

        let empty: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(ModelClient::extract_text_from_response(&empty).is_err());
    }
}

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use membot_core::config::parse_engine_id;
use membot_core::ManagedTarget;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLLS: u32 = 60;

/// A managed runtime instance (reasoning engine)
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Engine {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub create_time: Option<DateTime<Utc>>,
}

impl Engine {
    pub fn id(&self) -> Option<String> {
        parse_engine_id(&self.name)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateEngineRequest<'a> {
    display_name: &'a str,
}

#[derive(Deserialize, Debug)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<serde_json::Value>,
    response: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListEnginesResponse {
    #[serde(default)]
    reasoning_engines: Vec<Engine>,
    next_page_token: Option<String>,
}

/// Client for creating and listing runtime instances in a project
pub struct EngineAdmin {
    client: Client,
    target: ManagedTarget,
}

/// Engine resource name from a create operation name
fn engine_name_from_operation(operation: &str) -> Option<String> {
    let (engine, _) = operation.split_once("/operations/")?;
    parse_engine_id(engine).map(|_| engine.to_string())
}

impl EngineAdmin {
    pub fn new(target: ManagedTarget) -> Self {
        Self {
            client: Client::new(),
            target,
        }
    }

    fn engines_url(&self) -> String {
        format!("{}/reasoningEngines", self.target.base_url())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.target.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .context("Failed to reach the Vertex AI API")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Vertex AI API returned {}: {}", status, body);
        }
        response
            .json::<T>()
            .await
            .context("Failed to parse Vertex AI API response")
    }

    /// Creates an instance and waits for it to become available.
    /// Returns `(resource name, id)`.
    pub async fn create_engine(&self, display_name: &str) -> Result<(String, String)> {
        let request = CreateEngineRequest { display_name };
        let mut operation: Operation = self
            .send(self.client.post(self.engines_url()).json(&request))
            .await?;
        info!(operation = %operation.name, "Create request accepted");

        let engine_name = engine_name_from_operation(&operation.name)
            .ok_or_else(|| anyhow!("Unexpected operation name: {}", operation.name))?;

        let operation_url = format!("{}/v1beta1/{}", self.target.api_host(), operation.name);
        let mut polls = 0;
        while !operation.done {
            if polls >= MAX_POLLS {
                warn!("Gave up waiting for the instance; it may still be provisioning");
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            operation = self.send(self.client.get(&operation_url)).await?;
            polls += 1;
            debug!(polls, done = operation.done, "Polled create operation");
        }

        if let Some(error) = operation.error {
            bail!("Instance creation failed: {}", error);
        }
        let engine_name = operation
            .response
            .as_ref()
            .and_then(|r| r.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or(engine_name);
        let engine_id = parse_engine_id(&engine_name)
            .ok_or_else(|| anyhow!("Could not extract an id from {}", engine_name))?;
        Ok((engine_name, engine_id))
    }

    pub async fn list_engines(&self) -> Result<Vec<Engine>> {
        let mut engines = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut builder = self.client.get(self.engines_url());
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token)]);
            }
            let page: ListEnginesResponse = self.send(builder).await?;
            engines.extend(page.reasoning_engines);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(engines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_name_from_operation() {
        assert_eq!(
            engine_name_from_operation(
                "projects/p/locations/us-central1/reasoningEngines/123/operations/456"
            ),
            Some("projects/p/locations/us-central1/reasoningEngines/123".to_string())
        );
        assert_eq!(engine_name_from_operation("projects/p/operations/456"), None);
    }

    #[test]
    fn test_list_response_parsing() {
        let page: ListEnginesResponse = serde_json::from_str(
            r#"{"reasoningEngines":[{"name":"projects/p/locations/l/reasoningEngines/9","displayName":"Memory Bot Agent Engine","createTime":"2025-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(page.reasoning_engines.len(), 1);
        assert_eq!(page.reasoning_engines[0].id(), Some("9".to_string()));
        assert!(page.next_page_token.is_none());
    }
}

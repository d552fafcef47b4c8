use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use membot_core::{Content, ManagedTarget, MemoryScope, SessionSnapshot};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::MemoryIndexError;
use crate::index::{IngestReceipt, MemoryIndex};
use crate::memory::MemorySnippet;

/// REST client for the managed memory bank of a runtime instance.
///
/// Ingest sends the turns it is given as direct contents, so the caller
/// decides which turns are committed; the bank never reads them back from
/// the session service.
#[derive(Debug, Clone)]
pub struct MemoryBankClient {
    client: Client,
    target: ManagedTarget,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateMemoriesRequest {
    direct_contents_source: DirectContentsSource,
    scope: BTreeMap<String, String>,
}

#[derive(Serialize, Debug)]
struct DirectContentsSource {
    events: Vec<DirectEvent>,
}

#[derive(Serialize, Debug)]
struct DirectEvent {
    content: Content,
}

#[derive(Deserialize, Debug)]
struct Operation {
    name: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RetrieveMemoriesRequest {
    scope: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity_search_params: Option<SimilaritySearchParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    simple_retrieval_params: Option<SimpleRetrievalParams>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SimilaritySearchParams {
    search_query: String,
    top_k: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SimpleRetrievalParams {
    page_size: usize,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RetrieveMemoriesResponse {
    #[serde(default)]
    retrieved_memories: Vec<RetrievedMemory>,
}

#[derive(Deserialize, Debug)]
struct RetrievedMemory {
    memory: BankMemory,
    distance: Option<f32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BankMemory {
    name: Option<String>,
    #[serde(default)]
    fact: String,
    create_time: Option<DateTime<Utc>>,
}

fn scope_map(scope: &MemoryScope) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app_name".to_string(), scope.app_name.clone()),
        ("user_id".to_string(), scope.user_id.clone()),
    ])
}

impl MemoryBankClient {
    pub fn new(target: ManagedTarget) -> Self {
        Self {
            client: Client::new(),
            target,
        }
    }

    fn memories_url(&self) -> String {
        format!("{}/memories", self.target.engine_url())
    }

    fn generate_request(snapshot: &SessionSnapshot) -> GenerateMemoriesRequest {
        GenerateMemoriesRequest {
            direct_contents_source: DirectContentsSource {
                events: snapshot
                    .turns
                    .iter()
                    .map(|turn| DirectEvent {
                        content: Content::from_turn(turn),
                    })
                    .collect(),
            },
            scope: scope_map(&snapshot.scope()),
        }
    }

    fn retrieve_request(scope: &MemoryScope, query: &str, limit: usize) -> RetrieveMemoriesRequest {
        let query = query.trim();
        if query.is_empty() {
            RetrieveMemoriesRequest {
                scope: scope_map(scope),
                similarity_search_params: None,
                simple_retrieval_params: Some(SimpleRetrievalParams { page_size: limit }),
            }
        } else {
            RetrieveMemoriesRequest {
                scope: scope_map(scope),
                similarity_search_params: Some(SimilaritySearchParams {
                    search_query: query.to_string(),
                    top_k: limit,
                }),
                simple_retrieval_params: None,
            }
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, MemoryIndexError> {
        let mut builder = self.client.post(url).json(body);
        if let Some(token) = &self.target.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MemoryIndexError::Http {
                status_code: status.as_u16(),
                message,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| MemoryIndexError::Response(format!("Failed to parse response: {}", e)))
    }
}

fn snippets_from(response: RetrieveMemoriesResponse, limit: usize) -> Vec<MemorySnippet> {
    response
        .retrieved_memories
        .into_iter()
        .filter(|m| !m.memory.fact.trim().is_empty())
        .take(limit)
        .map(|m| MemorySnippet {
            content: m.memory.fact,
            score: m.distance.map(|d| 1.0 / (1.0 + d.max(0.0))),
            created_at: m.memory.create_time,
            id: m.memory.name,
        })
        .collect()
}

#[async_trait]
impl MemoryIndex for MemoryBankClient {
    #[instrument(skip(self, snapshot), fields(session_id = %snapshot.key.session_id, user_id = %snapshot.key.user_id))]
    async fn ingest(&self, snapshot: &SessionSnapshot) -> Result<IngestReceipt, MemoryIndexError> {
        let url = format!("{}:generate", self.memories_url());
        let request = Self::generate_request(snapshot);
        let operation: Operation = self.post(&url, &request).await?;
        debug!(operation = ?operation.name, "Memory generation accepted");

        Ok(IngestReceipt {
            id: operation.name,
            turns: snapshot.turns.len(),
        })
    }

    async fn search(
        &self,
        scope: &MemoryScope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, MemoryIndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let url = format!("{}:retrieve", self.memories_url());
        let request = Self::retrieve_request(scope, query, limit);
        let response: RetrieveMemoriesResponse = self.post(&url, &request).await?;
        Ok(snippets_from(response, limit))
    }
}

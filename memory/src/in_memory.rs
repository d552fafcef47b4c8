use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use membot_core::{MemoryScope, SessionSnapshot};
use tracing::debug;

use crate::errors::MemoryIndexError;
use crate::index::{IngestReceipt, MemoryIndex};
use crate::memory::{MemoryRecord, MemorySnippet};

/// In-process memory index.
///
/// One record per ingest, partitioned by scope. Search ranks by the share of
/// query terms found in a record, newest first on ties. An empty query lists
/// the newest records.
#[derive(Debug, Default)]
pub struct InMemoryMemoryIndex {
    records: Arc<RwLock<HashMap<MemoryScope, Vec<MemoryRecord>>>>,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl InMemoryMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of a scope, oldest first
    pub fn records(&self, scope: &MemoryScope) -> Result<Vec<MemoryRecord>, MemoryIndexError> {
        let records = self.records.read().map_err(|e| {
            MemoryIndexError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(records.get(scope).cloned().unwrap_or_default())
    }

    /// Total records across all scopes
    pub fn len(&self) -> usize {
        self.records
            .read()
            .map(|r| r.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryIndex for InMemoryMemoryIndex {
    async fn ingest(&self, snapshot: &SessionSnapshot) -> Result<IngestReceipt, MemoryIndexError> {
        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            scope: snapshot.scope(),
            session_id: snapshot.key.session_id.clone(),
            content: snapshot.transcript(),
            turn_count: snapshot.turns.len(),
            created_at: Utc::now(),
        };
        let receipt = IngestReceipt {
            id: Some(record.id.clone()),
            turns: record.turn_count,
        };

        let mut records = self.records.write().map_err(|e| {
            MemoryIndexError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        debug!(user_id = %record.scope.user_id, session_id = %record.session_id, "Stored memory record");
        records.entry(record.scope.clone()).or_default().push(record);

        Ok(receipt)
    }

    async fn search(
        &self,
        scope: &MemoryScope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemorySnippet>, MemoryIndexError> {
        let records = self.records.read().map_err(|e| {
            MemoryIndexError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        let Some(scoped) = records.get(scope) else {
            return Ok(Vec::new());
        };

        let query_terms = terms(query);
        // (score, insertion position, record); later position means newer
        let mut hits: Vec<(f32, usize, &MemoryRecord)> = if query_terms.is_empty() {
            scoped.iter().enumerate().map(|(i, r)| (1.0, i, r)).collect()
        } else {
            scoped
                .iter()
                .enumerate()
                .filter_map(|(i, r)| {
                    let record_terms = terms(&r.content);
                    let matched = query_terms.intersection(&record_terms).count();
                    (matched > 0).then(|| (matched as f32 / query_terms.len() as f32, i, r))
                })
                .collect()
        };

        hits.sort_by(|(sa, ia, _), (sb, ib, _)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ib.cmp(ia))
        });

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(score, _, record)| MemorySnippet {
                score: Some(score),
                ..MemorySnippet::from(record)
            })
            .collect())
    }
}

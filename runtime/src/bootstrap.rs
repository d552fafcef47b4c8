use std::sync::Arc;

use anyhow::{Context, Result};
use membot_core::{AppConfig, Backend, ModelClient};
use membot_memory::{InMemoryMemoryIndex, MemoryBankClient, MemoryIndexRef};
use tracing::info;

use crate::commit::CommitPipeline;
use crate::coordinator::ConversationRuntime;
use crate::llm_client::{ModelReplyGenerator, ReplyGenerator};
use crate::session::{InMemorySessionStore, ManagedSessionStore, SessionStoreRef};

/// The external collaborators a runtime is assembled from
#[derive(Debug, Clone)]
pub struct RuntimeParts {
    pub store: SessionStoreRef,
    pub memory: MemoryIndexRef,
    pub generator: Arc<dyn ReplyGenerator>,
}

/// Session store and memory index for a backend
pub fn backend_services(backend: &Backend) -> (SessionStoreRef, MemoryIndexRef) {
    match backend {
        Backend::Local => (
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryMemoryIndex::new()),
        ),
        Backend::Managed(target) => (
            Arc::new(ManagedSessionStore::new(target.clone())),
            Arc::new(MemoryBankClient::new(target.clone())),
        ),
    }
}

/// Wires the parts into a runtime according to `config`
pub fn assemble(config: &AppConfig, parts: RuntimeParts) -> ConversationRuntime {
    let pipeline = CommitPipeline::new(parts.memory.clone(), config.commit_policy);
    ConversationRuntime::builder(&config.app_name, parts.store, parts.generator)
        .system_prompt(&config.system_prompt)
        .memory(parts.memory, pipeline, config.memory_top_k)
        .build()
}

/// Builds the runtime for the configured backend.
///
/// Fails when the managed backend is enabled without its identifiers: the
/// process must not fall back to running without memory.
pub fn build_runtime(config: &AppConfig) -> Result<ConversationRuntime> {
    let backend = config.backend().context("Invalid backend configuration")?;
    let client = ModelClient::new(config).context("Failed to create model client")?;
    let (store, memory) = backend_services(&backend);

    match &backend {
        Backend::Local => info!("Using in-process session store and memory index"),
        Backend::Managed(target) => info!(engine = %target.engine_name(), "Using managed sessions and memory bank"),
    }
    info!(
        app_name = %config.app_name,
        model = client.model_name(),
        commit_policy = %config.commit_policy,
        "Runtime configured"
    );

    Ok(assemble(
        config,
        RuntimeParts {
            store,
            memory,
            generator: Arc::new(ModelReplyGenerator::new(client)),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use membot_core::{CommitPolicy, ConfigError};

    #[test]
    fn test_missing_engine_id_refuses_to_start() {
        let mut config = AppConfig::default();
        config.use_managed_backend = true;
        config.project_id = Some("proj".to_string());

        let err = build_runtime(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingIdentifier("AGENT_ENGINE_ID"))
        ));
    }

    #[test]
    fn test_local_backend_builds_with_api_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("key".to_string());
        config.commit_policy = CommitPolicy::Manual;

        let runtime = build_runtime(&config).unwrap();
        assert_eq!(runtime.app_name(), config.app_name);
        assert!(runtime.has_memory());
    }
}

use std::sync::Arc;

use membot_core::{CommitPolicy, MemoryScope, SessionKey, Turn};
use membot_memory::MemoryIndex;
use membot_runtime::testing::{RecordingMemoryIndex, ScriptedGenerator, StaleSessionStore};
use membot_runtime::{
    CommitOutcome, CommitPipeline, CommitReport, CompletionPoint, ConversationRuntime,
    InMemorySessionStore, Session, SessionStore, SkipReason, TurnContext,
};

fn runtime_with(
    store: Arc<dyn SessionStore>,
    index: Arc<RecordingMemoryIndex>,
    generator: Arc<ScriptedGenerator>,
) -> ConversationRuntime {
    ConversationRuntime::builder("memory-bot", store, generator)
        .memory(
            index.clone(),
            CommitPipeline::new(index, CommitPolicy::EveryExchange),
            5,
        )
        .build()
}

#[tokio::test]
async fn user_turn_without_reply_is_not_committed() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::EveryExchange);

    let mut session = Session::new(SessionKey::new("memory-bot", "alice", "s1"));
    session.append(Turn::user("hi")).unwrap();

    let outcome = pipeline.commit(
        &TurnContext::from_session(&session),
        CompletionPoint::ExchangeComplete,
    );
    assert!(matches!(
        outcome,
        CommitOutcome::Skipped(SkipReason::IncompleteExchange { turns: 1 })
    ));
    pipeline.drain().await;
    assert_eq!(index.ingest_count(), 0);
}

#[tokio::test]
async fn completed_exchange_is_committed_once_in_order() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let runtime = runtime_with(
        Arc::new(InMemorySessionStore::new()),
        index.clone(),
        Arc::new(ScriptedGenerator::echo()),
    );

    let reply = runtime.chat("alice", "hi").await.unwrap();
    runtime.drain_commits().await;

    let ingested = index.ingested();
    assert_eq!(ingested.len(), 1);
    assert_eq!(ingested[0].key, reply.key);
    let texts: Vec<String> = ingested[0].turns.iter().map(Turn::text).collect();
    assert_eq!(texts, vec!["hi".to_string(), "echo: hi".to_string()]);
}

#[tokio::test]
async fn every_exchange_commits_the_full_history() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let runtime = runtime_with(
        Arc::new(InMemorySessionStore::new()),
        index.clone(),
        Arc::new(ScriptedGenerator::echo()),
    );

    for message in ["one", "two", "three"] {
        runtime.chat("alice", message).await.unwrap();
    }
    runtime.drain_commits().await;

    let ingested = index.ingested();
    assert_eq!(ingested.len(), 3);
    let last: Vec<String> = ingested
        .iter()
        .max_by_key(|s| s.turns.len())
        .unwrap()
        .turns
        .iter()
        .map(Turn::text)
        .collect();
    assert_eq!(
        last,
        vec!["one", "echo: one", "two", "echo: two", "three", "echo: three"]
    );
}

#[tokio::test]
async fn stale_store_reads_do_not_affect_the_commit() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let store = Arc::new(StaleSessionStore::new());
    let runtime = runtime_with(
        store.clone(),
        index.clone(),
        Arc::new(ScriptedGenerator::echo()),
    );

    let reply = runtime.chat("alice", "hi").await.unwrap();
    runtime.drain_commits().await;

    // The store's read path would have produced an empty session
    let stored = store.get_session(&reply.key).await.unwrap();
    assert!(stored.turns.is_empty());

    let ingested = index.ingested();
    assert_eq!(ingested.len(), 1);
    assert_eq!(ingested[0].turns.len(), 2);
    assert_eq!(store.reads(), 1);
}

#[tokio::test]
async fn ingest_failure_leaves_the_reply_intact() {
    let index = Arc::new(RecordingMemoryIndex::failing());
    let runtime = runtime_with(
        Arc::new(InMemorySessionStore::new()),
        index.clone(),
        Arc::new(ScriptedGenerator::echo()),
    );

    let reply = runtime.chat("alice", "hi").await.unwrap();
    runtime.drain_commits().await;

    assert_eq!(reply.reply, "echo: hi");
    assert_eq!(index.ingest_count(), 1);

    let report = runtime.save_session(&reply.key).await.unwrap();
    assert!(matches!(report, CommitReport::Failed(_)));
}

#[tokio::test]
async fn concurrent_users_are_isolated() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let runtime = Arc::new(runtime_with(
        Arc::new(InMemorySessionStore::new()),
        index.clone(),
        Arc::new(ScriptedGenerator::echo()),
    ));

    let chats = [("alice", "I play the cello"), ("bob", "I climb mountains")]
        .into_iter()
        .map(|(user, message)| {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.chat(user, message).await })
        });
    for result in futures::future::join_all(chats).await {
        result.unwrap().unwrap();
    }
    runtime.drain_commits().await;

    assert_eq!(index.ingested_for("alice").len(), 1);
    assert_eq!(index.ingested_for("bob").len(), 1);

    let alice = index
        .search(&MemoryScope::new("memory-bot", "alice"), "cello mountains", 10)
        .await
        .unwrap();
    assert_eq!(alice.len(), 1);
    assert!(alice[0].content.contains("cello"));
    assert!(!alice[0].content.contains("mountains"));

    let bob = runtime.search_memories("bob", "cello", 10).await.unwrap();
    assert!(bob.is_empty());
}

#[tokio::test]
async fn first_conversation_generates_without_memories() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let generator = Arc::new(ScriptedGenerator::echo());
    let runtime = runtime_with(
        Arc::new(InMemorySessionStore::new()),
        index.clone(),
        generator.clone(),
    );

    assert!(runtime
        .search_memories("carol", "anything", 5)
        .await
        .unwrap()
        .is_empty());

    let reply = runtime.chat("carol", "hello there").await.unwrap();
    assert_eq!(reply.memories_used, 0);
    assert_eq!(reply.reply, "echo: hello there");
    assert!(generator.requests()[0].memories.is_empty());
}

#[tokio::test]
async fn failing_generation_is_reported_and_not_committed() {
    let index = Arc::new(RecordingMemoryIndex::new());
    let runtime = runtime_with(
        Arc::new(InMemorySessionStore::new()),
        index.clone(),
        Arc::new(ScriptedGenerator::failing()),
    );

    assert!(runtime.chat("dave", "hi").await.is_err());
    runtime.drain_commits().await;
    assert_eq!(index.ingest_count(), 0);
}

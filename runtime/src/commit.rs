//! Session-to-memory commit pipeline.
//!
//! The pipeline commits from the live execution frame it is handed. It never
//! re-reads the session store, whose read path may not yet reflect the turns
//! that were just appended. Ingest runs on a background task so the
//! user-facing reply is never delayed, and its outcome is only logged.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use membot_core::{CommitPolicy, SessionSnapshot};
use membot_memory::{IngestReceipt, MemoryIndexRef};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::hooks::{AfterTurnHook, CompletionPoint, TurnContext};

/// Why a commit did not reach the memory index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The configured policy does not commit at this completion point
    PolicyDeclined {
        policy: CommitPolicy,
        point: CompletionPoint,
    },
    /// Fewer than two turns: no user -> agent round trip to commit
    IncompleteExchange { turns: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PolicyDeclined { policy, point } => {
                write!(f, "policy {} does not commit at {}", policy, point)
            }
            SkipReason::IncompleteExchange { turns } => {
                write!(f, "incomplete exchange ({} turn(s))", turns)
            }
        }
    }
}

/// Final result of one commit attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CommitReport {
    Ingested(IngestReceipt),
    /// Ingest failed; the error was logged and swallowed
    Failed(String),
    Skipped(SkipReason),
}

impl CommitReport {
    pub fn is_ingested(&self) -> bool {
        matches!(self, CommitReport::Ingested(_))
    }
}

/// Handle to a dispatched ingest. Dropping it does not cancel the ingest.
#[derive(Debug)]
pub struct CommitHandle(JoinHandle<CommitReport>);

impl CommitHandle {
    /// Waits for the background ingest and returns its report
    pub async fn wait(self) -> CommitReport {
        match self.0.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Memory commit task did not complete");
                CommitReport::Failed(format!("commit task did not complete: {}", e))
            }
        }
    }
}

/// What `CommitPipeline::commit` did
#[derive(Debug)]
pub enum CommitOutcome {
    Skipped(SkipReason),
    Dispatched(CommitHandle),
}

impl CommitOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, CommitOutcome::Dispatched(_))
    }

    /// Waits for a dispatched ingest; a skip resolves immediately
    pub async fn wait(self) -> CommitReport {
        match self {
            CommitOutcome::Skipped(reason) => CommitReport::Skipped(reason),
            CommitOutcome::Dispatched(handle) => handle.wait().await,
        }
    }
}

/// Counts ingests that are still running
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn acquire(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(in_flight.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Hands completed exchanges to the memory index
#[derive(Debug)]
pub struct CommitPipeline {
    index: MemoryIndexRef,
    policy: CommitPolicy,
    in_flight: Arc<InFlight>,
}

impl CommitPipeline {
    pub fn new(index: MemoryIndexRef, policy: CommitPolicy) -> Self {
        Self {
            index,
            policy,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    fn precheck(&self, context: &TurnContext<'_>) -> Option<SkipReason> {
        if context.turns.len() < 2 {
            debug!(
                session_id = context.session_id(),
                user_id = context.user_id(),
                turns = context.turns.len(),
                "Skipping memory commit: incomplete exchange"
            );
            return Some(SkipReason::IncompleteExchange {
                turns: context.turns.len(),
            });
        }
        None
    }

    /// Commits the live turns if the policy fires at `point`.
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// ingest is dispatched.
    pub fn commit(&self, context: &TurnContext<'_>, point: CompletionPoint) -> CommitOutcome {
        if !point.fires_under(self.policy) {
            debug!(
                session_id = context.session_id(),
                policy = %self.policy,
                point = %point,
                "Commit policy declined"
            );
            return CommitOutcome::Skipped(SkipReason::PolicyDeclined {
                policy: self.policy,
                point,
            });
        }
        if let Some(reason) = self.precheck(context) {
            return CommitOutcome::Skipped(reason);
        }

        let snapshot = context.snapshot();
        let index = self.index.clone();
        let guard = InFlightGuard::acquire(&self.in_flight);
        let handle = tokio::spawn(async move {
            let report = ingest(index, snapshot).await;
            drop(guard);
            report
        });
        CommitOutcome::Dispatched(CommitHandle(handle))
    }

    /// Commits the live turns and waits for the index, regardless of policy
    pub async fn commit_now(&self, context: &TurnContext<'_>) -> CommitReport {
        if let Some(reason) = self.precheck(context) {
            return CommitReport::Skipped(reason);
        }
        let _guard = InFlightGuard::acquire(&self.in_flight);
        ingest(self.index.clone(), context.snapshot()).await
    }

    /// Number of ingests still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Waits until every dispatched ingest has finished
    pub async fn drain(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }
}

#[instrument(
    skip(index, snapshot),
    name = "memory_commit",
    fields(
        session_id = %snapshot.key.session_id,
        user_id = %snapshot.key.user_id,
        turns = snapshot.turns.len()
    )
)]
async fn ingest(index: MemoryIndexRef, snapshot: SessionSnapshot) -> CommitReport {
    match index.ingest(&snapshot).await {
        Ok(receipt) => {
            info!(receipt = ?receipt.id, "Committed session to memory");
            CommitReport::Ingested(receipt)
        }
        Err(e) => {
            error!(
                session_id = %snapshot.key.session_id,
                user_id = %snapshot.key.user_id,
                turns = snapshot.turns.len(),
                error = %e,
                "Failed to commit session to memory"
            );
            CommitReport::Failed(e.to_string())
        }
    }
}

#[async_trait]
impl AfterTurnHook for CommitPipeline {
    fn name(&self) -> &str {
        "memory_commit"
    }

    async fn after_turn(&self, context: &TurnContext<'_>, point: CompletionPoint) {
        // The outcome is logged by the pipeline itself.
        let _ = self.commit(context, point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::testing::RecordingMemoryIndex;
    use membot_core::{Role, SessionKey, Turn};
    use std::time::Duration;

    fn session(user: &str, texts: &[(Role, &str)]) -> Session {
        let mut session = Session::new(SessionKey::new("app", user, "s1"));
        for (role, text) in texts {
            let turn = match role {
                Role::User => Turn::user(*text),
                Role::Agent => Turn::agent(*text),
            };
            session.append(turn).unwrap();
        }
        session
    }

    #[tokio::test]
    async fn test_incomplete_exchange_is_skipped() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::EveryExchange);

        for turns in [vec![], vec![(Role::User, "hi")]] {
            let live = session("u1", &turns);
            let outcome = pipeline.commit(&TurnContext::from_session(&live), CompletionPoint::ExchangeComplete);
            assert!(matches!(
                outcome,
                CommitOutcome::Skipped(SkipReason::IncompleteExchange { .. })
            ));
        }
        pipeline.drain().await;
        assert_eq!(index.ingest_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_exchange_is_ingested_once_in_order() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::EveryExchange);
        let live = session("u1", &[(Role::User, "hi"), (Role::Agent, "hello")]);

        let report = pipeline
            .commit(&TurnContext::from_session(&live), CompletionPoint::ExchangeComplete)
            .wait()
            .await;
        assert!(report.is_ingested());

        let ingested = index.ingested();
        assert_eq!(ingested.len(), 1);
        assert_eq!(ingested[0].turns, live.turns);
        assert_eq!(ingested[0].key, live.key);
    }

    #[tokio::test]
    async fn test_policy_declines() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::SessionEnd);
        let live = session("u1", &[(Role::User, "hi"), (Role::Agent, "hello")]);
        let context = TurnContext::from_session(&live);

        let outcome = pipeline.commit(&context, CompletionPoint::ExchangeComplete);
        assert!(matches!(
            outcome,
            CommitOutcome::Skipped(SkipReason::PolicyDeclined { .. })
        ));

        let report = pipeline.commit(&context, CompletionPoint::SessionEnded).wait().await;
        assert!(report.is_ingested());
        assert_eq!(index.ingest_count(), 1);
    }

    #[tokio::test]
    async fn test_ingest_failure_is_swallowed() {
        let index = Arc::new(RecordingMemoryIndex::failing());
        let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::EveryExchange);
        let live = session("u1", &[(Role::User, "hi"), (Role::Agent, "hello")]);

        let report = pipeline
            .commit(&TurnContext::from_session(&live), CompletionPoint::ExchangeComplete)
            .wait()
            .await;
        assert!(matches!(report, CommitReport::Failed(_)));

        let report = pipeline.commit_now(&TurnContext::from_session(&live)).await;
        assert!(matches!(report, CommitReport::Failed(_)));
        assert_eq!(index.ingest_count(), 2);
    }

    #[tokio::test]
    async fn test_commit_returns_before_ingest_finishes() {
        let index = Arc::new(RecordingMemoryIndex::new().with_delay(Duration::from_millis(200)));
        let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::EveryExchange);
        let live = session("u1", &[(Role::User, "hi"), (Role::Agent, "hello")]);

        let outcome = pipeline.commit(&TurnContext::from_session(&live), CompletionPoint::ExchangeComplete);
        assert!(outcome.is_dispatched());
        assert_eq!(index.ingest_count(), 0);
        assert_eq!(pipeline.in_flight(), 1);

        pipeline.drain().await;
        assert_eq!(pipeline.in_flight(), 0);
        assert_eq!(index.ingest_count(), 1);
    }

    #[tokio::test]
    async fn test_explicit_commit_ignores_manual_policy() {
        let index = Arc::new(RecordingMemoryIndex::new());
        let pipeline = CommitPipeline::new(index.clone(), CommitPolicy::Manual);
        let live = session("u1", &[(Role::User, "hi"), (Role::Agent, "hello")]);
        let context = TurnContext::from_session(&live);

        pipeline.after_turn(&context, CompletionPoint::ExchangeComplete).await;
        pipeline.drain().await;
        assert_eq!(index.ingest_count(), 0);

        assert!(pipeline.commit_now(&context).await.is_ingested());
        assert_eq!(index.ingest_count(), 1);
    }
}

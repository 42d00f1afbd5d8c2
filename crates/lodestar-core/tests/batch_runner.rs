//! End-to-end batch runner scenarios: ordering, cascading skips, the
//! parallel concurrency cap, and cooperative cancellation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lodestar_core::{
    BatchDeploymentItem, BatchMode, BatchRequest, BatchRunner, DeployContext, DeployExecutor,
    DeployFailure, DeployOutcome, DeployTarget, ItemStatus, SchedulerError,
};

fn item(id: &str, deps: &[&str]) -> BatchDeploymentItem {
    BatchDeploymentItem::from_source(id, id, PathBuf::from(format!("contracts/{id}")))
        .depends_on(deps.iter().copied())
}

fn context() -> DeployContext {
    DeployContext::new("testnet", "alice")
}

fn success_for(id: &str) -> DeployOutcome {
    DeployOutcome::Success {
        contract_id: format!("C_{}", id.to_uppercase()),
        tx_hash: Some(format!("tx_{id}")),
    }
}

/// Records dispatch order and fails the configured items.
struct RecordingExecutor {
    started: Mutex<Vec<String>>,
    fail: HashSet<String>,
}

impl RecordingExecutor {
    fn new(fail: &[&str]) -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            fail: fail.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeployExecutor for RecordingExecutor {
    async fn deploy(
        &self,
        item: &BatchDeploymentItem,
        _target: &DeployTarget,
        _ctx: &DeployContext,
        _cancel: CancellationToken,
    ) -> anyhow::Result<DeployOutcome> {
        self.started.lock().unwrap().push(item.id.clone());
        if self.fail.contains(&item.id) {
            Ok(DeployOutcome::Failure(
                DeployFailure::from_message(format!("simulated failure for {}", item.id))
                    .with_category("publish"),
            ))
        } else {
            Ok(success_for(&item.id))
        }
    }
}

/// Tracks how many deploys are in flight at once.
struct ConcurrencyProbe {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DeployExecutor for ConcurrencyProbe {
    async fn deploy(
        &self,
        item: &BatchDeploymentItem,
        _target: &DeployTarget,
        _ctx: &DeployContext,
        _cancel: CancellationToken,
    ) -> anyhow::Result<DeployOutcome> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(success_for(&item.id))
    }
}

/// Cancels the shared token while deploying `trigger`; other items wait for
/// the cancellation signal before returning, so the test is timing-free.
struct CancellingExecutor {
    trigger: String,
}

#[async_trait]
impl DeployExecutor for CancellingExecutor {
    async fn deploy(
        &self,
        item: &BatchDeploymentItem,
        _target: &DeployTarget,
        _ctx: &DeployContext,
        cancel: CancellationToken,
    ) -> anyhow::Result<DeployOutcome> {
        if item.id == self.trigger {
            cancel.cancel();
        } else {
            cancel.cancelled().await;
        }
        Ok(success_for(&item.id))
    }
}

fn status_of<'a>(
    result: &'a lodestar_core::BatchDeploymentResult,
    id: &str,
) -> &'a lodestar_core::BatchDeploymentItemResult {
    result
        .results
        .iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| panic!("no result for {id}"))
}

#[tokio::test]
async fn test_sequential_chain_runs_in_dependency_order() {
    let executor = Arc::new(RecordingExecutor::new(&[]));
    let runner = BatchRunner::new(executor.clone(), context());
    // Input deliberately out of order.
    let request = BatchRequest::new(
        BatchMode::Sequential,
        vec![
            item("router", &["vault"]),
            item("token", &[]),
            item("vault", &["token"]),
        ],
    );

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert!(result.all_succeeded());
    assert_eq!(executor.started(), vec!["token", "vault", "router"]);
    let token = status_of(&result, "token");
    assert_eq!(token.status, ItemStatus::Succeeded);
    assert_eq!(token.contract_id.as_deref(), Some("C_TOKEN"));
    assert_eq!(token.tx_hash.as_deref(), Some("tx_token"));
}

#[tokio::test]
async fn test_failure_skips_transitive_dependents_but_not_independents() {
    let executor = Arc::new(RecordingExecutor::new(&["token"]));
    let runner = BatchRunner::new(executor.clone(), context());
    let request = BatchRequest::new(
        BatchMode::Sequential,
        vec![
            item("token", &[]),
            item("vault", &["token"]),
            item("router", &["vault"]),
            item("oracle", &[]),
        ],
    );

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(status_of(&result, "token").status, ItemStatus::Failed);
    assert_eq!(status_of(&result, "vault").status, ItemStatus::Skipped);
    assert_eq!(status_of(&result, "router").status, ItemStatus::Skipped);
    assert_eq!(status_of(&result, "oracle").status, ItemStatus::Succeeded);
    // Skipped items never reach the executor.
    assert!(!executor.started().contains(&"vault".to_string()));
    assert!(!executor.started().contains(&"router".to_string()));
    // Skip reasons name the blocking dependency.
    let vault_err = status_of(&result, "vault").error.as_ref().unwrap();
    assert!(vault_err.message.contains("token"));
}

#[tokio::test]
async fn test_failed_item_records_structured_error() {
    let executor = Arc::new(RecordingExecutor::new(&["nft"]));
    let runner = BatchRunner::new(executor, context());
    let request = BatchRequest::new(BatchMode::Sequential, vec![item("nft", &[])]);

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    let record = status_of(&result, "nft");
    assert_eq!(record.status, ItemStatus::Failed);
    assert!(record.contract_id.is_none());
    let error = record.error.as_ref().unwrap();
    assert!(error.message.contains("simulated failure"));
    assert_eq!(error.category.as_deref(), Some("publish"));
    assert!(record.started_at.is_some());
    assert!(record.finished_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_respects_concurrency_cap() {
    let probe = Arc::new(ConcurrencyProbe::new());
    let runner = BatchRunner::new(probe.clone(), context());
    let items = (0..6).map(|i| item(&format!("c{i}"), &[])).collect();
    let mut request = BatchRequest::new(BatchMode::Parallel, items);
    request.concurrency = Some(2);

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert!(result.all_succeeded());
    assert_eq!(result.results.len(), 6);
    assert!(probe.max_seen.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_diamond_waits_for_all_dependencies() {
    let executor = Arc::new(RecordingExecutor::new(&[]));
    let runner = BatchRunner::new(executor.clone(), context());
    let request = BatchRequest::new(
        BatchMode::Parallel,
        vec![
            item("base", &[]),
            item("left", &["base"]),
            item("right", &["base"]),
            item("top", &["left", "right"]),
        ],
    );

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert!(result.all_succeeded());
    let started = executor.started();
    let pos = |id: &str| started.iter().position(|s| s == id).unwrap();
    assert_eq!(pos("base"), 0);
    assert!(pos("top") > pos("left"));
    assert!(pos("top") > pos("right"));
}

#[tokio::test]
async fn test_parallel_failure_cascades_through_chain() {
    let executor = Arc::new(RecordingExecutor::new(&["base"]));
    let runner = BatchRunner::new(executor, context());
    let mut request = BatchRequest::new(
        BatchMode::Parallel,
        vec![
            item("base", &[]),
            item("mid", &["base"]),
            item("leaf", &["mid"]),
            item("solo", &[]),
        ],
    );
    request.concurrency = Some(3);

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(status_of(&result, "base").status, ItemStatus::Failed);
    assert_eq!(status_of(&result, "mid").status, ItemStatus::Skipped);
    assert_eq!(status_of(&result, "leaf").status, ItemStatus::Skipped);
    assert_eq!(status_of(&result, "solo").status, ItemStatus::Succeeded);
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.skipped_count(), 2);
    assert!(!result.cancelled);
}

#[tokio::test]
async fn test_sequential_cancellation_finalizes_queued_items() {
    let executor = Arc::new(CancellingExecutor {
        trigger: "first".to_string(),
    });
    let runner = BatchRunner::new(executor, context());
    let request = BatchRequest::new(
        BatchMode::Sequential,
        vec![item("first", &[]), item("second", &[]), item("third", &[])],
    );

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert!(result.cancelled);
    // The in-flight item completed normally before cancellation took hold.
    assert_eq!(status_of(&result, "first").status, ItemStatus::Succeeded);
    assert_eq!(status_of(&result, "second").status, ItemStatus::Cancelled);
    assert_eq!(status_of(&result, "third").status, ItemStatus::Cancelled);
}

#[tokio::test]
async fn test_parallel_cancellation_lets_in_flight_finish() {
    let executor = Arc::new(CancellingExecutor {
        trigger: "a".to_string(),
    });
    let runner = BatchRunner::new(executor, context());
    // Cap of 2: a and b dispatch immediately, c stays queued.
    let mut request = BatchRequest::new(
        BatchMode::Parallel,
        vec![item("a", &[]), item("b", &[]), item("c", &[])],
    );
    request.concurrency = Some(2);

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert!(result.cancelled);
    assert_eq!(status_of(&result, "a").status, ItemStatus::Succeeded);
    assert_eq!(status_of(&result, "b").status, ItemStatus::Succeeded);
    assert_eq!(status_of(&result, "c").status, ItemStatus::Cancelled);
}

#[tokio::test]
async fn test_pre_cancelled_token_runs_nothing() {
    let executor = Arc::new(RecordingExecutor::new(&[]));
    let runner = BatchRunner::new(executor.clone(), context());
    let request = BatchRequest::new(
        BatchMode::Parallel,
        vec![item("a", &[]), item("b", &["a"])],
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = runner.run(request, cancel).await.unwrap();

    assert!(result.cancelled);
    assert!(executor.started().is_empty());
    assert!(result
        .results
        .iter()
        .all(|r| r.status == ItemStatus::Cancelled));
}

#[tokio::test]
async fn test_result_set_has_one_entry_per_item() {
    let executor = Arc::new(RecordingExecutor::new(&["b"]));
    let runner = BatchRunner::new(executor, context());
    let ids = ["a", "b", "c", "d"];
    let request = BatchRequest::new(
        BatchMode::Parallel,
        ids.iter().map(|id| item(id, &[])).collect(),
    );

    let result = runner.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(result.results.len(), ids.len());
    let seen: HashSet<_> = result.results.iter().map(|r| r.id.as_str()).collect();
    for id in ids {
        assert!(seen.contains(id));
    }
    assert!(result.results.iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn test_cycle_rejected_without_executing() {
    let executor = Arc::new(RecordingExecutor::new(&[]));
    let runner = BatchRunner::new(executor.clone(), context());
    let request = BatchRequest::new(
        BatchMode::Parallel,
        vec![item("a", &["b"]), item("b", &["a"])],
    );

    let err = runner
        .run(request, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::DependencyCycle { .. }));
    assert!(executor.started().is_empty());
}

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let runner = BatchRunner::new(Arc::new(RecordingExecutor::new(&[])), context());
    let request = BatchRequest::new(
        BatchMode::Sequential,
        vec![item("a", &[]), item("a", &[])],
    );

    let err = runner
        .run(request, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::DuplicateItemId { .. }));
}

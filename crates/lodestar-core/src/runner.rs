//! Batch execution driver.
//!
//! Drives all items of a batch through their lifecycle in the requested
//! mode, consulting the dependency graph for readiness, applying cascading
//! skips when a dependency fails, and honoring cooperative cancellation.
//!
//! Concurrency discipline: the coordinator loop in [`BatchRunner::run`] is
//! the single writer of the result set. Worker tasks only execute the deploy
//! call and hand the outcome back through the `JoinSet`; readiness
//! re-evaluation and result recording therefore never race.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::ResultAggregator;
use crate::error::SchedulerResult;
use crate::executor::DeployExecutor;
use crate::graph::DependencyGraph;
use crate::item::{BatchDeploymentItem, BatchMode, BatchRequest, DeployContext, DeployTarget};
use crate::outcome::{DeployFailure, DeployOutcome};
use crate::report::BatchDeploymentResult;

/// An item paired with its validated deploy target.
struct PreparedItem {
    item: BatchDeploymentItem,
    target: DeployTarget,
}

/// Schedules and runs deployment batches against an injected executor.
pub struct BatchRunner {
    executor: Arc<dyn DeployExecutor>,
    context: DeployContext,
}

impl BatchRunner {
    pub fn new(executor: Arc<dyn DeployExecutor>, context: DeployContext) -> Self {
        Self { executor, context }
    }

    /// Run one batch to completion.
    ///
    /// Validation problems (unknown or cyclic dependencies, ambiguous
    /// targets, duplicate ids) reject the whole batch before any item
    /// executes. Per-item failures never surface here — they are recorded
    /// in the returned result set, one entry per input item.
    pub async fn run(
        &self,
        request: BatchRequest,
        cancel: CancellationToken,
    ) -> SchedulerResult<BatchDeploymentResult> {
        let graph = DependencyGraph::build(&request.items)?;

        // Targets were validated by the graph build; resolve them once.
        let mut prepared: HashMap<String, Arc<PreparedItem>> = HashMap::new();
        for item in &request.items {
            let target = item.target()?;
            prepared.insert(
                item.id.clone(),
                Arc::new(PreparedItem {
                    item: item.clone(),
                    target,
                }),
            );
        }

        let mut agg = ResultAggregator::new(request.items.iter().map(|i| i.id.as_str()));

        info!(
            batch_id = %request.batch_id,
            mode = ?request.mode,
            items = request.items.len(),
            "starting batch deployment"
        );

        let observed_cancel = match request.mode {
            BatchMode::Sequential => {
                self.run_sequential(&graph, &prepared, &mut agg, &cancel)
                    .await
            }
            BatchMode::Parallel => {
                let limit = request.effective_concurrency();
                self.run_parallel(&graph, &prepared, &mut agg, &cancel, limit)
                    .await
            }
        };

        let result = agg.finish(request.batch_id, request.mode, observed_cancel);
        info!(
            batch_id = %result.batch_id,
            succeeded = result.succeeded_count(),
            failed = result.failed_count(),
            skipped = result.skipped_count(),
            cancelled = result.cancelled,
            "batch deployment finished"
        );
        Ok(result)
    }

    /// Strict one-at-a-time execution in topological order.
    async fn run_sequential(
        &self,
        graph: &DependencyGraph,
        prepared: &HashMap<String, Arc<PreparedItem>>,
        agg: &mut ResultAggregator,
        cancel: &CancellationToken,
    ) -> bool {
        for id in graph.topological_order() {
            if cancel.is_cancelled() {
                info!("cancellation observed, finalizing queued items");
                agg.cancel_queued();
                return true;
            }

            if let Some(blocked_on) = graph.blocking_dependency(&id, |d| agg.status_of(d)) {
                let blocked_on = blocked_on.to_string();
                debug!(item = %id, dependency = %blocked_on, "skipping blocked item");
                agg.mark_skipped(&id, &blocked_on);
                continue;
            }

            agg.mark_running(&id);
            let (_, outcome) = deploy_guarded(
                Arc::clone(&self.executor),
                Arc::clone(&prepared[&id]),
                self.context.clone(),
                cancel.clone(),
            )
            .await;
            agg.record_outcome(&id, outcome);
        }
        false
    }

    /// Greedy readiness-driven dispatch bounded by a counting semaphore.
    ///
    /// Any item whose dependencies have resolved is dispatched as soon as a
    /// permit is free, independent of its position in the input list. The
    /// queued set is re-evaluated on every completion, since a completion
    /// may unblock items or force cascading skips.
    async fn run_parallel(
        &self,
        graph: &DependencyGraph,
        prepared: &HashMap<String, Arc<PreparedItem>>,
        agg: &mut ResultAggregator,
        cancel: &CancellationToken,
        limit: usize,
    ) -> bool {
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut join_set: JoinSet<(String, DeployOutcome)> = JoinSet::new();
        let mut observed_cancel = false;

        loop {
            if !observed_cancel && cancel.is_cancelled() {
                info!("cancellation observed, finalizing queued items");
                observed_cancel = true;
                agg.cancel_queued();
            }

            if !observed_cancel {
                propagate_skips(graph, agg);

                for id in agg.queued_ids() {
                    if !graph.is_ready(&id, |d| agg.status_of(d)) {
                        continue;
                    }
                    match Arc::clone(&semaphore).try_acquire_owned() {
                        Ok(permit) => {
                            debug!(item = %id, "dispatching");
                            agg.mark_running(&id);
                            let executor = Arc::clone(&self.executor);
                            let item = Arc::clone(&prepared[&id]);
                            let ctx = self.context.clone();
                            let cancel = cancel.clone();
                            join_set.spawn(async move {
                                let completed = deploy_guarded(executor, item, ctx, cancel).await;
                                drop(permit);
                                completed
                            });
                        }
                        // Pool saturated — wait for a completion to free a
                        // permit before re-evaluating.
                        Err(_) => break,
                    }
                }
            }

            if join_set.is_empty() {
                // Nothing in flight. Every remaining queued item was either
                // dispatched, skipped, or cancelled above.
                break;
            }

            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok((id, outcome))) => {
                            debug!(item = %id, success = outcome.is_success(), "item completed");
                            agg.record_outcome(&id, outcome);
                        }
                        Some(Err(e)) => {
                            // Panics are contained inside the task, so a join
                            // error here can only mean an aborted task.
                            warn!(error = %e, "worker task join error");
                        }
                        None => {}
                    }
                }
                _ = cancel.cancelled(), if !observed_cancel => {
                    // Handled at the top of the loop.
                }
            }
        }

        observed_cancel
    }
}

/// Mark every queued item with a permanently-blocked dependency as skipped.
///
/// Runs to a fixpoint: a skip can block further dependents, which must be
/// skipped in the same pass rather than waiting to become "eligible".
fn propagate_skips(graph: &DependencyGraph, agg: &mut ResultAggregator) {
    loop {
        let mut changed = false;
        for id in agg.queued_ids() {
            if let Some(blocked_on) = graph.blocking_dependency(&id, |d| agg.status_of(d)) {
                let blocked_on = blocked_on.to_string();
                debug!(item = %id, dependency = %blocked_on, "skipping blocked item");
                agg.mark_skipped(&id, &blocked_on);
                changed = true;
            }
        }
        if !changed {
            return;
        }
    }
}

/// Invoke the executor for one item, folding every kind of fault — an `Err`
/// return or a panic inside the executor — into a normalized failure so one
/// misbehaving item can never crash the batch.
async fn deploy_guarded(
    executor: Arc<dyn DeployExecutor>,
    prepared: Arc<PreparedItem>,
    ctx: DeployContext,
    cancel: CancellationToken,
) -> (String, DeployOutcome) {
    let id = prepared.item.id.clone();
    let call = executor.deploy(&prepared.item, &prepared.target, &ctx, cancel);
    let outcome = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(item = %id, error = %e, "deploy executor returned an error");
            DeployOutcome::Failure(
                DeployFailure::from_message(format!("deploy executor error: {e:#}"))
                    .with_category("executor"),
            )
        }
        Err(_) => {
            warn!(item = %id, "deploy executor panicked");
            DeployOutcome::Failure(
                DeployFailure::from_message("deploy executor panicked").with_category("executor"),
            )
        }
    };
    (id, outcome)
}

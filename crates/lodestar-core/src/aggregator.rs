//! Result ownership for one batch run.
//!
//! The aggregator is the single writer for the result list: the runner's
//! coordinator task mutates records through it, worker tasks only hand
//! outcomes back. One record exists per input item from the moment the run
//! starts, so no item can ever be dropped from the final result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::item::BatchMode;
use crate::outcome::{DeployFailure, DeployOutcome};
use crate::report::{BatchDeploymentItemResult, BatchDeploymentResult, ItemStatus};

/// Collects per-item results and assembles the final batch record.
#[derive(Debug)]
pub struct ResultAggregator {
    results: Vec<BatchDeploymentItemResult>,
    index: HashMap<String, usize>,
    started_at: DateTime<Utc>,
}

impl ResultAggregator {
    /// One queued record per item id, preserving input order.
    pub fn new<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let results: Vec<BatchDeploymentItemResult> = ids
            .into_iter()
            .map(BatchDeploymentItemResult::queued)
            .collect();
        let index = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self {
            results,
            index,
            started_at: Utc::now(),
        }
    }

    /// Current status of `id`. Panics on unknown ids — the runner only ever
    /// queries ids that came from the validated input.
    pub fn status_of(&self, id: &str) -> ItemStatus {
        self.results[self.index[id]].status
    }

    /// Ids still queued, in input order.
    pub fn queued_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.status == ItemStatus::Queued)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Whether every item has reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.results.iter().all(|r| r.status.is_terminal())
    }

    pub fn mark_running(&mut self, id: &str) {
        let record = &mut self.results[self.index[id]];
        record.status = ItemStatus::Running;
        record.started_at = Some(Utc::now());
    }

    /// Record the executor's outcome for a running item.
    pub fn record_outcome(&mut self, id: &str, outcome: DeployOutcome) {
        let record = &mut self.results[self.index[id]];
        record.finished_at = Some(Utc::now());
        match outcome {
            DeployOutcome::Success {
                contract_id,
                tx_hash,
            } => {
                record.status = ItemStatus::Succeeded;
                record.contract_id = Some(contract_id);
                record.tx_hash = tx_hash;
            }
            DeployOutcome::Failure(failure) => {
                record.status = ItemStatus::Failed;
                record.error = Some(failure);
            }
        }
    }

    /// Mark a queued item skipped because `blocked_on` permanently blocks it.
    pub fn mark_skipped(&mut self, id: &str, blocked_on: &str) {
        let record = &mut self.results[self.index[id]];
        record.status = ItemStatus::Skipped;
        record.finished_at = Some(Utc::now());
        record.error = Some(DeployFailure::from_message(format!(
            "skipped: dependency '{blocked_on}' did not succeed"
        )));
    }

    /// Finalize every still-queued item as cancelled.
    pub fn cancel_queued(&mut self) {
        let now = Utc::now();
        for record in &mut self.results {
            if record.status == ItemStatus::Queued {
                record.status = ItemStatus::Cancelled;
                record.finished_at = Some(now);
            }
        }
    }

    /// Consume the aggregator and assemble the batch result.
    pub fn finish(
        self,
        batch_id: impl Into<String>,
        mode: BatchMode,
        cancelled: bool,
    ) -> BatchDeploymentResult {
        BatchDeploymentResult {
            batch_id: batch_id.into(),
            mode,
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled,
            results: self.results,
        }
    }
}

//! Per-item and batch-level result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::BatchMode;
use crate::outcome::DeployFailure;

/// Lifecycle status of one item within a batch run.
///
/// `queued → running → {succeeded | failed}`, with `skipped` for items whose
/// dependencies failed and `cancelled` for items that never started before
/// cancellation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// A dependency failed, was cancelled, or was itself skipped.
    Skipped,
}

impl ItemStatus {
    /// Whether this status is terminal (the item will not transition again).
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemStatus::Queued | ItemStatus::Running)
    }

    /// Terminal statuses that permanently block dependents.
    pub fn blocks_dependents(self) -> bool {
        matches!(
            self,
            ItemStatus::Failed | ItemStatus::Cancelled | ItemStatus::Skipped
        )
    }
}

/// Result record for one item. Created when the batch starts and mutated as
/// the item moves through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeploymentItemResult {
    pub id: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Identifier of the published contract, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    /// Transaction reference for the publish, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Structured failure, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeployFailure>,
}

impl BatchDeploymentItemResult {
    /// Fresh queued record for `id`.
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::Queued,
            started_at: None,
            finished_at: None,
            contract_id: None,
            tx_hash: None,
            error: None,
        }
    }
}

/// Aggregate result of one batch run.
///
/// `results` preserves input order and always has one entry per input item —
/// items are never dropped, only marked with a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeploymentResult {
    pub batch_id: String,
    pub mode: BatchMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when cancellation was observed before the batch reached natural
    /// completion.
    pub cancelled: bool,
    pub results: Vec<BatchDeploymentItemResult>,
}

impl BatchDeploymentResult {
    /// Number of items with the given status.
    pub fn count(&self, status: ItemStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(ItemStatus::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ItemStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ItemStatus::Skipped)
    }

    /// `true` when every item succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.status == ItemStatus::Succeeded)
    }
}

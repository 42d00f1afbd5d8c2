//! The per-item deploy execution seam.
//!
//! The scheduler drives batches; it does not know how a contract is built or
//! published. Inject a real implementation that shells out to deploy tooling,
//! or a stub for tests.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::item::{BatchDeploymentItem, DeployContext, DeployTarget};
use crate::outcome::DeployOutcome;

/// Performs one item's build-and-publish action.
///
/// Returning `Err` is treated identically to a structured
/// [`DeployOutcome::Failure`]: the item is marked failed and the batch
/// continues. The `cancel` token is the batch's cancellation handle —
/// long-running implementations may watch it to exit early, but the
/// scheduler never force-aborts an in-flight call.
#[async_trait]
pub trait DeployExecutor: Send + Sync {
    async fn deploy(
        &self,
        item: &BatchDeploymentItem,
        target: &DeployTarget,
        ctx: &DeployContext,
        cancel: CancellationToken,
    ) -> anyhow::Result<DeployOutcome>;
}

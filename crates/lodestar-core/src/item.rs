//! Input model for a batch deployment run.
//!
//! A batch is a flat list of [`BatchDeploymentItem`]s, each naming one
//! contract to deploy and the items it depends on. The caller owns and
//! constructs the list; the scheduler never mutates it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// One deployable contract within a batch.
///
/// Exactly one of `source_dir` / `wasm_path` must be set — this is checked
/// during batch validation, before any item executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeploymentItem {
    /// Stable identifier, unique within the batch.
    pub id: String,
    /// Human-readable display name. No uniqueness constraint.
    pub name: String,
    /// Contract source directory — build the WASM, then publish it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    /// Pre-built WASM artifact — publish only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm_path: Option<PathBuf>,
    /// Ids of items in the same batch that must succeed before this one runs.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl BatchDeploymentItem {
    /// Create an item that builds from `dir` and publishes the result.
    pub fn from_source(id: impl Into<String>, name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_dir: Some(dir),
            wasm_path: None,
            depends_on: Vec::new(),
        }
    }

    /// Create an item that publishes a pre-built artifact at `wasm`.
    pub fn from_artifact(id: impl Into<String>, name: impl Into<String>, wasm: PathBuf) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_dir: None,
            wasm_path: Some(wasm),
            depends_on: Vec::new(),
        }
    }

    /// Declare dependencies on other items' ids (builder style).
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve the deployment target, rejecting items that set both or
    /// neither of the target fields.
    pub fn target(&self) -> SchedulerResult<DeployTarget> {
        match (&self.source_dir, &self.wasm_path) {
            (Some(dir), None) => Ok(DeployTarget::Source { dir: dir.clone() }),
            (None, Some(wasm)) => Ok(DeployTarget::Artifact { wasm: wasm.clone() }),
            (Some(_), Some(_)) => Err(SchedulerError::AmbiguousTarget {
                item: self.id.clone(),
            }),
            (None, None) => Err(SchedulerError::MissingTarget {
                item: self.id.clone(),
            }),
        }
    }
}

/// A validated deployment target for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployTarget {
    /// Build the contract in `dir`, then publish the built WASM.
    Source { dir: PathBuf },
    /// Publish the pre-built WASM at `wasm`.
    Artifact { wasm: PathBuf },
}

/// Execution environment identity, passed through opaquely to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployContext {
    /// Target network name (e.g. `"testnet"`, `"futurenet"`).
    pub network: String,
    /// Source account that signs and funds the deployment.
    pub source_account: String,
    /// Optional RPC endpoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl DeployContext {
    pub fn new(network: impl Into<String>, source_account: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            source_account: source_account.into(),
            rpc_url: None,
        }
    }
}

/// Batch execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// One item at a time, in dependency order.
    Sequential,
    /// Up to `concurrency` items at a time, readiness-driven.
    Parallel,
}

/// A complete batch run request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Caller-supplied batch identifier, echoed back in the result.
    pub batch_id: String,
    pub mode: BatchMode,
    pub items: Vec<BatchDeploymentItem>,
    /// Concurrency cap for [`BatchMode::Parallel`]; defaults to 4 when
    /// unset. Ignored in sequential mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

impl BatchRequest {
    /// Default concurrency cap for parallel mode when unspecified.
    pub const DEFAULT_CONCURRENCY: usize = 4;

    /// New request with a freshly minted batch id.
    pub fn new(mode: BatchMode, items: Vec<BatchDeploymentItem>) -> Self {
        Self {
            batch_id: format!("batch-{}", uuid::Uuid::new_v4()),
            mode,
            items,
            concurrency: None,
        }
    }

    /// Effective concurrency cap for this request.
    ///
    /// Sequential mode always resolves to 1; parallel mode clamps to at
    /// least 1 so a zero cap can never deadlock the runner.
    pub fn effective_concurrency(&self) -> usize {
        match self.mode {
            BatchMode::Sequential => 1,
            BatchMode::Parallel => self
                .concurrency
                .unwrap_or(Self::DEFAULT_CONCURRENCY)
                .max(1),
        }
    }
}

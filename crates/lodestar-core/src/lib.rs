//! Lodestar Core Library
//!
//! Batch deployment scheduling for Soroban contracts: dependency graph
//! resolution, sequential and bounded-parallel execution, cascading skips,
//! and cooperative cancellation. Deploy tooling is injected through the
//! [`DeployExecutor`] trait; this crate never shells out on its own.

pub mod aggregator;
pub mod error;
pub mod executor;
pub mod graph;
pub mod item;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use aggregator::ResultAggregator;
pub use error::{SchedulerError, SchedulerResult};
pub use executor::DeployExecutor;
pub use graph::DependencyGraph;
pub use item::{BatchDeploymentItem, BatchMode, BatchRequest, DeployContext, DeployTarget};
pub use outcome::{DeployFailure, DeployOutcome};
pub use report::{BatchDeploymentItemResult, BatchDeploymentResult, ItemStatus};
pub use runner::BatchRunner;
pub use telemetry::init_tracing;

/// Lodestar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

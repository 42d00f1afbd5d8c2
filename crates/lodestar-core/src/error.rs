//! Batch-fatal error taxonomy.
//!
//! Everything here rejects the whole `run` call before any item executes.
//! Per-item deployment failures are never surfaced as errors — they are
//! recorded in the item's result (see [`crate::outcome::DeployFailure`]).

use thiserror::Error;

/// Errors that reject a batch before scheduling begins.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Two items in the batch share an id.
    #[error("duplicate item id in batch: {id}")]
    DuplicateItemId { id: String },

    /// An item references a dependency id that is not in the batch.
    #[error("item '{item}' depends on unknown item '{dependency}'")]
    UnknownDependency { item: String, dependency: String },

    /// An item lists itself in `depends_on`.
    #[error("item '{item}' depends on itself")]
    SelfDependency { item: String },

    /// A dependency cycle was detected among `depends_on` edges.
    #[error("dependency cycle detected involving items: {items:?}")]
    DependencyCycle { items: Vec<String> },

    /// An item sets both a source directory and a pre-built artifact.
    #[error("item '{item}' sets both source_dir and wasm_path; exactly one is required")]
    AmbiguousTarget { item: String },

    /// An item sets neither a source directory nor a pre-built artifact.
    #[error("item '{item}' sets neither source_dir nor wasm_path; exactly one is required")]
    MissingTarget { item: String },
}

/// Convenience result alias.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_displays_item_ids() {
        let err = SchedulerError::DependencyCycle {
            items: vec!["token".to_string(), "vault".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("token"));
        assert!(msg.contains("vault"));
    }

    #[test]
    fn test_unknown_dependency_displays_both_ids() {
        let err = SchedulerError::UnknownDependency {
            item: "vault".to_string(),
            dependency: "missing".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vault"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_ambiguous_target_displays_item() {
        let err = SchedulerError::AmbiguousTarget {
            item: "token".to_string(),
        };
        assert!(err.to_string().contains("token"));
    }
}

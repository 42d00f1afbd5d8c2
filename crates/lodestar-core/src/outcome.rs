//! Deploy executor boundary types.
//!
//! External deploy tooling returns loosely shaped output; everything is
//! normalized into [`DeployOutcome`] at the scheduler boundary so the runner
//! only ever sees a fixed success/failure discriminant.

use serde::{Deserialize, Serialize};

/// Normalized outcome of one item's deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DeployOutcome {
    /// The contract was published.
    Success {
        /// Identifier of the published contract.
        contract_id: String,
        /// Transaction reference for the publish, when the tool reports one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
    },
    /// The deployment failed; the batch continues for independent items.
    Failure(DeployFailure),
}

impl DeployOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployOutcome::Success { .. })
    }
}

/// Structured description of a failed deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployFailure {
    /// Human-readable error message.
    pub message: String,
    /// Short one-line summary, when one can be extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Machine-readable classification (e.g. `"build"`, `"publish"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Suggested remedies, in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Raw diagnostic output from the underlying tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl DeployFailure {
    /// Minimal failure carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a classification.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

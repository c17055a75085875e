use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures a journey can carry, in result values or as a hard error.
///
/// `ElementNotFound` and `AssertionFailed` are encoded in step results and never
/// returned by themselves; `SessionAllocationFailed` is always returned as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JourneyError {
    #[error("No candidate for step '{step}' became interactable (tried {})", .attempted.join(", "))]
    ElementNotFound { step: String, attempted: Vec<String> },

    #[error("Action failed in step '{step}': {reason}")]
    ActionFailed { step: String, reason: String },

    #[error("Assertion '{check}' failed: {detail}")]
    AssertionFailed { check: String, detail: String },

    #[error("Session allocation failed: {reason}")]
    SessionAllocationFailed { reason: String },

    #[error("Journey cancelled during step '{step}' after {elapsed_ms}ms")]
    JourneyCancelled { step: String, elapsed_ms: u64 },
}

impl JourneyError {
    pub fn action_failed(step: &str, reason: impl std::fmt::Display) -> Self {
        JourneyError::ActionFailed {
            step: step.to_string(),
            reason: reason.to_string(),
        }
    }
}

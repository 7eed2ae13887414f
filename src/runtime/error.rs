//! Error types for the posture runtime
//!
//! Compatibility and displacement failures are ordinary results that callers
//! recover from locally. Invariant violations are the one class that is
//! treated as an assertion when strict invariants are enabled.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::ids::{AffordanceId, ObjectId, TaskId};

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Admission-related errors
    #[error("Interaction error: {0}")]
    Interaction(#[from] InteractionError),

    /// Posture node errors
    #[error("Posture error: {0}")]
    Posture(#[from] PostureError),

    /// Snapshot reconstruction errors
    #[error("Reconstruction error: {0}")]
    Reconstruction(#[from] ReconstructionError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Admission and removal errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InteractionError {
    /// Candidate failed the non-geometric or geometric compatibility test
    #[error("Interaction {task} is incompatible with {blocking:?}")]
    IncompatibleTask {
        /// Candidate interaction
        task: TaskId,
        /// Interactions that block it
        blocking: Vec<TaskId>,
    },

    /// An interaction refused to be displaced
    #[error("Interaction {task} could not displace {refused_by}")]
    DisplacementFailed {
        /// Candidate interaction
        task: TaskId,
        /// Interaction whose displacement hook refused
        refused_by: TaskId,
    },

    /// Interaction is already tracked by the set
    #[error("Interaction {0} is already tracked")]
    AlreadyTracked(TaskId),

    /// Interaction not found in the arena
    #[error("Interaction {0} not found")]
    UnknownTask(TaskId),

    /// Actor not found in the arena
    #[error("Actor {0} not found")]
    UnknownActor(ObjectId),

    /// No transition is attached to the interaction
    #[error("Interaction {0} has no transition")]
    NoTransition(TaskId),

    /// The transition was planned from a posture that is no longer current
    #[error("Transition of {0} is stale")]
    StaleTransition(TaskId),

    /// The transition failed validation or does not reach the required posture
    #[error("Transition of {0} is not valid")]
    InvalidTransition(TaskId),

    /// Internal bookkeeping went inconsistent
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Convenience result alias for admission operations
pub type InteractionResult<T> = std::result::Result<T, InteractionError>;

/// Posture node construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostureError {
    /// A slot type was set without a surface target
    #[error("Slot membership requires a surface target")]
    SlotWithoutSurface,
}

/// Convenience result alias for posture operations
pub type PostureResult<T> = std::result::Result<T, PostureError>;

/// Reasons a persisted interaction could not be re-admitted on load
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconstructionError {
    /// The affordance is no longer registered
    #[error("Affordance '{0}' is not registered")]
    MissingAffordance(AffordanceId),

    /// The target object no longer exists
    #[error("Target {0} no longer exists")]
    MissingTarget(ObjectId),

    /// The factory declined to rebuild the interaction
    #[error("Factory could not rebuild '{0}'")]
    FactoryDeclined(AffordanceId),

    /// The rebuilt interaction was refused by the normal add path
    #[error("Re-admission refused: {0}")]
    Rejected(#[from] InteractionError),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Atomic write failed
    #[error("Atomic write failed for {path}: {detail}")]
    AtomicWriteFailed {
        /// Path where write failed
        path: PathBuf,
        /// Error details
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Report an invariant violation
///
/// Always logged. Panics when `strict` is set so debug and test builds fail
/// loudly; otherwise the caller aborts only the current operation.
pub(crate) fn invariant_violation(strict: bool, detail: impl Into<String>) -> InteractionError {
    let detail = detail.into();
    tracing::error!(detail = %detail, "invariant violation");
    if strict {
        panic!("invariant violation: {detail}");
    }
    InteractionError::InvariantViolation(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relaxed_invariant_violation_is_returned() {
        let err = invariant_violation(false, "double insert");
        assert_eq!(err, InteractionError::InvariantViolation("double insert".into()));
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn test_strict_invariant_violation_panics() {
        let _ = invariant_violation(true, "double insert");
    }

    #[test]
    fn test_runtime_error_wraps_interaction_error() {
        let err: RuntimeError = InteractionError::AlreadyTracked(TaskId(3)).into();
        assert!(err.to_string().contains("si#3"));
    }
}

//! Errors raised by model construction, evaluation, and persistence.

use game_core::GameError;
use thiserror::Error;

/// Model errors.
///
/// The type is `Clone` so a failure of one batched evaluation can be
/// replicated to every request that was coalesced into the batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("representation shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("feature outputs are not available through this model")]
    FeatureUnsupported,

    #[error("failed to load model snapshot: {0}")]
    Load(String),

    #[error("evaluation was cancelled before a result arrived")]
    Cancelled,

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Game(#[from] GameError),
}

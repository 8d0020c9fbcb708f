//! Error types surfaced by the engine facade

use thiserror::Error;

use super::types::IntersectionId;

/// Broad classification of engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed something the engine will not accept. State is unchanged.
    InvalidArgument,
    /// Internal bookkeeping went wrong. Indicates a bug in the engine.
    InvariantViolation,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("simulation speed must be a positive finite number, got {0}")]
    InvalidSpeed(f32),

    #[error("unknown intersection {0}")]
    UnknownIntersection(IntersectionId),

    #[error("invalid signal phase {0:?}")]
    InvalidPhase(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            EngineError::InvalidSpeed(_)
            | EngineError::UnknownIntersection(_)
            | EngineError::InvalidPhase(_)
            | EngineError::InvalidConfig(_) => ErrorKind::InvalidArgument,
        }
    }
}

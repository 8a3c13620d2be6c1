//! Error types for the engine
//!
//! Primitive faults are isolated per thread by the scheduler; bundle errors
//! surface when a script bundle is loaded.

use thiserror::Error;

use super::blocks::BlockId;

/// Error raised by a block primitive during a step.
///
/// The scheduler catches these at the per-thread step boundary, terminates the
/// offending thread and records a [`ThreadFault`](super::scheduler::ThreadFault).
#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{name}' must be {expected}")]
    WrongArgumentType { name: String, expected: &'static str },

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PrimitiveError {
    pub fn message(msg: impl Into<String>) -> Self {
        PrimitiveError::Message(msg.into())
    }
}

/// Error raised while loading or validating a script bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to parse bundle: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate block id '{0}'")]
    DuplicateBlock(BlockId),

    #[error("block '{block}' references unknown block '{target}'")]
    UnknownReference { block: BlockId, target: BlockId },
}

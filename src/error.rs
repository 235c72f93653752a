//! Error types for container validation and chain application.

use std::io;
use thiserror::Error;

use crate::container::ContainerError;
use crate::engine::EngineFailure;

/// Result type alias for chain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Patch at `index` is not a valid container.
    #[error("patch {index} is invalid: {source}")]
    Container {
        /// Position of the patch in the chain
        index: usize,
        /// Why validation failed
        #[source]
        source: ContainerError,
    },

    /// Delta engine rejected the patch at `index`.
    #[error("patch {index} failed: {source}")]
    ApplyFailed {
        /// Position of the patch in the chain
        index: usize,
        /// Failure reported by the engine
        #[source]
        source: EngineFailure,
    },

    /// A chain needs at least one patch.
    #[error("no patches to apply")]
    EmptyChain,

    /// I/O error while reading inputs or writing the result
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Chain position the error is attributed to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Error::Container { index, .. } | Error::ApplyFailed { index, .. } => Some(*index),
            Error::EmptyChain | Error::Io(_) => None,
        }
    }
}

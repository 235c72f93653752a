/*!
Apply ordered chains of binary delta patches.

Every patch is a container (the `PA` signature, optionally preceded by a
CRC32 of the rest) handed to a pluggable [`DeltaEngine`]. Patches are applied
cumulatively, each to the output of the previous one, and every intermediate
engine buffer is released exactly once whatever the outcome of the chain.
*/

pub mod container;
pub mod engine;
mod error;
mod patcher;
mod utils;

pub use container::{validate, ContainerError};
pub use engine::bsdiff::BsdiffEngine;
#[cfg(windows)]
pub use engine::msdelta::{MsDeltaBuffer, MsDeltaEngine};
pub use engine::{ApplyFlags, BufferView, DeltaEngine, EngineFailure};
pub use error::{Error, Result};
pub use patcher::{EngineBuffer, Patcher};
pub use utils::digest;

//! Delta engines.
//!
//! The engine performs the actual delta application. It is injected into the
//! [`Patcher`](crate::Patcher) so the platform library, the portable bsdiff
//! engine or a test double can be swapped without touching the chain logic.

use std::io;
use thiserror::Error;

pub mod bsdiff;
#[cfg(windows)]
pub mod msdelta;

/// Flags passed to the engine for every apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyFlags {
    /// Only the current patch format is accepted.
    #[default]
    None,
    /// The engine may also accept the legacy (PA19) format.
    AllowLegacyFormat,
}

impl ApplyFlags {
    /// Flags for a legacy switch.
    pub fn from_legacy(legacy: bool) -> Self {
        if legacy {
            ApplyFlags::AllowLegacyFormat
        } else {
            ApplyFlags::None
        }
    }

    /// Raw flag word, as understood by `ApplyDeltaB`.
    pub fn bits(self) -> u64 {
        match self {
            ApplyFlags::None => 0x0000_0000,
            ApplyFlags::AllowLegacyFormat => 0x0000_0001,
        }
    }

    pub fn allows_legacy(self) -> bool {
        self == ApplyFlags::AllowLegacyFormat
    }
}

/// Read-only view of an input buffer.
///
/// Engines never edit their inputs, the shared borrow makes that explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
}

impl<'a> BufferView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        BufferView { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<'a> From<&'a [u8]> for BufferView<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        BufferView::new(bytes)
    }
}

/// Failure reported by an engine.
#[derive(Error, Debug)]
pub enum EngineFailure {
    /// The engine refused the patch without further detail.
    #[error("delta engine rejected the patch")]
    Rejected,

    /// OS or stream level error.
    #[error("delta engine error: {0}")]
    Io(#[from] io::Error),

    /// The patch payload is not something the engine can use.
    #[error("corrupt patch payload: {0}")]
    Corrupt(String),
}

/// Delta application capability.
///
/// Every `Output` returned by [`apply`](DeltaEngine::apply) must be passed to
/// [`free`](DeltaEngine::free) exactly once. Taking it by value there makes a
/// second release impossible to express.
pub trait DeltaEngine {
    /// Engine-owned output buffer.
    type Output: AsRef<[u8]>;

    /// Apply `patch` to `source`, producing a new buffer.
    fn apply(
        &self,
        flags: ApplyFlags,
        source: BufferView<'_>,
        patch: BufferView<'_>,
    ) -> Result<Self::Output, EngineFailure>;

    /// Release a buffer produced by `apply`.
    fn free(&self, output: Self::Output);
}

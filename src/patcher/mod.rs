#![forbid(unsafe_code)]
//! Sequential application of patch chains.

use std::fmt;
use std::ops::Deref;

use log::{debug, info, trace};

use crate::container;
use crate::engine::{ApplyFlags, BufferView, DeltaEngine};
use crate::error::{Error, Result};

/// Output of a delta engine, released through that engine when dropped.
///
/// Holding an `EngineBuffer` is holding the only reference to the engine
/// allocation, so every buffer is released exactly once: when the chain moves
/// past it, when an error unwinds the chain, or when the caller drops the
/// final result.
pub struct EngineBuffer<'e, E: DeltaEngine + ?Sized> {
    engine: &'e E,
    output: Option<E::Output>,
}

impl<'e, E: DeltaEngine + ?Sized> EngineBuffer<'e, E> {
    fn new(engine: &'e E, output: E::Output) -> Self {
        EngineBuffer {
            engine,
            output: Some(output),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self.output {
            Some(ref output) => output.as_ref(),
            None => &[],
        }
    }

    /// Read-only view, suitable as the source of the next step.
    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(self.as_bytes())
    }

    /// Copy the bytes out of the engine allocation.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl<E: DeltaEngine + ?Sized> Deref for EngineBuffer<'_, E> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<E: DeltaEngine + ?Sized> AsRef<[u8]> for EngineBuffer<'_, E> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<E: DeltaEngine + ?Sized> fmt::Debug for EngineBuffer<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuffer")
            .field("len", &self.len())
            .finish()
    }
}

impl<E: DeltaEngine + ?Sized> Drop for EngineBuffer<'_, E> {
    fn drop(&mut self) {
        if let Some(output) = self.output.take() {
            trace!("releasing {} byte engine buffer", output.as_ref().len());
            self.engine.free(output);
        }
    }
}

/// Applies patch chains through a delta engine.
///
/// Apply two patches in order, allowing the legacy format:
/// ```
/// use deltachain::{BsdiffEngine, Patcher};
///
/// fn patch_twice(base: &[u8], first: &[u8], second: &[u8]) -> deltachain::Result<Vec<u8>> {
///     let engine = BsdiffEngine::new();
///     let patched = Patcher::new(&engine)
///         .legacy(true)
///         .apply_chain(base, &[first, second])?;
///     Ok(patched.to_vec())
/// }
/// ```
pub struct Patcher<'e, E: DeltaEngine + ?Sized> {
    engine: &'e E,
    flags: ApplyFlags,
}

impl<'e, E: DeltaEngine + ?Sized> Patcher<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Patcher {
            engine,
            flags: ApplyFlags::None,
        }
    }

    /// Let the engine accept the legacy patch format (default is `false`).
    pub fn legacy(mut self, legacy: bool) -> Self {
        self.flags = ApplyFlags::from_legacy(legacy);
        self
    }

    /// Flags handed to the engine on every step.
    pub fn flags(&self) -> ApplyFlags {
        self.flags
    }

    /// Apply one validated patch to `source`.
    ///
    /// `index` is only used to attribute a failure. The source is never
    /// released here, whoever provided it keeps owning it.
    pub fn apply_step(
        &self,
        index: usize,
        source: BufferView<'_>,
        patch: &[u8],
    ) -> Result<EngineBuffer<'e, E>> {
        trace!(
            "step {}: {} byte source, {} byte patch, {:?}",
            index,
            source.len(),
            patch.len(),
            self.flags
        );
        match self.engine.apply(self.flags, source, BufferView::new(patch)) {
            Ok(output) => Ok(EngineBuffer::new(self.engine, output)),
            Err(source) => {
                debug!("step {} failed: {}", index, source);
                Err(Error::ApplyFailed { index, source })
            }
        }
    }

    /// Apply `patches` in order, starting from `initial`.
    ///
    /// Each raw container is validated right before its step runs, so a bad
    /// container stops the chain without touching the ones after it. The
    /// returned buffer belongs to the caller; every buffer produced before it
    /// has already been released, on success and failure alike.
    pub fn apply_chain<P>(&self, initial: &[u8], patches: &[P]) -> Result<EngineBuffer<'e, E>>
    where
        P: AsRef<[u8]>,
    {
        if patches.is_empty() {
            return Err(Error::EmptyChain);
        }

        let mut current: Option<EngineBuffer<'e, E>> = None;
        for (index, raw) in patches.iter().enumerate() {
            let patch = container::validate(raw.as_ref()).map_err(|source| {
                debug!("patch {} rejected: {}", index, source);
                Error::Container { index, source }
            })?;

            let source = match current {
                Some(ref buffer) => buffer.view(),
                None => BufferView::new(initial),
            };
            let next = self.apply_step(index, source, patch)?;
            debug!("patch {} applied, {} bytes", index, next.len());

            // the previous intermediate is released here
            current = Some(next);
        }

        let patched = current.ok_or(Error::EmptyChain)?;
        info!(
            "applied {} patches, {} bytes result",
            patches.len(),
            patched.len()
        );
        Ok(patched)
    }
}

//! Binding to the Windows delta compression API (`msdelta.dll`).

use std::ffi::c_void;
use std::io;
use std::ptr;
use std::slice;

use log::{trace, warn};

use super::{ApplyFlags, BufferView, DeltaEngine, EngineFailure};

type Bool = i32;

const FALSE: Bool = 0;

#[repr(C)]
struct DeltaInput {
    start: *const c_void,
    size: usize,
    editable: Bool,
}

#[repr(C)]
struct DeltaOutput {
    start: *mut c_void,
    size: usize,
}

#[link(name = "msdelta")]
extern "system" {
    #[link_name = "ApplyDeltaB"]
    fn apply_delta_b(
        flags: u64,
        source: DeltaInput,
        delta: DeltaInput,
        target: *mut DeltaOutput,
    ) -> Bool;

    #[link_name = "DeltaFree"]
    fn delta_free(memory: *mut c_void) -> Bool;
}

impl From<BufferView<'_>> for DeltaInput {
    fn from(view: BufferView<'_>) -> Self {
        DeltaInput {
            start: view.as_ptr().cast(),
            size: view.len(),
            editable: FALSE,
        }
    }
}

/// Buffer allocated by `ApplyDeltaB`.
#[derive(Debug)]
pub struct MsDeltaBuffer {
    start: *mut c_void,
    size: usize,
}

impl AsRef<[u8]> for MsDeltaBuffer {
    fn as_ref(&self) -> &[u8] {
        if self.start.is_null() || self.size == 0 {
            return &[];
        }
        // SAFETY: msdelta owns `size` initialized bytes at `start` until the
        // buffer is handed to `DeltaFree`, which consumes `self`.
        unsafe { slice::from_raw_parts(self.start as *const u8, self.size) }
    }
}

/// Engine backed by the platform `msdelta.dll`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsDeltaEngine;

impl MsDeltaEngine {
    pub fn new() -> Self {
        MsDeltaEngine
    }
}

impl DeltaEngine for MsDeltaEngine {
    type Output = MsDeltaBuffer;

    fn apply(
        &self,
        flags: ApplyFlags,
        source: BufferView<'_>,
        patch: BufferView<'_>,
    ) -> Result<MsDeltaBuffer, EngineFailure> {
        let mut output = DeltaOutput {
            start: ptr::null_mut(),
            size: 0,
        };
        trace!(
            "ApplyDeltaB(flags={:#x}, source={} bytes, delta={} bytes)",
            flags.bits(),
            source.len(),
            patch.len()
        );
        // SAFETY: both inputs borrow live slices for the duration of the call
        // and are marked read-only; `output` is a valid out pointer.
        let ok = unsafe { apply_delta_b(flags.bits(), source.into(), patch.into(), &mut output) };
        if ok == FALSE {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(0) | None => EngineFailure::Rejected,
                Some(_) => EngineFailure::Io(err),
            });
        }
        Ok(MsDeltaBuffer {
            start: output.start,
            size: output.size,
        })
    }

    fn free(&self, output: MsDeltaBuffer) {
        if output.start.is_null() {
            return;
        }
        // SAFETY: `start` came from a successful `ApplyDeltaB` and `output` is
        // consumed here, so it cannot be released twice.
        if unsafe { delta_free(output.start) } == FALSE {
            warn!("DeltaFree failed: {}", io::Error::last_os_error());
        }
    }
}

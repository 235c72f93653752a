#![forbid(unsafe_code)]
//! Patch container sniffing.
//!
//! A patch file is the engine payload preceded by the two byte signature
//! `PA`. Some distributions (Windows Update MSU packages among them) prepend
//! a little-endian CRC32 of everything that follows:
//!
//! ```text
//! [crc32 (4 bytes, optional)] "PA" [payload]
//! ```

use byteorder::{ByteOrder, LE};
use log::debug;
use thiserror::Error;

/// Container signature.
pub const SIGNATURE: &[u8; 2] = b"PA";

/// Size of the optional CRC32 prefix.
pub const CRC_PREFIX_LEN: usize = 4;

/// Container validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// Signature missing, or not where a container can place it.
    #[error("{}", malformed_reason(.offset))]
    Malformed {
        /// Offset of the first signature found, if any
        offset: Option<usize>,
    },

    /// CRC32 prefix does not match the data it covers.
    #[error("CRC32 check failed (stored {stored:#010x}, computed {computed:#010x}), patch corrupted or invalid")]
    Integrity {
        /// Value read from the prefix
        stored: u32,
        /// Value computed over the remainder
        computed: u32,
    },
}

fn malformed_reason(offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!("signature found at offset {}, expected 0 or 4", offset),
        None => "signature not found".to_owned(),
    }
}

/// Validate a raw patch file, returning the bytes to hand to the engine.
///
/// Unprefixed containers come back unchanged. Prefixed ones come back with
/// the CRC32 stripped, once it has been checked against the remainder.
pub fn validate(raw: &[u8]) -> Result<&[u8], ContainerError> {
    if raw.starts_with(SIGNATURE) {
        debug!("container of {} bytes has no CRC32 prefix", raw.len());
        return Ok(raw);
    }

    match find_signature(raw) {
        Some(CRC_PREFIX_LEN) => (),
        offset => return Err(ContainerError::Malformed { offset }),
    }

    let (prefix, remainder) = raw.split_at(CRC_PREFIX_LEN);
    let stored = LE::read_u32(prefix);
    let computed = crc32fast::hash(remainder);
    if stored != computed {
        return Err(ContainerError::Integrity { stored, computed });
    }

    debug!(
        "container of {} bytes passed CRC32 check ({:#010x})",
        raw.len(),
        stored
    );
    Ok(remainder)
}

/// Offset of the first signature occurrence.
#[inline]
fn find_signature(raw: &[u8]) -> Option<usize> {
    raw.windows(SIGNATURE.len()).position(|w| w == SIGNATURE)
}

use byteorder::{ByteOrder, LE};
use bzip2::write::BzEncoder;
use bzip2::Compression;
use deltachain::{ApplyFlags, BufferView, DeltaEngine, EngineFailure};
use rand::prelude::*;
use std::cell::RefCell;
use std::io;
use std::io::prelude::*;

/// Stub payload opcode: output the source unchanged.
pub const OP_IDENTITY: u8 = b'=';
/// Stub payload opcode: append the rest of the payload to the source.
pub const OP_APPEND: u8 = b'+';
/// Stub payload opcode: report a failure.
pub const OP_FAIL: u8 = b'!';

/// One observed `apply` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub flags: ApplyFlags,
    pub source: Vec<u8>,
    pub patch: Vec<u8>,
}

/// Buffer handed out by the stub engine.
#[derive(Debug)]
pub struct StubBuffer {
    pub id: usize,
    bytes: Vec<u8>,
}

impl AsRef<[u8]> for StubBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes[..]
    }
}

/// Engine understanding the tiny stub payload language, recording every call.
///
/// A payload is `"PA"` followed by one opcode byte and its operand:
/// [`OP_IDENTITY`], [`OP_APPEND`] or [`OP_FAIL`].
#[derive(Debug, Default)]
pub struct StubEngine {
    calls: RefCell<Vec<Call>>,
    produced: RefCell<Vec<usize>>,
    freed: RefCell<Vec<usize>>,
}

impl StubEngine {
    pub fn new() -> Self {
        StubEngine::default()
    }

    /// All apply calls, including failed ones.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Ids of buffers produced by successful applies.
    pub fn produced(&self) -> Vec<usize> {
        self.produced.borrow().clone()
    }

    /// Ids of released buffers, in release order.
    pub fn freed(&self) -> Vec<usize> {
        self.freed.borrow().clone()
    }

    /// Produced buffers not released yet.
    pub fn outstanding(&self) -> Vec<usize> {
        let freed = self.freed.borrow();
        self.produced
            .borrow()
            .iter()
            .copied()
            .filter(|id| !freed.contains(id))
            .collect()
    }
}

impl DeltaEngine for StubEngine {
    type Output = StubBuffer;

    fn apply(
        &self,
        flags: ApplyFlags,
        source: BufferView<'_>,
        patch: BufferView<'_>,
    ) -> Result<StubBuffer, EngineFailure> {
        self.calls.borrow_mut().push(Call {
            flags,
            source: source.as_bytes().to_vec(),
            patch: patch.as_bytes().to_vec(),
        });

        let payload = patch
            .as_bytes()
            .strip_prefix(&b"PA"[..])
            .ok_or_else(|| EngineFailure::Corrupt("no signature".to_owned()))?;
        let bytes = match payload.split_first() {
            Some((&OP_IDENTITY, _)) => source.as_bytes().to_vec(),
            Some((&OP_APPEND, tail)) => {
                let mut bytes = source.as_bytes().to_vec();
                bytes.extend_from_slice(tail);
                bytes
            }
            Some((&OP_FAIL, _)) => return Err(EngineFailure::Rejected),
            _ => return Err(EngineFailure::Corrupt("unknown opcode".to_owned())),
        };

        let mut produced = self.produced.borrow_mut();
        let id = produced.len();
        produced.push(id);
        Ok(StubBuffer { id, bytes })
    }

    fn free(&self, output: StubBuffer) {
        let mut freed = self.freed.borrow_mut();
        assert!(!freed.contains(&output.id), "buffer {} released twice", output.id);
        freed.push(output.id);
    }
}

/// Stub container leaving the source unchanged.
pub fn identity_patch() -> Vec<u8> {
    vec![b'P', b'A', OP_IDENTITY]
}

/// Stub container appending `tail` to the source.
pub fn append_patch(tail: &[u8]) -> Vec<u8> {
    let mut patch = vec![b'P', b'A', OP_APPEND];
    patch.extend_from_slice(tail);
    patch
}

/// Stub container the engine rejects.
pub fn failing_patch() -> Vec<u8> {
    vec![b'P', b'A', OP_FAIL]
}

/// Prepend the little-endian CRC32 of `container`.
pub fn with_crc(container: &[u8]) -> Vec<u8> {
    let mut raw = vec![0; 4];
    LE::write_u32(&mut raw[..], crc32fast::hash(container));
    raw.extend_from_slice(container);
    raw
}

/// Build a `"PA"` container with a bsdiff 4.x payload turning `s` into `t`.
///
/// The payload is a single control: add over the common prefix length, copy
/// the rest of the target as extra bytes.
pub fn bsdiff_container(s: &[u8], t: &[u8]) -> io::Result<Vec<u8>> {
    let add = Ord::min(s.len(), t.len());
    let delta: Vec<u8> = s[..add]
        .iter()
        .zip(t[..add].iter())
        .map(|(&a, &b)| b.wrapping_sub(a))
        .collect();
    let extra = &t[add..];

    let mut ctrl = [0; 24];
    encode_int(add as i64, &mut ctrl[0..8]);
    encode_int(extra.len() as i64, &mut ctrl[8..16]);
    encode_int(0, &mut ctrl[16..24]);

    let bz_ctrl = bzip(&ctrl[..])?;
    let bz_delta = bzip(&delta[..])?;
    let bz_extra = bzip(extra)?;

    let mut header = [0; 32];
    header[..8].copy_from_slice(b"BSDIFF40");
    encode_int(bz_ctrl.len() as i64, &mut header[8..16]);
    encode_int(bz_delta.len() as i64, &mut header[16..24]);
    encode_int(t.len() as i64, &mut header[24..32]);

    let mut container = b"PA".to_vec();
    container.extend_from_slice(&header[..]);
    container.extend_from_slice(&bz_ctrl[..]);
    container.extend_from_slice(&bz_delta[..]);
    container.extend_from_slice(&bz_extra[..]);
    Ok(container)
}

fn bzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut enc = BzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    enc.finish()
}

/// Encodes a bsdiff sign-magnitude integer.
fn encode_int(x: i64, b: &mut [u8]) {
    if x < 0 {
        LE::write_u64(b, x.wrapping_neg() as u64 | 0x8000000000000000);
    } else {
        LE::write_u64(b, x as u64);
    }
}

/// Random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut rng = thread_rng();
    let mut bytes = Vec::with_capacity(n);
    for _ in 0..n {
        bytes.push(rng.gen())
    }
    bytes
}

/// Copy of `source` with roughly `rate` of its bytes replaced and a random
/// tail of up to `grow` bytes.
pub fn distort(source: &[u8], rate: f64, grow: usize) -> Vec<u8> {
    let mut rng = thread_rng();
    let mut target: Vec<u8> = source
        .iter()
        .map(|&b| if rng.gen_bool(rate) { rng.gen() } else { b })
        .collect();
    let tail = rng.gen_range(0, grow + 1);
    target.extend(random_bytes(tail));
    target
}

#![forbid(unsafe_code)]
use super::{ApplyFlags, BufferView, DeltaEngine, EngineFailure};
use crate::container::SIGNATURE;
use crate::utils::decode_int;
use bzip2::read::BzDecoder;
use log::trace;
use std::io::{Cursor, Error, ErrorKind, Read, Result, Seek, SeekFrom};

/// Default chunk size.
pub const CHUNK_SIZE: usize = 16384;

/// Portable engine for containers carrying a bsdiff 4.x payload.
///
/// The container is `"PA"` followed by a regular `BSDIFF40` patch. bsdiff has
/// no legacy format, so [`ApplyFlags::AllowLegacyFormat`] changes nothing.
///
/// ```
/// use deltachain::{BsdiffEngine, Patcher};
///
/// fn patch(source: &[u8], containers: &[Vec<u8>]) -> deltachain::Result<Vec<u8>> {
///     let engine = BsdiffEngine::new().chunk_size(4096);
///     let patched = Patcher::new(&engine).apply_chain(source, containers)?;
///     Ok(patched.to_vec())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BsdiffEngine {
    chunk_size: usize,
}

impl Default for BsdiffEngine {
    fn default() -> Self {
        BsdiffEngine::new()
    }
}

impl BsdiffEngine {
    pub fn new() -> Self {
        BsdiffEngine {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Set the working chunk size, (`cs > 128`, default is `CHUNK_SIZE`).
    pub fn chunk_size(mut self, mut cs: usize) -> Self {
        if cs < 128 {
            cs = 128;
        }
        self.chunk_size = cs;
        self
    }
}

impl DeltaEngine for BsdiffEngine {
    type Output = Vec<u8>;

    fn apply(
        &self,
        flags: ApplyFlags,
        source: BufferView<'_>,
        patch: BufferView<'_>,
    ) -> std::result::Result<Vec<u8>, EngineFailure> {
        if flags.allows_legacy() {
            trace!("bsdiff payloads have no legacy variant, flag ignored");
        }
        let payload = patch
            .as_bytes()
            .strip_prefix(&SIGNATURE[..])
            .ok_or_else(|| EngineFailure::Corrupt("missing container signature".to_owned()))?;
        let stream = parse(payload)?;
        let tsize = stream.tsize;

        let mut target = Vec::new();
        target
            .try_reserve_exact(tsize as usize)
            .map_err(|_| EngineFailure::Corrupt(format!("target size {} too large", tsize)))?;
        Context::new(stream, source.as_bytes(), &mut target, self.chunk_size).apply()?;

        if target.len() as u64 != tsize {
            return Err(EngineFailure::Corrupt(format!(
                "expected {} target bytes, produced {}",
                tsize,
                target.len()
            )));
        }
        Ok(target)
    }

    fn free(&self, output: Vec<u8>) {
        drop(output);
    }
}

struct PatchStream<'a> {
    tsize: u64,
    ctrls: BzDecoder<Cursor<&'a [u8]>>,
    delta: BzDecoder<Cursor<&'a [u8]>>,
    extra: BzDecoder<Cursor<&'a [u8]>>,
}

/// Parse the bsdiff 4.x stream.
fn parse(patch: &[u8]) -> Result<PatchStream> {
    if patch.len() < 32 || &patch[..8] != b"BSDIFF40" {
        return Err(Error::new(ErrorKind::InvalidData, "not a bsdiff 4.x payload"));
    }

    let csize = decode_int(&patch[8..16]);
    let dsize = decode_int(&patch[16..24]);
    let tsize = decode_int(&patch[24..32]);
    if csize < 0 || dsize < 0 || tsize < 0 {
        return Err(Error::new(ErrorKind::InvalidData, "negative header field"));
    }
    let (csize, dsize) = (csize as u64, dsize as u64);
    let end = csize.checked_add(dsize).and_then(|n| n.checked_add(32));
    if end.map_or(true, |end| end > patch.len() as u64) {
        return Err(Error::new(ErrorKind::InvalidData, "payload truncated"));
    }

    let (_, remain) = patch.split_at(32);
    let (bz_ctrls, remain) = remain.split_at(csize as usize);
    let (bz_delta, bz_extra) = remain.split_at(dsize as usize);

    Ok(PatchStream {
        tsize: tsize as u64,
        ctrls: BzDecoder::new(Cursor::new(bz_ctrls)),
        delta: BzDecoder::new(Cursor::new(bz_delta)),
        extra: BzDecoder::new(Cursor::new(bz_extra)),
    })
}

/// Single bsdiff control instruction.
#[derive(Debug)]
struct Control {
    add: u64,
    copy: u64,
    seek: i64,
}

/// Application context, writing straight into the output buffer.
struct Context<'s, 'p, 't> {
    source: Cursor<&'s [u8]>,
    target: &'t mut Vec<u8>,
    stream: PatchStream<'p>,
    buf: Vec<u8>,
    dlt: Vec<u8>,
    ctl: [u8; 24],
}

impl<'s, 'p, 't> Context<'s, 'p, 't> {
    fn new(
        stream: PatchStream<'p>,
        source: &'s [u8],
        target: &'t mut Vec<u8>,
        chunk: usize,
    ) -> Self {
        Context {
            source: Cursor::new(source),
            target,
            stream,
            buf: vec![0; chunk],
            dlt: vec![0; chunk],
            ctl: [0; 24],
        }
    }

    fn apply(mut self) -> Result<()> {
        while let Some(Control { add, copy, seek }) = self.next()? {
            self.add(add)?;
            self.copy(copy)?;
            self.source.seek(SeekFrom::Current(seek))?;
        }
        Ok(())
    }

    /// Read the next control, `None` at the end of the stream.
    fn next(&mut self) -> Result<Option<Control>> {
        if read_exact_or_eof(&mut self.stream.ctrls, &mut self.ctl[..])? == 0 {
            return Ok(None);
        }
        let add = decode_int(&self.ctl[0..]);
        let copy = decode_int(&self.ctl[8..]);
        let seek = decode_int(&self.ctl[16..]);
        if add < 0 || copy < 0 {
            return Err(Error::new(ErrorKind::InvalidData, "negative control length"));
        }
        Ok(Some(Control {
            add: add as u64,
            copy: copy as u64,
            seek,
        }))
    }

    /// Add delta bytes to source bytes.
    fn add(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            let k = Ord::min(count, self.buf.len() as u64) as usize;
            self.reserve_target(k)?;
            self.source.read_exact(&mut self.buf[..k])?;
            self.stream.delta.read_exact(&mut self.dlt[..k])?;
            for (b, d) in self.buf[..k].iter_mut().zip(self.dlt[..k].iter()) {
                *b = b.wrapping_add(*d);
            }
            self.target.extend_from_slice(&self.buf[..k]);
            count -= k as u64;
        }
        Ok(())
    }

    /// Copy extra bytes verbatim.
    fn copy(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            let k = Ord::min(count, self.buf.len() as u64) as usize;
            self.reserve_target(k)?;
            self.stream.extra.read_exact(&mut self.buf[..k])?;
            self.target.extend_from_slice(&self.buf[..k]);
            count -= k as u64;
        }
        Ok(())
    }

    /// Check `k` more bytes still fit the target size from the header.
    fn reserve_target(&self, k: usize) -> Result<()> {
        if self.target.len() as u64 + k as u64 > self.stream.tsize {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "controls overrun the target size",
            ));
        }
        Ok(())
    }
}

// Read exact buf.len() bytes or reads an EOF, return the count of bytes read.
#[inline]
fn read_exact_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut cnt = 0;
    while cnt < buf.len() {
        match r.read(&mut buf[cnt..]) {
            Ok(0) => break,
            Ok(n) => cnt += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    if cnt != 0 && cnt != buf.len() {
        Err(Error::new(ErrorKind::UnexpectedEof, "truncated control block"))
    } else {
        Ok(cnt)
    }
}

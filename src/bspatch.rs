#![forbid(unsafe_code)]
use super::bsdiff::{HEADER_SIZE, MAGIC};
use super::error::{Error, Result};
use super::utils::*;
use bzip2::read::BzDecoder;
use log::debug;
use std::io::{ErrorKind, Read, Write};

/// Default buffer size.
pub const BUFFER_SIZE: usize = 16384;

/// Upper bound of the target buffer reserved up front from the header.
const PREALLOC_LIMIT: u64 = 64 * 1024 * 1024;

/// Patcher for bsdiff 4.x patches.
///
/// The whole target is assembled in memory and only written out once the
/// patch has been applied successfully, so a corrupt patch never produces
/// partial output.
///
/// Apply patch to source using a 4k buffer:
/// ```
/// use bsdelta::Bspatch;
///
/// fn bspatch(source: &[u8], patch: &[u8]) -> bsdelta::Result<Vec<u8>> {
///     let mut target = Vec::new();
///     Bspatch::new(patch)?
///         .buffer_size(4096)
///         .apply(source, &mut target)?;
///     Ok(target)
/// }
/// # let patch = bsdelta::diff(b"old", b"new").unwrap();
/// # assert_eq!(bspatch(b"old", &patch).unwrap(), b"new");
/// ```
///
/// Preallocate target vector before applying patch:
/// ```
/// use bsdelta::Bspatch;
///
/// fn bspatch(source: &[u8], patch: &[u8]) -> bsdelta::Result<Vec<u8>> {
///     let patcher = Bspatch::new(patch)?;
///     let mut target = Vec::with_capacity(patcher.hint_target_size() as usize);
///     patcher.apply(source, &mut target)?;
///     Ok(target)
/// }
/// # let patch = bsdelta::diff(b"old", b"new").unwrap();
/// # assert_eq!(bspatch(b"old", &patch).unwrap(), b"new");
/// ```
pub struct Bspatch<'p> {
    patch: PatchFile<'p>,
    buffer_size: usize,
}

impl<'p> Bspatch<'p> {
    /// Parse the patch file and create new patcher configuration.
    ///
    /// Return error if failed to parse the patch header.
    pub fn new(patch: &'p [u8]) -> Result<Self> {
        Ok(Bspatch {
            patch: parse(patch)?,
            buffer_size: BUFFER_SIZE,
        })
    }

    /// Set the read buffer size, (`bs >= 128`, default is `BUFFER_SIZE`).
    pub fn buffer_size(mut self, mut bs: usize) -> Self {
        if bs < 128 {
            bs = 128;
        }
        self.buffer_size = bs;
        self
    }

    /// Hint the final target file size, as provided in the patch header.
    pub fn hint_target_size(&self) -> u64 {
        self.patch.tsize
    }

    /// Apply patch to the source data and output the stream of target.
    ///
    /// The target data size would be returned if no error occurs.
    pub fn apply<T: Write>(self, source: &[u8], mut target: T) -> Result<u64> {
        let ctx = Context::new(self.patch, source, self.buffer_size);
        let data = ctx.apply()?;
        target.write_all(&data[..])?;
        target.flush()?;
        Ok(data.len() as u64)
    }
}

struct PatchFile<'a> {
    tsize: u64,
    ctrls: BzDecoder<&'a [u8]>,
    delta: BzDecoder<&'a [u8]>,
    extra: BzDecoder<&'a [u8]>,
}

/// Parse the bsdiff 4.x patch file.
fn parse(patch: &[u8]) -> Result<PatchFile> {
    if patch.len() < HEADER_SIZE {
        return Err(Error::Corrupt("truncated header"));
    }
    if patch[..8] != MAGIC[..] {
        return Err(Error::Corrupt("bad magic"));
    }

    let csize = decode_int(&patch[8..16]);
    let dsize = decode_int(&patch[16..24]);
    let tsize = decode_int(&patch[24..32]);
    if csize < 0 || dsize < 0 || tsize < 0 {
        return Err(Error::Corrupt("negative length in header"));
    }
    debug!(
        "patch header: control {} bytes, delta {} bytes, target {} bytes",
        csize, dsize, tsize
    );

    let (csize, dsize, tsize) = (csize as u64, dsize as u64, tsize as u64);
    let remain = (patch.len() - HEADER_SIZE) as u64;
    if csize > remain || dsize > remain - csize {
        return Err(Error::Corrupt("truncated blocks"));
    }
    if tsize > usize::MAX as u64 {
        return Err(Error::Corrupt("target too large"));
    }

    let (_, remain) = patch.split_at(HEADER_SIZE);
    let (bz_ctrls, remain) = remain.split_at(csize as usize);
    let (bz_delta, bz_extra) = remain.split_at(dsize as usize);

    Ok(PatchFile {
        tsize,
        ctrls: BzDecoder::new(bz_ctrls),
        delta: BzDecoder::new(bz_delta),
        extra: BzDecoder::new(bz_extra),
    })
}

/// Bspatch context.
struct Context<'s, 'p> {
    source: &'s [u8],
    patch: PatchFile<'p>,

    /// Source cursor, free to leave the bounds of the source.
    spos: i64,
    target: Vec<u8>,
    bsize: usize,
}

impl<'s, 'p> Context<'s, 'p> {
    /// Create context.
    pub fn new(patch: PatchFile<'p>, source: &'s [u8], bsize: usize) -> Self {
        let target = Vec::with_capacity(Ord::min(patch.tsize, PREALLOC_LIMIT) as usize);
        Context {
            source,
            patch,
            spos: 0,
            target,
            bsize,
        }
    }

    /// Apply the patch file, returning the whole target.
    pub fn apply(mut self) -> Result<Vec<u8>> {
        while (self.target.len() as u64) < self.patch.tsize {
            let Control { add, copy, seek } = self.next()?;
            self.add(add)?;
            self.copy(copy)?;
            self.seek(seek)?;
        }
        Ok(self.target)
    }

    /// Read the next control.
    fn next(&mut self) -> Result<Control> {
        let mut ctl = [0; CONTROL_SIZE];
        read_block(&mut self.patch.ctrls, &mut ctl[..], "truncated control block")?;
        Control::decode(&ctl)
    }

    /// Number of target bytes still expected.
    fn remaining(&self) -> u64 {
        self.patch.tsize - self.target.len() as u64
    }

    /// Add delta to source and write the result to target.
    fn add(&mut self, count: u64) -> Result<()> {
        if count > self.remaining() {
            return Err(Error::Corrupt("delta exceeds target size"));
        }
        let end = self
            .spos
            .checked_add(count as i64)
            .ok_or(Error::Corrupt("source cursor overflow"))?;

        let mut count = count as usize;
        while count > 0 {
            let k = Ord::min(count, self.bsize);
            let n = self.target.len();
            self.target.resize(n + k, 0);
            read_block(&mut self.patch.delta, &mut self.target[n..], "truncated delta block")?;

            // Bytes outside of the source are taken from the delta as is.
            for (i, y) in self.target[n..].iter_mut().enumerate() {
                let pos = self.spos + i as i64;
                if pos >= 0 && (pos as u64) < self.source.len() as u64 {
                    *y = y.wrapping_add(self.source[pos as usize]);
                }
            }
            self.spos += k as i64;
            count -= k;
        }
        debug_assert_eq!(self.spos, end);
        Ok(())
    }

    /// Copy extra data to target.
    fn copy(&mut self, count: u64) -> Result<()> {
        if count > self.remaining() {
            return Err(Error::Corrupt("extra exceeds target size"));
        }

        let mut count = count as usize;
        while count > 0 {
            let k = Ord::min(count, self.bsize);
            let n = self.target.len();
            self.target.resize(n + k, 0);
            read_block(&mut self.patch.extra, &mut self.target[n..], "truncated extra block")?;
            count -= k;
        }
        Ok(())
    }

    /// Move the cursor on source.
    fn seek(&mut self, offset: i64) -> Result<()> {
        self.spos = self
            .spos
            .checked_add(offset)
            .ok_or(Error::Corrupt("source cursor overflow"))?;
        Ok(())
    }
}

/// Fill the buffer from a decompressed block, a short read means the patch
/// is corrupt.
fn read_block<R: Read>(r: &mut R, buf: &mut [u8], reason: &'static str) -> Result<()> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::Corrupt(reason)),
        Err(e) => Err(Error::Io(e)),
    }
}

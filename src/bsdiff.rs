#![forbid(unsafe_code)]
use super::error::Result;
use super::index::SuffixIndex;
use super::utils::*;
use bzip2::write::BzEncoder;
use log::{debug, trace};
use rayon::prelude::*;
use std::io::{self, Write};

/// Compression level of the bzip2 compressor.
pub use bzip2::Compression;

/// Magic tag of the bsdiff 4.x patch format.
pub const MAGIC: &[u8; 8] = b"BSDIFF40";

/// Size of the patch header.
pub const HEADER_SIZE: usize = 32;

/// A new match is accepted once it beats the running one by this many bytes.
const MATCH_MARGIN: isize = 8;

/// Default buffer size for delta calculation.
pub const BUFFER_SIZE: usize = 4096;

/// Min chunk size of each parallel job, used internally in
/// `ParallelScheme::Auto`.
pub const MIN_CHUNK: usize = 256 * 1024;

/// Parallel searching scheme of bsdiff.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParallelScheme {
    /// Never search in parallel.
    Never,

    /// Automatically determine parallel scheme.
    Auto,

    /// Each parallel job works on a chunk no larger than the given size.
    ///
    /// The chunk size should be greater than 256 KiB, or it would choose a
    /// larger chunk size to avoid bad quality of patch.
    ChunkSize(usize),

    /// Run no more than `N` parallel jobs.
    NumJobs(usize),
}

/// Delta compressor producing bsdiff 4.x patches.
///
/// Compares source with target and generates patch using the fastest
/// compression level:
/// ```
/// use bsdelta::{Bsdiff, Compression};
///
/// fn bsdiff(source: &[u8], target: &[u8]) -> bsdelta::Result<Vec<u8>> {
///     let mut patch = Vec::new();
///     Bsdiff::new(source, target)
///         .compression_level(Compression::fast())
///         .compare(&mut patch)?;
///     Ok(patch)
/// }
/// # assert!(bsdiff(b"old data", b"new data").is_ok());
/// ```
///
/// Reuse one suffix index for several targets:
/// ```
/// use bsdelta::{Bsdiff, SuffixIndex};
///
/// let source = b"the old content";
/// let index = SuffixIndex::new(source);
/// let targets: [&[u8]; 2] = [b"the new content", b"the old contents"];
/// for target in targets.iter() {
///     let mut patch = Vec::new();
///     Bsdiff::new(source, target).index(&index).compare(&mut patch).unwrap();
/// }
/// ```
pub struct Bsdiff<'s, 't, 'i> {
    s: &'s [u8],
    t: &'t [u8],
    index: Option<&'i SuffixIndex>,
    scheme: ParallelScheme,
    bsize: usize,
    level: Compression,
}

impl<'s, 't, 'i> Bsdiff<'s, 't, 'i> {
    /// Create new configuration for bsdiff delta compression.
    pub fn new(source: &'s [u8], target: &'t [u8]) -> Self {
        Bsdiff {
            s: source,
            t: target,
            index: None,
            scheme: ParallelScheme::Never,
            bsize: BUFFER_SIZE,
            level: Compression::best(),
        }
    }

    /// Set the source data.
    pub fn source(mut self, s: &'s [u8]) -> Self {
        self.s = s;
        self
    }

    /// Set the target data.
    pub fn target(mut self, t: &'t [u8]) -> Self {
        self.t = t;
        self
    }

    /// Use a precomputed suffix index of the source data instead of building
    /// one on every comparison.
    ///
    /// The index must be built over the source data, `compare` fails with
    /// `ErrorKind::InvalidInput` if its length differs.
    pub fn index(mut self, index: &'i SuffixIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the parallel searching scheme (default is `ParallelScheme::Never`).
    /// Chunk size or thread number should not be zero, or it would
    /// automatically choose a proper number instead.
    ///
    /// Considering that small chunk size of each parallel job may lead to bad
    /// patch quality, the chunk size is forced to be no less than 256 KiB
    /// internally.
    pub fn parallel_scheme(mut self, mut scheme: ParallelScheme) -> Self {
        use ParallelScheme::*;
        if scheme == ChunkSize(0) || scheme == NumJobs(0) {
            scheme = Auto;
        }
        self.scheme = scheme;
        self
    }

    /// Set the compression level of bzip2 (default is `Compression::best()`,
    /// the level used by bsdiff 4.x).
    pub fn compression_level(mut self, lv: Compression) -> Self {
        self.level = lv;
        self
    }

    /// Set the buffer size for delta calculation (`bs >= 128`, default is `BUFFER_SIZE`).
    pub fn buffer_size(mut self, mut bs: usize) -> Self {
        if bs < 128 {
            bs = 128;
        }
        self.bsize = bs;
        self
    }

    /// Start searching matches in target and constructing the patch file.
    ///
    /// The size of patch file would be returned if no error occurs.
    pub fn compare<P: Write>(&self, patch: P) -> Result<u64> {
        let built;
        let index = match self.index {
            Some(index) if index.len() != self.s.len() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "suffix index does not match the source data",
                )
                .into());
            }
            Some(index) => index,
            None => {
                built = SuffixIndex::new(self.s);
                debug!("indexed {} source bytes", self.s.len());
                &built
            }
        };

        let chunk = self.chunk_size();
        if chunk >= self.t.len() {
            let diff = SaDiff::new(self.s, self.t, index);
            pack(self.s, self.t, diff, patch, self.level, self.bsize)
        } else {
            debug!("diffing {} target bytes in chunks of {}", self.t.len(), chunk);
            let diff = ParSaDiff::new(self.s, self.t, index, chunk);
            let ctrls = diff.compute();
            pack(self.s, self.t, ctrls.into_iter(), patch, self.level, self.bsize)
        }
    }

    /// Size of the target chunk handled by each job.
    fn chunk_size(&self) -> usize {
        use ParallelScheme::*;
        let chunk = match self.scheme {
            Never => return self.t.len(),
            Auto | NumJobs(0) => div_ceil(self.t.len(), Ord::max(rayon::current_num_threads(), 1)),
            ChunkSize(chunk) => chunk,
            NumJobs(n) => div_ceil(self.t.len(), n),
        };
        Ord::max(chunk, MIN_CHUNK)
    }
}

/// Calculate `ceil(x/y)`.
#[inline]
fn div_ceil(x: usize, y: usize) -> usize {
    if x % y == 0 {
        x / y
    } else {
        x / y + 1
    }
}

/// Construct bsdiff 4.x patch file from parts.
fn pack<D, P>(s: &[u8], t: &[u8], diff: D, mut p: P, lv: Compression, bsize: usize) -> Result<u64>
where
    D: Iterator<Item = Control>,
    P: Write,
{
    let mut ctrls = BzEncoder::new(Vec::new(), lv);
    let mut delta = BzEncoder::new(Vec::new(), lv);
    let mut extra = BzEncoder::new(Vec::new(), lv);

    let mut spos = 0i64;
    let mut tpos = 0usize;
    let mut count = 0u64;
    let mut dat = Vec::with_capacity(bsize);

    for ctl in diff {
        trace!("control {:?}", ctl);
        ctrls.write_all(&ctl.encode()[..])?;
        count += 1;

        // Compute and write delta data, using limited buffer `dat`.
        let mut n = ctl.add as usize;
        while n > 0 {
            let k = Ord::min(n, bsize);
            dat.extend(t[tpos..tpos + k].iter().enumerate().map(|(i, &y)| {
                match source_byte(s, spos + i as i64) {
                    Some(x) => y.wrapping_sub(x),
                    None => y,
                }
            }));
            delta.write_all(&dat[..])?;
            dat.clear();

            spos += k as i64;
            tpos += k;
            n -= k;
        }

        // Write extra data.
        if ctl.copy > 0 {
            let copy = ctl.copy as usize;
            extra.write_all(&t[tpos..tpos + copy])?;
            tpos += copy;
        }

        spos += ctl.seek;
    }
    debug_assert_eq!(tpos, t.len());

    let dlen = delta.total_in();
    let elen = extra.total_in();
    let bz_ctrls = ctrls.finish()?;
    let bz_delta = delta.finish()?;
    let bz_extra = extra.finish()?;
    debug!(
        "packed {} controls, {} delta bytes, {} extra bytes",
        count, dlen, elen
    );

    // Write header (b"BSDIFF40", control size, delta size, target size).
    let mut header = [0; HEADER_SIZE];
    let csize = bz_ctrls.len() as u64;
    let dsize = bz_delta.len() as u64;
    let esize = bz_extra.len() as u64;
    header[0..8].copy_from_slice(&MAGIC[..]);
    encode_int(csize as i64, &mut header[8..16]);
    encode_int(dsize as i64, &mut header[16..24]);
    encode_int(t.len() as i64, &mut header[24..32]);
    p.write_all(&header[..])?;

    // Write bzipped controls, delta data and extra data.
    p.write_all(&bz_ctrls[..])?;
    p.write_all(&bz_delta[..])?;
    p.write_all(&bz_extra[..])?;
    p.flush()?;

    Ok(HEADER_SIZE as u64 + csize + dsize + esize)
}

/// Source byte at a possibly out of range cursor.
#[inline]
fn source_byte(s: &[u8], pos: i64) -> Option<u8> {
    if pos < 0 {
        None
    } else {
        s.get(pos as usize).copied()
    }
}

/// Independent jobs, each diffing one chunk of the target.
struct ParSaDiff<'s, 't, 'i> {
    jobs: Vec<SaDiff<'s, 't, 'i>>,
}

impl<'s, 't, 'i> ParSaDiff<'s, 't, 'i> {
    pub fn new(s: &'s [u8], t: &'t [u8], index: &'i SuffixIndex, chunk: usize) -> Self {
        let jobs = t.chunks(chunk).map(|ti| SaDiff::new(s, ti, index)).collect();
        ParSaDiff { jobs }
    }

    /// Run all jobs and join the controls, rewinding the source cursor to the
    /// start after each chunk.
    pub fn compute(self) -> Vec<Control> {
        self.jobs
            .into_par_iter()
            .map(|diff| {
                let mut pos = 0i64;
                let mut ctrls = Vec::new();
                for ctl in diff {
                    pos += ctl.add as i64 + ctl.seek;
                    ctrls.push(ctl);
                }
                ctrls.push(Control {
                    add: 0,
                    copy: 0,
                    seek: -pos,
                });
                ctrls
            })
            .flatten()
            .collect()
    }
}

/// The greedy bsdiff 4.x match extension over a suffix index.
///
/// Each control covers the target from the end of the previous exact match
/// (`lastscan`) up to the start of the next one (`scan`). Around both matches,
/// bytes mostly equal to the source are absorbed into the delta region, and
/// whatever is left in between becomes extra data.
struct SaDiff<'s, 't, 'i> {
    s: &'s [u8],
    t: &'t [u8],
    index: &'i SuffixIndex,

    scan: usize,
    pos: usize,
    len: usize,
    lastscan: usize,
    lastpos: usize,
    lastoffset: isize,
}

impl<'s, 't, 'i> SaDiff<'s, 't, 'i> {
    /// Creates new search context.
    pub fn new(s: &'s [u8], t: &'t [u8], index: &'i SuffixIndex) -> Self {
        SaDiff {
            s,
            t,
            index,
            scan: 0,
            pos: 0,
            len: 0,
            lastscan: 0,
            lastpos: 0,
            lastoffset: 0,
        }
    }

    /// Test if target byte `j` equals the source byte at the previous match
    /// offset.
    #[inline]
    fn follows_previous(&self, j: usize) -> bool {
        let i = j as isize + self.lastoffset;
        i >= 0 && (i as usize) < self.s.len() && self.s[i as usize] == self.t[j]
    }

    /// Advances `scan` to the next match worth a new control. Returns false if
    /// the current match merely continues the previous one.
    fn search_next(&mut self) -> bool {
        let mut oldscore = 0isize;
        self.scan += self.len;
        let mut scsc = self.scan;
        while self.scan < self.t.len() {
            let (pos, len) = self.index.search(self.s, &self.t[self.scan..]);
            self.pos = pos;
            self.len = len;

            // Score the bytes the previous offset would explain.
            while scsc < self.scan + self.len {
                if self.follows_previous(scsc) {
                    oldscore += 1;
                }
                scsc += 1;
            }

            let len = self.len as isize;
            if (len == oldscore && len != 0) || len > oldscore + MATCH_MARGIN {
                break;
            }

            if self.follows_previous(self.scan) {
                oldscore -= 1;
            }
            self.scan += 1;
        }

        self.len as isize != oldscore || self.scan == self.t.len()
    }

    /// Length of the prefix of the gap best explained as delta against the
    /// source after the previous match.
    fn extend_forward(&self) -> usize {
        let (s, t) = (self.s, self.t);
        let mut score = 0isize;
        let mut best = 0isize;
        let mut lenf = 0;
        let mut i = 0;
        while self.lastscan + i < self.scan && self.lastpos + i < s.len() {
            if s[self.lastpos + i] == t[self.lastscan + i] {
                score += 1;
            }
            i += 1;
            if score * 2 - i as isize > best * 2 - lenf as isize {
                best = score;
                lenf = i;
            }
        }
        lenf
    }

    /// Length of the suffix of the gap best explained as delta against the
    /// source before the current match.
    fn extend_backward(&self) -> usize {
        if self.scan >= self.t.len() {
            return 0;
        }

        let (s, t) = (self.s, self.t);
        let mut score = 0isize;
        let mut best = 0isize;
        let mut lenb = 0;
        let mut i = 1;
        while self.scan >= self.lastscan + i && self.pos >= i {
            if s[self.pos - i] == t[self.scan - i] {
                score += 1;
            }
            if score * 2 - i as isize > best * 2 - lenb as isize {
                best = score;
                lenb = i;
            }
            i += 1;
        }
        lenb
    }

    /// Divides the overlap of forward and backward extensions, returns the
    /// adjusted `(lenf, lenb)`.
    fn divide_overlap(&self, lenf: usize, lenb: usize) -> (usize, usize) {
        if self.lastscan + lenf <= self.scan - lenb {
            return (lenf, lenb);
        }

        let (s, t) = (self.s, self.t);
        let overlap = (self.lastscan + lenf) - (self.scan - lenb);
        let f = self.lastscan + lenf - overlap;
        let g = self.lastpos + lenf - overlap;
        let b = self.scan - lenb;
        let c = self.pos - lenb;

        let mut score = 0isize;
        let mut best = 0isize;
        let mut lens = 0;
        for i in 0..overlap {
            if t[f + i] == s[g + i] {
                score += 1;
            }
            if t[b + i] == s[c + i] {
                score -= 1;
            }
            if score > best {
                best = score;
                lens = i + 1;
            }
        }

        (lenf + lens - overlap, lenb - lens)
    }
}

impl<'s, 't, 'i> Iterator for SaDiff<'s, 't, 'i> {
    type Item = Control;

    fn next(&mut self) -> Option<Self::Item> {
        while self.scan < self.t.len() {
            if !self.search_next() {
                continue;
            }

            let (lenf, lenb) = self.divide_overlap(self.extend_forward(), self.extend_backward());

            // source:
            //     ...(  lenf  )...(  lenb  ,   len   )...
            //        ^ lastpos    ^ pos-lenb ^ pos
            //                 | distance can be negative
            // target:
            //     ...(  lenf  ;  copy  )(  lenb  ,   len   )...
            //        ^ lastscan         ^ scan-lenb ^ scan
            let add = lenf as u64;
            let copy = ((self.scan - lenb) - (self.lastscan + lenf)) as u64;
            let seek = (self.pos - lenb) as i64 - (self.lastpos + lenf) as i64;

            self.lastscan = self.scan - lenb;
            self.lastpos = self.pos - lenb;
            self.lastoffset = self.pos as isize - self.scan as isize;
            return Some(Control { add, copy, seek });
        }
        None
    }
}

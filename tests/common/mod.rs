#![allow(unused)]

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use rand::prelude::*;
use std::io::prelude::*;

/// Generate `n` random bytes from a fixed seed.
pub fn random_bytes(seed: u64, n: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0; n];
    rng.fill_bytes(&mut bytes[..]);
    bytes
}

/// Generate data shaped like an executable: runs of code-like bytes
/// interleaved with tables of little-endian addresses.
pub fn executable_like(seed: u64, n: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let opcodes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    let mut bytes = Vec::with_capacity(n + 4);
    while bytes.len() < n {
        if rng.gen_bool(0.3) {
            let addr: u32 = rng.gen_range(0x1000..0x100000);
            bytes.extend_from_slice(&addr.to_le_bytes());
        } else {
            bytes.push(opcodes[rng.gen_range(0..opcodes.len())]);
        }
    }
    bytes.truncate(n);
    bytes
}

/// Shift every 4-byte aligned word by `delta`, as relinking does.
pub fn relocate(source: &[u8], delta: u32) -> Vec<u8> {
    let mut target = source.to_vec();
    for word in target.chunks_exact_mut(4) {
        let x = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        if x >= 0x1000 && x < 0x100000 {
            word.copy_from_slice(&x.wrapping_add(delta).to_le_bytes());
        }
    }
    target
}

/// Apply a handful of small random edits: replacements, insertions and
/// deletions.
pub fn edit(source: &[u8], seed: u64, edits: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut target = source.to_vec();
    for _ in 0..edits {
        let at = rng.gen_range(0..=target.len());
        match rng.gen_range(0..3) {
            0 => {
                let end = Ord::min(at + rng.gen_range(1..8), target.len());
                for b in target[at..end].iter_mut() {
                    *b = rng.gen();
                }
            }
            1 => {
                let piece: Vec<u8> = (0..rng.gen_range(1..16)).map(|_| rng.gen()).collect();
                target.splice(at..at, piece);
            }
            _ => {
                let end = Ord::min(at + rng.gen_range(1..16), target.len());
                target.drain(at..end);
            }
        }
    }
    target
}

/// Diff then patch with this crate.
pub fn roundtrip(s: &[u8], t: &[u8]) -> Vec<u8> {
    let p = bsdelta::diff(s, t).unwrap();
    bsdelta::apply(s, &p[..]).unwrap()
}

/// Decode an integer the way bspatch does.
fn offtin(b: &[u8]) -> i64 {
    let mut y = (b[7] & 0x7f) as i64;
    for i in (0..7).rev() {
        y = y * 256 + b[i] as i64;
    }
    if b[7] & 0x80 != 0 {
        -y
    } else {
        y
    }
}

/// Encode an integer the way bsdiff does.
fn offtout(x: i64, b: &mut [u8]) {
    let mut y = x.abs();
    for byte in b[..8].iter_mut() {
        *byte = (y % 256) as u8;
        y /= 256;
    }
    if x < 0 {
        b[7] |= 0x80;
    }
}

fn bunzip(block: &[u8]) -> Option<Vec<u8>> {
    let mut data = Vec::new();
    BzDecoder::new(block).read_to_end(&mut data).ok()?;
    Some(data)
}

fn bzip(data: &[u8]) -> Vec<u8> {
    let mut enc = BzEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Blocks of a bsdiff 4.x patch after decompression.
pub struct RawPatch {
    pub ctrls: Vec<[i64; 3]>,
    pub delta: Vec<u8>,
    pub extra: Vec<u8>,
    pub tsize: i64,
}

/// Split a patch into its decompressed blocks, independently of this crate.
pub fn unpack(patch: &[u8]) -> Option<RawPatch> {
    if patch.len() < 32 || &patch[..8] != b"BSDIFF40" {
        return None;
    }
    let clen = offtin(&patch[8..16]);
    let dlen = offtin(&patch[16..24]);
    let tsize = offtin(&patch[24..32]);
    if clen < 0 || dlen < 0 || tsize < 0 || 32 + clen + dlen > patch.len() as i64 {
        return None;
    }
    let (clen, dlen) = (clen as usize, dlen as usize);

    let raw_ctrls = bunzip(&patch[32..32 + clen])?;
    let delta = bunzip(&patch[32 + clen..32 + clen + dlen])?;
    let extra = bunzip(&patch[32 + clen + dlen..])?;
    if raw_ctrls.len() % 24 != 0 {
        return None;
    }
    let ctrls = raw_ctrls
        .chunks(24)
        .map(|c| [offtin(&c[0..8]), offtin(&c[8..16]), offtin(&c[16..24])])
        .collect();

    Some(RawPatch {
        ctrls,
        delta,
        extra,
        tsize,
    })
}

/// Straightforward bspatch, written against the format rather than this
/// crate.
pub fn reference_bspatch(old: &[u8], patch: &[u8]) -> Option<Vec<u8>> {
    let raw = unpack(patch)?;
    let tsize = raw.tsize as usize;
    let mut new = vec![0u8; tsize];
    let (mut oldpos, mut newpos) = (0i64, 0usize);
    let (mut dpos, mut epos) = (0usize, 0usize);
    let mut ctrls = raw.ctrls.iter();
    while newpos < tsize {
        let &[add, copy, seek] = ctrls.next()?;
        if add < 0 || copy < 0 {
            return None;
        }
        let (add, copy) = (add as usize, copy as usize);
        if newpos + add > tsize || dpos + add > raw.delta.len() {
            return None;
        }
        new[newpos..newpos + add].copy_from_slice(&raw.delta[dpos..dpos + add]);
        for i in 0..add {
            let o = oldpos + i as i64;
            if o >= 0 && (o as usize) < old.len() {
                new[newpos + i] = new[newpos + i].wrapping_add(old[o as usize]);
            }
        }
        newpos += add;
        oldpos += add as i64;
        dpos += add;

        if newpos + copy > tsize || epos + copy > raw.extra.len() {
            return None;
        }
        new[newpos..newpos + copy].copy_from_slice(&raw.extra[epos..epos + copy]);
        newpos += copy;
        epos += copy;
        oldpos += seek;
    }
    Some(new)
}

/// Assemble a bsdiff 4.x patch from raw blocks, independently of this crate.
pub fn assemble(ctrls: &[[i64; 3]], delta: &[u8], extra: &[u8], tsize: i64) -> Vec<u8> {
    let mut raw = vec![0u8; ctrls.len() * 24];
    for (ctl, buf) in ctrls.iter().zip(raw.chunks_mut(24)) {
        offtout(ctl[0], &mut buf[0..8]);
        offtout(ctl[1], &mut buf[8..16]);
        offtout(ctl[2], &mut buf[16..24]);
    }
    let c = bzip(&raw[..]);
    let d = bzip(delta);
    let e = bzip(extra);

    let mut patch = vec![0u8; 32];
    patch[..8].copy_from_slice(b"BSDIFF40");
    offtout(c.len() as i64, &mut patch[8..16]);
    offtout(d.len() as i64, &mut patch[16..24]);
    offtout(tsize, &mut patch[24..32]);
    patch.extend_from_slice(&c[..]);
    patch.extend_from_slice(&d[..]);
    patch.extend_from_slice(&e[..]);
    patch
}

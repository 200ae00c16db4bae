/*!
Binary delta compressor and patcher compatible with bsdiff 4.x.

Patches produced here can be applied by the reference `bspatch`, and patches
produced by the reference `bsdiff` can be applied here.

```
let old = b"The quick brown fox jumps over the lazy dog.".repeat(20);
let mut new = old.clone();
new[100..105].copy_from_slice(b"QUICK");

let patch = bsdelta::diff(&old, &new).unwrap();
assert_eq!(bsdelta::apply(&old, &patch).unwrap(), new);
```

Build the suffix index once to diff several targets against the same source:

```
let old = b"version one of the artifact";
let index = bsdelta::build_index(old);
let versions: [&[u8]; 2] = [b"version two of the artifact", b"version three"];
for new in versions.iter() {
    let patch = bsdelta::diff_with_index(&index, old, new).unwrap();
    assert_eq!(patch, bsdelta::diff(old, new).unwrap());
}
```
*/

pub mod bsdiff;
pub mod bspatch;
pub mod error;
pub mod index;
mod utils;

pub use bsdiff::{Bsdiff, Compression, ParallelScheme};
pub use bspatch::Bspatch;
pub use error::{Error, Result};
pub use index::SuffixIndex;
pub use utils::{decode_int, encode_int, Control};

/// Sort the suffixes of `old` for reuse across several diffs.
pub fn build_index(old: &[u8]) -> SuffixIndex {
    SuffixIndex::new(old)
}

/// Compute a patch turning `old` into `new`.
pub fn diff(old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    let mut patch = Vec::new();
    Bsdiff::new(old, new).compare(&mut patch)?;
    Ok(patch)
}

/// Compute a patch turning `old` into `new` with a precomputed index of `old`.
///
/// The patch is identical to the one produced by [`diff`].
///
/// Fails with `ErrorKind::InvalidInput` if the index was built over data of a
/// different length.
pub fn diff_with_index(index: &SuffixIndex, old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
    let mut patch = Vec::new();
    Bsdiff::new(old, new).index(index).compare(&mut patch)?;
    Ok(patch)
}

/// Apply a patch to `old`, returning the new data.
pub fn apply(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let patcher = Bspatch::new(patch)?;
    let mut new = Vec::new();
    patcher.apply(old, &mut new)?;
    Ok(new)
}

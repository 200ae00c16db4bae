//! Suffix index over the source data.
//!
//! The index is built with the Larsson-Sadakane doubling sort: suffixes are
//! first bucketed by their leading byte, then groups of suffixes sharing a
//! prefix of length `h` are refined by the rank of the suffix `h` bytes later,
//! doubling `h` until every group is a singleton.

#![forbid(unsafe_code)]
use std::cmp::Ordering;


/// Groups smaller than this are refined by selection instead of partitioning.
const SMALL_GROUP: usize = 16;

/// Flag marking an `order` entry as the length of a run of sorted suffixes.
const SORTED: usize = 1 << (usize::BITS - 1);

/// Sorted suffixes of the source data along with their ranks.
///
/// The index does not borrow the source, so it can be built once, shared
/// across threads and reused for any number of targets.
///
/// Build an index and find the longest match of a pattern:
/// ```
/// use bsdelta::SuffixIndex;
///
/// let source = b"banana bandana";
/// let index = SuffixIndex::new(source);
/// let (pos, len) = index.search(source, b"bandit");
/// assert_eq!(&source[pos..pos + len], b"band");
/// ```
#[derive(Clone, Debug)]
pub struct SuffixIndex {
    order: Vec<usize>,
    rank: Vec<usize>,
}

impl SuffixIndex {
    /// Sort all suffixes of the source.
    pub fn new(source: &[u8]) -> Self {
        let n = source.len();
        let mut order = vec![0; n + 1];
        let mut rank = vec![0; n + 1];
        qsufsort(&mut order, &mut rank, source);
        SuffixIndex { order, rank }
    }

    /// Length of the indexed source.
    pub fn len(&self) -> usize {
        self.order.len() - 1
    }

    /// Test if the indexed source is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Suffix offsets in sorted order.
    ///
    /// There are `len() + 1` entries, the first one is always the empty suffix.
    pub fn order(&self) -> &[usize] {
        &self.order[..]
    }

    /// Sort rank of each suffix offset, the inverse permutation of `order()`.
    pub fn rank(&self) -> &[usize] {
        &self.rank[..]
    }

    /// Sort rank of the suffix starting at `offset` (`offset <= len()`).
    pub fn rank_of(&self, offset: usize) -> usize {
        self.rank[offset]
    }

    /// Compare the suffixes at two offsets without touching the source.
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        self.rank[a].cmp(&self.rank[b])
    }

    /// Search for the longest prefix of `pattern` occurring in the source,
    /// returns its offset and length.
    ///
    /// A zero length means nothing matched.
    ///
    /// Panics if `source` is not the data this index was built over.
    pub fn search(&self, source: &[u8], pattern: &[u8]) -> (usize, usize) {
        assert_eq!(source.len(), self.len(), "suffix index built over another source");

        let mut st = 0;
        let mut en = source.len();
        while en - st >= 2 {
            let x = st + (en - st) / 2;
            let i = self.order[x];
            // A suffix that is a strict prefix of the pattern sorts before it.
            if source[i..] < *pattern {
                st = x;
            } else {
                en = x;
            }
        }

        let i = self.order[st];
        let j = self.order[en];
        let x = lcp(&source[i..], pattern);
        let y = lcp(&source[j..], pattern);
        if x > y {
            (i, x)
        } else {
            (j, y)
        }
    }
}

/// Count the longest common prefix of two strings.
#[inline]
pub(crate) fn lcp(xs: &[u8], ys: &[u8]) -> usize {
    Iterator::zip(xs.iter(), ys.iter())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Sort suffixes of `s` into `order` and leave the inverse in `rank`.
///
/// Both arrays hold `s.len() + 1` entries, the extra one standing for the
/// empty suffix. While sorting, an entry `SORTED | k` in `order` marks a run
/// of `k` suffixes already in final position, and `rank` holds the last
/// index of each suffix's group.
fn qsufsort(order: &mut [usize], rank: &mut [usize], s: &[u8]) {
    let n = s.len();

    let mut buckets = [0usize; 256];
    for &c in s {
        buckets[c as usize] += 1;
    }
    for c in 1..256 {
        buckets[c] += buckets[c - 1];
    }
    for c in (1..256).rev() {
        buckets[c] = buckets[c - 1];
    }
    buckets[0] = 0;

    for (i, &c) in s.iter().enumerate() {
        buckets[c as usize] += 1;
        order[buckets[c as usize]] = i;
    }
    order[0] = n;
    for (i, &c) in s.iter().enumerate() {
        rank[i] = buckets[c as usize];
    }
    rank[n] = 0;

    for c in 1..256 {
        if buckets[c] == buckets[c - 1] + 1 {
            order[buckets[c]] = SORTED | 1;
        }
    }
    order[0] = SORTED | 1;

    let total = n + 1;
    let mut h = 1;
    while order[0] != SORTED | total {
        let mut len = 0;
        let mut i = 0;
        while i < total {
            let x = order[i];
            if x & SORTED != 0 {
                // Skip a run of sorted suffixes, merging it with the previous.
                len += x & !SORTED;
                i += x & !SORTED;
            } else {
                if len != 0 {
                    order[i - len] = SORTED | len;
                }
                len = rank[x] + 1 - i;
                split(order, rank, i, len, h);
                i += len;
                len = 0;
            }
        }
        if len != 0 {
            order[i - len] = SORTED | len;
        }
        h += h;
    }

    for i in 0..=n {
        order[rank[i]] = i;
    }
}

/// Refine the group `order[start..start + len]` by the rank `h` bytes later.
fn split(order: &mut [usize], rank: &mut [usize], mut start: usize, mut len: usize, h: usize) {
    loop {
        if len < SMALL_GROUP {
            select_split(order, rank, start, len, h);
            return;
        }

        let x = key(order, rank, start + len / 2, h);

        let mut jj = start;
        let mut kk = 0;
        for i in start..start + len {
            match key(order, rank, i, h).cmp(&x) {
                Ordering::Less => jj += 1,
                Ordering::Equal => kk += 1,
                Ordering::Greater => (),
            }
        }
        let kk = jj + kk;

        // Three-way partition into [start, jj) < x, [jj, kk) == x, [kk, end) > x.
        let mut i = start;
        let mut j = 0;
        let mut k = 0;
        while i < jj {
            match key(order, rank, i, h).cmp(&x) {
                Ordering::Less => i += 1,
                Ordering::Equal => {
                    order.swap(i, jj + j);
                    j += 1;
                }
                Ordering::Greater => {
                    order.swap(i, kk + k);
                    k += 1;
                }
            }
        }
        while jj + j < kk {
            if key(order, rank, jj + j, h) == x {
                j += 1;
            } else {
                order.swap(jj + j, kk + k);
                k += 1;
            }
        }

        if jj > start {
            split(order, rank, start, jj - start, h);
        }

        for i in jj..kk {
            rank[order[i]] = kk - 1;
        }
        if jj == kk - 1 {
            order[jj] = SORTED | 1;
        }

        if start + len > kk {
            len = start + len - kk;
            start = kk;
        } else {
            return;
        }
    }
}

/// Rank of the suffix `h` bytes after the one at `order[i]`.
#[inline]
fn key(order: &[usize], rank: &[usize], i: usize, h: usize) -> usize {
    rank[order[i] + h]
}

/// Refine a small group by repeatedly selecting the minimal keys.
fn select_split(order: &mut [usize], rank: &mut [usize], start: usize, len: usize, h: usize) {
    let end = start + len;
    let mut k = start;
    while k < end {
        let mut j = 1;
        let mut x = key(order, rank, k, h);
        for i in 1..end - k {
            let v = key(order, rank, k + i, h);
            if v < x {
                x = v;
                j = 0;
            }
            if v == x {
                order.swap(k + j, k + i);
                j += 1;
            }
        }

        for i in 0..j {
            rank[order[k + i]] = k + j - 1;
        }
        if j == 1 {
            order[k] = SORTED | 1;
        }
        k += j;
    }
}

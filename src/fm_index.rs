//! FM-index over the concatenated reference proteins.
//!
//! The index supports backward extension of a match interval by one symbol,
//! occurrence counting, and resolution of an interval to reference
//! locations. It is built once, never mutated afterwards, and is safe to
//! query concurrently from any number of threads.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alphabet::{self, ALPHABET_SIZE};

// Internal symbol space: 0 is the per-reference sentinel, residues are
// shifted up by one so the sentinel sorts first.
const SENTINEL: u8 = 0;
const INTERNAL_ALPHABET: usize = ALPHABET_SIZE + 1;

// Occurrence counts are checkpointed every this many BWT positions;
// ranks scan at most one block.
const OCC_INTERVAL: usize = 128;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("reference set is empty")]
    Empty,
    #[error("reference {name}: invalid residue {residue:?}")]
    InvalidResidue { name: String, residue: char },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("could not encode index: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("could not decode index: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// A half-open range of suffix-array positions consistent with the
/// current partial match. A count of zero means "no match exists" and
/// is terminal; nothing extends an empty interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: usize,
    pub hi: usize,
}

impl Interval {
    #[inline]
    pub fn count(&self) -> usize {
        self.hi - self.lo
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FmIndex {
    bwt: Vec<u8>,
    sa: Vec<u64>,
    /// C array: number of text symbols strictly smaller than each symbol.
    counts: [u64; INTERNAL_ALPHABET + 1],
    /// Occurrence checkpoints: occ[k][c] = occurrences of c in bwt[..k * OCC_INTERVAL].
    occ: Vec<[u64; INTERNAL_ALPHABET]>,
    names: Vec<String>,
    starts: Vec<u64>,
}

impl FmIndex {
    /// Build an index from (name, residue sequence) pairs. References are
    /// concatenated with a sentinel after each one; the suffix array is
    /// constructed by plain sorting, which is adequate for reference sets
    /// that fit comfortably in memory.
    pub fn from_references<I, S>(references: I) -> Result<FmIndex, IndexError>
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut text: Vec<u8> = Vec::new();
        let mut names = Vec::new();
        let mut starts = Vec::new();

        for (name, seq) in references {
            let name = name.as_ref();
            starts.push(text.len() as u64);
            for c in seq.as_ref().bytes() {
                match alphabet::encode(c) {
                    Some(sym) => text.push(sym + 1),
                    None => {
                        return Err(IndexError::InvalidResidue {
                            name: name.to_string(),
                            residue: c as char,
                        })
                    }
                }
            }
            text.push(SENTINEL);
            names.push(name.to_string());
        }
        if names.is_empty() {
            return Err(IndexError::Empty);
        }

        let mut sa: Vec<usize> = (0..text.len()).collect();
        sa.sort_unstable_by(|&a, &b| text[a..].cmp(&text[b..]));

        let n = text.len();
        let mut bwt = Vec::with_capacity(n);
        for &p in &sa {
            bwt.push(if p == 0 { text[n - 1] } else { text[p - 1] });
        }

        let mut counts = [0u64; INTERNAL_ALPHABET + 1];
        for &sym in &text {
            counts[sym as usize + 1] += 1;
        }
        for c in 1..counts.len() {
            counts[c] += counts[c - 1];
        }

        let mut occ = Vec::with_capacity(n / OCC_INTERVAL + 1);
        let mut tally = [0u64; INTERNAL_ALPHABET];
        for (i, &sym) in bwt.iter().enumerate() {
            if i % OCC_INTERVAL == 0 {
                occ.push(tally);
            }
            tally[sym as usize] += 1;
        }
        // rank() may be asked for position n itself
        if n % OCC_INTERVAL == 0 {
            occ.push(tally);
        }

        Ok(FmIndex {
            bwt,
            sa: sa.into_iter().map(|p| p as u64).collect(),
            counts,
            occ,
            names,
            starts,
        })
    }

    /// Number of occurrences of internal symbol `c` in `bwt[..pos]`.
    fn rank(&self, c: u8, pos: usize) -> u64 {
        let block = pos / OCC_INTERVAL;
        let mut r = self.occ[block][c as usize];
        for &sym in &self.bwt[block * OCC_INTERVAL..pos] {
            if sym == c {
                r += 1;
            }
        }
        r
    }

    /// Interval of the whole index: every position matches the empty string.
    pub fn root(&self) -> Interval {
        Interval {
            lo: 0,
            hi: self.bwt.len(),
        }
    }

    /// Backward extension: narrow `iv` to the positions whose preceding
    /// symbol is `sym` (an encoded residue). Pure; returns an empty
    /// interval when no such position exists.
    pub fn extend(&self, iv: Interval, sym: u8) -> Interval {
        let c = sym + 1;
        let base = self.counts[c as usize] as usize;
        Interval {
            lo: base + self.rank(c, iv.lo) as usize,
            hi: base + self.rank(c, iv.hi) as usize,
        }
    }

    /// Exact backward search of a full pattern of encoded residues.
    pub fn backward_search(&self, pattern: &[u8]) -> Interval {
        let mut iv = self.root();
        for &sym in pattern.iter().rev() {
            iv = self.extend(iv, sym);
            if iv.is_empty() {
                break;
            }
        }
        iv
    }

    /// Resolve an interval to (reference id, offset) pairs, sorted for
    /// deterministic output. Only called for accepted candidates; never
    /// part of the search inner loop.
    pub fn locate(&self, iv: Interval) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(iv.count());
        for i in iv.lo..iv.hi {
            let pos = self.sa[i] as usize;
            let ref_id = self.starts.partition_point(|&s| s as usize <= pos) - 1;
            out.push((ref_id, pos - self.starts[ref_id] as usize));
        }
        out.sort_unstable();
        out
    }

    pub fn reference_name(&self, ref_id: usize) -> &str {
        &self.names[ref_id]
    }

    pub fn reference_count(&self) -> usize {
        self.names.len()
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<FmIndex, IndexError> {
        let mut reader = BufReader::new(File::open(path)?);
        let index = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(index)
    }
}

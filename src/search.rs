//! The two search strategies applied to a read against the FM-index:
//! maximal exact matches (MEM) and greedy BLOSUM-scored seed extension.
//!
//! Both operate on an encoded fragment (symbol ids) and return raw hits
//! carrying the index interval of the matched string; location lookup is
//! deferred to the caller and only performed for accepted hits.

use std::collections::HashSet;

use crate::alphabet::ALPHABET_SIZE;
use crate::blosum;
use crate::config::RunConfig;
use crate::fm_index::{FmIndex, Interval};

/// A side's extension is abandoned once its running score drops more
/// than this far below the side's best score; the side then rolls back
/// to its best-scoring extent. Caps worst-case work per seed.
pub const ABANDON_MARGIN: i32 = 20;

/// A match found by either strategy, before location lookup.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Read offsets of the matched segment, inclusive on both ends.
    pub start: usize,
    pub end: usize,
    /// BLOSUM score of the match; `None` in MEM mode.
    pub score: Option<i32>,
    pub mismatches: u32,
    pub interval: Interval,
}

impl SearchHit {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Find every maximal exact match of at least `min_length` symbols.
///
/// For each end position the longest exact match ending there is found
/// by backward extension; a hit is emitted only when it is also
/// right-maximal, i.e. the longest match ending one position further
/// right starts strictly later. Equal-length co-occurring matches share
/// one interval and are retained together.
pub fn mem_search(index: &FmIndex, frag: &[u8], min_length: usize) -> Vec<SearchHit> {
    let n = frag.len();
    if n == 0 {
        return Vec::new();
    }

    // longest[e] = (start, interval) of the longest exact match ending at e
    let mut longest: Vec<(usize, Interval)> = Vec::with_capacity(n);
    for e in 0..n {
        let mut iv = index.root();
        let mut s = e + 1;
        while s > 0 {
            let next = index.extend(iv, frag[s - 1]);
            if next.is_empty() {
                break;
            }
            iv = next;
            s -= 1;
        }
        longest.push((s, iv));
    }

    let mut hits = Vec::new();
    for e in 0..n {
        let (s, iv) = longest[e];
        let len = e + 1 - s;
        if len < min_length || len == 0 {
            continue;
        }
        let right_maximal = e + 1 == n || longest[e + 1].0 > s;
        if right_maximal {
            hits.push(SearchHit {
                start: s,
                end: e,
                score: None,
                mismatches: 0,
                interval: iv,
            });
        }
    }
    hits
}

/// Seed-and-extend search with a BLOSUM-scored mismatch budget.
///
/// Every substring of the configured seed length is searched exactly;
/// surviving seeds are extended left (incrementally, via backward
/// extension) and then right (re-searching the grown match string, since
/// the index only extends backward). Hits from different seeds that
/// converge on the same extent are deduplicated.
pub fn greedy_search(index: &FmIndex, frag: &[u8], config: &RunConfig) -> Vec<SearchHit> {
    let n = frag.len();
    let k = config.seed_length;
    if n < k {
        return Vec::new();
    }

    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut hits = Vec::new();
    for s in 0..=n - k {
        let seed_iv = index.backward_search(&frag[s..s + k]);
        if seed_iv.is_empty() {
            continue;
        }
        let hit = extend_seed(index, frag, s, s + k - 1, seed_iv, config.mismatches);
        let score = hit.score.unwrap_or(i32::MIN);
        if score >= config.min_score && seen.insert((hit.start, hit.end)) {
            hits.push(hit);
        }
    }
    hits
}

/// Pick the highest-scoring viable substitution for `sym`, ties broken
/// by the smallest symbol id to keep the search deterministic.
fn best_substitution<F>(sym: u8, mut probe: F) -> Option<(u8, Interval)>
where
    F: FnMut(u8) -> Interval,
{
    let mut best: Option<(u8, Interval, i32)> = None;
    for c in 0..ALPHABET_SIZE as u8 {
        if c == sym {
            continue;
        }
        let iv = probe(c);
        if iv.is_empty() {
            continue;
        }
        let sc = blosum::score(sym, c);
        if best.as_ref().map_or(true, |&(_, _, b)| sc > b) {
            best = Some((c, iv, sc));
        }
    }
    best.map(|(c, iv, _)| (c, iv))
}

fn search_with(index: &FmIndex, refside: &mut Vec<u8>, sym: u8) -> Interval {
    refside.push(sym);
    let iv = index.backward_search(refside);
    refside.pop();
    iv
}

fn extend_seed(
    index: &FmIndex,
    frag: &[u8],
    seed_start: usize,
    seed_end: usize,
    seed_iv: Interval,
    budget: u32,
) -> SearchHit {
    let n = frag.len();
    let mut start = seed_start;
    let mut end = seed_end;
    let mut iv = seed_iv;
    let mut mismatches = 0u32;
    let mut score: i32 = frag[seed_start..=seed_end]
        .iter()
        .map(|&a| blosum::score(a, a))
        .sum();

    // reference-side symbols of the current match, leftmost first
    let mut refside: Vec<u8> = frag[seed_start..=seed_end].to_vec();

    // left phase: one backward extension per step
    let mut best = (start, iv, score, mismatches);
    while start > 0 {
        let sym = frag[start - 1];
        let exact = index.extend(iv, sym);
        let (chosen, is_sub) = if !exact.is_empty() {
            (Some((sym, exact)), false)
        } else if mismatches < budget {
            (best_substitution(sym, |c| index.extend(iv, c)), true)
        } else {
            (None, false)
        };
        let Some((c, next)) = chosen else { break };
        iv = next;
        start -= 1;
        refside.insert(0, c);
        score += blosum::score(sym, c);
        if is_sub {
            mismatches += 1;
        }
        if score > best.2 {
            best = (start, iv, score, mismatches);
        } else if best.2 - score > ABANDON_MARGIN {
            // abandon: roll back to the side's best-scoring extent
            refside.drain(..best.0 - start);
            (start, iv, score, mismatches) = best;
            break;
        }
    }

    // right phase: the index only extends backward, so each rightward
    // step re-searches the grown match string
    let mut best = (end, iv, score, mismatches);
    while end + 1 < n {
        let sym = frag[end + 1];
        let exact = search_with(index, &mut refside, sym);
        let (chosen, is_sub) = if !exact.is_empty() {
            (Some((sym, exact)), false)
        } else if mismatches < budget {
            (
                best_substitution(sym, |c| search_with(index, &mut refside, c)),
                true,
            )
        } else {
            (None, false)
        };
        let Some((c, next)) = chosen else { break };
        iv = next;
        end += 1;
        refside.push(c);
        score += blosum::score(sym, c);
        if is_sub {
            mismatches += 1;
        }
        if score > best.2 {
            best = (end, iv, score, mismatches);
        } else if best.2 - score > ABANDON_MARGIN {
            refside.truncate(refside.len() - (end - best.0));
            (end, iv, score, mismatches) = best;
            break;
        }
    }

    SearchHit {
        start,
        end,
        score: Some(score),
        mismatches,
        interval: iv,
    }
}

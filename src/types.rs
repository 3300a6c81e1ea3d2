//! Shared data types for the classification pipeline.

/// One unit of work: a read identifier and its residue sequence
/// (already stripped of non-alphabetic characters and uppercased by
/// ingestion). Owned by the work queue until dequeued, then by exactly
/// one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadItem {
    pub id: String,
    pub seq: String,
}

impl ReadItem {
    pub fn new(id: impl Into<String>, seq: impl Into<String>) -> Self {
        ReadItem {
            id: id.into(),
            seq: seq.into(),
        }
    }
}

/// A resolved position of a match within one reference sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLocation {
    pub name: String,
    pub offset: usize,
}

/// An accepted match of a read segment against the index.
#[derive(Debug, Clone)]
pub struct CandidateMatch {
    /// Read offsets of the matched segment, inclusive on both ends.
    pub start: usize,
    pub end: usize,
    /// BLOSUM score in greedy mode; `None` in MEM mode.
    pub score: Option<i32>,
    pub mismatches: u32,
    pub locations: Vec<RefLocation>,
}

impl CandidateMatch {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Classified(Vec<CandidateMatch>),
    Unclassified,
}

/// Produced exactly once per consumed read.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub id: String,
    pub outcome: Outcome,
}

impl ClassificationResult {
    pub fn is_classified(&self) -> bool {
        matches!(self.outcome, Outcome::Classified(_))
    }
}

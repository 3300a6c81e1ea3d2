//! Protein-level classification of sequencing reads against an FM-index
//! of reference proteins.
//!
//! Reads are matched either as maximal exact matches (MEM mode) or by
//! greedy BLOSUM-scored seed extension with a bounded mismatch budget
//! (greedy mode), and each read yields exactly one classification
//! record. The search runs on a fixed pool of worker threads fed by a
//! bounded work queue.

pub mod alphabet;
pub mod blosum;
pub mod classify;
pub mod config;
pub mod fm_index;
pub mod queue;
pub mod search;
pub mod seqreader;
pub mod types;

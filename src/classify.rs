//! The classification pipeline: one producer feeding a bounded work
//! queue, a fixed pool of worker threads running the configured search
//! strategy, and a single serialized result sink.
//!
//! The index, scoring table, and run configuration are shared read-only;
//! the sink is the only shared mutable resource and every record is
//! written under one lock acquisition so writes never interleave
//! mid-record. Every dequeued read yields exactly one output record.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::alphabet;
use crate::config::{Mode, RunConfig};
use crate::fm_index::FmIndex;
use crate::queue::work_queue;
use crate::search::{greedy_search, mem_search, SearchHit};
use crate::types::{CandidateMatch, ClassificationResult, Outcome, ReadItem, RefLocation};

/// Work queue capacity; bounds memory for queued-but-unprocessed reads.
pub const QUEUE_CAPACITY: usize = 500;

const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Debug, Default, Clone)]
pub struct ClassificationStats {
    pub total_reads: u64,
    pub total_classified: u64,
}

impl ClassificationStats {
    pub fn total_unclassified(&self) -> u64 {
        self.total_reads - self.total_classified
    }
}

/// Serialized result sink shared by all workers.
pub struct ResultWriter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ResultWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        ResultWriter {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Append one record atomically.
    pub fn write_record(&self, record: &str) -> io::Result<()> {
        self.writer.lock().unwrap().write_all(record.as_bytes())
    }

    pub fn flush(&self) -> io::Result<()> {
        self.writer.lock().unwrap().flush()
    }
}

/// Classify a single read. Reads containing residues outside the
/// alphabet are a data error, not a fatal one: they yield an explicit
/// unclassified outcome and processing continues.
pub fn classify_read(index: &FmIndex, config: &RunConfig, read: &ReadItem) -> ClassificationResult {
    let Some(encoded) = alphabet::encode_seq(read.seq.as_bytes()) else {
        log::debug!(
            "read {:?} contains residues outside the alphabet, reporting it unclassified",
            read.id
        );
        return ClassificationResult {
            id: read.id.clone(),
            outcome: Outcome::Unclassified,
        };
    };

    let hits = match config.mode {
        Mode::Mem => mem_search(index, &encoded, config.min_match_length),
        Mode::Greedy => greedy_search(index, &encoded, config),
    };

    if hits.is_empty() {
        return ClassificationResult {
            id: read.id.clone(),
            outcome: Outcome::Unclassified,
        };
    }

    let mut matches: Vec<CandidateMatch> = hits.into_iter().map(|h| resolve(index, h)).collect();
    matches.sort_by_key(|m| (m.start, m.end));
    ClassificationResult {
        id: read.id.clone(),
        outcome: Outcome::Classified(matches),
    }
}

fn resolve(index: &FmIndex, hit: SearchHit) -> CandidateMatch {
    let locations = index
        .locate(hit.interval)
        .into_iter()
        .map(|(ref_id, offset)| RefLocation {
            name: index.reference_name(ref_id).to_string(),
            offset,
        })
        .collect();
    CandidateMatch {
        start: hit.start,
        end: hit.end,
        score: hit.score,
        mismatches: hit.mismatches,
        locations,
    }
}

/// One output record per read, kaiju-style TSV:
/// `C <id> <best score or length> <matched reference names>` or `U <id>`.
pub fn format_record(result: &ClassificationResult) -> String {
    match &result.outcome {
        Outcome::Unclassified => format!("U\t{}\n", result.id),
        Outcome::Classified(matches) => {
            let best = matches
                .iter()
                .map(|m| m.score.unwrap_or(m.len() as i32))
                .max()
                .unwrap_or(0);
            let mut names: Vec<&str> = Vec::new();
            for m in matches {
                for loc in &m.locations {
                    if !names.contains(&loc.name.as_str()) {
                        names.push(&loc.name);
                    }
                }
            }
            format!("C\t{}\t{}\t{}\n", result.id, best, names.join(","))
        }
    }
}

/// Run the full pipeline over a stream of reads.
///
/// The calling thread acts as the producer; `config.num_threads` workers
/// are spawned, borrow the index and configuration for the duration of
/// the scope, and are all joined before this returns. Dropping the
/// sender after the last enqueue is the end-of-stream signal.
pub fn run_pipeline<I>(
    index: &FmIndex,
    config: &RunConfig,
    reads: I,
    writer: &ResultWriter,
) -> Result<ClassificationStats>
where
    I: IntoIterator<Item = io::Result<ReadItem>>,
{
    config.validate()?;

    let (tx, rx) = work_queue::<ReadItem>(QUEUE_CAPACITY);
    let total_reads = AtomicU64::new(0);
    let total_classified = AtomicU64::new(0);
    let mut producer_err: Option<io::Error> = None;

    thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(config.num_threads);
        for _ in 0..config.num_threads {
            let rx = rx.clone();
            let (total_reads, total_classified) = (&total_reads, &total_classified);
            handles.push(scope.spawn(move || -> io::Result<()> {
                while let Some(read) = rx.recv() {
                    let result = classify_read(index, config, &read);
                    if result.is_classified() {
                        total_classified.fetch_add(1, Ordering::Relaxed);
                    }
                    let done = total_reads.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_INTERVAL == 0 && atty::is(atty::Stream::Stderr) {
                        eprint!("\rProcessed {} reads ...", done);
                    }
                    writer.write_record(&format_record(&result))?;
                }
                Ok(())
            }));
        }
        drop(rx);

        for item in reads {
            match item {
                Ok(read) => {
                    if tx.send(read).is_err() {
                        // all workers gone; their join below reports why
                        break;
                    }
                }
                Err(e) => {
                    producer_err = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        for handle in handles {
            handle.join().expect("worker thread panicked")?;
        }
        Ok(())
    })?;

    if let Some(e) = producer_err {
        return Err(e.into());
    }
    writer.flush()?;

    Ok(ClassificationStats {
        total_reads: total_reads.into_inner(),
        total_classified: total_classified.into_inner(),
    })
}

pub fn report_stats(elapsed: Duration, stats: &ClassificationStats) {
    let seconds = elapsed.as_secs_f64();
    let pct = |part: u64| {
        if stats.total_reads == 0 {
            0.0
        } else {
            part as f64 * 100.0 / stats.total_reads as f64
        }
    };

    if atty::is(atty::Stream::Stderr) {
        eprint!("\r");
    }
    eprintln!(
        "{} reads processed in {:.3} s ({:.1} reads/s).",
        stats.total_reads,
        seconds,
        stats.total_reads as f64 / seconds.max(f64::EPSILON)
    );
    eprintln!(
        "  {} reads classified ({:.2}%)",
        stats.total_classified,
        pct(stats.total_classified)
    );
    eprintln!(
        "  {} reads unclassified ({:.2}%)",
        stats.total_unclassified(),
        pct(stats.total_unclassified())
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_index() -> FmIndex {
        FmIndex::from_references([("protA", "MKVLAT"), ("protB", "WMKVLATW")]).unwrap()
    }

    fn mem_config(min_length: usize) -> RunConfig {
        RunConfig {
            mode: Mode::Mem,
            min_match_length: min_length,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_classify_read_mem() {
        let index = test_index();
        let read = ReadItem::new("r1", "MKVLAT");
        let result = classify_read(&index, &mem_config(4), &read);
        let Outcome::Classified(matches) = &result.outcome else {
            panic!("expected a classified outcome");
        };
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].len(), 6);
        let names: Vec<&str> = matches[0]
            .locations
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["protA", "protB"]);
    }

    #[test]
    fn test_invalid_read_is_unclassified_not_fatal() {
        let index = test_index();
        let read = ReadItem::new("r1", "MKXLAT");
        let result = classify_read(&index, &mem_config(4), &read);
        assert!(!result.is_classified());
    }

    #[test]
    fn test_nonmatching_read_is_unclassified() {
        let index = test_index();
        let read = ReadItem::new("r1", "GGGGGGGG");
        let result = classify_read(&index, &mem_config(4), &read);
        assert!(!result.is_classified());
    }

    #[test]
    fn test_format_record() {
        let index = test_index();
        let classified = classify_read(&index, &mem_config(4), &ReadItem::new("r1", "MKVLAT"));
        assert_eq!(format_record(&classified), "C\tr1\t6\tprotA,protB\n");

        let unclassified = classify_read(&index, &mem_config(4), &ReadItem::new("r2", "GGGGGG"));
        assert_eq!(format_record(&unclassified), "U\tr2\n");
    }

    #[test]
    fn test_pipeline_emits_one_record_per_read() {
        let index = test_index();
        let reads: Vec<io::Result<ReadItem>> = vec![
            Ok(ReadItem::new("r1", "MKVLAT")),
            Ok(ReadItem::new("r2", "GGGGGG")),
            Ok(ReadItem::new("r3", "MKXLAT")),
        ];
        let sink = ResultWriter::new(Vec::new());
        let config = RunConfig {
            num_threads: 2,
            ..mem_config(4)
        };
        let stats = run_pipeline(&index, &config, reads, &sink).unwrap();
        assert_eq!(stats.total_reads, 3);
        assert_eq!(stats.total_classified, 1);
        assert_eq!(stats.total_unclassified(), 2);
    }

    #[test]
    fn test_pipeline_rejects_invalid_config_before_starting() {
        let index = test_index();
        let sink = ResultWriter::new(Vec::new());
        let config = RunConfig {
            num_threads: 0,
            ..RunConfig::default()
        };
        assert!(run_pipeline(&index, &config, Vec::new(), &sink).is_err());
    }

    #[test]
    fn test_pipeline_propagates_producer_error() {
        let index = test_index();
        let sink = ResultWriter::new(Vec::new());
        let reads: Vec<io::Result<ReadItem>> = vec![
            Ok(ReadItem::new("r1", "MKVLAT")),
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad record")),
        ];
        assert!(run_pipeline(&index, &RunConfig::default(), reads, &sink).is_err());
    }
}

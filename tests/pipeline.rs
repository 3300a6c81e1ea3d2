//! End-to-end tests of the classification pipeline: every read yields
//! exactly one record, the result set is independent of thread count,
//! and the run terminates once the input stream ends.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use kaiju_rs::classify::{run_pipeline, ResultWriter};
use kaiju_rs::config::{Mode, RunConfig};
use kaiju_rs::fm_index::FmIndex;
use kaiju_rs::seqreader::SequenceReader;
use kaiju_rs::types::ReadItem;

/// A sink whose contents survive the `ResultWriter` taking ownership.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8(buf.clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn test_index() -> FmIndex {
    FmIndex::from_references([
        ("protA", "MKVLATRRWQQ"),
        ("protB", "WMKVLATWHHKL"),
        ("protC", "GGSSTTPPLL"),
    ])
    .unwrap()
}

fn test_reads(n: usize) -> Vec<io::Result<ReadItem>> {
    (0..n)
        .map(|i| {
            let seq = match i % 4 {
                0 => "MKVLATRRW",  // matches protA/protB
                1 => "GGSSTTPP",   // matches protC
                2 => "CCCCCCCCC",  // matches nothing
                _ => "MKXBLATRRW", // invalid residues
            };
            Ok(ReadItem::new(format!("read{}", i), seq))
        })
        .collect()
}

fn run(config: &RunConfig, reads: Vec<io::Result<ReadItem>>) -> Vec<String> {
    let index = test_index();
    let buf = SharedBuf::default();
    let writer = ResultWriter::new(buf.clone());
    run_pipeline(&index, config, reads, &writer).unwrap();
    buf.lines()
}

fn mem_config(threads: usize) -> RunConfig {
    RunConfig {
        mode: Mode::Mem,
        min_match_length: 6,
        num_threads: threads,
        ..RunConfig::default()
    }
}

#[test]
fn every_read_yields_exactly_one_record() {
    let lines = run(&mem_config(4), test_reads(40));
    assert_eq!(lines.len(), 40);
    for i in 0..40 {
        let id = format!("read{}", i);
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.split('\t').nth(1) == Some(id.as_str()))
                .count(),
            1,
            "expected exactly one record for {}",
            id
        );
    }
}

#[test]
fn result_set_is_independent_of_thread_count() {
    let mut single: Vec<String> = run(&mem_config(1), test_reads(40));
    single.sort();
    for threads in [2, 4, 8] {
        let mut many = run(&mem_config(threads), test_reads(40));
        many.sort();
        assert_eq!(single, many, "results differ at {} threads", threads);
    }
}

#[test]
fn repeated_runs_are_deterministic() {
    let first = {
        let mut lines = run(&mem_config(4), test_reads(24));
        lines.sort();
        lines
    };
    for _ in 0..3 {
        let mut again = run(&mem_config(4), test_reads(24));
        again.sort();
        assert_eq!(first, again);
    }
}

#[test]
fn invalid_and_nonmatching_reads_are_reported_unclassified() {
    let lines = run(&mem_config(2), test_reads(8));
    // reads 2 and 6 match nothing; reads 3 and 7 carry invalid residues
    for id in ["read2", "read3", "read6", "read7"] {
        assert!(
            lines.iter().any(|l| l == &format!("U\t{}", id)),
            "missing unclassified record for {}",
            id
        );
    }
    assert!(lines.iter().any(|l| l.starts_with("C\tread0\t")));
}

#[test]
fn greedy_mode_end_to_end() {
    let config = RunConfig {
        mode: Mode::Greedy,
        min_score: 30,
        seed_length: 7,
        mismatches: 1,
        num_threads: 3,
        ..RunConfig::default()
    };
    // one substitution against protA (R -> K at the second R)
    let reads: Vec<io::Result<ReadItem>> = vec![
        Ok(ReadItem::new("hit", "MKVLATRKW")),
        Ok(ReadItem::new("miss", "CCCCCCCCC")),
    ];
    let lines = run(&config, reads);
    assert_eq!(lines.len(), 2);
    let hit = lines.iter().find(|l| l.contains("hit")).unwrap();
    assert!(hit.starts_with("C\thit\t"), "got {:?}", hit);
    assert!(hit.contains("protA"));
    assert!(lines.contains(&"U\tmiss".to_string()));
}

#[test]
fn empty_input_stream_terminates_cleanly() {
    let lines = run(&mem_config(4), Vec::new());
    assert!(lines.is_empty());
}

#[test]
fn classify_from_files_via_saved_index() {
    let dir = tempfile::tempdir().unwrap();

    let index_path = dir.path().join("db.fmi");
    test_index().save(&index_path).unwrap();
    let index = FmIndex::load(&index_path).unwrap();

    let reads_path = dir.path().join("reads.fastq");
    std::fs::write(
        &reads_path,
        "@r1\nMKVLATRRW\n+\nIIIIIIIII\n@r2\nCCCCCCCCC\n+\nIIIIIIIII\n",
    )
    .unwrap();

    let reader = SequenceReader::open(&reads_path).unwrap();
    let buf = SharedBuf::default();
    let writer = ResultWriter::new(buf.clone());
    let stats = run_pipeline(&index, &mem_config(2), reader, &writer).unwrap();

    assert_eq!(stats.total_reads, 2);
    assert_eq!(stats.total_classified, 1);
    let lines = buf.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l.starts_with("C\tr1\t")));
    assert!(lines.contains(&"U\tr2".to_string()));
}

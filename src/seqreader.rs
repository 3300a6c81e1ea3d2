//! FASTA/FASTQ read ingestion.
//!
//! The format is auto-detected from the first record byte (`>` or `@`),
//! gzipped input is handled transparently, and sequences are stripped of
//! non-alphabetic characters and uppercased before they enter the
//! pipeline. Residues outside the amino-acid alphabet are left in place;
//! they are a per-read data error handled by the worker, not here.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::types::ReadItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceFormat {
    #[default]
    AutoDetect,
    Fasta,
    Fastq,
}

pub struct SequenceReader<R: BufRead> {
    reader: R,
    format: SequenceFormat,
    /// lookahead line, used to find FASTA record boundaries
    pending: Option<String>,
}

impl SequenceReader<Box<dyn BufRead + Send>> {
    /// Open a plain or gzipped FASTA/FASTQ file.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead + Send> = if path.extension().is_some_and(|e| e == "gz") {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(SequenceReader::new(reader))
    }
}

fn strip_sequence(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn read_id(header: &str) -> String {
    header[1..]
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

impl<R: BufRead> SequenceReader<R> {
    pub fn new(reader: R) -> Self {
        SequenceReader {
            reader,
            format: SequenceFormat::AutoDetect,
            pending: None,
        }
    }

    pub fn file_format(&self) -> SequenceFormat {
        self.format
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Next read record, or `None` at end of input. Records whose
    /// sequence is empty after stripping are skipped.
    pub fn next_read(&mut self) -> io::Result<Option<ReadItem>> {
        loop {
            let header = loop {
                match self.next_line()? {
                    None => return Ok(None),
                    Some(line) if line.is_empty() => continue,
                    Some(line) => break line,
                }
            };

            if self.format == SequenceFormat::AutoDetect {
                self.format = match header.bytes().next() {
                    Some(b'>') => SequenceFormat::Fasta,
                    Some(b'@') => SequenceFormat::Fastq,
                    _ => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "auto-detection of file type failed: input is neither FASTA nor FASTQ",
                        ))
                    }
                };
            }

            let id;
            let raw_seq;
            match self.format {
                SequenceFormat::Fastq => {
                    if !header.starts_with('@') {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "malformed FASTQ file",
                        ));
                    }
                    id = read_id(&header);
                    raw_seq = self.next_line()?.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "truncated FASTQ record")
                    })?;
                    // skip the + separator and quality lines
                    for _ in 0..2 {
                        self.next_line()?.ok_or_else(|| {
                            io::Error::new(io::ErrorKind::InvalidData, "truncated FASTQ record")
                        })?;
                    }
                }
                SequenceFormat::Fasta => {
                    if !header.starts_with('>') {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "malformed FASTA file",
                        ));
                    }
                    id = read_id(&header);
                    let mut seq = String::new();
                    loop {
                        match self.next_line()? {
                            None => break,
                            Some(line) if line.starts_with('>') => {
                                self.pending = Some(line);
                                break;
                            }
                            Some(line) => seq.push_str(&line),
                        }
                    }
                    raw_seq = seq;
                }
                SequenceFormat::AutoDetect => unreachable!(),
            }

            let seq = strip_sequence(&raw_seq);
            if seq.is_empty() {
                log::warn!("skipping read {:?} with empty sequence", id);
                continue;
            }
            return Ok(Some(ReadItem { id, seq }));
        }
    }
}

impl<R: BufRead> Iterator for SequenceReader<R> {
    type Item = io::Result<ReadItem>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_read().transpose()
    }
}

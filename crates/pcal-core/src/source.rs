//! # Record Source
//!
//! Streams line-delimited JSON records without buffering the population.
//!
//! Lines are read in chunks of [`ScanConfig::chunk_size`]. Each chunk is
//! parsed and folded in parallel with rayon; per-chunk partial results are
//! merged with a caller-supplied associative `reduce`. The
//! [`CancellationToken`] is checked between chunks.
//!
//! ## Malformed lines
//!
//! Unparsable lines, lines without a count mapping and lines that are not
//! valid UTF-8 are skipped and counted in [`ScanStats::skipped`]. The first
//! few are logged at `warn`, the rest at `debug`. Blank lines are not records
//! and are not counted at all. Skipped records are excluded from every
//! denominator downstream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::PcalError;
use crate::record::Record;

/// Malformed lines beyond this count are logged at `debug` instead of `warn`.
const WARN_SKIP_LIMIT: u64 = 10;

// ---------------------------------------------------------------------------
// CancellationToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between a scan and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Scans stop at the next chunk boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`PcalError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), PcalError> {
        if self.is_cancelled() {
            Err(PcalError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// ScanStats
// ---------------------------------------------------------------------------

/// Counts gathered during one pass over a record source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Well-formed records handed to the fold.
    pub processed: u64,
    /// Malformed lines that were skipped.
    pub skipped: u64,
}

impl ScanStats {
    /// Combine two partial counts.
    pub fn merge(self, other: ScanStats) -> ScanStats {
        ScanStats {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Origin {
    File(PathBuf),
    Lines(Arc<Vec<String>>),
}

/// An ordered, line-delimited collection of records.
///
/// Cheap to clone; every scan re-reads from the start.
#[derive(Debug, Clone)]
pub struct RecordSource {
    origin: Origin,
}

/// One raw line: its 1-based number and its text (`None` if not UTF-8).
type RawLine = (u64, Option<String>);

impl RecordSource {
    /// Open a JSON Lines file. Fails with [`PcalError::DataNotFound`] if the
    /// path is not a readable file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PcalError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PcalError::DataNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            origin: Origin::File(path.to_path_buf()),
        })
    }

    /// An in-memory source, one record per element.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origin: Origin::Lines(Arc::new(lines.into_iter().map(Into::into).collect())),
        }
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match &self.origin {
            Origin::File(p) => p.display().to_string(),
            Origin::Lines(lines) => format!("<memory: {} lines>", lines.len()),
        }
    }

    /// Parallel fold over every well-formed record.
    ///
    /// `fold` accumulates one record into a partial result, `reduce` merges
    /// two partials and must be associative and commutative with
    /// `identity()` as its neutral element. Chunk order is not observable.
    pub fn par_fold<A, ID, F, R>(
        &self,
        scan: &ScanConfig,
        cancel: &CancellationToken,
        identity: ID,
        fold: F,
        reduce: R,
    ) -> Result<(A, ScanStats), PcalError>
    where
        A: Send,
        ID: Fn() -> A + Sync + Send,
        F: Fn(A, &Record) -> A + Sync + Send,
        R: Fn(A, A) -> A + Sync + Send,
    {
        let warned = AtomicU64::new(0);
        let mut reader = self.reader()?;
        let mut total = identity();
        let mut stats = ScanStats::default();
        let chunk_size = scan.chunk_size.max(1);

        loop {
            cancel.check()?;
            let chunk = reader.next_chunk(chunk_size)?;
            if chunk.is_empty() {
                break;
            }

            let (partial, chunk_stats) = chunk
                .par_iter()
                .fold(
                    || (identity(), ScanStats::default()),
                    |(acc, mut st), (line, text)| match parse_raw(*line, text.as_deref()) {
                        Ok(record) => {
                            st.processed += 1;
                            (fold(acc, &record), st)
                        }
                        Err(e) => {
                            st.skipped += 1;
                            log_skip(&warned, &e);
                            (acc, st)
                        }
                    },
                )
                .reduce(
                    || (identity(), ScanStats::default()),
                    |(a, sa), (b, sb)| (reduce(a, b), sa.merge(sb)),
                );

            total = reduce(total, partial);
            stats = stats.merge(chunk_stats);
        }

        tracing::debug!(
            source = %self.describe(),
            processed = stats.processed,
            skipped = stats.skipped,
            "scan complete"
        );
        Ok((total, stats))
    }

    /// Read every well-formed record in source order.
    ///
    /// Buffers the whole population; intended for small sources and tests.
    pub fn read_all(&self, cancel: &CancellationToken) -> Result<(Vec<Record>, ScanStats), PcalError> {
        let warned = AtomicU64::new(0);
        let mut reader = self.reader()?;
        let mut records = Vec::new();
        let mut stats = ScanStats::default();
        loop {
            cancel.check()?;
            let chunk = reader.next_chunk(ScanConfig::default().chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            for (line, text) in chunk {
                match parse_raw(line, text.as_deref()) {
                    Ok(r) => {
                        stats.processed += 1;
                        records.push(r);
                    }
                    Err(e) => {
                        stats.skipped += 1;
                        log_skip(&warned, &e);
                    }
                }
            }
        }
        Ok((records, stats))
    }

    fn reader(&self) -> Result<LineReader<'_>, PcalError> {
        match &self.origin {
            Origin::File(path) => {
                let file = File::open(path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => PcalError::DataNotFound { path: path.clone() },
                    _ => PcalError::Io(e),
                })?;
                Ok(LineReader::File {
                    inner: BufReader::new(file),
                    line: 0,
                })
            }
            Origin::Lines(lines) => Ok(LineReader::Memory {
                inner: lines.iter(),
                line: 0,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: line reading
// ---------------------------------------------------------------------------

enum LineReader<'a> {
    File { inner: BufReader<File>, line: u64 },
    Memory { inner: std::slice::Iter<'a, String>, line: u64 },
}

impl LineReader<'_> {
    /// Next chunk of non-blank lines; empty at end of input.
    fn next_chunk(&mut self, size: usize) -> Result<Vec<RawLine>, PcalError> {
        let mut out = Vec::with_capacity(size.min(65_536));
        while out.len() < size {
            match self.next_line()? {
                None => break,
                Some((_, Some(ref t))) if t.trim().is_empty() => continue,
                Some(raw) => out.push(raw),
            }
        }
        Ok(out)
    }

    fn next_line(&mut self) -> Result<Option<RawLine>, PcalError> {
        match self {
            LineReader::File { inner, line } => {
                let mut buf = Vec::new();
                if inner.read_until(b'\n', &mut buf)? == 0 {
                    return Ok(None);
                }
                *line += 1;
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                Ok(Some((*line, String::from_utf8(buf).ok())))
            }
            LineReader::Memory { inner, line } => Ok(inner.next().map(|s| {
                *line += 1;
                (*line, Some(s.clone()))
            })),
        }
    }
}

fn parse_raw(line: u64, text: Option<&str>) -> Result<Record, PcalError> {
    match text {
        Some(t) => Record::parse_line(t, line),
        None => Err(PcalError::MalformedRecord {
            line,
            reason: "line is not valid UTF-8".into(),
        }),
    }
}

fn log_skip(warned: &AtomicU64, err: &PcalError) {
    let n = warned.fetch_add(1, Ordering::Relaxed);
    if n < WARN_SKIP_LIMIT {
        tracing::warn!("skipping {err}");
    } else {
        tracing::debug!("skipping {err}");
    }
}

//! Reading source abstraction for raw telemetry ingestion.
//!
//! Provides a unified trait for reading raw turbine readings from different
//! sources: an in-memory snapshot (tests, replays) and JSON lines from a file
//! or stdin.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::types::RawReading;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error while reading input: {0}")]
    Io(#[from] std::io::Error),

    /// The record shape does not match the reading schema (non-object line,
    /// unknown column, wrongly typed value).
    #[error("Schema mismatch on line {line}: {source}")]
    Schema {
        line: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// Events produced by a reading source.
#[derive(Debug)]
pub enum ReadingEvent {
    Reading(RawReading),
    /// Source reached end of data
    Eof,
}

/// Trait abstracting where raw readings come from.
///
/// The processing loop calls [`next_reading`](ReadingSource::next_reading)
/// in a `select!` with cancellation.
#[async_trait]
pub trait ReadingSource: Send {
    /// Read the next raw reading.
    ///
    /// Returns `ReadingEvent::Eof` when no more data is available and `Err`
    /// on unrecoverable input problems.
    async fn next_reading(&mut self) -> Result<ReadingEvent, IngestError>;

    /// Human-readable name for logging (e.g. "memory", "stdin").
    fn source_name(&self) -> &str;
}

// ============================================================================
// In-memory Source
// ============================================================================

/// Replays a pre-loaded snapshot of raw readings.
pub struct VecSource {
    readings: std::vec::IntoIter<RawReading>,
}

impl VecSource {
    pub fn new(readings: Vec<RawReading>) -> Self {
        Self {
            readings: readings.into_iter(),
        }
    }
}

#[async_trait]
impl ReadingSource for VecSource {
    async fn next_reading(&mut self) -> Result<ReadingEvent, IngestError> {
        Ok(match self.readings.next() {
            Some(r) => ReadingEvent::Reading(r),
            None => ReadingEvent::Eof,
        })
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// JSON Lines Source (file or stdin, one object per line)
// ============================================================================

/// Reads one JSON reading object per line. Blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    name: String,
    line_buffer: String,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_buffer: String::with_capacity(512),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self, IngestError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ReadingSource for JsonLinesSource<R> {
    async fn next_reading(&mut self) -> Result<ReadingEvent, IngestError> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(ReadingEvent::Eof);
            }
            self.line_no += 1;
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str::<RawReading>(line)
                .map(ReadingEvent::Reading)
                .map_err(|source| IngestError::Schema {
                    line: self.line_no,
                    source,
                });
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

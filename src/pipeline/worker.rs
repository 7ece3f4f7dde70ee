use crate::pipeline::chunk::Chunk;
use crate::source::reader::{LineReader, ReaderError};
use crate::source::timestamp::DateParser;
use chrono::NaiveDate;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempPath;
use thiserror::Error;
use tracing::debug;

/// Lines scanned between checks of the cancellation flag.
const CANCEL_POLL_LINES: u64 = 4096;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("chunk {ordinal}: failed to read source: {source}")]
    Read {
        ordinal: usize,
        #[source]
        source: ReaderError,
    },

    #[error("chunk {ordinal}: failed to write partial output: {source}")]
    Write {
        ordinal: usize,
        #[source]
        source: io::Error,
    },

    #[error("chunk {ordinal}: source ended at offset {offset}, before chunk end {end}")]
    Truncated { ordinal: usize, offset: u64, end: u64 },

    #[error("chunk {ordinal}: cancelled after another chunk failed")]
    Cancelled { ordinal: usize },
}

impl WorkerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled { .. })
    }
}

/// Read-only state shared by every worker of one extraction.
#[derive(Debug)]
pub struct WorkerContext {
    pub path: PathBuf,
    pub target: NaiveDate,
    pub parser: DateParser,
    /// Where chunk-local outputs are spooled; same filesystem as the final output.
    pub scratch_dir: PathBuf,
    pub read_buffer_bytes: usize,
    pub cancel: Arc<AtomicBool>,
}

/// Matching lines of one chunk, spooled to a temporary file that is removed
/// when this value is dropped.
#[derive(Debug)]
pub struct ChunkOutput {
    pub ordinal: usize,
    pub part: TempPath,
    pub lines: u64,
    pub bytes: u64,
    pub unparsed: u64,
}

/// Scan one chunk line by line and spool every line dated `ctx.target`.
///
/// The date of each line is checked again even though the chunk came from
/// the resolved range, so an off-by-one upstream can never leak a
/// neighbouring date into the output. Lines without a parseable date never
/// match.
pub fn scan_chunk(ctx: &WorkerContext, chunk: Chunk) -> Result<ChunkOutput, WorkerError> {
    let ordinal = chunk.ordinal;
    let end = chunk.range.end;
    let read_err = |source| WorkerError::Read { ordinal, source };
    let write_err = |source| WorkerError::Write { ordinal, source };

    let mut reader =
        LineReader::open(&ctx.path, chunk.range.start, ctx.read_buffer_bytes).map_err(read_err)?;

    let part = tempfile::Builder::new()
        .prefix(".logslice-part-")
        .tempfile_in(&ctx.scratch_dir)
        .map_err(write_err)?;
    let mut sink = BufWriter::new(part);

    let mut scanned = 0u64;
    let mut lines = 0u64;
    let mut bytes = 0u64;
    let mut unparsed = 0u64;

    while reader.offset() < end {
        if scanned % CANCEL_POLL_LINES == 0 && ctx.cancel.load(Ordering::Relaxed) {
            return Err(WorkerError::Cancelled { ordinal });
        }

        let offset = reader.offset();
        let Some(line) = reader.next_line().map_err(read_err)? else {
            return Err(WorkerError::Truncated {
                ordinal,
                offset,
                end,
            });
        };
        scanned += 1;

        match ctx.parser.parse(line.bytes) {
            Ok(date) if date == ctx.target => {
                sink.write_all(line.bytes).map_err(write_err)?;
                lines += 1;
                bytes += line.bytes.len() as u64;
            }
            Ok(_) => {}
            Err(_) => unparsed += 1,
        }
    }

    let part = sink
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;

    debug!(
        chunk = ordinal,
        scanned = scanned,
        matched = lines,
        bytes = bytes,
        "Chunk scanned"
    );

    Ok(ChunkOutput {
        ordinal,
        part: part.into_temp_path(),
        lines,
        bytes,
        unparsed,
    })
}

use super::{Index, IndexEntry, IndexError, SourceIdentity};
use crate::source::reader::{LineReader, DEFAULT_READ_BUFFER};
use crate::source::timestamp::DateParser;
use chrono::NaiveDate;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub read_buffer_bytes: usize,
    /// Emit a progress event every this many bytes; 0 disables progress.
    pub progress_interval_bytes: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            read_buffer_bytes: DEFAULT_READ_BUFFER,
            progress_interval_bytes: 1 << 30,
        }
    }
}

/// Build the index with one sequential pass over the whole file.
///
/// Each time a parsed date differs from the current one, an entry is recorded
/// at the start offset of that line. Lines without a parseable date belong to
/// the current date and never produce an entry. A date earlier than the
/// current one means the file is not chronological and aborts the build.
pub fn build_index(
    path: &Path,
    parser: &DateParser,
    options: &BuildOptions,
) -> Result<Index, IndexError> {
    let source = SourceIdentity::inspect(path, parser)?;
    info!(path = %source.path.display(), size = source.size, "Building index");

    let started = Instant::now();
    let mut reader = LineReader::open(&source.path, 0, options.read_buffer_bytes)?;

    let mut entries = Vec::new();
    let mut current: Option<NaiveDate> = None;
    let mut lines = 0u64;
    let mut unparsed = 0u64;
    let mut next_progress = options.progress_interval_bytes;

    while let Some(line) = reader.next_line()? {
        lines += 1;
        let line = line.to_log_line(parser);

        match line.date {
            Ok(date) => match current {
                Some(previous) if date == previous => {}
                Some(previous) if date < previous => {
                    return Err(IndexError::OutOfOrder {
                        date,
                        previous,
                        offset: line.start,
                    });
                }
                _ => {
                    debug!(date = %date, offset = line.start, "New date");
                    entries.push(IndexEntry {
                        date,
                        offset: line.start,
                    });
                    current = Some(date);
                }
            },
            Err(_) => unparsed += 1,
        }

        if options.progress_interval_bytes > 0 && line.end >= next_progress {
            debug!(
                offset = line.end,
                size = source.size,
                dates = entries.len(),
                "Indexing progress"
            );
            next_progress = line.end + options.progress_interval_bytes;
        }
    }

    if reader.offset() != source.size {
        return Err(IndexError::ChangedDuringBuild {
            expected: source.size,
            actual: reader.offset(),
        });
    }

    info!(
        dates = entries.len(),
        lines = lines,
        unparsed = unparsed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Index built"
    );

    Ok(Index { source, entries })
}

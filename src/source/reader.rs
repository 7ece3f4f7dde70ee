use crate::source::timestamp::{DateParseError, DateParser};
use chrono::NaiveDate;
use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_READ_BUFFER: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One newline-terminated record of the file: `[start, end)` covers the line
/// including its terminator (the final line of a file may lack one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLine {
    pub start: u64,
    pub end: u64,
    pub date: Result<NaiveDate, DateParseError>,
}

/// A line as read, borrowed from the reader's buffer until the next read.
#[derive(Debug)]
pub struct RawLine<'a> {
    pub start: u64,
    pub bytes: &'a [u8],
}

impl RawLine<'_> {
    pub fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    pub fn to_log_line(&self, parser: &DateParser) -> LogLine {
        LogLine {
            start: self.start,
            end: self.end(),
            date: parser.parse(self.bytes),
        }
    }
}

/// Sequential line reader that knows the byte offset of every line it yields.
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    line: Vec<u8>,
}

impl LineReader {
    /// Open `path` and position the reader at `start`, which must be a line
    /// start for the yielded lines to be whole records.
    pub fn open(path: &Path, start: u64, capacity: usize) -> Result<Self, ReaderError> {
        let file = File::open(path).map_err(|source| ReaderError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = BufReader::with_capacity(capacity.max(1), file);
        if start > 0 {
            reader.seek(SeekFrom::Start(start))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            offset: start,
            line: Vec::new(),
        })
    }

    /// Offset of the next line to be read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next line, or `None` at end of file.
    pub fn next_line(&mut self) -> Result<Option<RawLine<'_>>, ReaderError> {
        self.line.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.line)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        let start = self.offset;
        self.offset += bytes_read as u64;

        Ok(Some(RawLine {
            start,
            bytes: &self.line,
        }))
    }
}

// Platform-specific inode retrieval
#[cfg(unix)]
pub fn file_inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
pub fn file_inode(_metadata: &Metadata) -> u64 {
    // Size, mtime and the content digest carry the identity elsewhere
    0
}

//! Persisted date→offset index over a chronological log file.
//!
//! An [`Index`] is built once per file by [`builder::build_index`], written
//! and reloaded by [`store`], and consulted by [`resolve::resolve`] to turn a
//! date into the byte range holding that date's lines. The caller owns the
//! value for the lifetime of a run; there is no process-wide cache.

pub mod builder;
pub mod resolve;
pub mod store;

use crate::source::reader::{file_inode, ReaderError};
use crate::source::timestamp::DateParser;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

pub use builder::{build_index, BuildOptions};
pub use resolve::{resolve, ByteRange, Resolution};
pub use store::{LoadOutcome, StaleReason};

/// Bytes hashed from each end of the file for the content digest.
const DIGEST_SAMPLE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to inspect source file '{}': {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("source is not chronological: {date} at offset {offset} follows {previous}")]
    OutOfOrder {
        date: NaiveDate,
        previous: NaiveDate,
        offset: u64,
    },

    #[error("source changed while indexing: expected {expected} bytes, read {actual}")]
    ChangedDuringBuild { expected: u64, actual: u64 },

    #[error("failed to read index '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write index '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// First appearance of a date in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub date: NaiveDate,
    pub offset: u64,
}

/// Everything that must still hold for a persisted index to be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIdentity {
    pub path: PathBuf,
    pub size: u64,
    pub modified_ns: u128,
    pub inode: u64,
    /// SHA-256 over the first and last 64 KiB of the file.
    pub digest: String,
    /// Date parser the entries were produced with.
    pub parser: String,
}

impl SourceIdentity {
    /// Fingerprint the file at `path` as it is right now.
    pub fn inspect(path: &Path, parser: &DateParser) -> Result<Self, IndexError> {
        let source_err = |source| IndexError::Source {
            path: path.to_path_buf(),
            source,
        };

        let canonical = std::fs::canonicalize(path).map_err(source_err)?;
        let mut file = File::open(&canonical).map_err(source_err)?;
        let metadata = file.metadata().map_err(source_err)?;
        let size = metadata.len();

        let modified_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let digest = sample_digest(&mut file, size).map_err(source_err)?;

        Ok(Self {
            path: canonical,
            size,
            modified_ns,
            inode: file_inode(&metadata),
            digest,
            parser: parser.signature(),
        })
    }

    /// Name of the first field that differs from `current`, if any.
    pub fn mismatch(&self, current: &SourceIdentity) -> Option<&'static str> {
        if self.path != current.path {
            Some("path")
        } else if self.size != current.size {
            Some("size")
        } else if self.modified_ns != current.modified_ns {
            Some("modified_ns")
        } else if self.inode != current.inode {
            Some("inode")
        } else if self.digest != current.digest {
            Some("digest")
        } else if self.parser != current.parser {
            Some("parser")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub source: SourceIdentity,
    pub entries: Vec<IndexEntry>,
}

impl Index {
    pub fn file_size(&self) -> u64 {
        self.source.size
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.first().map(|e| e.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.last().map(|e| e.date)
    }

    /// Check that entries strictly increase in date and offset and that every
    /// offset lies inside the file.
    pub fn validate(&self) -> Result<(), String> {
        for pair in self.entries.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.date <= prev.date {
                return Err(format!("date {} does not follow {}", next.date, prev.date));
            }
            if next.offset <= prev.offset {
                return Err(format!(
                    "offset {} for {} does not follow {}",
                    next.offset, next.date, prev.offset
                ));
            }
        }

        if let Some(last) = self.entries.last() {
            if last.offset >= self.source.size {
                return Err(format!(
                    "offset {} for {} is past the end of a {}-byte file",
                    last.offset, last.date, self.source.size
                ));
            }
        }

        Ok(())
    }
}

fn sample_digest(file: &mut File, size: u64) -> io::Result<String> {
    let mut hasher = Sha256::new();

    let head = size.min(DIGEST_SAMPLE_BYTES);
    hash_span(file, 0, head, &mut hasher)?;

    let tail_start = size.saturating_sub(DIGEST_SAMPLE_BYTES).max(head);
    hash_span(file, tail_start, size - tail_start, &mut hasher)?;

    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_span(file: &mut File, start: u64, len: u64, hasher: &mut Sha256) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    hasher.update(&buf);
    Ok(())
}

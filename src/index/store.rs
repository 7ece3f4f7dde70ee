//! Plain-text persistence for [`Index`] values.
//!
//! The file starts with `# key: value` header lines describing the source
//! identity, followed by one `YYYY-MM-DD offset` entry per line in ascending
//! date order. Writes go to a temporary file in the same directory which is
//! then renamed over the destination, so a crash never leaves a truncated
//! index that could be mistaken for a valid one.

use super::{Index, IndexEntry, IndexError, SourceIdentity};
use crate::source::timestamp::parse_iso_date;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const FORMAT_HEADER: &str = "# logslice index v1";
const INDEX_EXTENSION: &str = "idx";

/// Result of looking for a reusable index.
#[derive(Debug)]
pub enum LoadOutcome {
    Ready(Index),
    Missing,
    Stale(StaleReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The file is not a well-formed index.
    Corrupt(String),
    /// Entries violate the ordering invariants.
    Unordered(String),
    /// The source file no longer matches the recorded identity.
    SourceChanged(&'static str),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Corrupt(detail) => write!(f, "corrupt index: {}", detail),
            StaleReason::Unordered(detail) => write!(f, "unordered index: {}", detail),
            StaleReason::SourceChanged(field) => write!(f, "source {} changed", field),
        }
    }
}

/// Where the index for `log_path` lives: `<file name>.idx` inside `dir`, or
/// next to the log file when no directory is configured.
pub fn index_path_for(log_path: &Path, dir: Option<&Path>) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "log".into());
    name.push(".");
    name.push(INDEX_EXTENSION);

    match dir {
        Some(dir) => dir.join(name),
        None => log_path.with_file_name(name),
    }
}

/// Load the index at `index_path` and check it against the current state of
/// its source file.
///
/// Only I/O failures on an existing index are errors; anything that makes the
/// index unusable is reported as [`LoadOutcome::Stale`] so the caller can
/// rebuild.
pub fn load(index_path: &Path, current: &SourceIdentity) -> Result<LoadOutcome, IndexError> {
    let text = match std::fs::read_to_string(index_path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %index_path.display(), "No index file");
            return Ok(LoadOutcome::Missing);
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Ok(LoadOutcome::Stale(StaleReason::Corrupt(
                "not valid UTF-8".to_string(),
            )));
        }
        Err(source) => {
            return Err(IndexError::Read {
                path: index_path.to_path_buf(),
                source,
            })
        }
    };

    let index = match decode(&text) {
        Ok(index) => index,
        Err(detail) => return Ok(LoadOutcome::Stale(StaleReason::Corrupt(detail))),
    };

    if let Err(detail) = index.validate() {
        return Ok(LoadOutcome::Stale(StaleReason::Unordered(detail)));
    }

    if let Some(field) = index.source.mismatch(current) {
        return Ok(LoadOutcome::Stale(StaleReason::SourceChanged(field)));
    }

    info!(
        path = %index_path.display(),
        dates = index.entries.len(),
        "Loaded index"
    );
    Ok(LoadOutcome::Ready(index))
}

/// Atomically replace the index at `index_path`.
pub fn save(index_path: &Path, index: &Index) -> Result<(), IndexError> {
    let write_err = |source| IndexError::Write {
        path: index_path.to_path_buf(),
        source,
    };

    let dir = match index_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(encode(index).as_bytes()).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(index_path).map_err(|e| write_err(e.error))?;

    info!(
        path = %index_path.display(),
        dates = index.entries.len(),
        "Saved index"
    );
    Ok(())
}

pub fn encode(index: &Index) -> String {
    let source = &index.source;
    let mut out = String::with_capacity(256 + index.entries.len() * 24);

    // Writing into a String cannot fail
    let _ = writeln!(out, "{}", FORMAT_HEADER);
    let _ = writeln!(out, "# source: {}", source.path.display());
    let _ = writeln!(out, "# size: {}", source.size);
    let _ = writeln!(out, "# modified_ns: {}", source.modified_ns);
    let _ = writeln!(out, "# inode: {}", source.inode);
    let _ = writeln!(out, "# digest: {}", source.digest);
    let _ = writeln!(out, "# parser: {}", source.parser);

    for entry in &index.entries {
        let _ = writeln!(out, "{} {}", entry.date.format("%Y-%m-%d"), entry.offset);
    }

    out
}

pub fn decode(text: &str) -> Result<Index, String> {
    let mut lines = text.lines().enumerate();

    match lines.next() {
        Some((_, FORMAT_HEADER)) => {}
        Some((_, other)) => return Err(format!("unknown format header '{}'", other)),
        None => return Err("empty index file".to_string()),
    }

    let mut path = None;
    let mut size = None;
    let mut modified_ns = None;
    let mut inode = None;
    let mut digest = None;
    let mut parser = None;
    let mut entries = Vec::new();

    for (number, line) in lines {
        let number = number + 1;

        if let Some(header) = line.strip_prefix("# ") {
            if !entries.is_empty() {
                return Err(format!("line {}: header after entries", number));
            }
            let (key, value) = header
                .split_once(": ")
                .ok_or_else(|| format!("line {}: malformed header", number))?;
            match key {
                "source" => path = Some(PathBuf::from(value)),
                "size" => size = Some(parse_number(value, number)?),
                "modified_ns" => {
                    modified_ns = Some(
                        value
                            .parse::<u128>()
                            .map_err(|_| format!("line {}: invalid modified_ns", number))?,
                    )
                }
                "inode" => inode = Some(parse_number(value, number)?),
                "digest" => digest = Some(value.to_string()),
                "parser" => parser = Some(value.to_string()),
                other => warn!(key = other, "Ignoring unknown index header"),
            }
            continue;
        }

        if line.is_empty() {
            continue;
        }

        let (date, offset) = line
            .split_once(' ')
            .ok_or_else(|| format!("line {}: expected '<date> <offset>'", number))?;
        let date = parse_iso_date(date).map_err(|e| format!("line {}: {}", number, e))?;
        let offset = parse_number(offset, number)?;
        entries.push(IndexEntry { date, offset });
    }

    let missing = |name: &str| format!("missing '{}' header", name);

    Ok(Index {
        source: SourceIdentity {
            path: path.ok_or_else(|| missing("source"))?,
            size: size.ok_or_else(|| missing("size"))?,
            modified_ns: modified_ns.ok_or_else(|| missing("modified_ns"))?,
            inode: inode.ok_or_else(|| missing("inode"))?,
            digest: digest.ok_or_else(|| missing("digest"))?,
            parser: parser.ok_or_else(|| missing("parser"))?,
        },
        entries,
    })
}

fn parse_number(value: &str, line: usize) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("line {}: invalid number '{}'", line, value))
}

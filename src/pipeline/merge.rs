use crate::pipeline::worker::ChunkOutput;
use chrono::NaiveDate;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("chunk outputs incomplete: expected chunk {expected}, found {found:?}")]
    MissingChunk {
        expected: usize,
        found: Option<usize>,
    },

    #[error("failed to assemble output '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to commit output '{}': {source}", path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    /// Final artifact, or `None` when nothing matched and no file was written.
    pub output: Option<PathBuf>,
    pub lines: u64,
    pub bytes: u64,
    pub chunks: usize,
}

/// `<dir>/output_<YYYY-MM-DD>.txt`
pub fn output_path_for(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("output_{}.txt", date.format("%Y-%m-%d")))
}

/// Concatenate chunk outputs in ordinal order and atomically move the result
/// to `output_path`.
///
/// `expected_chunks` is the number of chunks that were scheduled; every one of
/// them must be present. On any error the temporary result and all chunk parts
/// are removed and `output_path` is left untouched. When no line matched, no
/// artifact is written at all.
pub fn commit(
    mut parts: Vec<ChunkOutput>,
    expected_chunks: usize,
    output_path: &Path,
) -> Result<MergeSummary, MergeError> {
    parts.sort_by_key(|p| p.ordinal);

    for expected in 0..expected_chunks.max(parts.len()) {
        let found = parts.get(expected).map(|p| p.ordinal);
        if found != Some(expected) || expected >= expected_chunks {
            return Err(MergeError::MissingChunk { expected, found });
        }
    }

    let lines: u64 = parts.iter().map(|p| p.lines).sum();
    let bytes: u64 = parts.iter().map(|p| p.bytes).sum();

    if lines == 0 {
        info!(path = %output_path.display(), "No matching lines, output not written");
        return Ok(MergeSummary {
            output: None,
            lines,
            bytes,
            chunks: parts.len(),
        });
    }

    let write_err = |source| MergeError::Write {
        path: output_path.to_path_buf(),
        source,
    };

    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".logslice-out-")
        .tempfile_in(dir)
        .map_err(write_err)?;
    let mut writer = BufWriter::new(tmp);

    for part in &parts {
        let mut input = File::open(&part.part).map_err(write_err)?;
        let copied = io::copy(&mut input, &mut writer).map_err(write_err)?;
        debug!(chunk = part.ordinal, bytes = copied, "Merged chunk");
    }

    let tmp = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(output_path).map_err(|e| MergeError::Commit {
        path: output_path.to_path_buf(),
        source: e.error,
    })?;

    info!(
        path = %output_path.display(),
        lines = lines,
        bytes = bytes,
        "Output committed"
    );

    Ok(MergeSummary {
        output: Some(output_path.to_path_buf()),
        lines,
        bytes,
        chunks: parts.len(),
    })
}

//! Splitting a byte range into line-aligned chunks for parallel workers.
//!
//! Boundary snapping here is the only thing that keeps records whole: every
//! interior boundary is moved forward to the byte following a newline, so no
//! chunk starts or ends inside a line. Workers trust their chunk bounds and
//! never re-align them.

use crate::index::ByteRange;
use memchr::memchr;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SNAP_BUFFER_BYTES: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("failed to read '{}' while aligning chunk boundaries: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A line-aligned slice of the target range, owned by exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub ordinal: usize,
    pub range: ByteRange,
}

#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub parallelism: usize,
    /// Chunks smaller than this are not worth a worker of their own.
    pub min_chunk_bytes: u64,
    /// How far past a candidate boundary to look for a newline.
    pub boundary_scan_limit: u64,
}

/// Split `range` of the file at `path` into ordered, disjoint, line-aligned
/// chunks that cover it exactly.
pub fn plan_chunks(
    path: &Path,
    range: ByteRange,
    plan: &ChunkPlan,
) -> Result<Vec<Chunk>, ScheduleError> {
    let io_err = |source| ScheduleError::Io {
        path: path.to_path_buf(),
        source,
    };

    if chunk_count(range, plan) <= 1 {
        return Ok(whole_range(range));
    }

    let mut file = File::open(path).map_err(io_err)?;
    plan_chunks_in(&mut file, range, plan).map_err(io_err)
}

/// [`plan_chunks`] over any seekable reader.
pub fn plan_chunks_in<R: Read + Seek>(
    reader: &mut R,
    range: ByteRange,
    plan: &ChunkPlan,
) -> io::Result<Vec<Chunk>> {
    let count = chunk_count(range, plan);
    if count <= 1 {
        return Ok(whole_range(range));
    }

    let mut boundaries = vec![range.start];

    for i in 1..count {
        let candidate =
            range.start + (u128::from(range.len()) * i as u128 / count as u128) as u64;
        let previous = boundaries[boundaries.len() - 1];
        if candidate <= previous {
            continue;
        }

        match snap_to_line_start(reader, candidate, range.end, plan.boundary_scan_limit)? {
            Some(boundary) if boundary > previous && boundary < range.end => {
                boundaries.push(boundary);
            }
            Some(_) => {}
            None => {
                warn!(
                    candidate = candidate,
                    limit = plan.boundary_scan_limit,
                    "No line start within scan limit, merging chunk with its neighbour"
                );
            }
        }
    }
    boundaries.push(range.end);

    let chunks: Vec<Chunk> = boundaries
        .windows(2)
        .enumerate()
        .map(|(ordinal, pair)| Chunk {
            ordinal,
            range: ByteRange::new(pair[0], pair[1]),
        })
        .collect();

    debug!(
        requested = plan.parallelism,
        planned = chunks.len(),
        start = range.start,
        end = range.end,
        "Planned chunks"
    );
    Ok(chunks)
}

fn whole_range(range: ByteRange) -> Vec<Chunk> {
    if range.is_empty() {
        Vec::new()
    } else {
        vec![Chunk { ordinal: 0, range }]
    }
}

fn chunk_count(range: ByteRange, plan: &ChunkPlan) -> usize {
    if range.is_empty() {
        return 0;
    }
    let by_size = range.len().div_ceil(plan.min_chunk_bytes.max(1));
    (plan.parallelism.max(1) as u64).min(by_size).max(1) as usize
}

/// Find the first line start at or after `candidate`, looking no further than
/// `limit` bytes past it.
///
/// `candidate` must be greater than zero. A candidate that already follows a
/// newline is returned unchanged. Returns `Some(end)` when the only line start
/// left is the end of the range, and `None` when the limit runs out first.
pub fn snap_to_line_start<R: Read + Seek>(
    reader: &mut R,
    candidate: u64,
    end: u64,
    limit: u64,
) -> io::Result<Option<u64>> {
    debug_assert!(candidate > 0);

    // Start one byte early so a newline right before the candidate counts
    let mut pos = candidate - 1;
    let scan_end = end.min(candidate.saturating_add(limit));
    reader.seek(SeekFrom::Start(pos))?;

    let mut buf = vec![0u8; SNAP_BUFFER_BYTES.min(scan_end - pos).max(1) as usize];
    while pos < scan_end {
        let want = (scan_end - pos).min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            // File ended before the range did
            return Ok(Some(end));
        }
        if let Some(i) = memchr(b'\n', &buf[..n]) {
            return Ok(Some(pos + i as u64 + 1));
        }
        pos += n as u64;
    }

    if scan_end >= end {
        Ok(Some(end))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn plan(parallelism: usize) -> ChunkPlan {
        ChunkPlan {
            parallelism,
            min_chunk_bytes: 1,
            boundary_scan_limit: 1024 * 1024,
        }
    }

    /// Lines of varying width from a fixed linear congruential sequence.
    fn sample_file(lines: usize) -> Vec<u8> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut out = Vec::new();
        for n in 0..lines {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let width = (state >> 33) % 120;
            out.extend_from_slice(format!("2024-12-01 line {} ", n).as_bytes());
            out.extend(std::iter::repeat(b'x').take(width as usize));
            out.push(b'\n');
        }
        out
    }

    fn assert_partition(data: &[u8], range: ByteRange, chunks: &[Chunk]) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].range.start, range.start);
        assert_eq!(chunks[chunks.len() - 1].range.end, range.end);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert!(!chunk.range.is_empty(), "empty chunk {:?}", chunk);
            let start = chunk.range.start as usize;
            assert!(start == 0 || data[start - 1] == b'\n', "chunk {} starts mid-line", i);
        }

        for pair in chunks.windows(2) {
            assert_eq!(pair[0].range.end, pair[1].range.start);
        }
    }

    #[test]
    fn test_chunks_partition_whole_file() {
        let data = sample_file(500);
        let range = ByteRange::new(0, data.len() as u64);

        for parallelism in [1, 2, 3, 4, 7, 16, 64] {
            let chunks = plan_chunks_in(&mut Cursor::new(&data), range, &plan(parallelism)).unwrap();
            assert_partition(&data, range, &chunks);
            assert!(chunks.len() <= parallelism);
        }
    }

    #[test]
    fn test_chunks_partition_sub_range() {
        let data = sample_file(300);
        // Pick the start of line 40 and of line 250 as the range bounds
        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(data.iter().enumerate().filter(|(_, b)| **b == b'\n').map(|(i, _)| i + 1))
            .collect();
        let range = ByteRange::new(line_starts[40] as u64, line_starts[250] as u64);

        for parallelism in [2, 5, 8] {
            let chunks = plan_chunks_in(&mut Cursor::new(&data), range, &plan(parallelism)).unwrap();
            assert_partition(&data, range, &chunks);
        }
    }

    #[test]
    fn test_single_line_range_gives_one_chunk() {
        let data = b"2024-12-01 only line in range\n".to_vec();
        let range = ByteRange::new(0, data.len() as u64);

        let chunks = plan_chunks_in(&mut Cursor::new(&data), range, &plan(8)).unwrap();

        assert_eq!(chunks, vec![Chunk { ordinal: 0, range }]);
    }

    #[test]
    fn test_range_smaller_than_parallelism() {
        let data = b"a\nb\nc\n".to_vec();
        let range = ByteRange::new(0, 6);

        let chunks = plan_chunks_in(&mut Cursor::new(&data), range, &plan(32)).unwrap();

        assert_partition(&data, range, &chunks);
        assert!(chunks.len() <= 3);
    }

    #[test]
    fn test_min_chunk_bytes_limits_count() {
        let data = sample_file(200);
        let range = ByteRange::new(0, data.len() as u64);
        let plan = ChunkPlan {
            parallelism: 16,
            min_chunk_bytes: data.len() as u64 / 2 + 1,
            boundary_scan_limit: 1024,
        };

        let chunks = plan_chunks_in(&mut Cursor::new(&data), range, &plan).unwrap();

        assert_partition(&data, range, &chunks);
        assert!(chunks.len() <= 2);
    }

    #[test]
    fn test_empty_range() {
        let chunks = plan_chunks_in(&mut Cursor::new(b""), ByteRange::new(0, 0), &plan(4)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_long_line_exceeding_scan_limit_merges_chunks() {
        let mut data = b"2024-12-01 short\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(10_000));
        data.push(b'\n');
        data.extend_from_slice(b"2024-12-01 after\n");
        let range = ByteRange::new(0, data.len() as u64);
        let plan = ChunkPlan {
            parallelism: 4,
            min_chunk_bytes: 1,
            boundary_scan_limit: 16,
        };

        let chunks = plan_chunks_in(&mut Cursor::new(&data), range, &plan).unwrap();

        assert_partition(&data, range, &chunks);
        assert!(chunks.len() < 4);
    }

    #[test]
    fn test_snap_keeps_existing_line_start() {
        let data = b"aaaa\nbbbb\n";
        let snapped = snap_to_line_start(&mut Cursor::new(data), 5, 10, 100).unwrap();
        assert_eq!(snapped, Some(5));
    }

    #[test]
    fn test_snap_moves_forward_mid_line() {
        let data = b"aaaa\nbbbb\ncccc\n";
        let snapped = snap_to_line_start(&mut Cursor::new(data), 6, 15, 100).unwrap();
        assert_eq!(snapped, Some(10));
    }

    #[test]
    fn test_snap_reaches_range_end() {
        let data = b"aaaa\nbbbbbbbb\n";
        let snapped = snap_to_line_start(&mut Cursor::new(data), 7, 14, 100).unwrap();
        assert_eq!(snapped, Some(14));
    }

    #[test]
    fn test_snap_gives_up_at_limit() {
        let data = [b'x'; 200];
        let snapped = snap_to_line_start(&mut Cursor::new(&data[..]), 10, 200, 50).unwrap();
        assert_eq!(snapped, None);
    }

    #[test]
    fn test_plan_chunks_reads_file() {
        let data = sample_file(100);
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut temp_file, &data).unwrap();
        let range = ByteRange::new(0, data.len() as u64);

        let chunks = plan_chunks(temp_file.path(), range, &plan(4)).unwrap();

        assert_partition(&data, range, &chunks);
    }

    #[test]
    fn test_plan_chunks_missing_file() {
        let result = plan_chunks(
            Path::new("/nonexistent/app.log"),
            ByteRange::new(0, 1000),
            &plan(4),
        );
        assert!(matches!(result, Err(ScheduleError::Io { .. })));
    }
}

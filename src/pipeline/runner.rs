use crate::config::types::Config;
use crate::index::store::{self, LoadOutcome};
use crate::index::{
    build_index, resolve, BuildOptions, ByteRange, Index, IndexError, Resolution, SourceIdentity,
};
use crate::pipeline::channel::{create_channel, Sender};
use crate::pipeline::chunk::{plan_chunks, Chunk, ChunkPlan, ScheduleError};
use crate::pipeline::merge::{commit, output_path_for, MergeError};
use crate::pipeline::worker::{scan_chunk, ChunkOutput, WorkerContext, WorkerError};
use crate::source::reader::DEFAULT_READ_BUFFER;
use crate::source::timestamp::{parse_iso_date, DateParser, TimestampError};
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Rejected before any file is scanned.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("'{value}' is not a valid YYYY-MM-DD date")]
    MalformedDate { value: String },

    #[error("source file '{}' does not exist", .0.display())]
    SourceMissing(PathBuf),

    #[error("source '{}' is not a regular file", .0.display())]
    NotAFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("invalid timestamp settings: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("failed to create output directory '{}': {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker error: {0}")]
    ChunkIo(#[from] WorkerError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Lifecycle of one extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    IndexUnavailable,
    IndexReady,
    RangeResolved { found: bool },
    Scheduled { chunks: usize },
    Running { workers: usize },
    Merging,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::IndexUnavailable => write!(f, "index-unavailable"),
            JobState::IndexReady => write!(f, "index-ready"),
            JobState::RangeResolved { found: true } => write!(f, "range-resolved(found)"),
            JobState::RangeResolved { found: false } => write!(f, "range-resolved(not-found)"),
            JobState::Scheduled { chunks } => write!(f, "scheduled({} chunks)", chunks),
            JobState::Running { workers } => write!(f, "running({} workers)", workers),
            JobState::Merging => write!(f, "merging"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

struct Job {
    date: NaiveDate,
    state: JobState,
}

impl Job {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            state: JobState::IndexUnavailable,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug!(date = %self.date, from = %self.state, to = %next, "Job state changed");
        self.state = next;
    }
}

/// Everything one extraction needs, resolved from config and command line.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub log_path: PathBuf,
    pub date: NaiveDate,
    pub index_path: PathBuf,
    pub output_dir: PathBuf,
    pub parser: DateParser,
    pub workers: usize,
    pub min_chunk_bytes: u64,
    pub boundary_scan_limit: u64,
    pub read_buffer_bytes: usize,
    /// Ignore any persisted index and build a fresh one.
    pub rebuild_index: bool,
    pub build: BuildOptions,
}

impl ExtractRequest {
    pub fn from_config(
        config: &Config,
        log_path: PathBuf,
        date: NaiveDate,
    ) -> Result<Self, ExtractError> {
        let parser = DateParser::from_config(&config.timestamp)?;
        let read_buffer_bytes =
            usize::try_from(config.extract.read_buffer_bytes).unwrap_or(DEFAULT_READ_BUFFER);
        let index_path = store::index_path_for(&log_path, config.index.dir.as_deref());

        Ok(Self {
            log_path,
            date,
            index_path,
            output_dir: config.extract.output_dir.clone(),
            parser,
            workers: config.extract.workers,
            min_chunk_bytes: config.extract.min_chunk_bytes,
            boundary_scan_limit: config.extract.boundary_scan_limit,
            read_buffer_bytes,
            rebuild_index: false,
            build: BuildOptions {
                read_buffer_bytes,
                progress_interval_bytes: config.index.progress_interval_bytes,
            },
        })
    }

    fn chunk_plan(&self) -> ChunkPlan {
        ChunkPlan {
            parallelism: self.workers.max(1),
            min_chunk_bytes: self.min_chunk_bytes,
            boundary_scan_limit: self.boundary_scan_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub date: NaiveDate,
    pub range: ByteRange,
    pub chunks: usize,
    pub matched_lines: u64,
    pub bytes_written: u64,
    /// Lines inside the range that carried no parseable date.
    pub unparsed_lines: u64,
    /// `None` when nothing matched and no artifact was written.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Completed(ExtractionResult),
    /// The date has no entry in the index. Nothing was scanned or written.
    DateNotFound,
}

/// One chunk's result as sent back from a worker.
#[derive(Debug)]
struct ChunkReport {
    worker_id: usize,
    result: Result<ChunkOutput, WorkerError>,
}

pub fn parse_target_date(value: &str) -> Result<NaiveDate, InputError> {
    parse_iso_date(value).map_err(|_| InputError::MalformedDate {
        value: value.to_string(),
    })
}

/// Fail early when the source is absent or not a regular file.
pub fn check_source(path: &Path) -> Result<(), InputError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(InputError::NotAFile(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(InputError::SourceMissing(path.to_path_buf()))
        }
        // Anything else surfaces with context once the index inspects the file
        Err(_) => Ok(()),
    }
}

/// Load a reusable index for `log_path`, or build and persist a new one.
///
/// A missing, corrupt or stale index is rebuilt; `force_rebuild` skips the
/// load entirely.
pub async fn prepare_index(
    log_path: &Path,
    index_path: &Path,
    parser: &DateParser,
    options: &BuildOptions,
    force_rebuild: bool,
) -> Result<Index, ExtractError> {
    check_source(log_path)?;

    let log_path = log_path.to_path_buf();
    let index_path = index_path.to_path_buf();
    let parser = parser.clone();
    let options = options.clone();

    let index = tokio::task::spawn_blocking(move || {
        load_or_build(&log_path, &index_path, &parser, &options, force_rebuild)
    })
    .await??;

    Ok(index)
}

fn load_or_build(
    log_path: &Path,
    index_path: &Path,
    parser: &DateParser,
    options: &BuildOptions,
    force_rebuild: bool,
) -> Result<Index, IndexError> {
    if force_rebuild {
        info!(index = %index_path.display(), "Rebuilding index on request");
    } else {
        let current = SourceIdentity::inspect(log_path, parser)?;
        match store::load(index_path, &current)? {
            LoadOutcome::Ready(index) => return Ok(index),
            LoadOutcome::Missing => {
                info!(index = %index_path.display(), "No index found, building");
            }
            LoadOutcome::Stale(reason) => {
                warn!(index = %index_path.display(), reason = %reason, "Index is stale, rebuilding");
            }
        }
    }

    let index = build_index(log_path, parser, options)?;
    store::save(index_path, &index)?;
    Ok(index)
}

/// Extract every line dated `request.date` into
/// `<output_dir>/output_<date>.txt`.
pub async fn run_extraction(request: &ExtractRequest) -> Result<ExtractOutcome, ExtractError> {
    let mut job = Job::new(request.date);

    match drive(&mut job, request).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            job.advance(JobState::Failed);
            Err(e)
        }
    }
}

async fn drive(job: &mut Job, request: &ExtractRequest) -> Result<ExtractOutcome, ExtractError> {
    check_source(&request.log_path)?;

    let index = prepare_index(
        &request.log_path,
        &request.index_path,
        &request.parser,
        &request.build,
        request.rebuild_index,
    )
    .await?;
    job.advance(JobState::IndexReady);

    let range = match resolve(&index, request.date) {
        Resolution::Found(range) => range,
        Resolution::NotFound => {
            job.advance(JobState::RangeResolved { found: false });
            info!(date = %request.date, "Date not present in index");
            return Ok(ExtractOutcome::DateNotFound);
        }
    };
    job.advance(JobState::RangeResolved { found: true });
    info!(
        date = %request.date,
        start = range.start,
        end = range.end,
        bytes = range.len(),
        "Resolved date range"
    );

    std::fs::create_dir_all(&request.output_dir).map_err(|source| ExtractError::OutputDir {
        path: request.output_dir.clone(),
        source,
    })?;

    let source_path = index.source.path.clone();
    let plan = request.chunk_plan();
    let chunks = {
        let source_path = source_path.clone();
        tokio::task::spawn_blocking(move || plan_chunks(&source_path, range, &plan)).await??
    };
    let expected_chunks = chunks.len();
    job.advance(JobState::Scheduled {
        chunks: expected_chunks,
    });

    let ctx = Arc::new(WorkerContext {
        path: source_path,
        target: request.date,
        parser: request.parser.clone(),
        scratch_dir: request.output_dir.clone(),
        read_buffer_bytes: request.read_buffer_bytes,
        cancel: Arc::new(AtomicBool::new(false)),
    });
    let pool = request.workers.max(1).min(expected_chunks.max(1));
    job.advance(JobState::Running { workers: pool });

    let outputs = run_workers(ctx, chunks, pool).await?;
    let unparsed_lines: u64 = outputs.iter().map(|o| o.unparsed).sum();
    job.advance(JobState::Merging);

    let output_path = output_path_for(&request.output_dir, request.date);
    let summary =
        tokio::task::spawn_blocking(move || commit(outputs, expected_chunks, &output_path))
            .await??;
    job.advance(JobState::Completed);

    info!(
        date = %request.date,
        lines = summary.lines,
        bytes = summary.bytes,
        chunks = summary.chunks,
        "Extraction complete"
    );

    Ok(ExtractOutcome::Completed(ExtractionResult {
        date: request.date,
        range,
        chunks: summary.chunks,
        matched_lines: summary.lines,
        bytes_written: summary.bytes,
        unparsed_lines,
        output: summary.output,
    }))
}

/// Scan `chunks` on a fixed pool of blocking workers.
///
/// Returns only after every worker has finished. The first real failure
/// stops the remaining workers from taking new chunks and is returned; the
/// outputs of chunks that did complete are dropped, removing their files.
async fn run_workers(
    ctx: Arc<WorkerContext>,
    chunks: Vec<Chunk>,
    pool: usize,
) -> Result<Vec<ChunkOutput>, ExtractError> {
    let expected = chunks.len();
    let queue = Arc::new(Mutex::new(VecDeque::from(chunks)));
    let (tx, mut rx) = create_channel::<ChunkReport>(pool);

    let mut handles = Vec::with_capacity(pool);
    for worker_id in 0..pool {
        let ctx = ctx.clone();
        let queue = queue.clone();
        let tx = tx.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            worker_loop(worker_id, &ctx, &queue, &tx)
        }));
    }
    drop(tx);

    let mut outputs = Vec::with_capacity(expected);
    let mut failure: Option<WorkerError> = None;

    while let Some(report) = rx.recv().await {
        match report.result {
            Ok(output) => {
                debug!(
                    worker = report.worker_id,
                    chunk = output.ordinal,
                    lines = output.lines,
                    "Chunk finished"
                );
                outputs.push(output);
            }
            Err(e) if e.is_cancelled() => {
                debug!(worker = report.worker_id, "{}", e);
            }
            Err(e) => {
                ctx.cancel.store(true, Ordering::Relaxed);
                if failure.is_none() {
                    error!(worker = report.worker_id, error = %e, "Chunk failed, cancelling job");
                    failure = Some(e);
                } else {
                    debug!(worker = report.worker_id, error = %e, "Further chunk failure");
                }
            }
        }
    }

    // Barrier: nothing is merged or reported until every worker has exited
    let mut join_failure = None;
    for handle in handles {
        if let Err(e) = handle.await {
            ctx.cancel.store(true, Ordering::Relaxed);
            join_failure.get_or_insert(e);
        }
    }

    if let Some(e) = failure {
        return Err(e.into());
    }
    if let Some(e) = join_failure {
        return Err(e.into());
    }

    debug!(chunks = outputs.len(), expected = expected, "All workers joined");
    Ok(outputs)
}

fn worker_loop(
    worker_id: usize,
    ctx: &WorkerContext,
    queue: &Mutex<VecDeque<Chunk>>,
    tx: &Sender<ChunkReport>,
) {
    loop {
        if ctx.cancel.load(Ordering::Relaxed) {
            break;
        }

        let next = queue.lock().ok().and_then(|mut q| q.pop_front());
        let Some(chunk) = next else {
            break;
        };

        let result = scan_chunk(ctx, chunk);
        let failed = result.is_err();
        if tx.blocking_send(ChunkReport { worker_id, result }).is_err() || failed {
            break;
        }
    }
}

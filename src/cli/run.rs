use crate::config::{load_or_default, ConfigError};
use crate::index::store::index_path_for;
use crate::index::{BuildOptions, Index};
use crate::pipeline::{
    parse_target_date, prepare_index, run_extraction, ExtractError, ExtractOutcome,
    ExtractRequest, InputError,
};
use crate::source::reader::DEFAULT_READ_BUFFER;
use crate::source::timestamp::DateParser;
use clap::Args;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl From<InputError> for RunError {
    fn from(e: InputError) -> Self {
        RunError::Extract(e.into())
    }
}

/// How a command finished, as far as the exit code is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    DateNotFound,
}

impl CommandStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            CommandStatus::Success => 0,
            CommandStatus::DateNotFound => 2,
        }
    }
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Chronologically ordered log file
    pub log: PathBuf,

    /// Date to extract, as YYYY-MM-DD
    pub date: String,

    /// Index file to use instead of the configured location
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(long)]
    pub workers: Option<NonZeroUsize>,

    /// Directory for output_<date>.txt
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Ignore any existing index and build a new one
    #[arg(long)]
    pub rebuild_index: bool,
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Chronologically ordered log file
    pub log: PathBuf,

    /// Index file to write instead of the configured location
    #[arg(long)]
    pub index: Option<PathBuf>,
}

pub async fn extract(
    config_path: Option<&Path>,
    args: ExtractArgs,
) -> Result<CommandStatus, RunError> {
    // A bad date is rejected before anything is read
    let date = parse_target_date(&args.date)?;
    let config = load_or_default(config_path)?;

    let mut request = ExtractRequest::from_config(&config, args.log, date)?;
    if let Some(index) = args.index {
        request.index_path = index;
    }
    if let Some(workers) = args.workers {
        request.workers = workers.get();
    }
    if let Some(output_dir) = args.output_dir {
        request.output_dir = output_dir;
    }
    request.rebuild_index = args.rebuild_index;

    info!(
        log = %request.log_path.display(),
        date = %date,
        workers = request.workers,
        "Starting extraction"
    );

    match run_extraction(&request).await? {
        ExtractOutcome::Completed(result) => {
            match &result.output {
                Some(path) => println!(
                    "{}: {} lines ({} bytes) written to {}",
                    result.date,
                    result.matched_lines,
                    result.bytes_written,
                    path.display()
                ),
                None => println!("{}: no matching lines, nothing written", result.date),
            }
            Ok(CommandStatus::Success)
        }
        ExtractOutcome::DateNotFound => {
            eprintln!(
                "Date {} does not occur in {}",
                date,
                request.log_path.display()
            );
            Ok(CommandStatus::DateNotFound)
        }
    }
}

pub async fn index(config_path: Option<&Path>, args: IndexArgs) -> Result<CommandStatus, RunError> {
    let config = load_or_default(config_path)?;
    let parser = DateParser::from_config(&config.timestamp).map_err(ExtractError::from)?;
    let index_path = args
        .index
        .unwrap_or_else(|| index_path_for(&args.log, config.index.dir.as_deref()));
    let options = BuildOptions {
        read_buffer_bytes: usize::try_from(config.extract.read_buffer_bytes)
            .unwrap_or(DEFAULT_READ_BUFFER),
        progress_interval_bytes: config.index.progress_interval_bytes,
    };

    let index = prepare_index(&args.log, &index_path, &parser, &options, true).await?;

    print!("{}", describe_index(&index, &index_path));
    Ok(CommandStatus::Success)
}

fn describe_index(index: &Index, index_path: &Path) -> String {
    let span = match (index.first_date(), index.last_date()) {
        (Some(first), Some(last)) => format!("{} .. {}", first, last),
        _ => "none".to_string(),
    };

    format!(
        "Index:  {}\nSource: {} ({} bytes)\nDates:  {} ({})\n",
        index_path.display(),
        index.source.path.display(),
        index.file_size(),
        index.entries.len(),
        span
    )
}

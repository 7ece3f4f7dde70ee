pub mod channel;
pub mod chunk;
pub mod merge;
pub mod runner;
pub mod worker;

pub use channel::{create_channel, Receiver, Sender};
pub use chunk::{plan_chunks, Chunk, ChunkPlan, ScheduleError};
pub use merge::{commit, output_path_for, MergeError, MergeSummary};
pub use runner::{
    check_source, parse_target_date, prepare_index, run_extraction, ExtractError, ExtractOutcome,
    ExtractRequest, ExtractionResult, InputError, JobState,
};
pub use worker::{scan_chunk, ChunkOutput, WorkerContext, WorkerError};

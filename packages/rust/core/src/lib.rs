//! Generation pipeline and batch orchestration for paperpage.
//!
//! This crate ties source resolution, text extraction, author detection and
//! the content generator into one end-to-end run per request
//! ([`GenerationPipeline`]), and runs many requests under bounded concurrency
//! ([`BatchOrchestrator`]).

pub mod batch;
pub mod batch_input;
pub mod generator;
pub mod pipeline;
pub mod prompt;
mod record;
mod repair;

pub use batch::{
    BatchOrchestrator, BatchProgress, BatchSummary, GenerationJob, JobRunner, JobState,
    SilentBatchProgress,
};
pub use batch_input::{
    BatchPlan, BatchRow, FileSet, RowError, load_rows, parse_csv, rows_from_csv, validate_rows,
};
pub use generator::{ContentGenerator, OpenRouterGenerator};
pub use pipeline::{GenerationOutcome, GenerationPipeline, GenerationRequest};
pub use prompt::{DEFAULT_MAX_PROMPT_CHARS, PromptInput, build_prompt, prompt_hash};

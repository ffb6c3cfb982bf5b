pub mod consolidate;
pub mod context;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod repair;
pub mod retry;
pub mod sanitize;
pub mod schema;

pub use consolidate::{ChunkReport, ChunkStatus, Consolidator, ResultSet, Summary};
pub use context::PipelineContext;
pub use error::{ChunkError, PipelineError, RecordIssue};
pub use normalize::{normalize_record, normalize_records, parse_locale_number, RawRecord};
pub use pipeline::Pipeline;
pub use repair::{repair_truncated, Repair, RepairStrategy};
pub use retry::{run_chunk, ChunkOutcome, Recovery, RetryPolicy, Sleeper, TokioSleeper};
pub use sanitize::sanitize;
pub use schema::{records_schema, DEFAULT_INSTRUCTION};

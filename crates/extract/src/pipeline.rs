//! Document → chunks → records, one chunk at a time in source order.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cerebro_core::config::Config;
use cerebro_core::{CerebroError, Record};
use cerebro_ingest::{chunk_document, extract_text, Chunk, ChunkConfig, ExtractedDocument};
use cerebro_llm::{GenerationRequest, Generator};

use crate::consolidate::{ChunkReport, ChunkStatus, Consolidator, ResultSet};
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::normalize::normalize_records;
use crate::retry::{run_chunk, ChunkOutcome, Recovery, RetryPolicy};
use crate::schema::{records_schema, DEFAULT_INSTRUCTION};

/// Extraction pipeline for one document at a time.
pub struct Pipeline {
    ctx: PipelineContext,
    chunking: ChunkConfig,
    instruction: String,
    schema: Value,
    temperature: f32,
    max_tokens: u32,
    timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext, chunking: ChunkConfig) -> Self {
        Self {
            ctx,
            chunking,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            schema: records_schema(),
            temperature: 0.1,
            max_tokens: 8192,
            timeout: None,
        }
    }

    /// Build a pipeline from loaded configuration around an existing backend.
    pub fn from_config(config: &Config, generator: Arc<dyn Generator>) -> Result<Self, CerebroError> {
        let ctx = PipelineContext::new(generator, RetryPolicy::from(&config.pipeline));
        let mut pipeline = Self::new(ctx, ChunkConfig::from(&config.pipeline))
            .with_generation(config.llm.temperature, config.llm.max_tokens)
            .with_timeout(config.pipeline.timeout_secs.map(Duration::from_secs));
        if let Some(instruction) = config.pipeline.load_instruction()? {
            pipeline = pipeline.with_instruction(instruction);
        }
        Ok(pipeline)
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Overall deadline per document. Chunks not started in time are left
    /// unprocessed, exactly as on cancellation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Extract text from raw file bytes and process it. Failing to read the
    /// document is the only fatal error.
    pub async fn process_bytes(&self, bytes: &[u8], filename: &str) -> Result<ResultSet, PipelineError> {
        let doc = extract_text(bytes, filename)?;
        Ok(self.process_document(&doc).await)
    }

    /// Run every non-blank chunk of `doc` through generation, repair and
    /// normalization. Always returns a result set; chunk failures are
    /// reported in it.
    pub async fn process_document(&self, doc: &ExtractedDocument) -> ResultSet {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let blank_pages = doc.blank_pages().len();
        let mut chunks = chunk_document(doc, &self.chunking);
        let mut consolidator = Consolidator::new(&doc.filename, doc.page_count(), blank_pages);

        info!(
            document = %doc.filename,
            pages = doc.page_count(),
            blank_pages,
            chars = doc.total_chars(),
            chunks = chunks.len(),
            backend = self.ctx.generator.name(),
            "processing document"
        );

        while let Some(chunk) = chunks.next() {
            if chunk.is_blank() {
                debug!(chunk = %chunk.label, "skipping blank chunk");
                continue;
            }

            if self.should_stop(deadline) {
                let remaining = chunk.content_pages() + pending_pages(chunks.clone());
                warn!(chunk = %chunk.label, remaining_pages = remaining, "run stopped before chunk");
                consolidator.mark_cancelled(remaining);
                break;
            }

            let request = self.request_for(&chunk);
            let outcome = run_chunk(&self.ctx, &request, &chunk.label, deadline).await;
            let stopped = matches!(outcome, ChunkOutcome::Cancelled { .. });
            let (report, records) = report_outcome(&chunk, outcome);
            consolidator.push_chunk(report, records);

            if stopped {
                consolidator.mark_cancelled(pending_pages(chunks.clone()));
                break;
            }
        }

        let result = consolidator.finish();
        let s = &result.summary;
        info!(
            document = %result.document,
            records = s.records_recovered,
            dropped = s.records_dropped,
            succeeded = s.chunks_succeeded,
            partial = s.chunks_partial,
            exhausted = s.chunks_exhausted,
            cancelled = s.cancelled,
            "document processed"
        );
        result
    }

    fn should_stop(&self, deadline: Option<Instant>) -> bool {
        self.ctx.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn request_for(&self, chunk: &Chunk) -> GenerationRequest {
        GenerationRequest {
            instruction: self.instruction.clone(),
            content: format!("Technical document content ({}):\n{}", chunk.label, chunk.content),
            schema: Some(self.schema.clone()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Pages with text in the chunks not yet visited.
fn pending_pages(rest: impl Iterator<Item = Chunk>) -> usize {
    rest.map(|c| c.content_pages()).sum()
}

/// Turn a chunk's terminal state into its report and normalized records.
fn report_outcome(chunk: &Chunk, outcome: ChunkOutcome) -> (ChunkReport, Vec<Record>) {
    match outcome {
        ChunkOutcome::Succeeded { values, recovery, attempts } => {
            let status = match recovery {
                Recovery::Clean => ChunkStatus::Succeeded,
                Recovery::Repaired(_) => ChunkStatus::Partial,
            };
            let (records, dropped) = normalize_records(values, &chunk.label);
            let mut report = ChunkReport::new(chunk, status);
            report.recovery = Some(recovery);
            report.attempts = attempts;
            report.dropped_records = dropped;
            (report, records)
        }
        ChunkOutcome::Exhausted { attempts, error } => {
            let mut report = ChunkReport::new(chunk, ChunkStatus::Exhausted);
            report.attempts = attempts;
            report.error = Some(error.to_string());
            (report, Vec::new())
        }
        ChunkOutcome::Cancelled { attempts, error } => {
            let mut report = ChunkReport::new(chunk, ChunkStatus::Cancelled);
            report.attempts = attempts;
            report.error = error.map(|e| e.to_string());
            (report, Vec::new())
        }
    }
}

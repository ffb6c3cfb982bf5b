//! Per-chunk retry loop.
//!
//! Each attempt is classified from its finish reason and error text:
//! rate limits back off linearly, truncated or malformed output goes through
//! the sanitizer and truncation repair, and everything else waits a short
//! fixed delay. No wait follows the final attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cerebro_core::config::PipelineConfig;
use cerebro_llm::provider::looks_rate_limited;
use cerebro_llm::{generate_with_fallback, FinishReason, GenerationAttempt, GenerationRequest};

use crate::context::PipelineContext;
use crate::error::ChunkError;
use crate::repair::{repair_truncated, RepairStrategy, RECORDS_FIELD};
use crate::sanitize::sanitize;

/// How many times a chunk is tried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff unit for rate limits: attempt `i` (0-based) waits `(i + 1) * base`.
    pub rate_limit_base_delay: Duration,
    /// Wait after blocked, errored or unparseable attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following a failed attempt `attempt`.
    pub fn delay_after(&self, attempt: u32, error: &ChunkError) -> Duration {
        if error.is_rate_limit() {
            self.rate_limit_base_delay * (attempt + 1)
        } else {
            self.retry_delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            rate_limit_base_delay: Duration::from_millis(cfg.rate_limit_base_delay_ms),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }
}

/// Suspends the retry loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a successful attempt's payload was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "strategy")]
pub enum Recovery {
    /// The sanitized response parsed as-is.
    Clean,
    /// Truncation repair salvaged the leading records.
    Repaired(RepairStrategy),
}

/// Terminal state of one chunk's retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Succeeded {
        values: Vec<Value>,
        recovery: Recovery,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        error: ChunkError,
    },
    /// Stopped before the next attempt by cancellation or the deadline.
    Cancelled {
        attempts: u32,
        error: Option<ChunkError>,
    },
}

/// Run attempts against one chunk until it yields records, runs out of
/// attempts, or the run is cancelled.
pub async fn run_chunk(
    ctx: &PipelineContext,
    request: &GenerationRequest,
    label: &str,
    deadline: Option<Instant>,
) -> ChunkOutcome {
    let max_attempts = ctx.policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..max_attempts {
        if ctx.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(chunk = %label, attempt, "chunk stopped before attempt");
            return ChunkOutcome::Cancelled {
                attempts: attempt,
                error: last_error,
            };
        }

        let generated = generate_with_fallback(ctx.generator.as_ref(), request, attempt).await;
        match evaluate(&generated) {
            Ok((values, recovery)) => {
                if let Recovery::Repaired(strategy) = recovery {
                    warn!(chunk = %label, attempt, ?strategy, records = values.len(), "truncated response repaired");
                }
                info!(
                    chunk = %label,
                    attempt,
                    mode = ?generated.mode,
                    records = values.len(),
                    "chunk succeeded"
                );
                return ChunkOutcome::Succeeded {
                    values,
                    recovery,
                    attempts: attempt + 1,
                };
            }
            Err(error) => {
                let last = attempt + 1 == max_attempts;
                let delay = (!last).then(|| ctx.policy.delay_after(attempt, &error));
                warn!(
                    chunk = %label,
                    attempt,
                    finish_reason = ?generated.finish_reason,
                    %error,
                    delay_ms = delay.map(|d| d.as_millis() as u64),
                    "chunk attempt failed"
                );
                last_error = Some(error);
                if let Some(delay) = delay {
                    ctx.sleeper.sleep(delay).await;
                }
            }
        }
    }

    let error = last_error.unwrap_or_else(|| ChunkError::Generation("no attempt was made".into()));
    warn!(chunk = %label, attempts = max_attempts, %error, "chunk exhausted");
    ChunkOutcome::Exhausted {
        attempts: max_attempts,
        error,
    }
}

/// Classify one attempt and, when it carries text, pull the records array
/// out of it.
pub fn evaluate(attempt: &GenerationAttempt) -> Result<(Vec<Value>, Recovery), ChunkError> {
    let error_text = || {
        attempt
            .error
            .clone()
            .or_else(|| attempt.text.clone())
            .unwrap_or_default()
    };

    match attempt.finish_reason {
        FinishReason::RateLimited => return Err(ChunkError::RateLimited(error_text())),
        FinishReason::Blocked => return Err(ChunkError::Blocked),
        FinishReason::OtherError => {
            let text = error_text();
            return Err(if looks_rate_limited(&text) {
                ChunkError::RateLimited(text)
            } else {
                ChunkError::Generation(text)
            });
        }
        FinishReason::Complete | FinishReason::Truncated => {}
    }

    if !attempt.has_text() {
        return Err(ChunkError::Unparseable("empty response".into()));
    }
    let raw = attempt.text.as_deref().unwrap_or_default();

    let cleaned = sanitize(raw);
    let parse_error = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => return records_array(value).map(|values| (values, Recovery::Clean)),
        Err(e) => e.to_string(),
    };

    debug!(finish_reason = ?attempt.finish_reason, error = %parse_error, "sanitized response does not parse, repairing");
    let repaired = repair_truncated(&cleaned);
    let Some(strategy) = repaired.strategy else {
        return Err(ChunkError::Unparseable(parse_error));
    };
    let value = serde_json::from_str::<Value>(&repaired.text)
        .map_err(|e| ChunkError::Unparseable(e.to_string()))?;
    records_array(value).map(|values| (values, Recovery::Repaired(strategy)))
}

/// The records array of a payload: `{"records": [...]}` or a bare array.
fn records_array(value: Value) -> Result<Vec<Value>, ChunkError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove(RECORDS_FIELD) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ChunkError::Unparseable(format!("missing \"{RECORDS_FIELD}\" array"))),
        },
        _ => Err(ChunkError::Unparseable("payload is not an object or array".into())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use cerebro_llm::{GenerationResponse, Generator, LlmError, OutputMode};
    use serde_json::json;

    use super::*;

    struct Scripted {
        results: Mutex<VecDeque<Result<GenerationResponse, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(results: Vec<Result<GenerationResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(
            &self,
            _request: &GenerationRequest,
            _mode: OutputMode,
        ) -> Result<GenerationResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            self.results.lock().unwrap().pop_front().expect("script exhausted")
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            rate_limit_base_delay: Duration::from_millis(5_000),
            retry_delay: Duration::from_millis(1_000),
        }
    }

    fn context(gen: Arc<Scripted>) -> (PipelineContext, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let ctx = PipelineContext::new(gen, policy()).with_sleeper(sleeper.clone());
        (ctx, sleeper)
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            instruction: "extract".into(),
            content: "page text".into(),
            schema: Some(json!({"type": "object"})),
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    fn reply(text: &str, finish_reason: FinishReason) -> Result<GenerationResponse, LlmError> {
        Ok(GenerationResponse { text: Some(text.into()), finish_reason })
    }

    fn rate_limited() -> Result<GenerationResponse, LlmError> {
        Err(LlmError::RateLimited { retry_after_secs: 30, body: "quota exceeded".into() })
    }

    fn attempt(text: Option<&str>, finish_reason: FinishReason) -> GenerationAttempt {
        GenerationAttempt {
            attempt: 0,
            mode: OutputMode::Strict,
            text: text.map(String::from),
            finish_reason,
            error: None,
        }
    }

    #[tokio::test]
    async fn rate_limits_back_off_linearly_then_succeed() {
        let gen = Scripted::new(vec![
            rate_limited(),
            rate_limited(),
            reply(r#"{"records": [{"tipo_residuo": "A", "cantidad": 1}]}"#, FinishReason::Complete),
        ]);
        let (ctx, sleeper) = context(gen.clone());

        let outcome = run_chunk(&ctx, &request(), "p1", None).await;

        match outcome {
            ChunkOutcome::Succeeded { values, recovery, attempts } => {
                assert_eq!(values.len(), 1);
                assert_eq!(recovery, Recovery::Clean);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(
            *sleeper.0.lock().unwrap(),
            vec![Duration::from_millis(5_000), Duration::from_millis(10_000)]
        );
        // Rate limits never fall back to permissive mode.
        assert_eq!(*gen.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn blocked_every_time_exhausts_without_trailing_wait() {
        let blocked = || Ok(GenerationResponse { text: None, finish_reason: FinishReason::Blocked });
        let gen = Scripted::new(vec![blocked(), blocked(), blocked()]);
        let (ctx, sleeper) = context(gen);

        let outcome = run_chunk(&ctx, &request(), "p2", None).await;

        assert_eq!(
            outcome,
            ChunkOutcome::Exhausted { attempts: 3, error: ChunkError::Blocked }
        );
        assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_millis(1_000); 2]);
    }

    #[tokio::test]
    async fn truncated_response_is_repaired_without_retry() {
        let gen = Scripted::new(vec![reply(
            r#"{"records": [{"tipo_residuo": "A", "cantidad": 1}, {"tipo_residuo": "B", "cantidad": 2}, {"tipo_residuo": "C", "cant"#,
            FinishReason::Truncated,
        )]);
        let (ctx, sleeper) = context(gen.clone());

        let outcome = run_chunk(&ctx, &request(), "p1-2", None).await;

        let ChunkOutcome::Succeeded { values, recovery, attempts } = outcome else {
            panic!("expected success");
        };
        assert_eq!(values.len(), 2);
        assert_eq!(recovery, Recovery::Repaired(RepairStrategy::LastCompleteElement));
        assert_eq!(attempts, 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_then_clean() {
        let gen = Scripted::new(vec![
            reply("Lo siento, no encontré residuos.", FinishReason::Complete),
            reply("```json\n{\"records\": []}\n```", FinishReason::Complete),
        ]);
        let (ctx, sleeper) = context(gen);

        let outcome = run_chunk(&ctx, &request(), "p1", None).await;

        assert!(matches!(outcome, ChunkOutcome::Succeeded { attempts: 2, .. }));
        assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_millis(1_000)]);
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let gen = Scripted::new(Vec::new());
        let (ctx, _) = context(gen.clone());
        ctx.cancel();

        let outcome = run_chunk(&ctx, &request(), "p1", None).await;

        assert_eq!(outcome, ChunkOutcome::Cancelled { attempts: 0, error: None });
        assert_eq!(*gen.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn past_deadline_stops_the_loop() {
        let gen = Scripted::new(Vec::new());
        let (ctx, _) = context(gen);

        let outcome = run_chunk(&ctx, &request(), "p1", Some(Instant::now())).await;

        assert!(matches!(outcome, ChunkOutcome::Cancelled { attempts: 0, .. }));
    }

    #[test]
    fn evaluate_classification() {
        let err = evaluate(&attempt(None, FinishReason::Blocked)).unwrap_err();
        assert_eq!(err, ChunkError::Blocked);

        let mut failed = attempt(None, FinishReason::OtherError);
        failed.error = Some("API error: 400 RESOURCE_EXHAUSTED".into());
        assert!(evaluate(&failed).unwrap_err().is_rate_limit());

        failed.error = Some("API error: 500 internal".into());
        assert!(matches!(evaluate(&failed), Err(ChunkError::Generation(_))));

        let err = evaluate(&attempt(Some("  "), FinishReason::Complete)).unwrap_err();
        assert!(matches!(err, ChunkError::Unparseable(_)));
    }

    #[test]
    fn evaluate_requires_records_array() {
        let err = evaluate(&attempt(Some(r#"{"items": []}"#), FinishReason::Complete)).unwrap_err();
        assert!(matches!(err, ChunkError::Unparseable(_)));

        let (values, recovery) =
            evaluate(&attempt(Some(r#"[{"tipo_residuo": "A"}]"#), FinishReason::Complete)).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(recovery, Recovery::Clean);
    }

    #[test]
    fn truncated_flag_with_parseable_text_is_clean() {
        let (values, recovery) = evaluate(&attempt(
            Some(r#"{"records": [{"tipo_residuo": "A", "cantidad": 1}]}"#),
            FinishReason::Truncated,
        ))
        .unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(recovery, Recovery::Clean);
    }

    #[test]
    fn policy_delays() {
        let p = policy();
        let limited = ChunkError::RateLimited("429".into());
        assert_eq!(p.delay_after(0, &limited), Duration::from_millis(5_000));
        assert_eq!(p.delay_after(2, &limited), Duration::from_millis(15_000));
        assert_eq!(p.delay_after(2, &ChunkError::Blocked), Duration::from_millis(1_000));
    }
}

//! One request/response cycle, with the strict → permissive fallback chain.

use serde::Serialize;
use tracing::{debug, warn};

use crate::provider::{
    looks_rate_limited, FinishReason, GenerationRequest, Generator, LlmError, OutputMode,
};

/// Outcome of one attempt against the generation service for a chunk.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationAttempt {
    /// 0-based attempt index within the chunk's retry loop.
    pub attempt: u32,
    /// Mode of the call that produced this outcome.
    pub mode: OutputMode,
    /// Raw (possibly partial) response text.
    pub text: Option<String>,
    pub finish_reason: FinishReason,
    /// Error text when the call raised.
    pub error: Option<String>,
}

impl GenerationAttempt {
    fn from_error(attempt: u32, mode: OutputMode, err: &LlmError) -> Self {
        let finish_reason = if err.is_rate_limit() {
            FinishReason::RateLimited
        } else {
            FinishReason::OtherError
        };
        Self {
            attempt,
            mode,
            text: None,
            finish_reason,
            error: Some(err.to_string()),
        }
    }

    /// True when the service answered with text worth parsing.
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Run one attempt: strict mode first; if the strict call itself raises
/// (anything but a rate limit), degrade to permissive mode. Bad *output*
/// from a strict call is returned as-is for the sanitizer to deal with.
pub async fn generate_with_fallback(
    generator: &dyn Generator,
    request: &GenerationRequest,
    attempt: u32,
) -> GenerationAttempt {
    let strict_err = match generator.generate(request, OutputMode::Strict).await {
        Ok(resp) => return classified(attempt, OutputMode::Strict, resp.text, resp.finish_reason),
        Err(e) => e,
    };

    if strict_err.is_rate_limit() || request.schema.is_none() {
        return GenerationAttempt::from_error(attempt, OutputMode::Strict, &strict_err);
    }

    warn!(
        backend = generator.name(),
        attempt,
        error = %strict_err,
        "strict generation failed, retrying in permissive mode"
    );

    match generator.generate(request, OutputMode::Permissive).await {
        Ok(resp) => classified(attempt, OutputMode::Permissive, resp.text, resp.finish_reason),
        Err(e) => GenerationAttempt::from_error(attempt, OutputMode::Permissive, &e),
    }
}

fn classified(
    attempt: u32,
    mode: OutputMode,
    text: Option<String>,
    finish_reason: FinishReason,
) -> GenerationAttempt {
    // Some services put quota errors in the body of an otherwise normal reply.
    let finish_reason = match (&text, finish_reason) {
        (Some(t), FinishReason::OtherError) if looks_rate_limited(t) => FinishReason::RateLimited,
        (_, reason) => reason,
    };
    debug!(attempt, ?mode, ?finish_reason, chars = text.as_ref().map_or(0, |t| t.len()), "generation finished");
    GenerationAttempt {
        attempt,
        mode,
        text,
        finish_reason,
        error: None,
    }
}

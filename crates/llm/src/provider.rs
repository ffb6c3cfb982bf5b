use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One request to the generation service: an instruction, the chunk text,
/// and optionally the JSON schema the output should follow.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub instruction: String,
    pub content: String,
    /// JSON Schema (draft subset: type/properties/items/required/enum).
    pub schema: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// Instruction text for permissive mode: the schema travels inside the
    /// prompt instead of being enforced by the service.
    pub fn permissive_instruction(&self) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}\n\nReturn ONLY valid JSON matching this schema, no explanation:\n{}",
                self.instruction, schema
            ),
            None => format!("{}\n\nReturn ONLY valid JSON, no explanation.", self.instruction),
        }
    }
}

/// How strictly the service is asked to follow the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The service enforces the schema.
    Strict,
    /// The service is only asked for valid JSON.
    Permissive,
}

/// Why a generation call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Complete,
    /// Output-length cap reached; the text is cut off.
    Truncated,
    /// Content-safety block.
    Blocked,
    RateLimited,
    OtherError,
}

/// Raw outcome of a call that reached the service and got an answer.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Full text, or the first available fragment when the full text could
    /// not be assembled. `None` when the service returned no text at all.
    pub text: Option<String>,
    pub finish_reason: FinishReason,
}

/// Trait for generation backends — each service implements this.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation call in the given output mode.
    async fn generate(
        &self,
        request: &GenerationRequest,
        mode: OutputMode,
    ) -> Result<GenerationResponse, LlmError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} — {body}")]
    ApiError { status: u16, body: String },
    #[error("rate limited (retry after {retry_after_secs}s): {body}")]
    RateLimited { retry_after_secs: u64, body: String },
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Whether this error means the shared rate limit was hit, judged from
    /// the variant first and the raw error text second.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status: 429, .. } => true,
            other => looks_rate_limited(&other.to_string()),
        }
    }
}

/// Text heuristics for services that report quota errors without a 429.
pub fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["429", "rate limit", "ratelimit", "quota", "resource_exhausted", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn permissive_instruction_embeds_schema() {
        let req = GenerationRequest {
            instruction: "Extract waste records.".into(),
            content: String::new(),
            schema: Some(json!({"type": "object"})),
            temperature: 0.1,
            max_tokens: 100,
        };
        let text = req.permissive_instruction();
        assert!(text.starts_with("Extract waste records."));
        assert!(text.contains(r#"{"type":"object"}"#));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(LlmError::RateLimited { retry_after_secs: 1, body: String::new() }.is_rate_limit());
        assert!(LlmError::ApiError { status: 429, body: String::new() }.is_rate_limit());
        assert!(LlmError::ApiError {
            status: 400,
            body: "RESOURCE_EXHAUSTED: Quota exceeded".into()
        }
        .is_rate_limit());
        assert!(!LlmError::ApiError { status: 500, body: "internal".into() }.is_rate_limit());
        assert!(!LlmError::ParseError("bad json".into()).is_rate_limit());
    }
}

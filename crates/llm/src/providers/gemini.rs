use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{
    FinishReason, GenerationRequest, GenerationResponse, Generator, LlmError, OutputMode,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the request body for the Gemini generateContent API.
    fn build_request_body(request: &GenerationRequest, mode: OutputMode) -> Value {
        let instruction = match mode {
            OutputMode::Strict => request.instruction.clone(),
            OutputMode::Permissive => request.permissive_instruction(),
        };

        let mut generation_config = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
            "responseMimeType": "application/json",
        });
        if let (OutputMode::Strict, Some(schema)) = (mode, &request.schema) {
            generation_config["responseJsonSchema"] = schema.clone();
        }

        json!({
            "system_instruction": { "parts": [{ "text": instruction }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.content }],
            }],
            "generationConfig": generation_config,
        })
    }
}

/// Map a Gemini `finishReason` to our classification.
fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        None | Some("STOP") | Some("FINISH_REASON_UNSPECIFIED") => FinishReason::Complete,
        Some("MAX_TOKENS") => FinishReason::Truncated,
        Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY") => {
            FinishReason::Blocked
        }
        Some(_) => FinishReason::OtherError,
    }
}

/// Join every text part of the first candidate. Fails when any part lacks
/// text, which is what happens when a completion is cut mid-token.
fn full_text(resp: &Value) -> Result<String, LlmError> {
    let parts = resp["candidates"][0]["content"]["parts"]
        .as_array()
        .filter(|parts| !parts.is_empty())
        .ok_or_else(|| LlmError::ParseError("missing candidates[0].content.parts".into()))?;

    let mut text = String::new();
    for (i, part) in parts.iter().enumerate() {
        let fragment = part["text"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError(format!("part {i} has no text")))?;
        text.push_str(fragment);
    }
    Ok(text)
}

/// First text fragment found in any candidate, possibly partial.
fn first_fragment(resp: &Value) -> Option<String> {
    resp["candidates"]
        .as_array()?
        .iter()
        .filter_map(|c| c["content"]["parts"].as_array())
        .flatten()
        .find_map(|p| p["text"].as_str())
        .map(str::to_string)
}

/// Turn a decoded generateContent payload into a response.
fn parse_response(resp: &Value) -> GenerationResponse {
    if resp["promptFeedback"]["blockReason"].is_string() {
        return GenerationResponse {
            text: None,
            finish_reason: FinishReason::Blocked,
        };
    }

    let finish_reason = map_finish_reason(resp["candidates"][0]["finishReason"].as_str());
    let text = match full_text(resp) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(error = %e, "full text unavailable, falling back to first fragment");
            first_fragment(resp)
        }
    };

    // No candidate at all and no explicit reason: nothing usable came back.
    let finish_reason = if text.is_none() && finish_reason == FinishReason::Complete {
        FinishReason::OtherError
    } else {
        finish_reason
    };

    GenerationResponse { text, finish_reason }
}

#[async_trait]
impl Generator for GeminiProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
        mode: OutputMode,
    ) -> Result<GenerationResponse, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key,
        );

        let body = Self::build_request_body(request, mode);

        debug!(model = %self.model, ?mode, chars = request.content.len(), "Gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited {
                retry_after_secs: retry_after,
                body,
            });
        }
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let text = response.text().await?;
        let resp: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::ParseError(format!("generateContent body is not JSON: {e}")))?;
        Ok(parse_response(&resp))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            instruction: "You are a material scientist.".into(),
            content: "Aceite usado, 5 kg".into(),
            schema: Some(json!({"type": "object", "properties": {"records": {"type": "array"}}})),
            temperature: 0.1,
            max_tokens: 4096,
        }
    }

    #[test]
    fn strict_body_carries_schema() {
        let body = GeminiProvider::build_request_body(&request(), OutputMode::Strict);

        assert_eq!(
            body["system_instruction"]["parts"][0]["text"].as_str().unwrap(),
            "You are a material scientist.",
        );
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Aceite usado, 5 kg");

        let cfg = &body["generationConfig"];
        assert_eq!(cfg["responseMimeType"], "application/json");
        assert_eq!(cfg["responseJsonSchema"]["type"], "object");
        assert_eq!(cfg["maxOutputTokens"], 4096);
        let temp = cfg["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 1e-6, "temperature should be ~0.1, got {temp}");
    }

    #[test]
    fn permissive_body_has_no_schema() {
        let body = GeminiProvider::build_request_body(&request(), OutputMode::Permissive);
        assert!(body["generationConfig"].get("responseJsonSchema").is_none());
        let instruction = body["system_instruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(instruction.contains("valid JSON"));
        assert!(instruction.contains("\"records\""));
    }

    #[test]
    fn complete_response_joins_parts() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"records\":" }, { "text": "[]}" }] },
                "finishReason": "STOP"
            }]
        });
        let parsed = parse_response(&resp);
        assert_eq!(parsed.finish_reason, FinishReason::Complete);
        assert_eq!(parsed.text.as_deref(), Some("{\"records\":[]}"));
    }

    #[test]
    fn truncated_response_recovers_first_fragment() {
        // Second part was cut mid-token and carries no text.
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"records\": [{\"a\": 1}," }, { "thought": true }] },
                "finishReason": "MAX_TOKENS"
            }]
        });
        let parsed = parse_response(&resp);
        assert_eq!(parsed.finish_reason, FinishReason::Truncated);
        assert_eq!(parsed.text.as_deref(), Some("{\"records\": [{\"a\": 1},"));
    }

    #[test]
    fn truncated_without_content_has_no_text() {
        let resp = json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] });
        let parsed = parse_response(&resp);
        assert_eq!(parsed.finish_reason, FinishReason::Truncated);
        assert!(parsed.text.is_none());
    }

    #[test]
    fn prompt_block_is_blocked() {
        let resp = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let parsed = parse_response(&resp);
        assert_eq!(parsed.finish_reason, FinishReason::Blocked);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("SAFETY")), FinishReason::Blocked);
        assert_eq!(map_finish_reason(Some("RECITATION")), FinishReason::Blocked);
        assert_eq!(map_finish_reason(Some("MAX_TOKENS")), FinishReason::Truncated);
        assert_eq!(map_finish_reason(Some("MALFORMED_FUNCTION_CALL")), FinishReason::OtherError);
        assert_eq!(map_finish_reason(None), FinishReason::Complete);
    }

    // ── HTTP status mapping ─────────────────────────────────────

    /// Serve one canned HTTP response on a local port; returns the base URL.
    async fn stub_server(status_line: &'static str, extra_headers: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&received) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\n{extra_headers}content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len(),
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    /// Headers received and the body as long as its content-length says.
    fn request_complete(received: &[u8]) -> bool {
        let Some(split) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&received[..split]);
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        received.len() - (split + 4) >= content_length
    }

    fn provider(base_url: String) -> GeminiProvider {
        GeminiProvider::new("test-key".into(), "gemini-test".into(), Duration::from_secs(5))
            .with_base_url(base_url)
    }

    #[tokio::test]
    async fn status_429_is_rate_limited_with_retry_after() {
        let base = stub_server("429 Too Many Requests", "retry-after: 7\r\n", r#"{"error": "quota"}"#).await;
        let err = provider(base).generate(&request(), OutputMode::Strict).await.unwrap_err();
        match &err {
            LlmError::RateLimited { retry_after_secs, body } => {
                assert_eq!(*retry_after_secs, 7);
                assert!(body.contains("quota"));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn status_429_without_header_defaults_to_30s() {
        let base = stub_server("429 Too Many Requests", "", "slow down").await;
        let err = provider(base).generate(&request(), OutputMode::Strict).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 30, .. }));
    }

    #[tokio::test]
    async fn other_status_is_api_error() {
        let base = stub_server("500 Internal Server Error", "", "backend exploded").await;
        let err = provider(base).generate(&request(), OutputMode::Strict).await.unwrap_err();
        match err {
            LlmError::ApiError { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "backend exploded");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_success_body_is_parse_error() {
        let base = stub_server("200 OK", "", "<html>gateway</html>").await;
        let err = provider(base).generate(&request(), OutputMode::Strict).await.unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
        assert!(!err.is_rate_limit());
    }

    #[tokio::test]
    async fn success_body_is_parsed() {
        let base = stub_server(
            "200 OK",
            "",
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"records\": []}"}]}, "finishReason": "STOP"}]}"#,
        )
        .await;
        let resp = provider(base).generate(&request(), OutputMode::Strict).await.unwrap();
        assert_eq!(resp.finish_reason, FinishReason::Complete);
        assert_eq!(resp.text.as_deref(), Some(r#"{"records": []}"#));
    }

    #[test]
    fn empty_payload_is_other_error() {
        let parsed = parse_response(&json!({}));
        assert_eq!(parsed.finish_reason, FinishReason::OtherError);
        assert!(parsed.text.is_none());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::provider::{
    FinishReason, GenerationRequest, GenerationResponse, Generator, LlmError, OutputMode,
};

pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(url: String, model: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url,
            model,
        }
    }

    fn build_request_body(&self, request: &GenerationRequest, mode: OutputMode) -> Value {
        let (instruction, format) = match (mode, &request.schema) {
            (OutputMode::Strict, Some(schema)) => (request.instruction.clone(), schema.clone()),
            _ => (request.permissive_instruction(), json!("json")),
        };

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": instruction },
                { "role": "user", "content": request.content },
            ],
            "stream": false,
            "format": format,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        })
    }
}

fn parse_response(resp: &Value) -> GenerationResponse {
    let text = resp["message"]["content"].as_str().map(str::to_string);
    let finish_reason = match resp["done_reason"].as_str() {
        Some("length") => FinishReason::Truncated,
        _ if text.is_none() => FinishReason::OtherError,
        _ => FinishReason::Complete,
    };
    GenerationResponse { text, finish_reason }
}

#[async_trait]
impl Generator for OllamaProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
        mode: OutputMode,
    ) -> Result<GenerationResponse, LlmError> {
        let url = format!("{}/api/chat", self.url);
        let body = self.build_request_body(request, mode);

        debug!(url = %url, ?mode, "Ollama request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let resp: Value = response.json().await?;
        Ok(parse_response(&resp))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

pub mod gemini;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use cerebro_core::config::{LlmConfig, OllamaConfig};

use crate::provider::{Generator, LlmError};

/// Create the appropriate generation backend based on config.
pub fn create_generator(
    llm_config: &LlmConfig,
    ollama_config: &OllamaConfig,
) -> Result<Arc<dyn Generator>, LlmError> {
    let timeout = Duration::from_secs(llm_config.request_timeout_secs);
    match llm_config.provider.as_str() {
        "gemini" | "google" => {
            let api_key = llm_config
                .google_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("GOOGLE_API_KEY not set".into()))?;
            Ok(Arc::new(gemini::GeminiProvider::new(
                api_key.clone(),
                llm_config.gemini_model.clone(),
                timeout,
            )))
        }
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            ollama_config.url.clone(),
            ollama_config.model.clone(),
            timeout,
        ))),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CerebroError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CEREBRO_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CEREBRO_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            pipeline: PipelineConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CerebroError> {
        if !self.llm.is_configured() {
            return Err(CerebroError::Config(format!(
                "LLM provider '{}' is not configured (missing API key or unknown provider)",
                self.llm.provider
            )));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(CerebroError::Config("MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.pipeline.max_chunk_chars == 0 {
            return Err(CerebroError::Config("MAX_CHUNK_CHARS must be positive".into()));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  llm:         provider={}, model={}", self.llm.provider, self.llm.model_label(&self.ollama));
        tracing::info!("  ollama:      url={}", self.ollama.url);
        tracing::info!(
            "  pipeline:    pages_per_chunk={}, max_attempts={}, rate_limit_base_delay_ms={}",
            self.pipeline.pages_per_chunk,
            self.pipeline.max_attempts,
            self.pipeline.rate_limit_base_delay_ms
        );
    }
}

// ── LLM (Gemini / Ollama) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "gemini", "ollama"
    pub provider: String,
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "gemini"),
            google_api_key: profiled_env_opt(p, "GOOGLE_API_KEY"),
            gemini_model: profiled_env_or(p, "GEMINI_MODEL", "gemini-flash-latest"),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.1")
                .parse()
                .unwrap_or(0.1),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 8192),
            request_timeout_secs: profiled_env_u64(p, "LLM_REQUEST_TIMEOUT_SECS", 120),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "gemini" | "google" => self.google_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }

    fn model_label<'a>(&'a self, ollama: &'a OllamaConfig) -> &'a str {
        match self.provider.as_str() {
            "ollama" => &ollama.model,
            _ => &self.gemini_model,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
        }
    }
}

// ── Extraction pipeline ───────────────────────────────────────

/// Smallest and largest accepted chunk granularity, in pages.
pub const MIN_PAGES_PER_CHUNK: usize = 1;
pub const MAX_PAGES_PER_CHUNK: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pages per chunk, clamped to 1..=4.
    pub pages_per_chunk: usize,
    /// Character budget for one chunk's text.
    pub max_chunk_chars: usize,
    /// Attempts per chunk before it is abandoned.
    pub max_attempts: u32,
    /// Linear backoff unit for rate-limited attempts.
    pub rate_limit_base_delay_ms: u64,
    /// Fixed wait after blocked/errored/unparseable attempts.
    pub retry_delay_ms: u64,
    /// Overall deadline for one document; `None` = unbounded.
    pub timeout_secs: Option<u64>,
    /// Optional file holding the extraction instruction text.
    pub instruction_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: 2,
            max_chunk_chars: 20_000,
            max_attempts: 3,
            rate_limit_base_delay_ms: 5_000,
            retry_delay_ms: 1_000,
            timeout_secs: None,
            instruction_file: None,
        }
    }
}

impl PipelineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        let pages = profiled_env_u32(p, "PAGES_PER_CHUNK", defaults.pages_per_chunk as u32) as usize;
        Self {
            pages_per_chunk: pages.clamp(MIN_PAGES_PER_CHUNK, MAX_PAGES_PER_CHUNK),
            max_chunk_chars: profiled_env_u32(p, "MAX_CHUNK_CHARS", defaults.max_chunk_chars as u32)
                as usize,
            max_attempts: profiled_env_u32(p, "MAX_ATTEMPTS", defaults.max_attempts),
            rate_limit_base_delay_ms: profiled_env_u64(
                p,
                "RATE_LIMIT_BASE_DELAY_MS",
                defaults.rate_limit_base_delay_ms,
            ),
            retry_delay_ms: profiled_env_u64(p, "RETRY_DELAY_MS", defaults.retry_delay_ms),
            timeout_secs: profiled_env_opt(p, "PIPELINE_TIMEOUT_SECS").and_then(|v| v.parse().ok()),
            instruction_file: profiled_env_opt(p, "EXTRACTION_INSTRUCTION_FILE").map(PathBuf::from),
        }
    }

    /// Read the instruction override, if one is configured.
    pub fn load_instruction(&self) -> Result<Option<String>, CerebroError> {
        let Some(path) = &self.instruction_file else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Err(CerebroError::Config(format!(
                "instruction file {} is empty",
                path.display()
            )));
        }
        Ok(Some(text))
    }
}

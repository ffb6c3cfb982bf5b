pub mod attempt;
pub mod provider;
pub mod providers;

pub use attempt::{generate_with_fallback, GenerationAttempt};
pub use provider::{
    FinishReason, GenerationRequest, GenerationResponse, Generator, LlmError, OutputMode,
};
pub use providers::create_generator;

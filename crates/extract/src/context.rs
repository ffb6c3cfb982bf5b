use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cerebro_llm::Generator;
use tracing::info;

use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// Everything a pipeline run shares across chunks: the generation backend,
/// the sleeper used for backoff, the retry policy and the cancel flag.
pub struct PipelineContext {
    pub generator: Arc<dyn Generator>,
    pub sleeper: Arc<dyn Sleeper>,
    pub policy: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(generator: Arc<dyn Generator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            sleeper: Arc::new(TokioSleeper),
            policy,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the sleeper (tests record delays instead of waiting).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Request cancellation. Takes effect before the next chunk or retry.
    pub fn cancel(&self) {
        info!("Pipeline cancellation requested");
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Get an Arc to the cancel flag (for signal handlers).
    pub fn cancel_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

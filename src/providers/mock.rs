/*!
 * Mock provider implementations for testing.
 *
 * This module provides a scriptable text generator that simulates different behaviors:
 * - `MockProvider::working()` - Echoes the instruction back
 * - `MockProvider::replying()` - Always answers with a fixed text
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::slow()` - Answers after a delay, honoring cancellation
 *
 * Every instruction received is recorded so tests can inspect prompts.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::providers::{Generation, TextGenerator};

/// Custom response generator
pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for cancellation testing)
    Slow { delay_ms: u64 },
}

/// Mock text generator for testing
pub struct MockProvider {
    name: String,
    behavior: MockBehavior,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    responder: Option<Responder>,
    /// Usage reported with every successful response
    usage: Option<(u64, u64)>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            responder: None,
            usage: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock provider that echoes instructions
    pub fn working(name: &str) -> Self {
        Self::new(name, MockBehavior::Working)
    }

    /// Create a mock provider that always answers `reply`
    pub fn replying(name: &str, reply: &str) -> Self {
        let reply = reply.to_string();
        Self::working(name).with_responder(move |_| reply.clone())
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(name: &str, fail_every: usize) -> Self {
        Self::new(name, MockBehavior::Intermittent { fail_every })
    }

    /// Create a failing mock provider that always errors
    pub fn failing(name: &str) -> Self {
        Self::new(name, MockBehavior::Failing)
    }

    /// Create a mock that returns empty responses
    pub fn empty(name: &str) -> Self {
        Self::new(name, MockBehavior::Empty)
    }

    /// Create a mock that answers after `delay_ms`
    pub fn slow(name: &str, delay_ms: u64) -> Self {
        Self::new(name, MockBehavior::Slow { delay_ms })
    }

    /// Set a custom response generator
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Report this usage with every successful response
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Some((prompt_tokens, completion_tokens));
        self
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every instruction received, in arrival order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn answer(&self, instruction: &str) -> Generation {
        let text = match &self.responder {
            Some(responder) => responder(instruction),
            None => format!("[{}] {}", self.name, instruction),
        };
        Generation {
            text,
            prompt_tokens: self.usage.map(|(p, _)| p),
            completion_tokens: self.usage.map(|(_, c)| c),
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            responder: self.responder.clone(),
            usage: self.usage,
            prompts: Arc::clone(&self.prompts),
        }
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("name", &self.name)
            .field("behavior", &self.behavior)
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl TextGenerator for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        instruction: &str,
    ) -> Result<Generation, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(instruction.to_string());

        match self.behavior {
            MockBehavior::Working => Ok(self.answer(instruction)),

            MockBehavior::Intermittent { fail_every } => {
                if fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(self.answer(instruction))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Empty => Ok(Generation::text("")),

            MockBehavior::Slow { delay_ms } => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        Err(ProviderError::RequestFailed("request cancelled".to_string()))
                    }
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                        Ok(self.answer(instruction))
                    }
                }
            }
        }
    }
}

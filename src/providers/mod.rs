/*!
 * Text-generation provider contract.
 *
 * Concrete backends (OpenAI, DeepSeek, Zhipu, Anthropic, local models) live
 * outside this crate. They plug in by implementing `TextGenerator` and being
 * registered under an identifier in a `ProviderRegistry`; the preparation
 * engine only ever sees the trait object.
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;

pub mod mock;

/// Text returned by a provider together with the usage it reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    /// The generated text
    pub text: String,
    /// Prompt tokens, when the provider reports them
    pub prompt_tokens: Option<u64>,
    /// Completion tokens, when the provider reports them
    pub completion_tokens: Option<u64>,
}

impl Generation {
    /// A generation without usage information.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: None,
            completion_tokens: None,
        }
    }

    /// Reported tokens, zero when the provider reported nothing.
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.unwrap_or(0) + self.completion_tokens.unwrap_or(0)
    }
}

/// Common trait for all text-generation providers
///
/// Implementations must honor the cancellation token for long requests;
/// callers additionally race every call against it.
#[async_trait]
pub trait TextGenerator: Send + Sync + Debug {
    /// Identifier used in logs and in `ContentAnalysis::analyzed_by`
    fn name(&self) -> &str;

    /// Send one instruction and return the provider's answer
    async fn generate(
        &self,
        cancel: &CancellationToken,
        instruction: &str,
    ) -> Result<Generation, ProviderError>;
}

/// Ordered set of providers addressable by identifier.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    order: Vec<String>,
    providers: HashMap<String, Arc<dyn TextGenerator>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, builder style.
    pub fn with(mut self, provider: Arc<dyn TextGenerator>) -> Self {
        self.register(provider.name().to_string(), provider);
        self
    }

    /// Register (or replace) a provider under `id`.
    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn TextGenerator>) {
        let id = id.into();
        if !self.providers.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.providers.insert(id, provider);
    }

    /// Look up a provider.
    pub fn get(&self, id: &str) -> Option<Arc<dyn TextGenerator>> {
        self.providers.get(id).cloned()
    }

    /// Registered identifiers in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Resolve a list of identifiers, failing on the first unknown one.
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<(String, Arc<dyn TextGenerator>)>, String> {
        ids.iter()
            .map(|id| {
                self.get(id)
                    .map(|p| (id.clone(), p))
                    .ok_or_else(|| format!("unknown provider '{}'", id))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

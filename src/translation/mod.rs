/*!
 * Book translation.
 *
 * - `Translator`: the base translation contract, one request per text unit
 * - `literary`: a `Translator` backed by any text generator
 * - `orchestrator`: whole-book translation conditioned on a preparation result
 */

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;

pub mod literary;
pub mod orchestrator;

pub use literary::GeneratorTranslator;
pub use orchestrator::{PreparationAwareTranslator, TermMatch, GENERIC_LITERARY_CONTEXT};

/// Base translation contract.
///
/// `context` carries guidance for the unit (chapter context, unit kind) and
/// is never itself translated.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    /// Translate one unit of text
    async fn translate(
        &self,
        cancel: &CancellationToken,
        text: &str,
        context: &str,
    ) -> Result<String, ProviderError>;
}

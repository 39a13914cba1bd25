/*!
 * Multi-pass content analysis run before translation.
 *
 * - `types`: the analysis schema and run configuration
 * - `prompts`: instructions sent to providers
 * - `parser`: structured-output extraction
 * - `consolidation`: merging the analyses of one pass
 * - `coordinator`: the pass state machine
 * - `persistence`: saving, loading and rendering results
 */

use log::debug;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::PreparationError;
use crate::providers::{Generation, TextGenerator};

pub mod consolidation;
pub mod coordinator;
pub mod parser;
pub mod persistence;
pub mod prompts;
pub mod types;

pub use consolidation::{Consolidated, Consolidator, MergeConsolidator, ModelConsolidator};
pub use coordinator::{PreparationCoordinator, PreparationState};
pub use persistence::{
    format_preparation_summary, load_preparation_result, save_preparation_result,
    translation_context,
};
pub use prompts::PreparationPromptBuilder;
pub use types::{
    Character, ChapterAnalysis, Complexity, ContentAnalysis, CulturalReference, DetailLevel,
    FootnoteGuidance, PreparationConfig, PreparationPass, PreparationResult, Priority,
    UntranslatableTerm,
};

/// One provider request raced against cancellation.
///
/// Transport failures are tagged with the provider identifier; a failure
/// observed after cancellation is reported as `Cancelled`.
pub(crate) async fn call_provider(
    cancel: &CancellationToken,
    provider_id: &str,
    provider: &dyn TextGenerator,
    instruction: &str,
) -> Result<Generation, PreparationError> {
    if cancel.is_cancelled() {
        return Err(PreparationError::Cancelled);
    }

    let started = Instant::now();
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PreparationError::Cancelled),
        result = provider.generate(cancel, instruction) => result,
    };

    match result {
        Ok(generation) => {
            debug!(
                "{} answered in {:.2}s ({} chars)",
                provider_id,
                started.elapsed().as_secs_f64(),
                generation.text.len()
            );
            Ok(generation)
        }
        Err(_) if cancel.is_cancelled() => Err(PreparationError::Cancelled),
        Err(source) => Err(PreparationError::Transport {
            provider: provider_id.to_string(),
            source,
        }),
    }
}

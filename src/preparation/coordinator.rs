/*!
 * Preparation engine.
 *
 * Runs the analysis passes in order. Every pass queries all configured
 * providers concurrently; several answers are consolidated into one, which
 * seeds the next pass's refinement prompt. After the last pass each chapter
 * is analyzed, with a bounded number of requests in flight.
 *
 * States: `NotStarted -> PassRunning(i) -> Consolidating(i) -> ChapterAnalyzing -> Complete`.
 * Any transport or parse failure aborts the run; nothing is retried here.
 */

use chrono::Utc;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::call_provider;
use super::consolidation::{Consolidator, ModelConsolidator};
use super::parser::{parse_analysis, parse_chapter_analysis};
use super::prompts::PreparationPromptBuilder;
use super::types::{
    ChapterAnalysis, ContentAnalysis, PreparationConfig, PreparationPass, PreparationResult,
};
use crate::book::Book;
use crate::errors::PreparationError;
use crate::providers::{ProviderRegistry, TextGenerator};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparationState {
    NotStarted,
    PassRunning(u32),
    Consolidating(u32),
    ChapterAnalyzing,
    Complete,
}

/// Result of one pass before it is recorded
struct PassOutcome {
    analysis: ContentAnalysis,
    record: PreparationPass,
}

/// Drives the multi-pass analysis of one book.
pub struct PreparationCoordinator {
    config: PreparationConfig,
    providers: Vec<(String, Arc<dyn TextGenerator>)>,
    consolidator: Arc<dyn Consolidator>,
    state: Mutex<PreparationState>,
}

impl PreparationCoordinator {
    /// Validate the configuration and resolve its providers.
    ///
    /// Consolidation defaults to asking the first configured provider.
    pub fn new(config: PreparationConfig, registry: &ProviderRegistry) -> Result<Self, PreparationError> {
        config.validate()?;
        let providers = registry
            .resolve(&config.providers)
            .map_err(PreparationError::Config)?;

        let (first_id, first) = providers
            .first()
            .ok_or_else(|| PreparationError::Config("no providers resolved".to_string()))?;
        let consolidator: Arc<dyn Consolidator> =
            Arc::new(ModelConsolidator::new(first_id.clone(), Arc::clone(first)));

        Ok(Self {
            config,
            providers,
            consolidator,
            state: Mutex::new(PreparationState::NotStarted),
        })
    }

    /// Replace the consolidation strategy.
    pub fn with_consolidator(mut self, consolidator: Arc<dyn Consolidator>) -> Self {
        self.consolidator = consolidator;
        self
    }

    pub fn config(&self) -> &PreparationConfig {
        &self.config
    }

    pub fn state(&self) -> PreparationState {
        *self.state.lock()
    }

    fn enter(&self, state: PreparationState) {
        debug!("Preparation state: {:?}", state);
        *self.state.lock() = state;
    }

    /// Run every pass, then chapter analysis, and assemble the result.
    pub async fn prepare_book(
        &self,
        cancel: &CancellationToken,
        book: &Book,
    ) -> Result<PreparationResult, PreparationError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let provider_ids: Vec<&str> = self.providers.iter().map(|(id, _)| id.as_str()).collect();

        info!(
            "Starting preparation: {} pass(es) with {} provider(s) [{}]",
            self.config.pass_count,
            self.providers.len(),
            provider_ids.join(", ")
        );

        let content = book.extract_text();
        let mut passes: Vec<PreparationPass> = Vec::with_capacity(self.config.pass_count as usize);
        let mut total_tokens = 0u64;
        let mut current: Option<ContentAnalysis> = None;

        for pass in 1..=self.config.pass_count {
            if cancel.is_cancelled() {
                return Err(PreparationError::Cancelled);
            }

            let outcome = self.run_pass(cancel, pass, &content, current.as_ref()).await?;
            info!(
                "Pass {}/{} complete ({:.2}s, {} tokens)",
                pass,
                self.config.pass_count,
                outcome.record.duration.as_secs_f64(),
                outcome.record.tokens_used
            );

            total_tokens += outcome.record.tokens_used;
            passes.push(outcome.record);
            current = Some(outcome.analysis);
        }

        let mut final_analysis = current.unwrap_or_default();

        if self.config.analyze_chapters {
            self.enter(PreparationState::ChapterAnalyzing);
            let (chapters, tokens) = self.analyze_chapters(cancel, book).await?;
            total_tokens += tokens;
            final_analysis.chapter_analyses.extend(chapters);
            final_analysis.dedup_chapter_analyses();
        } else {
            final_analysis.chapter_analyses.clear();
        }

        self.enter(PreparationState::Complete);
        let total_duration = started.elapsed();
        info!(
            "Preparation complete: {} pass(es) in {:.2}s, {} tokens",
            passes.len(),
            total_duration.as_secs_f64(),
            total_tokens
        );

        Ok(PreparationResult {
            source_language: self.config.source_language.clone(),
            target_language: self.config.target_language.clone(),
            passes,
            final_analysis,
            total_duration,
            total_tokens,
            pass_count: self.config.pass_count,
            started_at,
            completed_at: Utc::now(),
        })
    }

    async fn run_pass(
        &self,
        cancel: &CancellationToken,
        pass: u32,
        content: &str,
        previous: Option<&ContentAnalysis>,
    ) -> Result<PassOutcome, PreparationError> {
        self.enter(PreparationState::PassRunning(pass));
        let started = Instant::now();

        let prompts = PreparationPromptBuilder::from_config(&self.config, pass);
        let prompt = if pass == 1 {
            prompts.build_initial_analysis_prompt(content)
        } else {
            prompts.build_refinement_prompt(content, previous)
        };

        let requests = self.providers.iter().map(|(id, provider)| {
            let prompt = prompt.as_str();
            async move {
                let generation = call_provider(cancel, id, provider.as_ref(), prompt).await?;
                let mut analysis = parse_analysis(id, &generation.text)?;
                analysis.analysis_version = pass;
                analysis.analyzed_by = id.clone();
                analysis.analyzed_at = Some(Utc::now());
                Ok::<_, PreparationError>((analysis, generation.total_tokens()))
            }
        });
        let answers = try_join_all(requests).await?;

        let mut tokens: u64 = answers.iter().map(|(_, t)| t).sum();
        let providers: Vec<String> = answers.iter().map(|(a, _)| a.analyzed_by.clone()).collect();
        let mut analyses: Vec<ContentAnalysis> = answers.into_iter().map(|(a, _)| a).collect();

        let (mut analysis, consolidated_by, analyzed_by) = if analyses.len() > 1 {
            self.enter(PreparationState::Consolidating(pass));
            info!("Pass {}: consolidating {} analyses via {}", pass, analyses.len(), self.consolidator.name());
            let merged = self.consolidator.consolidate(cancel, &prompts, &analyses).await?;
            tokens += merged.tokens;
            (
                merged.analysis,
                self.consolidator.name().to_string(),
                format!("consensus({})", providers.join(",")),
            )
        } else {
            let single = analyses.pop().unwrap_or_default();
            let id = single.analyzed_by.clone();
            (single, id.clone(), id)
        };

        normalize(&mut analysis, pass, analyzed_by);

        Ok(PassOutcome {
            analysis,
            record: PreparationPass {
                pass_number: pass,
                providers,
                consolidated_by,
                duration: started.elapsed(),
                tokens_used: tokens,
            },
        })
    }

    /// Analyze every non-empty chapter with the first configured provider.
    async fn analyze_chapters(
        &self,
        cancel: &CancellationToken,
        book: &Book,
    ) -> Result<(Vec<ChapterAnalysis>, u64), PreparationError> {
        let Some((provider_id, provider)) = self.providers.first() else {
            return Ok((Vec::new(), 0));
        };
        let prompts = PreparationPromptBuilder::from_config(&self.config, self.config.pass_count);
        let limit = self.config.max_concurrent_chapters.max(1);

        let work: Vec<(usize, String)> = book
            .chapters
            .iter()
            .enumerate()
            .filter_map(|(i, chapter)| {
                let text = chapter.text();
                if text.trim().is_empty() {
                    debug!("Skipping empty chapter {}", i + 1);
                    None
                } else {
                    Some((i + 1, prompts.build_chapter_analysis_prompt(i + 1, &chapter.title, &text)))
                }
            })
            .collect();

        info!("Analyzing {} chapter(s), at most {} in flight", work.len(), limit);
        let started = Instant::now();

        let mut results: Vec<(ChapterAnalysis, u64)> = stream::iter(work)
            .map(|(num, prompt)| async move {
                let generation = call_provider(cancel, provider_id, provider.as_ref(), &prompt).await?;
                let analysis = parse_chapter_analysis(provider_id, num, &generation.text)?;
                debug!("Chapter {} analyzed", num);
                Ok::<_, PreparationError>((analysis, generation.total_tokens()))
            })
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        results.sort_by_key(|(chapter, _)| chapter.chapter_num);
        let tokens = results.iter().map(|(_, t)| t).sum();
        debug!("Chapter analysis finished in {:.2}s", started.elapsed().as_secs_f64());

        Ok((results.into_iter().map(|(c, _)| c).collect(), tokens))
    }
}

/// Invariants every pass result satisfies, whatever produced it.
fn normalize(analysis: &mut ContentAnalysis, pass: u32, analyzed_by: String) {
    analysis.dedup_untranslatable_terms();
    analysis.dedup_chapter_analyses();
    analysis.analysis_version = pass;
    analysis.analyzed_by = analyzed_by;
    if analysis.analyzed_at.is_none() {
        analysis.analyzed_at = Some(Utc::now());
    }
}

/*!
 * Consolidation of the per-provider analyses of one pass.
 *
 * The pass loop only sees the `Consolidator` trait. `ModelConsolidator` asks
 * a provider to merge the analyses; `MergeConsolidator` merges them locally
 * with field-level voting and gives the same answer for the same input.
 */

use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::call_provider;
use super::parser::parse_analysis;
use super::prompts::PreparationPromptBuilder;
use super::types::{
    fill_if_empty, term_key, union_into, Character, ContentAnalysis, CulturalReference,
    FootnoteGuidance, Priority,
};
use crate::errors::PreparationError;
use crate::providers::TextGenerator;

/// Result of merging one pass.
#[derive(Debug, Clone)]
pub struct Consolidated {
    pub analysis: ContentAnalysis,
    /// Tokens reported while consolidating
    pub tokens: u64,
}

/// Merges several analyses of the same pass into one.
#[async_trait]
pub trait Consolidator: Send + Sync {
    /// Identity recorded in the pass statistics
    fn name(&self) -> &str;

    async fn consolidate(
        &self,
        cancel: &CancellationToken,
        prompts: &PreparationPromptBuilder,
        analyses: &[ContentAnalysis],
    ) -> Result<Consolidated, PreparationError>;
}

/// Sends the consolidation prompt to a provider and parses its answer.
#[derive(Debug, Clone)]
pub struct ModelConsolidator {
    provider_id: String,
    provider: Arc<dyn TextGenerator>,
}

impl ModelConsolidator {
    pub fn new(provider_id: impl Into<String>, provider: Arc<dyn TextGenerator>) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider,
        }
    }
}

#[async_trait]
impl Consolidator for ModelConsolidator {
    fn name(&self) -> &str {
        &self.provider_id
    }

    async fn consolidate(
        &self,
        cancel: &CancellationToken,
        prompts: &PreparationPromptBuilder,
        analyses: &[ContentAnalysis],
    ) -> Result<Consolidated, PreparationError> {
        let prompt = prompts.build_consolidation_prompt(analyses);
        let generation = call_provider(cancel, &self.provider_id, self.provider.as_ref(), &prompt).await?;
        let analysis = parse_analysis(&self.provider_id, &generation.text)?;

        Ok(Consolidated {
            analysis,
            tokens: generation.total_tokens(),
        })
    }
}

/// Local merge with no model call.
///
/// Scalar fields take the value most analyses agree on (ties go to the
/// earliest analysis). Lists are unioned in order. Terms, footnotes,
/// characters and cultural references are merged by case-insensitive key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeConsolidator;

#[async_trait]
impl Consolidator for MergeConsolidator {
    fn name(&self) -> &str {
        "merge"
    }

    async fn consolidate(
        &self,
        _cancel: &CancellationToken,
        _prompts: &PreparationPromptBuilder,
        analyses: &[ContentAnalysis],
    ) -> Result<Consolidated, PreparationError> {
        debug!("Merging {} analyses locally", analyses.len());
        Ok(Consolidated {
            analysis: merge_analyses(analyses),
            tokens: 0,
        })
    }
}

/// Deterministic field-level merge of several analyses.
pub fn merge_analyses(analyses: &[ContentAnalysis]) -> ContentAnalysis {
    let mut merged = ContentAnalysis {
        content_type: vote(analyses.iter().map(|a| a.content_type.as_str())),
        genre: vote(analyses.iter().map(|a| a.genre.as_str())),
        tone: vote(analyses.iter().map(|a| a.tone.as_str())),
        language_style: vote(analyses.iter().map(|a| a.language_style.as_str())),
        target_audience: vote(analyses.iter().map(|a| a.target_audience.as_str())),
        ..Default::default()
    };

    for analysis in analyses {
        union_into(&mut merged.subgenres, &analysis.subgenres);
        union_into(&mut merged.key_themes, &analysis.key_themes);
        merged
            .untranslatable_terms
            .extend(analysis.untranslatable_terms.iter().cloned());
        merged
            .chapter_analyses
            .extend(analysis.chapter_analyses.iter().cloned());
    }
    merged.dedup_untranslatable_terms();
    merged.dedup_chapter_analyses();

    merged.footnote_guidance = merge_by_key(
        analyses.iter().flat_map(|a| a.footnote_guidance.iter().cloned()),
        |f: &FootnoteGuidance| term_key(&f.term),
        |existing: &mut FootnoteGuidance, other: FootnoteGuidance| {
            fill_if_empty(&mut existing.explanation, other.explanation);
            union_into(&mut existing.locations, &other.locations);
            if priority_rank(other.priority) > priority_rank(existing.priority) {
                existing.priority = other.priority;
            }
        },
    );

    merged.characters = merge_by_key(
        analyses.iter().flat_map(|a| a.characters.iter().cloned()),
        |c: &Character| term_key(&c.name),
        |existing: &mut Character, other: Character| {
            union_into(&mut existing.alternate_names, &other.alternate_names);
            union_into(&mut existing.key_traits, &other.key_traits);
            fill_if_empty(&mut existing.role, other.role);
            fill_if_empty(&mut existing.speech_pattern, other.speech_pattern);
            for (lang, name) in other.name_translation {
                existing.name_translation.entry(lang).or_insert(name);
            }
        },
    );

    merged.cultural_references = merge_by_key(
        analyses.iter().flat_map(|a| a.cultural_references.iter().cloned()),
        |r: &CulturalReference| term_key(&r.reference),
        |existing: &mut CulturalReference, other: CulturalReference| {
            fill_if_empty(&mut existing.origin, other.origin);
            fill_if_empty(&mut existing.explanation, other.explanation);
            fill_if_empty(&mut existing.handling, other.handling);
        },
    );

    merged
}

/// Most frequent non-blank value, compared case-insensitively. Ties go to
/// the value seen first; the first spelling seen is returned.
fn vote<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut tally: Vec<(String, &'a str, usize)> = Vec::new();

    for value in values {
        let key = term_key(value);
        if key.is_empty() {
            continue;
        }
        match tally.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => tally.push((key, value.trim(), 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (_, spelling, count) in &tally {
        if best.is_none_or(|(_, top)| *count > top) {
            best = Some((*spelling, *count));
        }
    }
    best.map(|(spelling, _)| spelling.to_string()).unwrap_or_default()
}

fn merge_by_key<T, K, M>(items: impl IntoIterator<Item = T>, key: K, merge: M) -> Vec<T>
where
    K: Fn(&T) -> String,
    M: Fn(&mut T, T),
{
    let mut merged: Vec<T> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        let k = key(&item);
        if k.is_empty() {
            continue;
        }
        match index.get(&k) {
            Some(&i) => merge(&mut merged[i], item),
            None => {
                index.insert(k, merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

fn priority_rank(priority: Priority) -> u8 {
    match priority {
        Priority::Low => 0,
        Priority::Medium => 1,
        Priority::High => 2,
    }
}

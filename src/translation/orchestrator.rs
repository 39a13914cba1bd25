/*!
 * Context-aware book translation.
 *
 * `PreparationAwareTranslator::translate_book` runs one whole-book pass:
 * source-language detection when none is configured, the preparation phase,
 * metadata, then every chapter depth-first with a chapter context built from
 * the analysis. The book is translated on a working copy and only replaced
 * when every unit succeeded.
 */

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Translator;
use crate::book::{Book, Chapter, Section};
use crate::errors::{PersistenceError, TranslationError};
use crate::events::{self, Event, EventPublisher, EventType};
use crate::language_utils::{Language, LanguageDetector};
use crate::preparation::{
    save_preparation_result, translation_context, Consolidator, PreparationConfig,
    PreparationCoordinator, PreparationResult,
};
use crate::providers::ProviderRegistry;

/// Chapter context used when no preparation result exists.
pub const GENERIC_LITERARY_CONTEXT: &str = "Treat this as literary text: preserve the author's style, \
     tone and imagery, keep proper names consistent, and render dialogue naturally.";

/// Characters of book text handed to the language detector
const LANGUAGE_SAMPLE_CHARS: usize = 2_000;

/// How a queried term is matched against the recorded untranslatable terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermMatch {
    /// The query equals a recorded term or is a case-sensitive substring of one
    #[default]
    Substring,
    /// Also matches when a recorded term is contained in the query
    Bidirectional,
}

impl TermMatch {
    pub fn matches(&self, query: &str, recorded: &str) -> bool {
        if query.is_empty() || recorded.is_empty() {
            return false;
        }
        match self {
            Self::Substring => recorded.contains(query),
            Self::Bidirectional => recorded.contains(query) || query.contains(recorded),
        }
    }
}

/// Translates whole books, optionally conditioned on a preparation run.
pub struct PreparationAwareTranslator {
    translator: Arc<dyn Translator>,
    detector: Option<Arc<dyn LanguageDetector>>,
    registry: ProviderRegistry,
    preparation: Option<PreparationConfig>,
    consolidator: Option<Arc<dyn Consolidator>>,
    source_language: String,
    target_language: String,
    term_match: TermMatch,
    chapter_workers: usize,
    result: Option<PreparationResult>,
}

impl PreparationAwareTranslator {
    /// Translator with no preparation, no detector and one chapter worker.
    pub fn new(translator: Arc<dyn Translator>, target_language: &str) -> Self {
        Self {
            translator,
            detector: None,
            registry: ProviderRegistry::new(),
            preparation: None,
            consolidator: None,
            source_language: String::new(),
            target_language: target_language.to_string(),
            term_match: TermMatch::default(),
            chapter_workers: 1,
            result: None,
        }
    }

    /// Enable the preparation phase with these providers.
    pub fn with_preparation(mut self, config: PreparationConfig, registry: ProviderRegistry) -> Self {
        self.preparation = Some(config);
        self.registry = registry;
        self
    }

    /// Use an existing analysis instead of running preparation.
    pub fn with_preparation_result(mut self, result: PreparationResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_consolidator(mut self, consolidator: Arc<dyn Consolidator>) -> Self {
        self.consolidator = Some(consolidator);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Source language code; empty means detect.
    pub fn with_source_language(mut self, code: &str) -> Self {
        self.source_language = code.trim().to_string();
        self
    }

    pub fn with_term_match(mut self, term_match: TermMatch) -> Self {
        self.term_match = term_match;
        self
    }

    /// Chapters translated concurrently (at least 1).
    pub fn with_chapter_workers(mut self, workers: usize) -> Self {
        self.chapter_workers = workers.max(1);
        self
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    /// Last completed (or supplied) preparation result.
    pub fn get_preparation_result(&self) -> Option<&PreparationResult> {
        self.result.as_ref()
    }

    /// Write the current preparation result to `path`.
    pub fn save_preparation_analysis<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        let result = self.result.as_ref().ok_or(PersistenceError::NoResult)?;
        save_preparation_result(result, path)
    }

    /// Whether `term` is covered by a recorded untranslatable term.
    /// Always false without a preparation result.
    pub fn is_untranslatable(&self, term: &str) -> bool {
        let Some(result) = &self.result else {
            return false;
        };
        if term.is_empty() {
            return false;
        }
        let analysis = &result.final_analysis;
        analysis.records_term(term)
            || analysis
                .untranslatable_terms
                .iter()
                .any(|recorded| self.term_match.matches(term, &recorded.term))
    }

    /// Guidance for every request of a chapter (1-based number).
    pub fn chapter_context(&self, chapter_num: usize) -> String {
        match &self.result {
            Some(result) => translation_context(&result.final_analysis, chapter_num),
            None => GENERIC_LITERARY_CONTEXT.to_string(),
        }
    }

    /// Translate `book` in place.
    ///
    /// On error the book is left exactly as it was. Detection and event
    /// delivery failures are logged and never abort the run.
    pub async fn translate_book(
        &mut self,
        cancel: &CancellationToken,
        book: &mut Book,
        publisher: &dyn EventPublisher,
        session_id: &str,
    ) -> Result<(), TranslationError> {
        let started = Instant::now();
        events::emit(
            publisher,
            Event::new(EventType::TranslationStarted, session_id, "Translation started")
                .with("chapters", book.chapters.len()),
        );

        let outcome = self.run(cancel, book, publisher, session_id).await;

        match &outcome {
            Ok(()) => {
                info!(
                    "Translated '{}' in {:.2}s",
                    book.metadata.title,
                    started.elapsed().as_secs_f64()
                );
                events::emit(
                    publisher,
                    Event::new(EventType::TranslationCompleted, session_id, "Translation completed")
                        .with("duration", started.elapsed().as_secs_f64()),
                );
            }
            Err(e) => events::emit_error(publisher, session_id, "Translation failed", e),
        }
        outcome
    }

    async fn run(
        &mut self,
        cancel: &CancellationToken,
        book: &mut Book,
        publisher: &dyn EventPublisher,
        session_id: &str,
    ) -> Result<(), TranslationError> {
        if self.source_language.is_empty() {
            self.source_language = self.detect_language(cancel, book, publisher, session_id).await?;
        }

        if let Some(config) = &self.preparation {
            let mut config = config.with_source_language(&self.source_language);
            config.target_language = self.target_language.clone();

            events::emit_progress(
                publisher,
                session_id,
                "Preparation phase started",
                [
                    ("phase", Value::from("preparation")),
                    ("pass_count", Value::from(config.pass_count)),
                ],
            );

            let mut coordinator = PreparationCoordinator::new(config, &self.registry)?;
            if let Some(consolidator) = &self.consolidator {
                coordinator = coordinator.with_consolidator(Arc::clone(consolidator));
            }
            let result = coordinator.prepare_book(cancel, book).await?;

            publish_preparation_summary(publisher, session_id, &result);
            self.result = Some(result);
        }

        let mut working = book.clone();
        self.translate_contents(cancel, &mut working, publisher, session_id).await?;
        working.metadata.language = self.target_language.clone();
        *book = working;
        Ok(())
    }

    /// Detect the source language; failure leaves it empty.
    async fn detect_language(
        &self,
        cancel: &CancellationToken,
        book: &Book,
        publisher: &dyn EventPublisher,
        session_id: &str,
    ) -> Result<String, TranslationError> {
        let Some(detector) = &self.detector else {
            warn!("No source language configured and no detector available");
            return Ok(String::new());
        };

        let sample = book.language_sample(LANGUAGE_SAMPLE_CHARS);
        let detected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TranslationError::Cancelled),
            detected = detector.detect(cancel, &sample) => detected,
        };

        match detected {
            Ok(language) => {
                info!("Detected source language: {} ({})", language.display_name(), language.code);
                Ok(language.code)
            }
            Err(_) if cancel.is_cancelled() => Err(TranslationError::Cancelled),
            Err(e) => {
                warn!("Language detection failed, continuing without a source language: {}", e);
                events::emit_error(publisher, session_id, "Language detection failed", &e);
                Ok(String::new())
            }
        }
    }

    async fn translate_contents(
        &self,
        cancel: &CancellationToken,
        book: &mut Book,
        publisher: &dyn EventPublisher,
        session_id: &str,
    ) -> Result<(), TranslationError> {
        let target = Language::from_code(&self.target_language);
        let target_name = if target.is_unset() { "the target language" } else { target.display_name() };

        if !book.metadata.title.is_empty() && !self.is_untranslatable(&book.metadata.title) {
            let context = format!("Book title - translate to {} while preserving literary style", target_name);
            book.metadata.title = self
                .translate_unit(cancel, &book.metadata.title, &context, "book title")
                .await?;
        }
        if !book.metadata.description.is_empty() {
            let mut context = format!("Book description - translate to {}, maintain literary tone", target_name);
            if let Some(result) = &self.result {
                let analysis = &result.final_analysis;
                context.push_str(&format!("\n\nBook style: {}, {}", analysis.content_type, analysis.tone));
            }
            book.metadata.description = self
                .translate_unit(cancel, &book.metadata.description, &context, "book description")
                .await?;
        }

        let total = book.chapters.len();
        info!("Translating {} chapter(s) with {} worker(s)", total, self.chapter_workers);

        stream::iter(book.chapters.iter_mut().enumerate())
            .map(|(i, chapter)| async move {
                let num = i + 1;
                let context = self.chapter_context(num);
                self.translate_chapter(cancel, chapter, num, &context).await?;

                events::emit_progress(
                    publisher,
                    session_id,
                    &format!("Chapter {}/{} translated", num, total),
                    [
                        ("phase", Value::from("translation")),
                        ("chapter", Value::from(num)),
                        ("total_chapters", Value::from(total)),
                    ],
                );
                Ok::<_, TranslationError>(())
            })
            .buffer_unordered(self.chapter_workers)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(())
    }

    async fn translate_chapter(
        &self,
        cancel: &CancellationToken,
        chapter: &mut Chapter,
        num: usize,
        context: &str,
    ) -> Result<(), TranslationError> {
        debug!("Translating chapter {}", num);

        if !chapter.title.is_empty() && !self.is_untranslatable(&chapter.title) {
            let title_context = format!("Chapter title\n\n{}", context);
            let unit = format!("chapter {} title", num);
            chapter.title = self.translate_unit(cancel, &chapter.title, &title_context, &unit).await?;
        }

        for (i, section) in chapter.sections.iter_mut().enumerate() {
            let path = format!("chapter {} section {}", num, i + 1);
            self.translate_section(cancel, section, context, path).await?;
        }
        Ok(())
    }

    /// Title, content, then subsections, depth-first.
    fn translate_section<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        section: &'a mut Section,
        context: &'a str,
        path: String,
    ) -> BoxFuture<'a, Result<(), TranslationError>> {
        async move {
            if !section.title.is_empty() && !self.is_untranslatable(&section.title) {
                let title_context = format!("Section title\n\n{}", context);
                let unit = format!("{} title", path);
                section.title = self.translate_unit(cancel, &section.title, &title_context, &unit).await?;
            }

            // Bodies are always translated; the chapter context lists the terms to keep
            if !section.content.is_empty() {
                let content_context = format!("Section content\n\n{}", context);
                section.content = self
                    .translate_unit(cancel, &section.content, &content_context, &path)
                    .await?;
            }

            for (i, sub) in section.subsections.iter_mut().enumerate() {
                let sub_path = format!("{}.{}", path, i + 1);
                self.translate_section(cancel, sub, context, sub_path).await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// One translator request raced against cancellation.
    async fn translate_unit(
        &self,
        cancel: &CancellationToken,
        text: &str,
        context: &str,
        unit: &str,
    ) -> Result<String, TranslationError> {
        if cancel.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TranslationError::Cancelled),
            result = self.translator.translate(cancel, text, context) => result,
        };

        match result {
            Ok(translated) => Ok(translated),
            Err(_) if cancel.is_cancelled() => Err(TranslationError::Cancelled),
            Err(source) => Err(TranslationError::Unit {
                unit: unit.to_string(),
                source,
            }),
        }
    }
}

fn publish_preparation_summary(publisher: &dyn EventPublisher, session_id: &str, result: &PreparationResult) {
    let analysis = &result.final_analysis;
    events::emit_progress(
        publisher,
        session_id,
        &format!(
            "Preparation complete: {} {} ({} untranslatable terms, {} characters)",
            analysis.genre,
            analysis.content_type,
            analysis.untranslatable_terms.len(),
            analysis.characters.len()
        ),
        [
            ("phase", Value::from("preparation_complete")),
            ("content_type", Value::from(analysis.content_type.as_str())),
            ("genre", Value::from(analysis.genre.as_str())),
            ("untranslatable", Value::from(analysis.untranslatable_terms.len())),
            ("footnotes", Value::from(analysis.footnote_guidance.len())),
            ("characters", Value::from(analysis.characters.len())),
            ("cultural_refs", Value::from(analysis.cultural_references.len())),
            ("chapters_analyzed", Value::from(analysis.chapter_analyses.len())),
            ("duration", Value::from(result.total_duration.as_secs_f64())),
        ],
    );
}

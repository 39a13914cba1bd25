/*!
 * End-to-end tests of context-aware book translation
 */

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use lektor::app_config::Config;
use lektor::errors::{PersistenceError, TranslationError};
use lektor::events::EventType;
use lektor::preparation::{PreparationConfig, load_preparation_result};
use lektor::providers::ProviderRegistry;
use lektor::providers::mock::MockProvider;
use lektor::translation::{GENERIC_LITERARY_CONTEXT, PreparationAwareTranslator};

use crate::common::mock_providers::{
    EchoTranslator, FailingTranslator, FixedDetector, Script, StuckTranslator, scripted_analyst,
};
use crate::common::{
    BrokenPublisher, RecordingPublisher, analysis_json, create_temp_dir, init_logging, sample_book,
    temp_file,
};

fn registry_with(terms: &[&str]) -> (ProviderRegistry, MockProvider) {
    let analyst = scripted_analyst("deepseek", Script::constant(analysis_json("satire", terms, &["evil"])));
    let registry = ProviderRegistry::new().with(Arc::new(analyst.clone()));
    (registry, analyst)
}

fn prep_config() -> PreparationConfig {
    PreparationConfig {
        pass_count: 2,
        providers: vec!["deepseek".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_translateBook_shouldKeepNonTranslatableMetadataIdentical() {
    init_logging();
    let echo = Arc::new(EchoTranslator::new());
    let mut translator = PreparationAwareTranslator::new(echo.clone(), "sr").with_source_language("ru");

    let original = sample_book();
    let mut book = original.clone();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s1")
        .await
        .unwrap();

    assert_eq!(book.metadata.authors, original.metadata.authors);
    assert_eq!(book.metadata.publisher, original.metadata.publisher);
    assert_eq!(book.metadata.isbn, original.metadata.isbn);
    assert_eq!(book.metadata.date, original.metadata.date);

    assert_eq!(book.metadata.title, format!("[sr] {}", original.metadata.title));
    assert_eq!(book.metadata.description, format!("[sr] {}", original.metadata.description));
    assert_eq!(book.metadata.language, "sr");

    // Depth-first through subsections
    let nested = &book.chapters[0].sections[1].subsections[0];
    assert_eq!(nested.content, "[sr] Аннушка уже разлила масло.");
    assert!(echo.calls().iter().all(|(text, _)| !text.is_empty()));
}

#[tokio::test]
async fn test_translateBook_withoutPreparation_shouldUseGenericContext() {
    let echo = Arc::new(EchoTranslator::new());
    let mut translator = PreparationAwareTranslator::new(echo.clone(), "sr").with_source_language("ru");

    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s1")
        .await
        .unwrap();

    assert!(translator.get_preparation_result().is_none());
    let context = echo.context_for("В белом плаще с кровавым подбоем вышел прокуратор Иудеи.").unwrap();
    assert_eq!(context, format!("Section content\n\n{}", GENERIC_LITERARY_CONTEXT));

    let title_context = echo.context_for("Мастер и Маргарита").unwrap();
    assert!(title_context.starts_with("Book title - translate to Serbian"));
}

#[tokio::test]
async fn test_translateBook_withPreparation_shouldInjectChapterContext() {
    let (registry, analyst) = registry_with(&["Воланд", "МАССОЛИТ"]);
    let echo = Arc::new(EchoTranslator::new());
    let mut translator = PreparationAwareTranslator::new(echo.clone(), "sr")
        .with_source_language("ru")
        .with_preparation(prep_config(), registry);

    let mut book = sample_book();
    let publisher = RecordingPublisher::new();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &publisher, "s2")
        .await
        .unwrap();

    // 2 passes + 2 chapters
    assert_eq!(analyst.request_count(), 4);

    let result = translator.get_preparation_result().unwrap();
    assert_eq!(result.final_analysis.analysis_version, 2);
    assert_eq!(result.source_language, "ru");
    assert_eq!(result.target_language, "sr");

    let context = echo.context_for("В белом плаще с кровавым подбоем вышел прокуратор Иудеи.").unwrap();
    assert!(context.starts_with("Section content\n\n## TRANSLATION CONTEXT"));
    assert!(context.contains("**Genre**: satire"));
    assert!(context.contains("- Woland (antagonist)"));
    assert!(context.contains("**Chapter 2 Context**"));
    assert!(context.contains("Chapter 2 according to deepseek"));
    assert!(!context.contains("Chapter 1 according to"));

    let chapter_title = echo.context_for("Понтий Пилат").unwrap();
    assert!(chapter_title.starts_with("Chapter title\n\n## TRANSLATION CONTEXT"));

    // The section titled with an untranslatable name is kept verbatim
    assert_eq!(book.chapters[0].sections[1].title, "Воланд");
    assert!(echo.context_for("Воланд").is_none());
    assert_eq!(book.chapters[0].sections[1].content, "[sr] Воланд улыбнулся.");
}

#[tokio::test]
async fn test_translateBook_shouldPublishCoarseProgress() {
    let (registry, _) = registry_with(&["Воланд"]);
    let mut translator = PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), "sr")
        .with_source_language("ru")
        .with_preparation(prep_config(), registry);

    let publisher = RecordingPublisher::new();
    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &publisher, "session-7")
        .await
        .unwrap();

    let events = publisher.events();
    assert_eq!(events.first().unwrap().event_type, EventType::TranslationStarted);
    assert_eq!(events.last().unwrap().event_type, EventType::TranslationCompleted);
    assert!(events.iter().all(|e| e.session_id == "session-7"));
    assert!(publisher.of_type(EventType::TranslationError).is_empty());

    let progress = publisher.of_type(EventType::TranslationProgress);
    let phases: Vec<&str> = progress.iter().filter_map(|e| e.data_str("phase")).collect();
    assert_eq!(phases.first(), Some(&"preparation"));
    assert_eq!(phases.iter().filter(|p| **p == "translation").count(), 2);

    let summary = progress
        .iter()
        .find(|e| e.data_str("phase") == Some("preparation_complete"))
        .unwrap();
    assert_eq!(summary.data_str("content_type"), Some("novel"));
    assert_eq!(summary.data_str("genre"), Some("satire"));
    assert_eq!(summary.data.get("untranslatable").and_then(|v| v.as_u64()), Some(1));
}

#[tokio::test]
async fn test_detectionFailure_shouldContinueWithEmptySourceLanguage() {
    let detector = Arc::new(FixedDetector::failing("detector offline"));
    let mut translator = PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), "sr")
        .with_detector(detector.clone());

    let publisher = RecordingPublisher::new();
    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &publisher, "s3")
        .await
        .unwrap();

    assert_eq!(detector.call_count(), 1);
    assert_eq!(translator.source_language(), "");
    assert_eq!(book.metadata.language, "sr");
    assert!(book.chapters[1].sections[0].content.starts_with("[sr] "));

    let errors = publisher.of_type(EventType::TranslationError);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].data_str("error").unwrap().contains("detector offline"));
    assert_eq!(publisher.of_type(EventType::TranslationCompleted).len(), 1);
}

#[tokio::test]
async fn test_detection_shouldPopulateSourceLanguageOnce() {
    let detector = Arc::new(FixedDetector::detecting("ru"));
    let (registry, analyst) = registry_with(&[]);
    let mut translator = PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), "sr")
        .with_detector(detector.clone())
        .with_preparation(prep_config(), registry);

    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s4")
        .await
        .unwrap();

    assert_eq!(translator.source_language(), "ru");
    assert_eq!(translator.get_preparation_result().unwrap().source_language, "ru");
    assert!(analyst.prompts()[0].contains("from Russian to Serbian"));

    // A configured language is not detected again
    let mut again = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut again, &RecordingPublisher::new(), "s5")
        .await
        .unwrap();
    assert_eq!(detector.call_count(), 1);
}

#[tokio::test]
async fn test_unitFailure_shouldAbortAndLeaveBookUnchanged() {
    let mut translator =
        PreparationAwareTranslator::new(Arc::new(FailingTranslator::failing_on(4)), "sr").with_source_language("ru");

    let original = sample_book();
    let mut book = original.clone();
    let publisher = RecordingPublisher::new();
    let err = translator
        .translate_book(&CancellationToken::new(), &mut book, &publisher, "s6")
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::Unit { .. }));
    assert_eq!(book, original);
    assert_eq!(publisher.of_type(EventType::TranslationError).len(), 1);
    assert!(publisher.of_type(EventType::TranslationCompleted).is_empty());
}

#[tokio::test]
async fn test_preparationFailure_shouldAbortBeforeTranslating() {
    let registry = ProviderRegistry::new().with(Arc::new(MockProvider::failing("deepseek")));
    let echo = Arc::new(EchoTranslator::new());
    let mut translator = PreparationAwareTranslator::new(echo.clone(), "sr")
        .with_source_language("ru")
        .with_preparation(prep_config(), registry);

    let original = sample_book();
    let mut book = original.clone();
    let err = translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s7")
        .await
        .unwrap_err();

    assert!(matches!(err, TranslationError::Preparation(_)));
    assert!(echo.calls().is_empty());
    assert_eq!(book, original);
    assert!(translator.get_preparation_result().is_none());
}

#[tokio::test]
async fn test_cancellation_shouldReportCancelledAndLeaveBookUnchanged() {
    let mut translator =
        PreparationAwareTranslator::new(Arc::new(StuckTranslator), "sr").with_source_language("ru");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let original = sample_book();
    let mut book = original.clone();
    let err = translator
        .translate_book(&cancel, &mut book, &RecordingPublisher::new(), "s8")
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(book, original);
}

#[tokio::test]
async fn test_brokenPublisher_shouldNotAbortTranslation() {
    let mut translator =
        PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), "sr").with_source_language("ru");

    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &BrokenPublisher, "s9")
        .await
        .unwrap();
    assert_eq!(book.metadata.language, "sr");
}

#[tokio::test]
async fn test_parallelChapterWorkers_shouldTranslateEveryChapter() {
    let mut translator = PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), "sr")
        .with_source_language("ru")
        .with_chapter_workers(4);

    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s10")
        .await
        .unwrap();

    assert_eq!(book.chapters[0].title, "[sr] Никогда не разговаривайте с неизвестными");
    assert_eq!(book.chapters[1].title, "[sr] Понтий Пилат");
}

#[tokio::test]
async fn test_savePreparationAnalysis_shouldRequireResultAndRoundTrip() {
    let (registry, _) = registry_with(&["Воланд"]);
    let mut translator = PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), "sr")
        .with_source_language("ru")
        .with_preparation(prep_config(), registry);

    let dir = create_temp_dir().unwrap();
    let path = temp_file(&dir, "out/analysis.json");

    let err = translator.save_preparation_analysis(&path).unwrap_err();
    assert!(matches!(err, PersistenceError::NoResult));

    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s11")
        .await
        .unwrap();

    translator.save_preparation_analysis(&path).unwrap();
    let loaded = load_preparation_result(&path).unwrap();
    assert_eq!(&loaded, translator.get_preparation_result().unwrap());
}

#[tokio::test]
async fn test_configure_shouldWireConfigIntoOrchestrator() {
    let mut config = Config::default();
    config.source_language = "ru".to_string();
    config.preparation.providers = vec!["deepseek".to_string()];
    config.preparation.pass_count = 1;
    config.preparation.analyze_chapters = false;
    config.translation.chapter_workers = 2;
    config.validate().unwrap();

    let (registry, analyst) = registry_with(&["Воланд"]);
    let translator = PreparationAwareTranslator::new(Arc::new(EchoTranslator::new()), &config.target_language);
    let mut translator = config.configure(translator, registry);

    let mut book = sample_book();
    translator
        .translate_book(&CancellationToken::new(), &mut book, &RecordingPublisher::new(), "s12")
        .await
        .unwrap();

    assert_eq!(analyst.request_count(), 1);
    let result = translator.get_preparation_result().unwrap();
    assert_eq!(result.pass_count, 1);
    assert!(result.final_analysis.chapter_analyses.is_empty());
    assert_eq!(book.chapters[0].sections[1].title, "Воланд");
}

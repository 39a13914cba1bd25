/*!
 * End-to-end tests of the multi-pass preparation engine
 */

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use lektor::errors::PreparationError;
use lektor::preparation::prompts::analysis_json;
use lektor::preparation::{
    ContentAnalysis, MergeConsolidator, PreparationConfig, PreparationCoordinator,
    PreparationState,
};
use lektor::providers::ProviderRegistry;
use lektor::providers::mock::MockProvider;

use crate::common::mock_providers::{PromptKind, Script, prompt_kind, scripted_analyst};
use crate::common::{analysis_json as provider_json, init_logging, sample_book};

fn config(pass_count: u32, providers: &[&str], analyze_chapters: bool) -> PreparationConfig {
    PreparationConfig {
        pass_count,
        providers: providers.iter().map(|p| p.to_string()).collect(),
        analyze_chapters,
        source_language: "ru".to_string(),
        target_language: "sr".to_string(),
        ..Default::default()
    }
}

/// Text between the refinement prompt's previous-analysis header and the content header
fn embedded_previous(prompt: &str) -> &str {
    let start = prompt.find("## PREVIOUS ANALYSIS (Pass #1):\n").unwrap();
    let body = &prompt[start..];
    let body = &body[body.find('\n').unwrap() + 1..];
    let end = body.find("\n\n## CONTENT TO ANALYZE:").unwrap();
    &body[..end]
}

#[tokio::test]
async fn test_twoPassTwoProviders_shouldConsolidateAndRefineWithoutDuplicates() {
    init_logging();

    let script_a = Script {
        initial: provider_json("satire", &["Woland", "MASSOLIT"], &["good and evil"]),
        refinement: provider_json("satire", &["Woland", "Behemoth"], &["power"]),
        // The merge answer repeats a term with different case
        consolidation: provider_json("fantastic satire", &["Woland", "woland", "MASSOLIT"], &["good and evil"]),
        chapter_num_override: None,
    };
    let script_b = Script::constant(provider_json("satire", &["WOLAND", "Torgsin"], &["cowardice"]));

    let a = scripted_analyst("a", script_a);
    let b = scripted_analyst("b", script_b);
    let registry = ProviderRegistry::new()
        .with(Arc::new(a.clone()))
        .with(Arc::new(b.clone()));

    let coordinator = PreparationCoordinator::new(config(2, &["a", "b"], true), &registry).unwrap();
    let result = coordinator.prepare_book(&CancellationToken::new(), &sample_book()).await.unwrap();

    // Pass records
    assert_eq!(result.pass_count, 2);
    assert_eq!(result.passes.len(), 2);
    for (i, pass) in result.passes.iter().enumerate() {
        assert_eq!(pass.pass_number, i as u32 + 1);
        assert_eq!(pass.providers, vec!["a", "b"]);
        assert_eq!(pass.consolidated_by, "a");
    }

    // Pass 2's refinement embeds pass 1's consolidated analysis verbatim
    let refinements: Vec<String> = a
        .prompts()
        .into_iter()
        .filter(|p| prompt_kind(p) == PromptKind::Refinement)
        .collect();
    assert_eq!(refinements.len(), 1);
    let embedded = embedded_previous(&refinements[0]);
    let previous: ContentAnalysis = serde_json::from_str(embedded).unwrap();
    assert_eq!(embedded, analysis_json(&previous));
    assert_eq!(previous.genre, "fantastic satire");
    assert_eq!(previous.analysis_version, 1);
    assert_eq!(previous.analyzed_by, "consensus(a,b)");
    assert_eq!(previous.untranslatable_terms.len(), 2);

    // b saw the same refinement prompt
    assert!(b.prompts().iter().any(|p| p == &refinements[0]));

    // Final analysis: no duplicate terms, tagged with the last pass
    let analysis = &result.final_analysis;
    assert_eq!(analysis.analysis_version, 2);
    assert_eq!(analysis.analyzed_by, "consensus(a,b)");
    let mut keys: Vec<String> = analysis
        .untranslatable_terms
        .iter()
        .map(|t| t.term.to_lowercase())
        .collect();
    let before = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), before);
    assert_eq!(analysis.untranslatable_terms[0].term, "Woland");

    // Chapters analyzed by the first provider only
    assert_eq!(analysis.chapter_analyses.len(), 2);
    assert_eq!(analysis.chapter_analyses[0].chapter_num, 1);
    assert_eq!(analysis.chapter_analyses[1].chapter_num, 2);
    assert!(analysis.chapter_analyses[1].summary.contains("according to a"));
    assert!(b.prompts().iter().all(|p| prompt_kind(p) != PromptKind::Chapter));

    // 2 passes x (2 answers + 1 consolidation) + 2 chapters, 15 tokens each
    assert_eq!(result.total_tokens, 8 * 15);
    assert_eq!(coordinator.state(), PreparationState::Complete);
}

#[tokio::test]
async fn test_singleProvider_shouldSkipConsolidation() {
    let a = scripted_analyst("solo", Script::constant(provider_json("satire", &["Woland"], &[])));
    let registry = ProviderRegistry::new().with(Arc::new(a.clone()));

    let coordinator = PreparationCoordinator::new(config(3, &["solo"], false), &registry).unwrap();
    let result = coordinator.prepare_book(&CancellationToken::new(), &sample_book()).await.unwrap();

    assert_eq!(a.request_count(), 3);
    assert!(a.prompts().iter().all(|p| prompt_kind(p) != PromptKind::Consolidation));
    assert_eq!(result.final_analysis.analysis_version, 3);
    assert_eq!(result.final_analysis.analyzed_by, "solo");
    assert_eq!(result.passes[2].consolidated_by, "solo");
}

#[tokio::test]
async fn test_chapterAnalysisDisabled_shouldLeaveNoChapterAnalyses() {
    // The provider volunteers chapter analyses in its whole-book answer
    let mut answer = provider_json("satire", &["Woland"], &[]);
    answer["chapter_analyses"] = json!([{ "chapter_num": 1, "summary": "unsolicited" }]);
    let a = scripted_analyst("a", Script::constant(answer));
    let registry = ProviderRegistry::new().with(Arc::new(a.clone()));

    for pass_count in [1, 2] {
        let coordinator = PreparationCoordinator::new(config(pass_count, &["a"], false), &registry).unwrap();
        let result = coordinator.prepare_book(&CancellationToken::new(), &sample_book()).await.unwrap();
        assert!(result.final_analysis.chapter_analyses.is_empty());
    }
    assert!(a.prompts().iter().all(|p| prompt_kind(p) != PromptKind::Chapter));
}

#[tokio::test]
async fn test_chapterAnalysis_shouldAttributeByRequestedNumber() {
    let script = Script {
        chapter_num_override: Some(99),
        ..Script::constant(provider_json("satire", &[], &[]))
    };
    let a = scripted_analyst("a", script);
    let registry = ProviderRegistry::new().with(Arc::new(a));

    let mut config = config(1, &["a"], true);
    config.max_concurrent_chapters = 1;
    let coordinator = PreparationCoordinator::new(config, &registry).unwrap();
    let result = coordinator.prepare_book(&CancellationToken::new(), &sample_book()).await.unwrap();

    let nums: Vec<usize> = result.final_analysis.chapter_analyses.iter().map(|c| c.chapter_num).collect();
    assert_eq!(nums, vec![1, 2]);
    assert_eq!(result.final_analysis.chapter_analyses[0].chapter_id, "chapter_99");
}

#[tokio::test]
async fn test_unparseableAnswer_shouldAbortRun() {
    let good = scripted_analyst("good", Script::constant(provider_json("satire", &[], &[])));
    let bad = MockProvider::replying("bad", "I could not analyze this book, sorry.");
    let registry = ProviderRegistry::new()
        .with(Arc::new(good))
        .with(Arc::new(bad));

    let coordinator = PreparationCoordinator::new(config(2, &["good", "bad"], true), &registry).unwrap();
    let err = coordinator
        .prepare_book(&CancellationToken::new(), &sample_book())
        .await
        .unwrap_err();

    assert!(matches!(err, PreparationError::Parse { ref provider, .. } if provider == "bad"));
    assert_eq!(coordinator.state(), PreparationState::PassRunning(1));
}

#[tokio::test]
async fn test_emptyAnalysis_shouldBeParseErrorNotDefault() {
    let blank = MockProvider::replying("blank", "{}");
    let registry = ProviderRegistry::new().with(Arc::new(blank));

    let coordinator = PreparationCoordinator::new(config(1, &["blank"], false), &registry).unwrap();
    let err = coordinator
        .prepare_book(&CancellationToken::new(), &sample_book())
        .await
        .unwrap_err();
    assert!(matches!(err, PreparationError::Parse { .. }));
}

#[tokio::test]
async fn test_transportFailure_shouldAbortRun() {
    let good = scripted_analyst("good", Script::constant(provider_json("satire", &[], &[])));
    let registry = ProviderRegistry::new()
        .with(Arc::new(good))
        .with(Arc::new(MockProvider::failing("down")));

    let coordinator = PreparationCoordinator::new(config(1, &["good", "down"], false), &registry).unwrap();
    let err = coordinator
        .prepare_book(&CancellationToken::new(), &sample_book())
        .await
        .unwrap_err();
    assert!(matches!(err, PreparationError::Transport { ref provider, .. } if provider == "down"));
}

#[tokio::test]
async fn test_invalidConfig_shouldFailBeforeAnyRequest() {
    let a = MockProvider::working("a");
    let registry = ProviderRegistry::new().with(Arc::new(a.clone()));

    assert!(matches!(
        PreparationCoordinator::new(config(0, &["a"], false), &registry),
        Err(PreparationError::Config(_))
    ));
    assert!(matches!(
        PreparationCoordinator::new(config(1, &[], false), &registry),
        Err(PreparationError::Config(_))
    ));
    assert_eq!(a.request_count(), 0);
}

#[tokio::test]
async fn test_cancellation_shouldAbandonSlowProviders() {
    let slow = MockProvider::slow("slow", 60_000);
    let registry = ProviderRegistry::new().with(Arc::new(slow));
    let coordinator = PreparationCoordinator::new(config(2, &["slow"], false), &registry).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = coordinator.prepare_book(&cancel, &sample_book()).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_mergeConsolidator_shouldReplaceModelConsolidation() {
    let a = scripted_analyst("a", Script::constant(provider_json("satire", &["Woland"], &["power"])));
    let b = scripted_analyst("b", Script::constant(provider_json("satire", &["woland", "Torgsin"], &["fear"])));
    let registry = ProviderRegistry::new()
        .with(Arc::new(a.clone()))
        .with(Arc::new(b));

    let coordinator = PreparationCoordinator::new(config(1, &["a", "b"], false), &registry)
        .unwrap()
        .with_consolidator(Arc::new(MergeConsolidator));
    let result = coordinator.prepare_book(&CancellationToken::new(), &sample_book()).await.unwrap();

    assert!(a.prompts().iter().all(|p| prompt_kind(p) != PromptKind::Consolidation));
    let terms: Vec<&str> = result
        .final_analysis
        .untranslatable_terms
        .iter()
        .map(|t| t.term.as_str())
        .collect();
    assert_eq!(terms, vec!["Woland", "Torgsin"]);
    assert_eq!(result.final_analysis.key_themes, vec!["power", "fear"]);
    assert_eq!(result.passes[0].consolidated_by, "merge");
    // Merging costs no tokens: two answers at 15 each
    assert_eq!(result.total_tokens, 30);
}

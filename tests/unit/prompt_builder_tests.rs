/*!
 * Tests for preparation prompt rendering and content truncation
 */

use lektor::preparation::prompts::{
    ANALYSIS_CONTENT_LIMIT, AnalysisSections, BOUNDARY_WINDOW, CHAPTER_CONTENT_LIMIT,
    TRUNCATION_MARKER, analysis_json, truncate_content,
};
use lektor::preparation::{
    ContentAnalysis, DetailLevel, PreparationConfig, PreparationPromptBuilder, UntranslatableTerm,
};

fn sentences(count: usize) -> String {
    (0..count).map(|i| format!("Sentence number {} ends here. ", i)).collect()
}

/// Truncation never exceeds the limit and ends on a boundary when one is close
#[test]
fn test_truncateContent_withLongInputs_shouldRespectLimitAndBoundaries() {
    let inputs = vec![
        sentences(1_000),
        "word ".repeat(5_000),
        format!("{}\n\n{}", "x".repeat(14_900), "y".repeat(500)),
        "ж".repeat(20_000),
        format!("{}.{}", "a".repeat(14_700), "b".repeat(1_000)),
    ];

    for input in inputs {
        let truncated = truncate_content(&input, ANALYSIS_CONTENT_LIMIT);
        let body = truncated.strip_suffix(TRUNCATION_MARKER).unwrap();
        let len = body.chars().count();

        assert!(len <= ANALYSIS_CONTENT_LIMIT, "body of {} chars", len);
        assert!(input.starts_with(body));

        let head: String = input.chars().take(ANALYSIS_CONTENT_LIMIT).collect();
        let window: String = head.chars().skip(ANALYSIS_CONTENT_LIMIT - BOUNDARY_WINDOW).collect();
        if window.contains('.') {
            assert!(body.ends_with('.'));
            assert!(len >= ANALYSIS_CONTENT_LIMIT - BOUNDARY_WINDOW);
        } else if window.contains("\n\n") {
            assert!(input[body.len()..].starts_with("\n\n"));
        } else {
            assert_eq!(len, ANALYSIS_CONTENT_LIMIT);
        }
    }
}

#[test]
fn test_truncateContent_withShortInput_shouldBorrowUnchanged() {
    let text = sentences(10);
    let out = truncate_content(&text, CHAPTER_CONTENT_LIMIT);
    assert_eq!(out, text.as_str());
    assert!(!out.contains(TRUNCATION_MARKER));
}

#[test]
fn test_truncateContent_withDistantPeriod_shouldHardCut() {
    let text = format!("Start.{}", "z".repeat(20_000));
    let out = truncate_content(&text, CHAPTER_CONTENT_LIMIT);
    let body = out.strip_suffix(TRUNCATION_MARKER).unwrap();
    assert_eq!(body.chars().count(), CHAPTER_CONTENT_LIMIT);
}

#[test]
fn test_initialPrompt_shouldTruncateBookAndRequestJsonOnly() {
    let builder = PreparationPromptBuilder::new("ru", "sr", 1);
    let prompt = builder.build_initial_analysis_prompt(&sentences(2_000));

    assert!(prompt.contains("from Russian to Serbian"));
    assert!(prompt.contains(TRUNCATION_MARKER));
    assert!(prompt.contains("\"untranslatable_terms\""));
    assert!(prompt.contains("{\"sr\": \"...\"}"));
    assert!(prompt.ends_with("Provide ONLY the JSON output, no additional text."));
}

#[test]
fn test_initialPrompt_withDisabledSections_shouldRenumberAndOmit() {
    let builder = PreparationPromptBuilder::new("ru", "sr", 1).with_sections(AnalysisSections {
        content_type: false,
        characters: true,
        terminology: false,
        culture: false,
    });
    let prompt = builder.build_initial_analysis_prompt("Text.");

    assert!(prompt.contains("### 1. CHARACTERS"));
    assert!(prompt.contains("### 2. KEY THEMES"));
    assert!(!prompt.contains("UNTRANSLATABLE TERMS"));
    assert!(!prompt.contains("\"cultural_references\""));
    assert!(!prompt.contains("\"content_type\""));
}

#[test]
fn test_fromConfig_shouldApplyTogglesAndDetailLevel() {
    let config = PreparationConfig {
        analyze_culture: false,
        detail_level: DetailLevel::Basic,
        source_language: "de".to_string(),
        target_language: "fr".to_string(),
        ..Default::default()
    };
    let builder = PreparationPromptBuilder::from_config(&config, 2);
    let prompt = builder.build_initial_analysis_prompt("Text.");

    assert_eq!(builder.pass_number(), 2);
    assert!(prompt.contains("from German to French"));
    assert!(prompt.contains("Keep the analysis brief"));
    assert!(!prompt.contains("CULTURAL REFERENCES"));
}

#[test]
fn test_refinementPrompt_withoutPrevious_shouldDegradeToInitial() {
    let builder = PreparationPromptBuilder::new("ru", "sr", 2);
    assert_eq!(
        builder.build_refinement_prompt("Text.", None),
        builder.build_initial_analysis_prompt("Text.")
    );
}

#[test]
fn test_refinementPrompt_shouldEmbedPreviousVerbatim() {
    let previous = ContentAnalysis {
        genre: "satire {content}".to_string(),
        untranslatable_terms: vec![UntranslatableTerm {
            term: "Woland".to_string(),
            ..Default::default()
        }],
        analysis_version: 1,
        ..Default::default()
    };
    let builder = PreparationPromptBuilder::new("ru", "sr", 2);
    let prompt = builder.build_refinement_prompt("Book {previous} text.", Some(&previous));

    assert!(prompt.contains("Pass #2"));
    assert!(prompt.contains("## PREVIOUS ANALYSIS (Pass #1):"));
    assert!(prompt.contains(&analysis_json(&previous)));
    assert!(prompt.contains("## CONTENT TO ANALYZE:\nBook {previous} text."));
    assert!(prompt.contains("not an unchanged copy"));
}

#[test]
fn test_chapterPrompt_shouldQuoteTitleAndBoundContent() {
    let builder = PreparationPromptBuilder::new("ru", "sr", 1);
    let prompt = builder.build_chapter_analysis_prompt(7, "The \"Bad\" Flat", &sentences(1_000));

    assert!(prompt.contains("You are analyzing Chapter 7"));
    assert!(prompt.contains("\"chapter_id\": \"chapter_7\""));
    assert!(prompt.contains("\"title\": \"The \\\"Bad\\\" Flat\""));
    assert!(prompt.contains(TRUNCATION_MARKER));
    assert!(prompt.contains("\"complexity\": \"simple|moderate|complex\""));
}

#[test]
fn test_consolidationPrompt_shouldListEveryAnalysisWithProvider() {
    let analyses: Vec<ContentAnalysis> = ["deepseek", "zhipu"]
        .iter()
        .map(|p| ContentAnalysis {
            genre: format!("genre by {}", p),
            analyzed_by: p.to_string(),
            analysis_version: 1,
            ..Default::default()
        })
        .collect();
    let prompt = PreparationPromptBuilder::new("ru", "sr", 1).build_consolidation_prompt(&analyses);

    assert!(prompt.contains("### Analysis from Pass #1 (Provider: deepseek):"));
    assert!(prompt.contains("### Analysis from Pass #1 (Provider: zhipu):"));
    assert!(prompt.contains("genre by zhipu"));
    assert!(prompt.contains("merge duplicate entries instead of dropping them"));
    assert!(prompt.contains("Include items that appear in ANY analysis"));
}

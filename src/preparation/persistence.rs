/*!
 * Saving, loading and rendering preparation results.
 */

use std::fmt::Write;
use std::fs;
use std::path::Path;

use super::types::{ContentAnalysis, PreparationResult, Priority};
use crate::errors::PersistenceError;

/// Untranslatable terms listed in a summary before eliding the rest
const SUMMARY_TERM_LIMIT: usize = 10;

/// Write a result as pretty-printed JSON, creating parent directories.
pub fn save_preparation_result<P: AsRef<Path>>(
    result: &PreparationResult,
    path: P,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)?;
    Ok(())
}

/// Read a result written by `save_preparation_result`.
pub fn load_preparation_result<P: AsRef<Path>>(path: P) -> Result<PreparationResult, PersistenceError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Human-readable report of a preparation run.
pub fn format_preparation_summary(result: &PreparationResult) -> String {
    let analysis = &result.final_analysis;
    let mut out = String::new();

    let _ = writeln!(out, "=== PREPARATION ANALYSIS SUMMARY ===\n");
    let _ = writeln!(
        out,
        "Languages: {} → {}",
        or_unknown(&result.source_language),
        or_unknown(&result.target_language)
    );
    let _ = writeln!(out, "Duration: {:.2} seconds", result.total_duration.as_secs_f64());
    let _ = writeln!(out, "Passes: {}", result.pass_count);
    let _ = writeln!(out, "Total Tokens: {}\n", result.total_tokens);

    let _ = writeln!(out, "--- CONTENT CLASSIFICATION ---");
    let _ = writeln!(out, "Type: {}", analysis.content_type);
    let _ = writeln!(out, "Genre: {}", analysis.genre);
    if !analysis.subgenres.is_empty() {
        let _ = writeln!(out, "Subgenres: {}", analysis.subgenres.join(", "));
    }
    let _ = writeln!(out, "Tone: {}", analysis.tone);
    let _ = writeln!(out, "Target Audience: {}\n", analysis.target_audience);

    let _ = writeln!(out, "--- KEY FINDINGS ---");
    let _ = writeln!(out, "Untranslatable Terms: {}", analysis.untranslatable_terms.len());
    let _ = writeln!(out, "Footnotes Needed: {}", analysis.footnote_guidance.len());
    let _ = writeln!(out, "Characters: {}", analysis.characters.len());
    let _ = writeln!(out, "Cultural References: {}", analysis.cultural_references.len());
    let _ = writeln!(out, "Key Themes: {}", analysis.key_themes.len());
    let _ = writeln!(out, "Chapters Analyzed: {}\n", analysis.chapter_analyses.len());

    if !analysis.key_themes.is_empty() {
        let _ = writeln!(out, "--- KEY THEMES ---");
        for theme in &analysis.key_themes {
            let _ = writeln!(out, "• {}", theme);
        }
        out.push('\n');
    }

    if !analysis.untranslatable_terms.is_empty() {
        let _ = writeln!(out, "--- UNTRANSLATABLE TERMS (showing first {}) ---", SUMMARY_TERM_LIMIT);
        for term in analysis.untranslatable_terms.iter().take(SUMMARY_TERM_LIMIT) {
            let _ = writeln!(out, "• {}: {}", term.term, term.reason);
        }
        let hidden = analysis.untranslatable_terms.len().saturating_sub(SUMMARY_TERM_LIMIT);
        if hidden > 0 {
            let _ = writeln!(out, "  ... and {} more", hidden);
        }
        out.push('\n');
    }

    if !analysis.characters.is_empty() {
        let _ = writeln!(out, "--- CHARACTERS ---");
        for character in &analysis.characters {
            let _ = writeln!(out, "• {} ({})", character.name, character.role);
            if !character.speech_pattern.is_empty() {
                let _ = writeln!(out, "  Speech: {}", character.speech_pattern);
            }
        }
        out.push('\n');
    }

    let high_priority: Vec<_> = analysis
        .footnote_guidance
        .iter()
        .filter(|f| f.priority == Priority::High)
        .collect();
    if !high_priority.is_empty() {
        let _ = writeln!(out, "--- HIGH PRIORITY FOOTNOTES ---");
        for footnote in high_priority {
            let _ = writeln!(out, "• {}", footnote.term);
            let _ = writeln!(out, "  {}", footnote.explanation);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "=== END SUMMARY ===");
    out
}

/// Guidance injected into every translation request of a chapter
/// (1-based number; 0 renders the book-wide part only).
pub fn translation_context(analysis: &ContentAnalysis, chapter_num: usize) -> String {
    let mut out = String::from("## TRANSLATION CONTEXT\n\n");

    let _ = writeln!(out, "**Content Type**: {}", analysis.content_type);
    let _ = writeln!(out, "**Genre**: {}", analysis.genre);
    let _ = writeln!(out, "**Tone**: {}\n", analysis.tone);

    if !analysis.untranslatable_terms.is_empty() {
        let _ = writeln!(out, "**Terms to Keep in Original**:");
        for term in &analysis.untranslatable_terms {
            if term.reason.is_empty() {
                let _ = writeln!(out, "- {}", term.term);
            } else {
                let _ = writeln!(out, "- {}: {}", term.term, term.reason);
            }
        }
        out.push('\n');
    }

    if !analysis.characters.is_empty() {
        let _ = writeln!(out, "**Characters**:");
        for character in &analysis.characters {
            if character.role.is_empty() {
                let _ = writeln!(out, "- {}", character.name);
            } else {
                let _ = writeln!(out, "- {} ({})", character.name, character.role);
            }
        }
        out.push('\n');

        let speech: Vec<_> = analysis
            .characters
            .iter()
            .filter(|c| !c.speech_pattern.is_empty())
            .collect();
        if !speech.is_empty() {
            let _ = writeln!(out, "**Character Speech Patterns**:");
            for character in speech {
                let _ = writeln!(out, "- {}: {}", character.name, character.speech_pattern);
            }
            out.push('\n');
        }
    }

    if let Some(chapter) = analysis.chapter(chapter_num) {
        let _ = writeln!(out, "**Chapter {} Context**:", chapter_num);
        let _ = writeln!(out, "Summary: {}", chapter.summary);
        if !chapter.caveats.is_empty() {
            let _ = writeln!(out, "Translation Caveats:");
            for caveat in &chapter.caveats {
                let _ = writeln!(out, "- {}", caveat);
            }
        }
        out.push('\n');
    }

    out
}

fn or_unknown(code: &str) -> &str {
    if code.is_empty() { "unknown" } else { code }
}

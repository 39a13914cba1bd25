/*!
 * Structured-output parsing for preparation responses.
 *
 * Providers are asked for a bare JSON object, but answers wrapped in
 * markdown fences or surrounded by prose are accepted. A response without a
 * usable object is a parse error; it is never replaced by an empty analysis.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use super::types::{ChapterAnalysis, ContentAnalysis};
use crate::errors::PreparationError;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("valid fenced JSON regex")
});

/// Locate the JSON object in a model response.
///
/// Tried in order: a response that already starts with `{`, a fenced code
/// block, then the span from the first `{` to the last `}`.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = trimmed.rfind('}') {
            return Some(&trimmed[..=end]);
        }
    }

    if let Some(captures) = FENCED_JSON.captures(trimmed) {
        if let Some(body) = captures.get(1) {
            return Some(body.as_str());
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

fn parse_object<T: DeserializeOwned>(provider: &str, what: &str, response: &str) -> Result<T, PreparationError> {
    let parse_error = |message: String| PreparationError::Parse {
        provider: provider.to_string(),
        what: what.to_string(),
        message,
    };

    let json = extract_json(response).ok_or_else(|| {
        let preview: String = response.trim().chars().take(80).collect();
        parse_error(format!("no JSON object in response: {:?}", preview))
    })?;

    serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))
}

/// Parse a whole-work analysis. An object with no content at all is rejected.
pub fn parse_analysis(provider: &str, response: &str) -> Result<ContentAnalysis, PreparationError> {
    let analysis: ContentAnalysis = parse_object(provider, "content analysis", response)?;

    if is_blank(&analysis) {
        return Err(PreparationError::Parse {
            provider: provider.to_string(),
            what: "content analysis".to_string(),
            message: "analysis has no content".to_string(),
        });
    }

    Ok(analysis)
}

/// Parse a chapter analysis and attribute it to `chapter_num`, whatever
/// number the model wrote.
pub fn parse_chapter_analysis(
    provider: &str,
    chapter_num: usize,
    response: &str,
) -> Result<ChapterAnalysis, PreparationError> {
    let what = format!("chapter {} analysis", chapter_num);
    let mut chapter: ChapterAnalysis = parse_object(provider, &what, response)?;

    chapter.chapter_num = chapter_num;
    if chapter.chapter_id.trim().is_empty() {
        chapter.chapter_id = format!("chapter_{}", chapter_num);
    }

    Ok(chapter)
}

fn is_blank(analysis: &ContentAnalysis) -> bool {
    analysis.content_type.trim().is_empty()
        && analysis.genre.trim().is_empty()
        && analysis.tone.trim().is_empty()
        && analysis.subgenres.is_empty()
        && analysis.untranslatable_terms.is_empty()
        && analysis.footnote_guidance.is_empty()
        && analysis.characters.is_empty()
        && analysis.key_themes.is_empty()
        && analysis.cultural_references.is_empty()
}

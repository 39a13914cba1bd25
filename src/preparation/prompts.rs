/*!
 * Prompt builder for the preparation passes.
 *
 * Four instructions are rendered here: the initial analysis, the refinement
 * of a previous pass, the chapter analysis and the consolidation of several
 * per-provider analyses. All of them ask for a single JSON object and nothing
 * else. Book text is cut to a bounded size at a sentence or paragraph break.
 */

use std::borrow::Cow;
use std::fmt::Write;

use super::types::{ContentAnalysis, DetailLevel, PreparationConfig};
use crate::language_utils::Language;

/// Content limit for whole-book analysis prompts, in characters
pub const ANALYSIS_CONTENT_LIMIT: usize = 15_000;

/// Content limit for chapter analysis prompts, in characters
pub const CHAPTER_CONTENT_LIMIT: usize = 10_000;

/// How far back from the limit a sentence or paragraph break is searched for
pub const BOUNDARY_WINDOW: usize = 200;

/// Appended to content that was cut
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated for analysis ...]";

const JSON_ONLY: &str = "Provide ONLY the JSON output, no additional text.";

const CLASSIFICATION_SECTION: &str = r#"CONTENT CLASSIFICATION
- **Content Type**: Determine if this is a novel, short story, poem, technical documentation, legal text, scientific paper, business document, etc.
- **Genre**: Identify the primary genre (e.g., detective fiction, romance, science fiction, literary fiction, etc.)
- **Subgenres**: List specific subgenres (e.g., noir detective, psychological thriller, etc.)

### {n2}. LANGUAGE AND STYLE
- **Tone**: Describe the overall tone (formal, informal, poetic, technical, conversational, archaic, etc.)
- **Language Style**: Identify literary devices, sentence structure patterns, vocabulary level, narrative voice
- **Target Audience**: Who is this written for? (age group, education level, professional field, etc.)"#;

const TERMINOLOGY_SECTION: &str = r#"UNTRANSLATABLE TERMS
Identify terms that should be KEPT IN ORIGINAL LANGUAGE:
- Proper nouns (names, places)
- Culture-specific terms without direct equivalents
- Technical jargon that is internationally recognized
- Terms where translation would lose critical meaning
- For EACH term provide: original form, transliteration (if needed), reason, and contexts where it appears

### {n2}. FOOTNOTE GUIDANCE
Identify concepts that will need clarification for {target} readers:
- Cultural references unfamiliar to the target audience
- Historical context
- Wordplay or puns that don't translate directly
- Idiomatic expressions
- For EACH, provide: term/concept, explanation needed, priority (high/medium/low)"#;

const CHARACTERS_SECTION: &str = r#"CHARACTERS (if narrative content)
For each significant character:
- Name and alternate names
- Role (protagonist, antagonist, supporting, etc.)
- Speech patterns (dialect, formality, unique quirks)
- Key character traits
- How their name should be handled in translation"#;

const CULTURE_SECTION: &str = r#"CULTURAL REFERENCES
Identify all culture-specific references:
- References to literature, art, music, film
- Historical events
- Social customs and traditions
- Food, clothing, architecture specific to the source culture
- For EACH: explain what it is, why it matters, how it should be handled (keep original, translate, add explanation)"#;

const THEMES_SECTION: &str = "KEY THEMES\nList the main themes and motifs that must be preserved in translation";

const CLASSIFICATION_SCHEMA: &str = r#"  "content_type": "...",
  "genre": "...",
  "subgenres": ["..."],
  "tone": "...",
  "language_style": "...",
  "target_audience": "...","#;

const TERMINOLOGY_SCHEMA: &str = r#"  "untranslatable_terms": [
    {
      "term": "...",
      "original_script": "...",
      "reason": "...",
      "context": ["..."],
      "transliteration": "..."
    }
  ],
  "footnote_guidance": [
    {
      "term": "...",
      "explanation": "...",
      "locations": ["..."],
      "priority": "high|medium|low"
    }
  ],"#;

const CHARACTERS_SCHEMA: &str = r#"  "characters": [
    {
      "name": "...",
      "alternate_names": ["..."],
      "role": "...",
      "speech_pattern": "...",
      "key_traits": ["..."],
      "name_translation": {"{target_code}": "..."}
    }
  ],"#;

const CULTURE_SCHEMA: &str = r#"  "cultural_references": [
    {
      "reference": "...",
      "origin": "...",
      "explanation": "...",
      "handling": "..."
    }
  ],"#;

const THEMES_SCHEMA: &str = r#"  "key_themes": ["..."]"#;

const REFINEMENT_TEMPLATE: &str = r#"You are a professional translator and literary analyst conducting Pass #{pass} of content analysis for a translation from {source} to {target}.

## PREVIOUS ANALYSIS (Pass #{previous_pass}):
{previous}

## CONTENT TO ANALYZE:
{content}

## YOUR TASK:
Review and IMPROVE the previous analysis. Focus on:

1. **Validation**: Verify all identifications are accurate
2. **Completeness**: Find what was missed
   - Additional untranslatable terms
   - More cultural references
   - Subtle nuances in tone or style
   - Character details that weren't captured
3. **Refinement**: Improve explanations and guidance
   - Make footnote explanations clearer
   - Add more context where needed
   - Clarify ambiguous points
4. **Prioritization**: Adjust priorities based on importance
5. **Consolidation**: Merge duplicate entries, organize better

## SPECIFIC IMPROVEMENTS TO MAKE:
- Check if content_type and genre classifications are precise
- Ensure ALL significant untranslatable terms are captured
- Verify cultural references are explained adequately for {target} readers
- Confirm character speech patterns are accurately described
- Validate that key themes are comprehensive

{detail}

## OUTPUT FORMAT:
Provide your IMPROVED analysis in the same JSON format as the previous analysis.

This must be your ENHANCED version, not an unchanged copy of the previous analysis.
{json_only}"#;

const CHAPTER_TEMPLATE: &str = r#"You are analyzing Chapter {num} for translation preparation from {source} to {target}.

## CHAPTER INFORMATION:
**Number**: {num}
**Title**: {title}
**Content**:
{content}

## ANALYSIS REQUIREMENTS:

### 1. SUMMARY
Provide a concise summary (2-3 sentences) of what happens in this chapter.

### 2. KEY POINTS
List the most important points, events or information in this chapter (4-6 items).

### 3. TRANSLATION CAVEATS
Identify specific challenges for translating THIS chapter:
- Complex terminology
- Cultural references specific to this chapter
- Tone shifts
- Character introductions or developments
- Timeline or setting changes
- Any other translation challenges

### 4. TONE ANALYSIS
Describe the specific tone of this chapter (may differ from the overall work):
- Tense, relaxed, humorous, somber, etc.
- Narrative pace (fast, slow, varied)
- Emotional register

### 5. COMPLEXITY ASSESSMENT
Rate the translation complexity: Simple / Moderate / Complex

### 6. SPECIAL NOTES
Any other observations relevant to translation.

## OUTPUT FORMAT:
Provide your analysis in JSON format:
{
  "chapter_id": "chapter_{num}",
  "chapter_num": {num},
  "title": {title_json},
  "summary": "...",
  "key_points": ["...", "..."],
  "caveats": ["...", "..."],
  "tone": "...",
  "complexity": "simple|moderate|complex",
  "special_notes": "..."
}

{json_only}"#;

const CONSOLIDATION_TEMPLATE: &str = r#"You are creating the FINAL CONSOLIDATED ANALYSIS from several independent analyses of the same work.

## ANALYSES TO CONSOLIDATE:
{analyses}

## YOUR TASK:
Create the DEFINITIVE, HIGHEST-QUALITY analysis by:

1. **Merging**: Combine insights from all analyses
2. **Validating**: Include only accurate, verified information
3. **Deduplicating**: Remove redundant entries
4. **Prioritizing**: Keep the most important items
5. **Clarifying**: Use the clearest explanations
6. **Organizing**: Present information logically

## CONSOLIDATION GUIDELINES:
- If several analyses agree on something, it is likely correct
- If analyses disagree, use your judgment to pick the most accurate
- Include items that appear in ANY analysis if they are valid
- For untranslatable terms: merge duplicate entries instead of dropping them, keep all valid ones
- For footnotes: merge similar concepts, keep the highest justified priority
- For characters: merge information, keep the most comprehensive descriptions
- For cultural references: combine explanations for completeness

## OUTPUT FORMAT:
Provide the FINAL consolidated analysis in JSON format (same structure as the individual analyses).
This will be the definitive guide for translation.

{json_only}"#;

/// Cut `content` to at most `max_chars` characters.
///
/// When cutting, the last `.` within the final `BOUNDARY_WINDOW` characters
/// wins (the period is kept), else the last blank line in that window, else a
/// hard cut at the limit. `TRUNCATION_MARKER` is appended to cut content.
pub fn truncate_content(content: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((limit, _)) = content.char_indices().nth(max_chars) else {
        return Cow::Borrowed(content);
    };
    let head = &content[..limit];

    let window_start = content
        .char_indices()
        .nth(max_chars.saturating_sub(BOUNDARY_WINDOW))
        .map_or(0, |(i, _)| i);

    let cut = match head.rfind('.') {
        Some(period) if period >= window_start => period + 1,
        _ => match head.rfind("\n\n") {
            Some(blank) if blank >= window_start => blank,
            _ => limit,
        },
    };

    Cow::Owned(format!("{}{}", &content[..cut], TRUNCATION_MARKER))
}

/// Which analysis sections the initial prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisSections {
    pub content_type: bool,
    pub characters: bool,
    pub terminology: bool,
    pub culture: bool,
}

impl Default for AnalysisSections {
    fn default() -> Self {
        Self {
            content_type: true,
            characters: true,
            terminology: true,
            culture: true,
        }
    }
}

/// Renders preparation instructions for one pass.
#[derive(Debug, Clone)]
pub struct PreparationPromptBuilder {
    source_language: String,
    target_language: String,
    target_code: String,
    pass_number: u32,
    sections: AnalysisSections,
    detail_level: DetailLevel,
}

impl PreparationPromptBuilder {
    /// Builder with every section enabled and comprehensive detail.
    pub fn new(source_language: &str, target_language: &str, pass_number: u32) -> Self {
        Self {
            source_language: language_label(source_language, "the source language"),
            target_language: language_label(target_language, "the target language"),
            target_code: target_language.trim().to_string(),
            pass_number,
            sections: AnalysisSections::default(),
            detail_level: DetailLevel::default(),
        }
    }

    /// Builder shaped by a run configuration.
    pub fn from_config(config: &PreparationConfig, pass_number: u32) -> Self {
        Self::new(&config.source_language, &config.target_language, pass_number)
            .with_sections(AnalysisSections {
                content_type: config.analyze_content_type,
                characters: config.analyze_characters,
                terminology: config.analyze_terminology,
                culture: config.analyze_culture,
            })
            .with_detail_level(config.detail_level)
    }

    pub fn with_sections(mut self, sections: AnalysisSections) -> Self {
        self.sections = sections;
        self
    }

    pub fn with_detail_level(mut self, detail_level: DetailLevel) -> Self {
        self.detail_level = detail_level;
        self
    }

    pub fn pass_number(&self) -> u32 {
        self.pass_number
    }

    /// First-pass analysis of the whole work.
    pub fn build_initial_analysis_prompt(&self, content: &str) -> String {
        let mut sections: Vec<String> = Vec::new();
        let mut schema: Vec<&str> = Vec::new();

        // Section numbers follow the enabled sections
        let mut next = 1;
        let mut numbered = |template: &str, spans_two: bool| {
            let text = template
                .replace("{n2}", &(next + 1).to_string())
                .replace("{target}", &self.target_language);
            let heading = format!("### {}. {}", next, text);
            next += if spans_two { 2 } else { 1 };
            heading
        };

        if self.sections.content_type {
            sections.push(numbered(CLASSIFICATION_SECTION, true));
            schema.push(CLASSIFICATION_SCHEMA);
        }
        if self.sections.terminology {
            sections.push(numbered(TERMINOLOGY_SECTION, true));
            schema.push(TERMINOLOGY_SCHEMA);
        }
        if self.sections.characters {
            sections.push(numbered(CHARACTERS_SECTION, false));
            schema.push(CHARACTERS_SCHEMA);
        }
        if self.sections.culture {
            sections.push(numbered(CULTURE_SECTION, false));
            schema.push(CULTURE_SCHEMA);
        }
        sections.push(numbered(THEMES_SECTION, false));
        schema.push(THEMES_SCHEMA);

        let schema = schema.join("\n").replace("{target_code}", &self.target_code);

        let mut prompt = String::new();
        let _ = write!(
            prompt,
            "You are a professional translator and literary analyst preparing for high-quality translation from {} to {}.\n\n\
             Your task is to perform a CONTENT ANALYSIS before translation begins. This analysis will guide the translation \
             process to ensure accuracy, cultural sensitivity, and stylistic appropriateness.\n\n\
             ## CONTENT TO ANALYZE:\n{}\n\n\
             ## ANALYSIS REQUIREMENTS:\n\n{}\n\n{}\n\n\
             ## OUTPUT FORMAT:\nProvide your analysis in JSON format matching this structure:\n{{\n{}\n}}\n\n{}",
            self.source_language,
            self.target_language,
            truncate_content(content, ANALYSIS_CONTENT_LIMIT),
            sections.join("\n\n"),
            self.detail_instruction(),
            schema,
            JSON_ONLY,
        );
        prompt
    }

    /// Refinement of the previous pass; without one this is the initial prompt.
    pub fn build_refinement_prompt(
        &self,
        content: &str,
        previous: Option<&ContentAnalysis>,
    ) -> String {
        let Some(previous) = previous else {
            return self.build_initial_analysis_prompt(content);
        };

        fill(
            REFINEMENT_TEMPLATE,
            &[
                ("pass", self.pass_number.to_string().as_str()),
                ("previous_pass", self.pass_number.saturating_sub(1).to_string().as_str()),
                ("source", self.source_language.as_str()),
                ("target", self.target_language.as_str()),
                ("detail", self.detail_instruction()),
                ("json_only", JSON_ONLY),
                ("previous", analysis_json(previous).as_str()),
                ("content", &*truncate_content(content, ANALYSIS_CONTENT_LIMIT)),
            ],
        )
    }

    /// Analysis of one chapter (1-based number).
    pub fn build_chapter_analysis_prompt(
        &self,
        chapter_num: usize,
        chapter_title: &str,
        chapter_content: &str,
    ) -> String {
        let title_json =
            serde_json::to_string(chapter_title).unwrap_or_else(|_| "\"\"".to_string());

        fill(
            CHAPTER_TEMPLATE,
            &[
                ("num", chapter_num.to_string().as_str()),
                ("source", self.source_language.as_str()),
                ("target", self.target_language.as_str()),
                ("title", chapter_title),
                ("title_json", title_json.as_str()),
                ("json_only", JSON_ONLY),
                ("content", &*truncate_content(chapter_content, CHAPTER_CONTENT_LIMIT)),
            ],
        )
    }

    /// Merge request over the per-provider analyses of one pass.
    pub fn build_consolidation_prompt(&self, analyses: &[ContentAnalysis]) -> String {
        let mut rendered = String::new();
        for analysis in analyses {
            let _ = write!(
                rendered,
                "\n### Analysis from Pass #{} (Provider: {}):\n{}\n",
                analysis.analysis_version,
                analysis.analyzed_by,
                analysis_json(analysis)
            );
        }

        fill(
            CONSOLIDATION_TEMPLATE,
            &[("analyses", rendered.as_str()), ("json_only", JSON_ONLY)],
        )
    }

    fn detail_instruction(&self) -> &'static str {
        match self.detail_level {
            DetailLevel::Basic => {
                "Keep the analysis brief: list only the most important items in each section."
            }
            DetailLevel::Standard => {
                "Cover each section at a moderate depth, focusing on items that affect the translation."
            }
            DetailLevel::Comprehensive => {
                "Be exhaustive: capture every item that could affect the translation, however minor."
            }
        }
    }
}

/// Pretty JSON of an analysis as embedded in prompts.
pub fn analysis_json(analysis: &ContentAnalysis) -> String {
    serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string())
}

/// Substitute `{key}` placeholders in a single left-to-right scan, so text
/// coming from the book or from a model is never re-expanded.
pub(crate) fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let hit = values.iter().find(|(key, _)| {
            tail.starts_with(key) && tail[key.len()..].starts_with('}')
        });
        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

pub(crate) fn language_label(code: &str, fallback: &str) -> String {
    let language = Language::from_code(code);
    if language.is_unset() {
        fallback.to_string()
    } else {
        language.display_name().to_string()
    }
}

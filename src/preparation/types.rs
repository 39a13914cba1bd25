/*!
 * Analysis schema.
 *
 * Field names are snake_case on the wire and every field tolerates being
 * absent or `null`, because the same types decode model answers and saved
 * analysis files.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::PreparationError;

/// Decode `null` as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Durations are stored as integer nanoseconds.
pub(crate) mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}

/// Consolidated understanding of a work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    #[serde(default, deserialize_with = "nullable")]
    pub content_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub genre: String,
    #[serde(default, deserialize_with = "nullable")]
    pub subgenres: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub tone: String,
    #[serde(default, deserialize_with = "nullable")]
    pub language_style: String,
    #[serde(default, deserialize_with = "nullable")]
    pub target_audience: String,

    #[serde(default, deserialize_with = "nullable")]
    pub untranslatable_terms: Vec<UntranslatableTerm>,
    #[serde(default, deserialize_with = "nullable")]
    pub footnote_guidance: Vec<FootnoteGuidance>,
    #[serde(default, deserialize_with = "nullable")]
    pub characters: Vec<Character>,
    #[serde(default, deserialize_with = "nullable")]
    pub key_themes: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub cultural_references: Vec<CulturalReference>,

    #[serde(default, deserialize_with = "nullable")]
    pub chapter_analyses: Vec<ChapterAnalysis>,

    /// Pass that produced or last refined this record
    #[serde(default, deserialize_with = "nullable")]
    pub analysis_version: u32,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
    /// Provider identifier, or `consensus(a,b)` after a multi-provider pass
    #[serde(default, deserialize_with = "nullable")]
    pub analyzed_by: String,
}

/// A term to keep in its original form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntranslatableTerm {
    #[serde(default, deserialize_with = "nullable")]
    pub term: String,
    #[serde(default, deserialize_with = "nullable")]
    pub original_script: String,
    #[serde(default, deserialize_with = "nullable")]
    pub reason: String,
    /// Excerpts where the term appears
    #[serde(default, deserialize_with = "nullable")]
    pub context: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub transliteration: String,
}

/// A concept that needs clarification for target-language readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootnoteGuidance {
    #[serde(default, deserialize_with = "nullable")]
    pub term: String,
    #[serde(default, deserialize_with = "nullable")]
    pub explanation: String,
    #[serde(default, deserialize_with = "nullable")]
    pub locations: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub priority: Priority,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub alternate_names: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub role: String,
    #[serde(default, deserialize_with = "nullable")]
    pub speech_pattern: String,
    #[serde(default, deserialize_with = "nullable")]
    pub key_traits: Vec<String>,
    /// Target language code to rendered name
    #[serde(default, deserialize_with = "nullable")]
    pub name_translation: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CulturalReference {
    #[serde(default, deserialize_with = "nullable")]
    pub reference: String,
    #[serde(default, deserialize_with = "nullable")]
    pub origin: String,
    #[serde(default, deserialize_with = "nullable")]
    pub explanation: String,
    /// Keep, translate, add footnote, ...
    #[serde(default, deserialize_with = "nullable")]
    pub handling: String,
}

/// Chapter-scoped analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterAnalysis {
    #[serde(default, deserialize_with = "nullable")]
    pub chapter_id: String,
    /// 1-based chapter number
    #[serde(default, deserialize_with = "nullable")]
    pub chapter_num: usize,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub summary: String,
    #[serde(default, deserialize_with = "nullable")]
    pub key_points: Vec<String>,
    /// Translation warnings
    #[serde(default, deserialize_with = "nullable")]
    pub caveats: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub tone: String,
    #[serde(default, deserialize_with = "nullable")]
    pub complexity: Complexity,
    #[serde(default, deserialize_with = "nullable")]
    pub special_notes: String,
}

/// Footnote priority. Parsed case-insensitively, written lowercase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Translation complexity of a chapter. Parsed case-insensitively, written lowercase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

/// First meaningful word of a model-supplied rating, lowercased.
/// "Very High priority" and "high - footnote needed" both yield "high".
fn rating_word(s: &str) -> String {
    s.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .find(|w| !matches!(w.as_str(), "very" | "extremely" | "quite" | "fairly" | "rather"))
        .unwrap_or_default()
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match rating_word(s).as_str() {
            "high" | "critical" | "urgent" | "essential" | "important" | "mandatory" => Ok(Self::High),
            "" | "medium" | "moderate" | "normal" => Ok(Self::Medium),
            "low" | "minor" | "optional" => Ok(Self::Low),
            _ => Err(format!("unknown priority '{}'", s)),
        }
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match rating_word(s).as_str() {
            "simple" | "easy" | "low" | "basic" => Ok(Self::Simple),
            "" | "moderate" | "medium" | "intermediate" | "average" => Ok(Self::Moderate),
            "complex" | "hard" | "difficult" | "high" | "challenging" => Ok(Self::Complex),
            _ => Err(format!("unknown complexity '{}'", s)),
        }
    }
}

macro_rules! lowercase_enum_serde {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

lowercase_enum_serde!(Priority);
lowercase_enum_serde!(Complexity);

/// How much detail the analysis prompts ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Basic,
    Standard,
    #[default]
    Comprehensive,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Comprehensive => "comprehensive",
        }
    }
}

fn default_pass_count() -> u32 {
    2
}

fn default_providers() -> Vec<String> {
    vec!["deepseek".to_string(), "zhipu".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_chapters() -> usize {
    3
}

fn default_target_language() -> String {
    "sr".to_string()
}

/// Immutable run configuration for the preparation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationConfig {
    /// Number of sequential analysis passes (at least 1)
    #[serde(default = "default_pass_count")]
    pub pass_count: u32,

    /// Ordered provider identifiers queried on every pass
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    #[serde(default = "default_true")]
    pub analyze_content_type: bool,
    #[serde(default = "default_true")]
    pub analyze_characters: bool,
    #[serde(default = "default_true")]
    pub analyze_terminology: bool,
    #[serde(default = "default_true")]
    pub analyze_culture: bool,
    #[serde(default = "default_true")]
    pub analyze_chapters: bool,

    #[serde(default)]
    pub detail_level: DetailLevel,

    /// Upper bound on chapter-analysis requests in flight
    #[serde(default = "default_max_concurrent_chapters")]
    pub max_concurrent_chapters: usize,

    #[serde(default)]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            pass_count: default_pass_count(),
            providers: default_providers(),
            analyze_content_type: true,
            analyze_characters: true,
            analyze_terminology: true,
            analyze_culture: true,
            analyze_chapters: true,
            detail_level: DetailLevel::default(),
            max_concurrent_chapters: default_max_concurrent_chapters(),
            source_language: String::new(),
            target_language: default_target_language(),
        }
    }
}

impl PreparationConfig {
    /// Reject configurations that cannot run, before any external call.
    pub fn validate(&self) -> Result<(), PreparationError> {
        if self.pass_count == 0 {
            return Err(PreparationError::Config(
                "pass_count must be at least 1".to_string(),
            ));
        }
        if self.providers.is_empty() {
            return Err(PreparationError::Config(
                "at least one provider is required".to_string(),
            ));
        }
        if let Some(blank) = self.providers.iter().position(|p| p.trim().is_empty()) {
            return Err(PreparationError::Config(format!(
                "provider #{} has an empty identifier",
                blank + 1
            )));
        }
        if self.max_concurrent_chapters == 0 {
            return Err(PreparationError::Config(
                "max_concurrent_chapters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with a different source language (used after detection).
    pub fn with_source_language(&self, code: &str) -> Self {
        Self {
            source_language: code.to_string(),
            ..self.clone()
        }
    }
}

/// Statistics for one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationPass {
    pub pass_number: u32,
    /// Providers that answered, in configured order
    #[serde(default)]
    pub providers: Vec<String>,
    /// Identity that produced the pass result
    #[serde(default)]
    pub consolidated_by: String,
    #[serde(with = "duration_nanos", default)]
    pub duration: Duration,
    #[serde(default)]
    pub tokens_used: u64,
}

/// Output of a completed preparation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationResult {
    pub source_language: String,
    pub target_language: String,

    #[serde(default)]
    pub passes: Vec<PreparationPass>,

    pub final_analysis: ContentAnalysis,

    #[serde(with = "duration_nanos")]
    pub total_duration: Duration,
    pub total_tokens: u64,
    pub pass_count: u32,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ContentAnalysis {
    /// Chapter analysis for a 1-based chapter number.
    pub fn chapter(&self, chapter_num: usize) -> Option<&ChapterAnalysis> {
        self.chapter_analyses
            .iter()
            .find(|c| c.chapter_num == chapter_num)
    }

    /// Merge untranslatable terms that share a case-insensitive term.
    /// The first spelling wins; contexts are unioned and empty fields filled.
    pub fn dedup_untranslatable_terms(&mut self) {
        let mut merged: Vec<UntranslatableTerm> = Vec::with_capacity(self.untranslatable_terms.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for term in self.untranslatable_terms.drain(..) {
            let key = term_key(&term.term);
            if key.is_empty() {
                continue;
            }
            match index.get(&key) {
                Some(&i) => {
                    let existing = &mut merged[i];
                    union_into(&mut existing.context, &term.context);
                    fill_if_empty(&mut existing.original_script, term.original_script);
                    fill_if_empty(&mut existing.reason, term.reason);
                    fill_if_empty(&mut existing.transliteration, term.transliteration);
                }
                None => {
                    index.insert(key, merged.len());
                    merged.push(term);
                }
            }
        }

        self.untranslatable_terms = merged;
    }

    /// Keep one analysis per chapter number (the last one seen), ordered by number.
    pub fn dedup_chapter_analyses(&mut self) {
        let mut by_num: BTreeMap<usize, ChapterAnalysis> = BTreeMap::new();
        for chapter in self.chapter_analyses.drain(..) {
            by_num.insert(chapter.chapter_num, chapter);
        }
        self.chapter_analyses = by_num.into_values().collect();
    }

    /// Whether any recorded untranslatable term has this exact spelling.
    pub fn records_term(&self, term: &str) -> bool {
        self.untranslatable_terms.iter().any(|t| t.term == term)
    }
}

/// Case-insensitive identity key for terms, names and references.
pub(crate) fn term_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Append the items of `extra` missing from `target` (case-insensitive), keeping order.
pub(crate) fn union_into(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        let key = term_key(item);
        if key.is_empty() {
            continue;
        }
        if !target.iter().any(|existing| term_key(existing) == key) {
            target.push(item.clone());
        }
    }
}

pub(crate) fn fill_if_empty(target: &mut String, candidate: String) {
    if target.trim().is_empty() && !candidate.trim().is_empty() {
        *target = candidate;
    }
}

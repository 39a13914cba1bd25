use anyhow::{Result, anyhow};
use async_trait::async_trait;
use isolang::Language as IsoLanguage;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;

/// Language utilities for ISO language code handling
///
/// This module provides the language-identification contract used by the
/// orchestrator, and helpers for validating and normalizing ISO 639-1
/// (2-letter) and ISO 639-2/T (3-letter) codes.

/// A language as reported by a detector or configured by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// ISO code, e.g. "ru" (may be empty when unknown)
    pub code: String,
    /// English name, e.g. "Russian"
    pub name: String,
}

impl Language {
    /// Build a language from a code, resolving its English name when possible.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_lowercase();
        let name = get_language_name(&code).unwrap_or_else(|_| code.clone());
        Self { code, name }
    }

    /// True when no language is known.
    pub fn is_unset(&self) -> bool {
        self.code.trim().is_empty()
    }

    /// The name to put in prompts: the English name, else the code.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.code } else { &self.name }
    }
}

/// Language identification contract (heuristic or LLM-backed detectors
/// live outside this crate).
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Identify the language of `sample`
    async fn detect(
        &self,
        cancel: &CancellationToken,
        sample: &str,
    ) -> Result<Language, ProviderError>;
}

/// ISO 639-2/B codes that differ from their ISO 639-2/T counterparts
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("slo", "slk"),
    ("scc", "srp"),
    ("scr", "hrv"),
    ("rum", "ron"),
    ("mac", "mkd"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("per", "fas"),
];

fn lookup(code: &str) -> Option<IsoLanguage> {
    let code = code.trim().to_lowercase();
    match code.len() {
        2 => IsoLanguage::from_639_1(&code),
        3 => {
            let part2t = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(b, _)| *b == code)
                .map(|(_, t)| *t)
                .unwrap_or(code.as_str());
            IsoLanguage::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Check that a code is a valid ISO 639-1 or ISO 639-2 code
pub fn validate_language_code(code: &str) -> Result<()> {
    lookup(code)
        .map(|_| ())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-2/T if no ISO 639-1 code exists
pub fn normalize_code(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))?;
    Ok(lang
        .to_639_1()
        .map(str::to_string)
        .unwrap_or_else(|| lang.to_639_3().to_string()))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (lookup(code1), lookup(code2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    lookup(code)
        .map(|lang| lang.to_name().to_string())
        .ok_or_else(|| anyhow!("Unknown language code: {}", code))
}

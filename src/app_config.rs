use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs;
use std::path::Path;

use crate::preparation::{DetailLevel, PreparationConfig};
use crate::providers::ProviderRegistry;
use crate::translation::{PreparationAwareTranslator, TermMatch};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Source language code (ISO); empty means detect from the book
    #[serde(default)]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Preparation phase settings
    #[serde(default)]
    pub preparation: PreparationSettings,

    /// Translation phase settings
    #[serde(default)]
    pub translation: TranslationSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Settings of the multi-pass preparation phase
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PreparationSettings {
    // @field: Run the preparation phase before translating
    #[serde(default = "default_true")]
    pub enabled: bool,

    // @field: Sequential analysis passes
    #[serde(default = "default_pass_count")]
    pub pass_count: u32,

    // @field: Provider identifiers queried on every pass, in order
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

    // @field: Chapter-analysis requests in flight
    #[serde(default = "default_max_concurrent_chapters")]
    pub max_concurrent_chapters: usize,
}

impl Default for PreparationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            pass_count: default_pass_count(),
            providers: default_providers(),
            analyze_content_type: true,
            analyze_characters: true,
            analyze_terminology: true,
            analyze_culture: true,
            analyze_chapters: true,
            detail_level: DetailLevel::default(),
            max_concurrent_chapters: default_max_concurrent_chapters(),
        }
    }
}

/// Settings of the translation phase
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslationSettings {
    // @field: Chapters translated concurrently
    #[serde(default = "default_chapter_workers")]
    pub chapter_workers: usize,

    // @field: How titles are checked against untranslatable terms
    #[serde(default)]
    pub term_match: TermMatch,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            chapter_workers: default_chapter_workers(),
            term_match: TermMatch::default(),
        }
    }
}

/// Log level for the application
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    // @level: Error messages only
    Error,
    // @level: Warnings and errors
    Warn,
    // @level: General information
    #[default]
    Info,
    // @level: Detailed debugging
    Debug,
    // @level: Everything
    Trace,
}

impl LogLevel {
    // @returns: Matching filter for the log facade
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_target_language() -> String {
    "sr".to_string()
}

fn default_pass_count() -> u32 {
    2
}

fn default_providers() -> Vec<String> {
    vec!["deepseek".to_string(), "zhipu".to_string()]
}

fn default_max_concurrent_chapters() -> usize {
    3
}

fn default_chapter_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the configuration at `path`, writing the defaults there first
    /// when the file does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Parse a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::validate_language_code(&self.target_language)
            .context("Invalid target language")?;
        if !self.source_language.is_empty() {
            crate::language_utils::validate_language_code(&self.source_language)
                .context("Invalid source language")?;
        }

        if self.preparation.enabled {
            self.preparation_config()
                .validate()
                .map_err(|e| anyhow!("Invalid preparation settings: {}", e))?;
        }

        if self.translation.chapter_workers == 0 {
            return Err(anyhow!("translation.chapter_workers must be at least 1"));
        }

        Ok(())
    }

    /// The immutable run configuration handed to the preparation engine
    pub fn preparation_config(&self) -> PreparationConfig {
        let prep = &self.preparation;
        PreparationConfig {
            pass_count: prep.pass_count,
            providers: prep.providers.clone(),
            analyze_content_type: prep.analyze_content_type,
            analyze_characters: prep.analyze_characters,
            analyze_terminology: prep.analyze_terminology,
            analyze_culture: prep.analyze_culture,
            analyze_chapters: prep.analyze_chapters,
            detail_level: prep.detail_level,
            max_concurrent_chapters: prep.max_concurrent_chapters,
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
        }
    }

    /// Apply the configured languages, preparation and translation settings
    /// to an orchestrator.
    pub fn configure(
        &self,
        translator: PreparationAwareTranslator,
        registry: ProviderRegistry,
    ) -> PreparationAwareTranslator {
        let mut translator = translator
            .with_term_match(self.translation.term_match)
            .with_chapter_workers(self.translation.chapter_workers);
        if !self.source_language.is_empty() {
            translator = translator.with_source_language(&self.source_language);
        }
        if self.preparation.enabled {
            translator = translator.with_preparation(self.preparation_config(), registry);
        }
        translator
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: String::new(),
            target_language: default_target_language(),
            preparation: PreparationSettings::default(),
            translation: TranslationSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}

/*!
 * # Lektor - multi-pass preparation for literary machine translation
 *
 * A Rust library that analyses a book before translating it and then
 * conditions every translation request on that analysis.
 *
 * ## Features
 *
 * - Multi-pass, multi-provider content analysis (content type, tone,
 *   characters, untranslatable terms, cultural references, per-chapter notes)
 * - Consolidation of the analyses produced by several providers
 * - Per-chapter translation context injected into every request
 * - Titles made of untranslatable terms kept verbatim
 * - Progress events for a translation session
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `book`: The book model being translated
 * - `preparation`: The analysis phase:
 *   - `preparation::types`: Analysis schema and run configuration
 *   - `preparation::prompts`: Provider instructions
 *   - `preparation::coordinator`: The multi-pass engine
 *   - `preparation::persistence`: Saving and rendering results
 * - `translation`: Context-aware book translation
 * - `providers`: The text-generation contract and registry
 * - `language_utils`: Language detection contract and ISO code utilities
 * - `events`: Progress events
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod book;
pub mod errors;
pub mod events;
pub mod language_utils;
pub mod preparation;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use book::{Book, Chapter, Metadata, Section};
pub use errors::{AppError, PersistenceError, PreparationError, ProviderError, TranslationError};
pub use events::{Event, EventBus, EventPublisher, EventType, LogPublisher};
pub use language_utils::{Language, LanguageDetector, get_language_name, language_codes_match};
pub use preparation::{ContentAnalysis, PreparationConfig, PreparationCoordinator, PreparationResult};
pub use providers::{Generation, ProviderRegistry, TextGenerator};
pub use translation::{GeneratorTranslator, PreparationAwareTranslator, Translator};

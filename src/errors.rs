/*!
 * Error types for the lektor crate.
 *
 * Each layer gets its own error enum built with thiserror:
 * - `ProviderError`: transport-class failures reported by external services
 * - `PreparationError`: failures of the multi-pass analysis engine
 * - `TranslationError`: failures of a whole-book translation run
 * - `PersistenceError`: saving or loading a preparation result
 * - `EventError`: event delivery (always absorbed by callers)
 */

use thiserror::Error;

/// Errors that can occur when talking to an external service
/// (text generation, translation, language detection).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

/// Errors raised by the preparation engine.
#[derive(Error, Debug)]
pub enum PreparationError {
    /// Rejected before any external call was made
    #[error("Invalid preparation config: {0}")]
    Config(String),

    /// A provider could not be reached or answered with a failure
    #[error("Provider '{provider}' failed: {source}")]
    Transport {
        /// Provider identifier
        provider: String,
        /// Underlying transport error
        #[source]
        source: ProviderError,
    },

    /// A provider answered, but not with the expected structured shape
    #[error("Could not parse {what} from provider '{provider}': {message}")]
    Parse {
        /// Provider identifier
        provider: String,
        /// What was being parsed ("content analysis", "chapter 3 analysis", ...)
        what: String,
        /// Parser diagnostic
        message: String,
    },

    /// The run was cancelled while requests were in flight
    #[error("Preparation cancelled")]
    Cancelled,
}

impl PreparationError {
    /// True for cancellation-class errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised by a book translation run.
#[derive(Error, Debug)]
pub enum TranslationError {
    /// The preparation phase failed; the whole run is aborted
    #[error("Preparation phase failed: {0}")]
    Preparation(#[from] PreparationError),

    /// The base translator failed for one unit of the book
    #[error("Failed to translate {unit}: {source}")]
    Unit {
        /// Human-readable unit description ("chapter 2 title", ...)
        unit: String,
        /// Underlying transport error
        #[source]
        source: ProviderError,
    },

    /// The run was cancelled while requests were in flight
    #[error("Translation cancelled")]
    Cancelled,
}

impl TranslationError {
    /// True for cancellation-class errors, including a cancelled preparation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Preparation(e) => e.is_cancelled(),
            Self::Unit { .. } => false,
        }
    }
}

/// Errors raised while persisting a preparation result.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Nothing has been prepared yet
    #[error("No preparation result available")]
    NoResult,

    /// Filesystem failure
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by an event publisher.
#[derive(Error, Debug)]
pub enum EventError {
    /// The event could not be delivered
    #[error("Event delivery failed: {0}")]
    Delivery(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from preparation
    #[error("Preparation error: {0}")]
    Preparation(#[from] PreparationError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from persistence
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

//! # Error Handling
//!
//! This module defines the application-level error type used by game setup,
//! localization loading and preference storage.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **T**: The success type (what you get when everything works)
//! - **E**: The error type (what you get when something goes wrong)
//!
//! ### thiserror
//! - **#[derive(Error)]**: Generates the `Display` and `std::error::Error` impls
//! - **#[error("...")]**: The message format for each variant
//! - **#[from]**: Generates a `From` conversion so `?` works across error types
//!
//! ## What is NOT in here:
//! Speech recognizer failures never surface as `AppError`. The voice session
//! maps them to a status (see `voice::recognizer::RecognitionError`).

use thiserror::Error;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **InvalidSetup**: Players or rows don't satisfy the game preconditions
/// - **Config**: Configuration file or environment variable problems
/// - **Localization**: The embedded string table could not be parsed
/// - **Storage**: Reading or writing the preferences file failed
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::InvalidSetup("at least 2 players are required".to_string()));
/// ```
#[derive(Debug, Error)]
pub enum AppError {
    /// Game setup input failed validation
    #[error("Invalid game setup: {0}")]
    InvalidSetup(String),

    /// Configuration file or environment variable problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// The localization table is malformed
    #[error("Localization error: {0}")]
    Localization(#[from] toml::de::Error),

    /// Preference file could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Preference file content is not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration loading can fail for various reasons (missing files, invalid syntax, etc.).
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

//! Error types for paperpage.
//!
//! Library crates use [`PaperpageError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all paperpage operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperpageError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The source could not be resolved to bytes. Message is passed through verbatim.
    #[error("{0}")]
    SourceUnavailable(String),

    /// The document could not be turned into usable text.
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// The content generator could not be reached or refused the call.
    #[error("generator unavailable: {0}")]
    GeneratorUnavailable(String),

    /// The content store rejected the record.
    #[error("persist failed: {0}")]
    PersistFailed(String),

    /// Database open, migration or query failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed input (batch row, locator, manual field).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperpageError>;

impl PaperpageError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PaperpageError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PaperpageError::SourceUnavailable("https://x.test/a.pdf: HTTP 500".into());
        assert_eq!(err.to_string(), "https://x.test/a.pdf: HTTP 500");

        let err = PaperpageError::PersistFailed("disk full".into());
        assert_eq!(err.to_string(), "persist failed: disk full");
    }
}

//! Error types for GrantScout.
//!
//! Library crates use [`GrantScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all GrantScout operations.
#[derive(Debug, thiserror::Error)]
pub enum GrantScoutError {
    /// Missing credentials or an unusable configuration value.
    #[error("config error: {message}")]
    Config { message: String },

    /// Extraction provider unreachable, rejected the request, or returned no text.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// No JSON array could be recovered from the provider's response.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Digest dispatch to the notification channel failed.
    #[error("notification error: {0}")]
    Notification(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A discovery run was requested while another one is still active.
    #[error("a discovery run is already in progress")]
    RunInProgress,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GrantScoutError>;

impl GrantScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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

    /// Whether this error came from a discovery phase that aborts the run
    /// before any grants are merged (config, extraction, or parse).
    ///
    /// `RunInProgress` and `Io` are host-side errors, and notification
    /// failures are recovered inside the run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Extraction(_) | Self::Parse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = GrantScoutError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = GrantScoutError::parse("no JSON array found");
        assert!(err.to_string().contains("no JSON array"));
    }

    #[test]
    fn only_discovery_phase_errors_are_run_fatal() {
        assert!(GrantScoutError::config("x").is_run_fatal());
        assert!(GrantScoutError::Extraction("x".into()).is_run_fatal());
        assert!(GrantScoutError::parse("x").is_run_fatal());
        assert!(!GrantScoutError::Notification("x".into()).is_run_fatal());
        assert!(!GrantScoutError::RunInProgress.is_run_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!GrantScoutError::io("/tmp/grants.json", io).is_run_fatal());
    }
}

//! Error types for the analysis engine.
//!
//! Only conditions that abort an operation are errors. Recoverable
//! conditions (unresolved copybooks, parse diagnostics, cache read
//! failures) are carried as [`coqu_lang_core::Diagnostic`] records on the
//! operation's result so that loading and querying always make progress.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, CoquError>;

/// Errors produced by workspace, cache, and query operations.
#[derive(Debug, Error, Diagnostic)]
pub enum CoquError {
    /// Unknown command or invalid flag combination.
    #[error("usage: {0}")]
    #[diagnostic(code(coqu::usage))]
    Usage(String),

    /// The source file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    #[diagnostic(code(coqu::file_access))]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source bytes could not be decoded as UTF-8 or Latin-1.
    #[error("cannot decode {} at byte offset {offset}", path.display())]
    #[diagnostic(code(coqu::decoding))]
    Decoding { path: PathBuf, offset: usize },

    /// Cache directory I/O failed.
    #[error("cache error: {message}")]
    #[diagnostic(code(coqu::cache))]
    Cache { message: String },

    /// A cancellation deadline expired at a safe point.
    #[error("operation interrupted")]
    #[diagnostic(code(coqu::interrupted))]
    Interrupted,
}

impl CoquError {
    /// Build a cache error from an I/O failure.
    pub fn cache(context: &str, err: std::io::Error) -> Self {
        CoquError::Cache {
            message: format!("{context}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoquError::Usage("unknown command 'frobnicate'".into());
        assert_eq!(format!("{err}"), "usage: unknown command 'frobnicate'");
    }

    #[test]
    fn test_cache_error_context() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CoquError::cache("writing entry", io);
        assert!(format!("{err}").contains("writing entry"));
    }
}

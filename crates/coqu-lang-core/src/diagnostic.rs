//! Diagnostic records for recoverable analysis conditions.
//!
//! Unresolved copybooks, COPY cycles, and parse errors never abort an
//! operation; they are recorded as diagnostics and surfaced alongside the
//! result. Each diagnostic carries a source position, severity, and a
//! human-readable message; parser diagnostics additionally carry the
//! expected/actual token detail that debug mode renders in full.

use std::fmt;

use crate::span::SrcPos;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error — the surrounding construct could not be analyzed.
    Error,
    /// Warning — analysis continued but something looks suspicious.
    Warning,
    /// Informational — not a problem, but worth noting.
    Info,
}

/// A diagnostic message from preprocessing, indexing, or parsing.
///
/// # Example
///
/// ```
/// use coqu_lang_core::{Diagnostic, Severity, SrcPos};
///
/// let d = Diagnostic::warning("unresolved-copy", "copybook 'DATEUTIL' not found on search path")
///     .at(SrcPos::new(16, 8));
///
/// assert_eq!(d.severity, Severity::Warning);
/// assert_eq!(d.pos.unwrap().line, 16);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Stable machine-readable code (e.g. "unresolved-copy", "cyclic-copy").
    pub code: String,
    /// Human-readable message describing the condition.
    pub message: String,
    /// Source position, when one is known.
    pub pos: Option<SrcPos>,
    /// Token classes the parser would have accepted here.
    pub expected: Vec<String>,
    /// The token actually seen.
    pub actual: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Create a new info diagnostic.
    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            pos: None,
            expected: Vec::new(),
            actual: None,
        }
    }

    /// Attach a source position.
    pub fn at(mut self, pos: SrcPos) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Attach expected/actual token detail (parser diagnostics).
    pub fn with_tokens(mut self, expected: Vec<String>, actual: impl Into<String>) -> Self {
        self.expected = expected;
        self.actual = Some(actual.into());
        self
    }

    /// Returns `true` if this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Returns `true` if this diagnostic is a warning.
    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " at {}", pos)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_error() {
        let d = Diagnostic::error("parse", "unexpected token");
        assert_eq!(d.severity, Severity::Error);
        assert!(d.is_error());
        assert!(!d.is_warning());
        assert!(d.pos.is_none());
    }

    #[test]
    fn test_diagnostic_warning_at() {
        let d = Diagnostic::warning("unresolved-copy", "copybook not found").at(SrcPos::new(16, 8));
        assert!(d.is_warning());
        assert_eq!(d.pos, Some(SrcPos::new(16, 8)));
    }

    #[test]
    fn test_diagnostic_with_tokens() {
        let d = Diagnostic::error("parse", "unexpected token")
            .with_tokens(vec!["PERIOD".into(), "VERB".into()], "SECTION");
        assert_eq!(d.expected.len(), 2);
        assert_eq!(d.actual.as_deref(), Some("SECTION"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::warning("cyclic-copy", "COPY cycle via 'SELFREF'").at(SrcPos::new(3, 1));
        assert_eq!(
            format!("{}", d),
            "warning[cyclic-copy]: COPY cycle via 'SELFREF' at 3:1"
        );
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(format!("{}", Severity::Error), "error");
        assert_eq!(format!("{}", Severity::Warning), "warning");
        assert_eq!(format!("{}", Severity::Info), "info");
    }
}

//! Full parser frontend.
//!
//! Drives the grammar backend over a whole expanded stream or a line
//! segment. The backend is reached only through `tokenize`/`parse`, so a
//! generated parser with equivalent semantics can replace it without
//! touching anything above this module.

pub mod ast;
pub mod grammar;

use coqu_lang_core::Diagnostic;

pub use ast::{AstNode, NodeKind};

/// Frontend tuning knobs.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Diagnostic count beyond which the AST is flagged degraded.
    pub max_diagnostics: usize,
    /// Advisory memory ceiling in bytes; full parses of larger sources are
    /// refused with a warning instead of attempted.
    pub memory_limit: Option<u64>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_diagnostics: 100,
            memory_limit: None,
        }
    }
}

/// A parse result: tree, diagnostics, and the degraded flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAst {
    pub root: AstNode,
    pub diagnostics: Vec<Diagnostic>,
    pub degraded: bool,
}

/// Driver for the grammar backend.
#[derive(Debug, Default)]
pub struct ParserFrontend {
    options: ParseOptions,
}

impl ParserFrontend {
    /// Create a frontend with the given options.
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parse an entire expanded stream.
    pub fn parse_full(&self, lines: &[String]) -> ParsedAst {
        if let Some(limit) = self.options.memory_limit {
            let bytes: usize = lines.iter().map(|l| l.len() + 1).sum();
            if bytes as u64 > limit {
                tracing::warn!(bytes, limit, "full parse skipped: over memory ceiling");
                return ParsedAst {
                    root: AstNode::leaf(NodeKind::Program, Default::default()),
                    diagnostics: vec![Diagnostic::warning(
                        "memory-limit",
                        format!("source of {bytes} bytes exceeds the {limit}-byte parse ceiling"),
                    )],
                    degraded: true,
                };
            }
        }
        self.run(lines, 1, false)
    }

    /// Parse a line segment drawn from a program.
    ///
    /// `line_start` is the original 1-based line number of `lines[0]`. If
    /// the segment carries no division header, a synthetic
    /// `PROCEDURE DIVISION.` header is prepended so the grammar accepts a
    /// paragraph body in isolation; the synthetic line is not part of the
    /// caller's source and carries line number `line_start - 1`.
    pub fn parse_segment(&self, lines: &[String], line_start: u32) -> ParsedAst {
        let has_division = lines
            .iter()
            .any(|l| grammar::tokenize(l, 0).len() >= 2 && l.to_ascii_uppercase().contains("DIVISION"));
        if has_division {
            return self.run(lines, line_start, true);
        }

        let mut padded = Vec::with_capacity(lines.len() + 1);
        padded.push("       PROCEDURE DIVISION.".to_string());
        padded.extend(lines.iter().cloned());
        self.run(&padded, line_start.saturating_sub(1), true)
    }

    fn run(&self, lines: &[String], first_line: u32, segment: bool) -> ParsedAst {
        let (root, diagnostics) = grammar::parse(lines, first_line);
        let degraded = diagnostics.iter().filter(|d| d.is_error()).count() > self.options.max_diagnostics;
        if degraded {
            tracing::debug!(
                errors = diagnostics.len(),
                segment,
                "parse degraded past diagnostic threshold"
            );
        }
        ParsedAst {
            root,
            diagnostics,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(source: &str) -> Vec<String> {
        source.lines().map(String::from).collect()
    }

    #[test]
    fn test_parse_full() {
        let frontend = ParserFrontend::default();
        let parsed = frontend.parse_full(&lines(
            "       PROCEDURE DIVISION.\n       P1.\n           DISPLAY 'A'.\n",
        ));
        assert!(!parsed.degraded);
        assert!(parsed.root.paragraph("P1").is_some());
    }

    #[test]
    fn test_segment_gets_synthetic_header() {
        let frontend = ParserFrontend::default();
        // A bare paragraph body, as sliced out of a larger program.
        let parsed = frontend.parse_segment(
            &lines("       2100-VALIDATE.\n           CALL 'AUDITLOG'.\n"),
            47,
        );
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
        let paragraph = parsed.root.paragraph("2100-VALIDATE").unwrap();
        assert_eq!(paragraph.span.start.line, 47);
        assert_eq!(paragraph.children.len(), 1);
    }

    #[test]
    fn test_segment_with_own_header_not_padded() {
        let frontend = ParserFrontend::default();
        let parsed = frontend.parse_segment(
            &lines("       PROCEDURE DIVISION.\n       P1.\n           CONTINUE.\n"),
            1,
        );
        assert!(parsed.root.paragraph("P1").is_some());
    }

    #[test]
    fn test_memory_limit_refuses_parse() {
        let frontend = ParserFrontend::new(ParseOptions {
            max_diagnostics: 100,
            memory_limit: Some(8),
        });
        let parsed = frontend.parse_full(&lines("       PROCEDURE DIVISION.\n"));
        assert!(parsed.degraded);
        assert_eq!(parsed.diagnostics[0].code, "memory-limit");
        assert_eq!(parsed.root.children.len(), 0);
    }

    #[test]
    fn test_degraded_flag_on_error_flood() {
        let frontend = ParserFrontend::new(ParseOptions {
            max_diagnostics: 3,
            memory_limit: None,
        });
        let mut source = String::from("       PROCEDURE DIVISION.\n       P1.\n");
        for _ in 0..10 {
            source.push_str("           ~~~ broken line without recovery period\n");
            source.push_str("           fixed.\n");
        }
        let parsed = frontend.parse_full(&lines(&source));
        assert!(parsed.diagnostics.len() > 3);
        assert!(parsed.degraded);
    }
}

//! Chunk analyzer: on-demand semantic extraction from a text slice.
//!
//! Operates on one chunk at a time (typically a paragraph or section) and
//! pulls out transfer-of-control and data-movement edges with dedicated
//! regular expressions. No full parse is required; when a grammar-produced
//! AST for the segment exists, [`ChunkAnalyzer::analyze_ast`] derives the
//! same edges from statement nodes instead, which keeps commented-out code
//! from contributing edges.
//!
//! Edges come back in source order, one per statement occurrence.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parse::AstNode;

/// Kinds of references a chunk can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    Perform,
    PerformThru,
    CallLiteral,
    CallIdentifier,
    Goto,
    MoveTo,
    MoveFrom,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Perform => "perform",
            RefKind::PerformThru => "perform-thru",
            RefKind::CallLiteral => "call-literal",
            RefKind::CallIdentifier => "call-identifier",
            RefKind::Goto => "goto",
            RefKind::MoveTo => "move-to",
            RefKind::MoveFrom => "move-from",
        }
    }
}

/// A directed reference from the analyzed chunk to a named target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReference {
    pub kind: RefKind,
    pub target: String,
    /// Source line of the statement, 1-based in the original file.
    pub line: u32,
}

static PERFORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPERFORM\s+([A-Z0-9][A-Z0-9-]*)(?:\s+(THRU|THROUGH)\s+([A-Z0-9][A-Z0-9-]*))?")
        .expect("perform pattern")
});

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bCALL\s+("[^"]+"|'[^']+'|[A-Z0-9][A-Z0-9-]*)"#).expect("call pattern"));

static GOTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGO\s+TO\s+([A-Z0-9][A-Z0-9-]*)").expect("goto pattern")
});

static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bMOVE\s+(?:CORRESPONDING\s+|CORR\s+)?(\S+)\s+TO\s+([A-Z0-9][A-Z0-9-]*(?:\s*,\s*[A-Z0-9][A-Z0-9-]*)*)",
    )
    .expect("move pattern")
});

/// Words that follow PERFORM without naming a paragraph.
const PERFORM_NON_TARGETS: [&str; 9] = [
    "UNTIL", "VARYING", "TIMES", "WITH", "TEST", "BEFORE", "AFTER", "THRU", "THROUGH",
];

/// Words that follow CALL without naming a program.
const CALL_NON_TARGETS: [&str; 5] = ["USING", "BY", "REFERENCE", "CONTENT", "VALUE"];

/// Regex-driven semantic extractor for code chunks.
#[derive(Debug, Default)]
pub struct ChunkAnalyzer;

impl ChunkAnalyzer {
    /// Analyze a chunk of source text.
    ///
    /// `first_line` is the original line number of the chunk's first line;
    /// reported edges carry original line numbers. Comment lines never
    /// contribute edges.
    pub fn analyze(chunk: &str, first_line: u32) -> Vec<ChunkReference> {
        let mut refs = Vec::new();

        for (i, line) in chunk.lines().enumerate() {
            let line_no = first_line + i as u32;
            if is_comment(line) {
                continue;
            }
            let code = line.find("*>").map_or(line, |pos| &line[..pos]);
            scan_line(code, line_no, &mut refs);
        }

        refs
    }

    /// Derive edges from a parsed segment instead of raw text.
    ///
    /// Statement nodes carry their collected source text, so extraction
    /// scopes each pattern to a single statement.
    pub fn analyze_ast(root: &AstNode) -> Vec<ChunkReference> {
        let mut refs = Vec::new();
        for statement in root.statements() {
            let Some(text) = statement.text.as_deref() else {
                continue;
            };
            scan_line(text, statement.span.start.line, &mut refs);
        }
        refs
    }
}

/// Collect all edges in one line of code, ordered by match position.
fn scan_line(code: &str, line_no: u32, refs: &mut Vec<ChunkReference>) {
    let mut found: Vec<(usize, ChunkReference)> = Vec::new();

    for caps in PERFORM_RE.captures_iter(code) {
        let target = caps[1].to_ascii_uppercase();
        if PERFORM_NON_TARGETS.contains(&target.as_str()) {
            continue;
        }
        let pos = caps.get(0).unwrap().start();
        found.push((
            pos,
            ChunkReference {
                kind: RefKind::Perform,
                target,
                line: line_no,
            },
        ));
        if let Some(thru) = caps.get(3) {
            found.push((
                pos + 1,
                ChunkReference {
                    kind: RefKind::PerformThru,
                    target: thru.as_str().to_ascii_uppercase(),
                    line: line_no,
                },
            ));
        }
    }

    for caps in CALL_RE.captures_iter(code) {
        let raw = &caps[1];
        let pos = caps.get(0).unwrap().start();
        let (kind, target) = if raw.starts_with('\'') || raw.starts_with('"') {
            (
                RefKind::CallLiteral,
                raw.trim_matches(['\'', '"']).to_ascii_uppercase(),
            )
        } else {
            let upper = raw.to_ascii_uppercase();
            if CALL_NON_TARGETS.contains(&upper.as_str()) {
                continue;
            }
            (RefKind::CallIdentifier, upper)
        };
        found.push((
            pos,
            ChunkReference {
                kind,
                target,
                line: line_no,
            },
        ));
    }

    for caps in GOTO_RE.captures_iter(code) {
        let target = caps[1].to_ascii_uppercase();
        if target == "DEPENDING" {
            continue;
        }
        found.push((
            caps.get(0).unwrap().start(),
            ChunkReference {
                kind: RefKind::Goto,
                target,
                line: line_no,
            },
        ));
    }

    for caps in MOVE_RE.captures_iter(code) {
        let pos = caps.get(0).unwrap().start();
        let source = caps[1].trim_end_matches('.').to_ascii_uppercase();
        found.push((
            pos,
            ChunkReference {
                kind: RefKind::MoveFrom,
                target: source,
                line: line_no,
            },
        ));
        for (offset, target) in caps[2].split(',').map(str::trim).enumerate() {
            if target.is_empty() {
                continue;
            }
            found.push((
                pos + offset + 1,
                ChunkReference {
                    kind: RefKind::MoveTo,
                    target: target.to_ascii_uppercase(),
                    line: line_no,
                },
            ));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    refs.extend(found.into_iter().map(|(_, r)| r));
}

fn is_comment(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() > 6 && (bytes[6] == b'*' || bytes[6] == b'/') {
        return true;
    }
    let leading = line.len() - line.trim_start().len();
    leading < 7 && line.trim_start().starts_with('*')
}

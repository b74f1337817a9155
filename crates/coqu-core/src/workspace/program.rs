//! A loaded program and its summary record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use coqu_lang_core::{Diagnostic, LineSpan};
use serde::Serialize;

use crate::index::{DivisionName, Paragraph, StructuralIndex};
use crate::parse::ParsedAst;
use crate::preprocess::Expansion;
use crate::source::{NormalizedSource, SourceFormat};

/// One COBOL compilation unit loaded into the workspace.
///
/// Identity is the content hash: reloading a changed file replaces the
/// whole value. The structural index and AST are immutable once built;
/// queries borrow read-only views.
#[derive(Debug, Clone)]
pub struct Program {
    /// Workspace name (uppercased file stem, uniquified on collision).
    pub name: String,
    /// Canonical source path.
    pub path: PathBuf,
    /// SHA-256 of the raw source bytes, hex-encoded.
    pub source_hash: String,
    /// Detected source layout.
    pub format: SourceFormat,
    /// Normalized source, retained for body and search queries.
    pub normalized: NormalizedSource,
    /// The structural skeleton.
    pub index: StructuralIndex,
    /// Preprocessor output; absent when the program was rehydrated from
    /// cache and nothing has forced an expansion yet.
    pub expansion: Option<Expansion>,
    /// Full AST, present when a full parse has run.
    pub ast: Option<ParsedAst>,
    /// Load-time diagnostics (unresolved copybooks, COPY cycles). Empty
    /// when the program was rehydrated from cache.
    pub warnings: Vec<Diagnostic>,
    pub loaded_at: DateTime<Utc>,
    /// Whether this load was served from the cache.
    pub from_cache: bool,
    /// Milliseconds spent preprocessing + indexing (zero for cache hits).
    pub parse_time_ms: f64,
}

impl Program {
    /// Line count of the original source.
    pub fn lines(&self) -> u32 {
        self.normalized.line_count()
    }

    /// PROGRAM-ID from the identification division, falling back to the
    /// workspace name.
    pub fn program_id(&self) -> &str {
        self.index.program_id().unwrap_or(&self.name)
    }

    /// Original source text for a line span.
    pub fn body(&self, span: LineSpan) -> String {
        self.normalized.slice(span.start, span.end)
    }

    /// The PROCEDURE DIVISION span, when the program has one.
    pub fn procedure_span(&self) -> Option<LineSpan> {
        self.index
            .division(DivisionName::Procedure)
            .map(|d| d.span)
    }

    /// The source chunk of one paragraph.
    pub fn paragraph_chunk(&self, paragraph: &Paragraph) -> String {
        self.body(paragraph.span)
    }

    /// Build the summary the `/list` surface renders.
    pub fn summary(&self) -> ProgramSummary {
        ProgramSummary {
            name: self.name.clone(),
            program_id: self.program_id().to_string(),
            path: self.path.clone(),
            lines: self.lines(),
            format: self.format,
            hash: self.source_hash.chars().take(12).collect(),
            from_cache: self.from_cache,
        }
    }
}

/// Read-only program summary for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSummary {
    pub name: String,
    pub program_id: String,
    pub path: PathBuf,
    pub lines: u32,
    pub format: SourceFormat,
    /// First 12 hex digits of the content hash.
    pub hash: String,
    pub from_cache: bool,
}

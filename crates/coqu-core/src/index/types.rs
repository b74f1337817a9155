//! Structural index record types.
//!
//! The index is an immutable line-span skeleton of one compilation unit,
//! built without full parsing. All line numbers are 1-based and refer to
//! the original, pre-expansion source. Every record serializes, so the
//! whole index round-trips through the cache codec.

use std::fmt;
use std::path::PathBuf;

use coqu_lang_core::LineSpan;
use serde::{Deserialize, Serialize};

/// The four COBOL divisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DivisionName {
    Identification,
    Environment,
    Data,
    Procedure,
}

impl DivisionName {
    /// Parse a division keyword (accepts the `ID` abbreviation).
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "IDENTIFICATION" | "ID" => Some(Self::Identification),
            "ENVIRONMENT" => Some(Self::Environment),
            "DATA" => Some(Self::Data),
            "PROCEDURE" => Some(Self::Procedure),
            _ => None,
        }
    }

    /// The canonical keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identification => "IDENTIFICATION",
            Self::Environment => "ENVIRONMENT",
            Self::Data => "DATA",
            Self::Procedure => "PROCEDURE",
        }
    }
}

impl fmt::Display for DivisionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A division and its line span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Division {
    pub name: DivisionName,
    pub span: LineSpan,
}

/// A section and its line span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section name without the SECTION keyword.
    pub name: String,
    /// The division containing this section.
    pub division: DivisionName,
    pub span: LineSpan,
}

/// A paragraph in the PROCEDURE DIVISION.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub name: String,
    /// Enclosing section, if the paragraph sits inside one.
    pub section: Option<String>,
    pub division: DivisionName,
    pub span: LineSpan,
}

/// Which DATA DIVISION section a data item was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    WorkingStorage,
    File,
    Linkage,
    LocalStorage,
    Other,
}

/// A data description entry, captured structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    /// Level number: 01-49, 66, 77, or 88.
    pub level: u8,
    pub name: String,
    pub line: u32,
    /// The PIC clause text, verbatim, when present.
    pub pic: Option<String>,
    /// Parent item by level nesting; None for 01 and 77 levels.
    pub parent: Option<String>,
    /// The DATA DIVISION section holding the declaration.
    pub storage: StorageKind,
}

/// A COPY directive as written in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyDirective {
    pub name: String,
    /// `OF`/`IN` library qualifier, when present.
    pub library: Option<String>,
    pub line: u32,
    /// The REPLACING clause text, verbatim, when present.
    pub replacing: Option<String>,
    pub resolved: bool,
    pub resolved_path: Option<PathBuf>,
}

/// Embedded EXEC block dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecKind {
    Sql,
    Cics,
    Dli,
}

impl ExecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "SQL",
            Self::Cics => "CICS",
            Self::Dli => "DLI",
        }
    }
}

/// An `EXEC ... END-EXEC` block captured verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecBlock {
    pub kind: ExecKind,
    pub span: LineSpan,
    /// Body text between EXEC and END-EXEC, verbatim.
    pub text: String,
}

/// Comment placement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentClass {
    /// Immediately precedes a structural header, or opens the file.
    Header,
    /// Trails code on the same line (`*> ...`).
    Inline,
    /// Free-standing comment attached to nothing.
    Orphan,
}

/// A comment found during indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub line: u32,
    /// 1-based column of the comment indicator.
    pub column: u32,
    pub text: String,
    pub class: CommentClass,
}

/// One recognized statement head in the PROCEDURE DIVISION.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    /// The statement verb (MOVE, PERFORM, CALL, ...).
    pub verb: String,
    pub line: u32,
    /// Containing paragraph, when one has been opened.
    pub paragraph: Option<String>,
}

/// An IDENTIFICATION DIVISION entry (PROGRAM-ID, AUTHOR, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdEntry {
    pub key: String,
    pub value: Option<String>,
    pub line: u32,
}

/// Immutable structural snapshot of one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralIndex {
    pub divisions: Vec<Division>,
    pub sections: Vec<Section>,
    pub paragraphs: Vec<Paragraph>,
    pub data_items: Vec<DataItem>,
    pub copy_directives: Vec<CopyDirective>,
    pub exec_blocks: Vec<ExecBlock>,
    pub comments: Vec<Comment>,
    pub statements: Vec<StatementEntry>,
    pub id_entries: Vec<IdEntry>,
    pub line_count: u32,
}

impl StructuralIndex {
    /// Look up a division.
    pub fn division(&self, name: DivisionName) -> Option<&Division> {
        self.divisions.iter().find(|d| d.name == name)
    }

    /// Look up a section by name, case-insensitive.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Look up a paragraph by name, case-insensitive.
    pub fn paragraph(&self, name: &str) -> Option<&Paragraph> {
        self.paragraphs
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Paragraphs contained in a named section. A section with no
    /// paragraphs yields an empty list, never an error.
    pub fn paragraphs_in_section(&self, section: &str) -> Vec<&Paragraph> {
        self.paragraphs
            .iter()
            .filter(|p| {
                p.section
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(section))
            })
            .collect()
    }

    /// The PROGRAM-ID value, when one was captured.
    pub fn program_id(&self) -> Option<&str> {
        self.id_entries
            .iter()
            .find(|e| e.key == "PROGRAM-ID")
            .and_then(|e| e.value.as_deref())
    }

    /// Data items declared in a given DATA DIVISION section.
    pub fn data_items_in(&self, storage: StorageKind) -> Vec<&DataItem> {
        self.data_items
            .iter()
            .filter(|d| d.storage == storage)
            .collect()
    }

    /// Check the structural invariants; returns human-readable violations.
    ///
    /// Used by tests and debug assertions: every section and paragraph must
    /// sit inside exactly one division span, sibling spans must not
    /// overlap, and no span may exceed the source line count.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for section in &self.sections {
            let containing = self
                .divisions
                .iter()
                .filter(|d| section.span.is_within(d.span))
                .count();
            if containing != 1 {
                problems.push(format!(
                    "section {} is contained in {containing} divisions",
                    section.name
                ));
            }
        }

        for paragraph in &self.paragraphs {
            let containing = self
                .divisions
                .iter()
                .filter(|d| paragraph.span.is_within(d.span))
                .count();
            if containing != 1 {
                problems.push(format!(
                    "paragraph {} is contained in {containing} divisions",
                    paragraph.name
                ));
            }
        }

        for window in self.divisions.windows(2) {
            if window[1].span.start <= window[0].span.end {
                problems.push(format!(
                    "divisions {} and {} overlap",
                    window[0].name, window[1].name
                ));
            }
        }
        for window in self.paragraphs.windows(2) {
            if window[1].span.start <= window[0].span.end {
                problems.push(format!(
                    "paragraphs {} and {} overlap",
                    window[0].name, window[1].name
                ));
            }
        }

        let max_end = self
            .divisions
            .iter()
            .map(|d| d.span.end)
            .chain(self.sections.iter().map(|s| s.span.end))
            .chain(self.paragraphs.iter().map(|p| p.span.end))
            .max()
            .unwrap_or(0);
        if max_end > self.line_count {
            problems.push(format!(
                "span end {max_end} exceeds line count {}",
                self.line_count
            ));
        }

        problems
    }
}

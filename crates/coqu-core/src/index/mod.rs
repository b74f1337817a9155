//! Structural indexer.
//!
//! A single linear pass over normalized source drives a small family of
//! compiled regular expressions and produces the navigable skeleton of the
//! program: divisions, sections, paragraphs, data items, COPY directives,
//! EXEC blocks, comments, and a statement census. Designed for multi-million
//! line files where full parsing is too slow.
//!
//! The indexer never fails: a line that matches no pattern contributes
//! nothing to the structure and remains available to text search.

mod types;

use std::sync::LazyLock;

use coqu_lang_core::LineSpan;
use regex::Regex;

pub use types::{
    Comment, CommentClass, CopyDirective, DataItem, Division, DivisionName, ExecBlock, ExecKind,
    IdEntry, Paragraph, Section, StatementEntry, StorageKind, StructuralIndex,
};

use crate::source::NormalizedSource;

static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(IDENTIFICATION|ID|ENVIRONMENT|DATA|PROCEDURE)\s+DIVISION(\s+USING\s+[^.]*)?\s*\.")
        .expect("division pattern")
});

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([A-Z0-9][A-Z0-9-]*)\s+SECTION\s*(USING\s+[^.]*)?\s*\.")
        .expect("section pattern")
});

static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([A-Z0-9][A-Z0-9-]*)\s*\.\s*$").expect("paragraph pattern"));

static DATA_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,2})\s+([A-Z0-9][A-Z0-9-]*)\b(.*)$").expect("data item pattern")
});

static PIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPIC(?:TURE)?(?:\s+IS)?\s+[A-Z0-9()VSXZ$*,.+-]+").expect("pic pattern")
});

static COPY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^COPY\s+['"]?([A-Z0-9][A-Z0-9-]*)['"]?(?:\s+(?:OF|IN)\s+([A-Z0-9][A-Z0-9-]*))?(?:\s+REPLACING\s+(.*?))?\s*\.$"#,
    )
    .expect("copy pattern")
});

static EXEC_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^EXEC\s+(SQL|CICS|DLI)\b").expect("exec pattern"));

static PROGRAM_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*PROGRAM-ID\s*\.?\s*([A-Z0-9][A-Z0-9-]*)?").expect("program-id pattern")
});

/// Names the paragraph pattern must never accept.
const PARAGRAPH_RESERVED: [&str; 7] = [
    "DIVISION",
    "SECTION",
    "EXIT",
    "END",
    "STOP",
    "CONTINUE",
    "GOBACK",
];

/// Statement verbs recognized by the census pass.
const STATEMENT_VERBS: [&str; 31] = [
    "MOVE",
    "PERFORM",
    "CALL",
    "IF",
    "EVALUATE",
    "READ",
    "WRITE",
    "REWRITE",
    "DELETE",
    "START",
    "OPEN",
    "CLOSE",
    "DISPLAY",
    "ACCEPT",
    "COMPUTE",
    "ADD",
    "SUBTRACT",
    "MULTIPLY",
    "DIVIDE",
    "STRING",
    "UNSTRING",
    "INSPECT",
    "INITIALIZE",
    "SET",
    "GO",
    "STOP",
    "EXIT",
    "CONTINUE",
    "RETURN",
    "SEARCH",
    "SORT",
];

/// Identification division keys captured into [`IdEntry`] records.
const ID_KEYS: [&str; 4] = ["PROGRAM-ID", "AUTHOR", "DATE-WRITTEN", "DATE-COMPILED"];

struct ExecAccum {
    kind: ExecKind,
    start: u32,
}

struct CopyAccum {
    start: u32,
    text: String,
}

/// Regex-driven structural indexer.
#[derive(Debug, Default)]
pub struct StructuralIndexer;

impl StructuralIndexer {
    /// Build the structural index of a normalized source.
    pub fn index(source: &NormalizedSource) -> StructuralIndex {
        let mut ix = StructuralIndex {
            line_count: source.line_count(),
            ..Default::default()
        };

        let mut current_division: Option<DivisionName> = None;
        let mut current_storage = StorageKind::Other;
        let mut current_section: Option<String> = None;
        let mut current_paragraph: Option<String> = None;
        let mut data_stack: Vec<(u8, String)> = Vec::new();
        let mut last_data_parent: Option<String> = None;
        let mut exec: Option<ExecAccum> = None;
        let mut copy: Option<CopyAccum> = None;

        for (i, raw) in source.lines.iter().enumerate() {
            let line_no = (i + 1) as u32;

            if let Some(column) = full_line_comment_column(raw) {
                ix.comments.push(Comment {
                    line: line_no,
                    column,
                    text: raw[column as usize..].trim().to_string(),
                    class: CommentClass::Orphan,
                });
                continue;
            }

            // Inline `*>` comment: record it and index only the code part.
            let code = match raw.find("*>") {
                Some(pos) if !raw[..pos].trim().is_empty() => {
                    ix.comments.push(Comment {
                        line: line_no,
                        column: pos as u32 + 1,
                        text: raw[pos + 2..].trim().to_string(),
                        class: CommentClass::Inline,
                    });
                    &raw[..pos]
                }
                _ => raw.as_str(),
            };

            if let Some(accum) = exec.as_mut() {
                if code.to_ascii_uppercase().contains("END-EXEC") {
                    let span = LineSpan::new(accum.start, line_no);
                    ix.exec_blocks.push(ExecBlock {
                        kind: accum.kind,
                        span,
                        text: source.slice(span.start, span.end),
                    });
                    exec = None;
                }
                continue;
            }

            let trimmed = code.trim();

            if let Some(accum) = copy.as_mut() {
                accum.text.push(' ');
                accum.text.push_str(trimmed);
                if accum.text.trim_end().ends_with('.') {
                    if let Some(directive) = parse_copy(&accum.text, accum.start) {
                        ix.copy_directives.push(directive);
                    }
                    copy = None;
                }
                continue;
            }

            if trimmed.is_empty() {
                continue;
            }

            if let Some(caps) = DIVISION_RE.captures(code) {
                if let Some(name) = DivisionName::parse(&caps[1]) {
                    ix.divisions.push(Division {
                        name,
                        span: LineSpan::single(line_no),
                    });
                    current_division = Some(name);
                    current_section = None;
                    current_paragraph = None;
                    current_storage = StorageKind::Other;
                    data_stack.clear();
                    continue;
                }
            }

            if let Some(division) = current_division {
                if let Some(caps) = SECTION_RE.captures(code) {
                    let name = caps[1].to_ascii_uppercase();
                    ix.sections.push(Section {
                        name: name.clone(),
                        division,
                        span: LineSpan::single(line_no),
                    });
                    if division == DivisionName::Data {
                        current_storage = storage_kind(&name);
                    }
                    if division == DivisionName::Procedure {
                        current_section = Some(name);
                        current_paragraph = None;
                    }
                    continue;
                }
            }

            let upper = trimmed.to_ascii_uppercase();

            if upper.starts_with("COPY ") || upper == "COPY" {
                if upper.ends_with('.') {
                    if let Some(directive) = parse_copy(trimmed, line_no) {
                        ix.copy_directives.push(directive);
                    }
                } else {
                    copy = Some(CopyAccum {
                        start: line_no,
                        text: trimmed.to_string(),
                    });
                }
                continue;
            }

            if let Some(caps) = EXEC_START_RE.captures(trimmed) {
                let kind = match caps[1].to_ascii_uppercase().as_str() {
                    "SQL" => ExecKind::Sql,
                    "CICS" => ExecKind::Cics,
                    _ => ExecKind::Dli,
                };
                if upper.contains("END-EXEC") {
                    ix.exec_blocks.push(ExecBlock {
                        kind,
                        span: LineSpan::single(line_no),
                        text: raw.clone(),
                    });
                } else {
                    exec = Some(ExecAccum {
                        kind,
                        start: line_no,
                    });
                }
                continue;
            }

            match current_division {
                Some(DivisionName::Identification) => {
                    if let Some(entry) = parse_id_entry(trimmed, line_no) {
                        ix.id_entries.push(entry);
                        continue;
                    }
                }
                Some(DivisionName::Data) => {
                    if let Some(item) = parse_data_item(
                        code,
                        line_no,
                        current_storage,
                        &mut data_stack,
                        &mut last_data_parent,
                    ) {
                        ix.data_items.push(item);
                        continue;
                    }
                }
                Some(DivisionName::Procedure) => {
                    // Paragraph names start in Area A (columns 8-11); a
                    // lone `END-READ.` indented into Area B is statement
                    // text, not a header.
                    let leading = code.len() - code.trim_start().len();
                    if let Some(caps) = (leading <= 10).then(|| PARAGRAPH_RE.captures(code)).flatten() {
                        let name = caps[1].to_ascii_uppercase();
                        if !PARAGRAPH_RESERVED.contains(&name.as_str()) {
                            ix.paragraphs.push(Paragraph {
                                name: name.clone(),
                                section: current_section.clone(),
                                division: DivisionName::Procedure,
                                span: LineSpan::single(line_no),
                            });
                            current_paragraph = Some(name);
                            continue;
                        }
                    }
                    let first_word = upper.split_whitespace().next().unwrap_or("");
                    let verb = first_word.trim_end_matches('.');
                    if STATEMENT_VERBS.contains(&verb) {
                        ix.statements.push(StatementEntry {
                            verb: verb.to_string(),
                            line: line_no,
                            paragraph: current_paragraph.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        // Unterminated trailing EXEC block: close it at end of file.
        if let Some(accum) = exec {
            let span = LineSpan::new(accum.start, ix.line_count);
            ix.exec_blocks.push(ExecBlock {
                kind: accum.kind,
                span,
                text: source.slice(span.start, span.end),
            });
        }

        compute_spans(&mut ix);
        classify_comments(&mut ix, source);
        ix
    }
}

/// Column (1-based) of a full-line comment indicator, if the line is one.
fn full_line_comment_column(line: &str) -> Option<u32> {
    let bytes = line.as_bytes();
    if bytes.len() > 6 && (bytes[6] == b'*' || bytes[6] == b'/') {
        return Some(7);
    }
    // Free-form or short lines: a '*' opening the line within the sequence
    // and indicator area is still a comment.
    let leading = line.len() - line.trim_start().len();
    if leading < 7 && line.trim_start().starts_with('*') {
        return Some(leading as u32 + 1);
    }
    None
}

fn storage_kind(section_name: &str) -> StorageKind {
    match section_name {
        "WORKING-STORAGE" => StorageKind::WorkingStorage,
        "FILE" => StorageKind::File,
        "LINKAGE" => StorageKind::Linkage,
        "LOCAL-STORAGE" => StorageKind::LocalStorage,
        _ => StorageKind::Other,
    }
}

/// Parse a complete COPY statement (terminated by a period).
pub(crate) fn parse_copy(stmt: &str, line: u32) -> Option<CopyDirective> {
    let caps = COPY_RE.captures(stmt.trim())?;
    Some(CopyDirective {
        name: caps[1].to_ascii_uppercase(),
        library: caps.get(2).map(|m| m.as_str().to_ascii_uppercase()),
        line,
        replacing: caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()),
        resolved: false,
        resolved_path: None,
    })
}

fn parse_id_entry(trimmed: &str, line: u32) -> Option<IdEntry> {
    let upper = trimmed.to_ascii_uppercase();
    let key = ID_KEYS.iter().find(|k| upper.starts_with(*k))?;

    if *key == "PROGRAM-ID" {
        let value = PROGRAM_ID_RE
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_end_matches('.').to_ascii_uppercase());
        return Some(IdEntry {
            key: (*key).to_string(),
            value,
            line,
        });
    }

    let rest = trimmed[key.len()..]
        .trim_start_matches('.')
        .trim()
        .trim_end_matches('.')
        .trim();
    Some(IdEntry {
        key: (*key).to_string(),
        value: (!rest.is_empty()).then(|| rest.to_string()),
        line,
    })
}

fn parse_data_item(
    code: &str,
    line: u32,
    storage: StorageKind,
    stack: &mut Vec<(u8, String)>,
    last_parent: &mut Option<String>,
) -> Option<DataItem> {
    let caps = DATA_ITEM_RE.captures(code)?;
    let level: u8 = caps[1].parse().ok()?;
    if !((1..=49).contains(&level) || level == 66 || level == 77 || level == 88) {
        return None;
    }
    let name = caps[2].to_ascii_uppercase();
    let rest = caps.get(3).map_or("", |m| m.as_str());

    let pic = PIC_RE
        .find(rest)
        .map(|m| m.as_str().trim_end_matches('.').to_string());

    let parent = match level {
        1 | 77 => {
            stack.clear();
            None
        }
        66 | 88 => last_parent.clone(),
        _ => {
            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            stack.last().map(|(_, n)| n.clone())
        }
    };

    if level != 66 && level != 88 {
        stack.push((level, name.clone()));
        *last_parent = Some(name.clone());
    }

    Some(DataItem {
        level,
        name,
        line,
        pic,
        parent,
        storage,
    })
}

/// Close every span at the next peer header, per §4.3: each header
/// terminates its predecessor at the previous line; the last division runs
/// to end of file.
fn compute_spans(ix: &mut StructuralIndex) {
    let total = ix.line_count;

    let division_starts: Vec<u32> = ix.divisions.iter().map(|d| d.span.start).collect();
    for (i, division) in ix.divisions.iter_mut().enumerate() {
        division.span.end = division_starts
            .get(i + 1)
            .map(|next| next - 1)
            .unwrap_or(total);
    }

    let section_starts: Vec<u32> = ix.sections.iter().map(|s| s.span.start).collect();
    for (i, section) in ix.sections.iter_mut().enumerate() {
        let division_end = ix
            .divisions
            .iter()
            .find(|d| d.span.contains_line(section.span.start))
            .map(|d| d.span.end)
            .unwrap_or(total);
        section.span.end = section_starts
            .get(i + 1)
            .map(|next| (next - 1).min(division_end))
            .unwrap_or(division_end);
    }

    let paragraph_starts: Vec<u32> = ix.paragraphs.iter().map(|p| p.span.start).collect();
    for (i, paragraph) in ix.paragraphs.iter_mut().enumerate() {
        let outer_end = ix
            .sections
            .iter()
            .find(|s| {
                s.division == DivisionName::Procedure && s.span.contains_line(paragraph.span.start)
            })
            .map(|s| s.span.end)
            .or_else(|| {
                ix.divisions
                    .iter()
                    .find(|d| d.span.contains_line(paragraph.span.start))
                    .map(|d| d.span.end)
            })
            .unwrap_or(total);
        paragraph.span.end = paragraph_starts
            .get(i + 1)
            .map(|next| (next - 1).min(outer_end))
            .unwrap_or(outer_end);
    }
}

/// Classify full-line comments: a run of comments immediately preceding a
/// structural header (or opening the file) is a header comment; everything
/// else free-standing is an orphan.
fn classify_comments(ix: &mut StructuralIndex, source: &NormalizedSource) {
    use std::collections::HashSet;

    let mut header_starts: HashSet<u32> = HashSet::new();
    header_starts.extend(ix.divisions.iter().map(|d| d.span.start));
    header_starts.extend(ix.sections.iter().map(|s| s.span.start));
    header_starts.extend(ix.paragraphs.iter().map(|p| p.span.start));
    header_starts.extend(ix.data_items.iter().filter(|d| d.level == 1).map(|d| d.line));

    let comment_lines: HashSet<u32> = ix
        .comments
        .iter()
        .filter(|c| c.class != CommentClass::Inline)
        .map(|c| c.line)
        .collect();

    let first_division = ix.divisions.first().map(|d| d.span.start).unwrap_or(u32::MAX);

    for comment in &mut ix.comments {
        if comment.class == CommentClass::Inline {
            continue;
        }
        if comment.line < first_division {
            comment.class = CommentClass::Header;
            continue;
        }
        let mut next = comment.line + 1;
        while next <= source.line_count() {
            if comment_lines.contains(&next) {
                next += 1;
                continue;
            }
            if source.line(next).is_some_and(|l| l.trim().is_empty()) {
                next += 1;
                continue;
            }
            break;
        }
        if header_starts.contains(&next) {
            comment.class = CommentClass::Header;
        }
    }
}

//! COBOL-85 preprocessing: COPY expansion, REPLACE, and EXEC pass-through.
//!
//! The preprocessor turns normalized source into an expanded token stream
//! with an [`OriginMap`] tying every emitted line back to exactly one
//! `(file, line)` of input. Unresolved copybooks never fail the run; the
//! directive is replaced by a single placeholder comment so downstream
//! line anchoring survives, and a warning diagnostic is recorded.
//!
//! Output is a pure function of the source text, the copybook file
//! contents, and the search paths at expansion time.

mod copybook;

use std::path::{Path, PathBuf};

use coqu_lang_core::{Diagnostic, LineSpan, SrcPos};
use regex::Regex;

pub use copybook::{CopybookDep, CopybookResolver, COPYBOOK_EXTENSIONS};

use crate::index::{parse_copy, CopyDirective, ExecBlock, ExecKind};
use crate::source::{normalize, NormalizedSource};

/// Where an expanded line came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// Source file; `None` means the root compilation unit.
    pub file: Option<PathBuf>,
    /// 1-based line within that file.
    pub line: u32,
}

/// Mapping from post-preprocessor line numbers to pre-preprocessor input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OriginMap {
    entries: Vec<Origin>,
}

impl OriginMap {
    /// Origin of a 1-based expanded line.
    pub fn lookup(&self, expanded_line: u32) -> Option<&Origin> {
        self.entries.get(expanded_line.checked_sub(1)? as usize)
    }

    /// Number of mapped lines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no lines are mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One textual substitution, from a REPLACING clause or REPLACE directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    /// Pattern text without `==` delimiters.
    pub from: String,
    /// Replacement text without delimiters. Empty means delete.
    pub to: String,
}

impl Replacement {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The preprocessor's output for one compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// The expanded stream, one entry per line.
    pub lines: Vec<String>,
    /// Per-line provenance, parallel to `lines`.
    pub origin_map: OriginMap,
    /// Every COPY directive seen, with resolution status.
    pub copies: Vec<CopyDirective>,
    /// EXEC blocks in the expanded stream (spans refer to expanded lines).
    pub exec_blocks: Vec<ExecBlock>,
    /// Unresolved copies, cycles, and other recoverable conditions.
    pub warnings: Vec<Diagnostic>,
}

/// COPY/REPLACE expander.
#[derive(Debug)]
pub struct Preprocessor<'a> {
    resolver: &'a CopybookResolver,
    max_depth: usize,
}

struct ExpandState {
    lines: Vec<String>,
    origins: Vec<Origin>,
    copies: Vec<CopyDirective>,
    exec_blocks: Vec<ExecBlock>,
    warnings: Vec<Diagnostic>,
    replace_table: Vec<Replacement>,
    expanding: Vec<String>,
}

impl ExpandState {
    fn emit(&mut self, text: String, file: Option<&Path>, line: u32) {
        self.lines.push(text);
        self.origins.push(Origin {
            file: file.map(Path::to_path_buf),
            line,
        });
    }
}

impl<'a> Preprocessor<'a> {
    /// Create a preprocessor over a copybook resolver.
    pub fn new(resolver: &'a CopybookResolver) -> Self {
        Self {
            resolver,
            max_depth: 16,
        }
    }

    /// Set the maximum COPY nesting depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Expand a normalized root source.
    pub fn expand(&self, root: &NormalizedSource) -> Expansion {
        let mut state = ExpandState {
            lines: Vec::with_capacity(root.lines.len()),
            origins: Vec::with_capacity(root.lines.len()),
            copies: Vec::new(),
            exec_blocks: Vec::new(),
            warnings: Vec::new(),
            replace_table: Vec::new(),
            expanding: Vec::new(),
        };
        self.expand_lines(&root.lines, None, 0, &mut state);
        Expansion {
            lines: state.lines,
            origin_map: OriginMap {
                entries: state.origins,
            },
            copies: state.copies,
            exec_blocks: state.exec_blocks,
            warnings: state.warnings,
        }
    }

    fn expand_lines(
        &self,
        lines: &[String],
        file: Option<&Path>,
        depth: usize,
        st: &mut ExpandState,
    ) {
        let mut exec: Option<(ExecKind, u32, Vec<String>)> = None;
        let mut copy_buf: Option<(u32, String)> = None;
        let mut replace_buf: Option<String> = None;

        for (i, raw) in lines.iter().enumerate() {
            let line_no = (i + 1) as u32;

            if is_comment_line(raw) {
                st.emit(raw.clone(), file, line_no);
                continue;
            }

            if let Some((kind, start, body)) = exec.as_mut() {
                body.push(raw.clone());
                st.emit(raw.clone(), file, line_no);
                if raw.to_ascii_uppercase().contains("END-EXEC") {
                    let kind = *kind;
                    let span = LineSpan::new(*start, st.lines.len() as u32);
                    let text = body.join("\n");
                    st.emit(EXEC_END_SENTINEL.to_string(), file, line_no);
                    st.exec_blocks.push(ExecBlock { kind, span, text });
                    exec = None;
                }
                continue;
            }

            let trimmed = raw.trim();

            if let Some(buf) = replace_buf.as_mut() {
                buf.push(' ');
                buf.push_str(trimmed);
                st.emit(format!("      *> {trimmed}"), file, line_no);
                if trimmed.ends_with('.') {
                    apply_replace_directive(buf, &mut st.replace_table);
                    replace_buf = None;
                }
                continue;
            }

            if let Some((start, buf)) = copy_buf.as_mut() {
                buf.push(' ');
                buf.push_str(trimmed);
                if trimmed.ends_with('.') {
                    let stmt = buf.clone();
                    let start = *start;
                    copy_buf = None;
                    self.finish_copy(&stmt, start, file, depth, st);
                }
                continue;
            }

            if trimmed.is_empty() {
                st.emit(raw.clone(), file, line_no);
                continue;
            }

            let upper = trimmed.to_ascii_uppercase();

            if upper.starts_with("REPLACE ") || upper == "REPLACE" {
                st.emit(format!("      *> {trimmed}"), file, line_no);
                if trimmed.ends_with('.') {
                    apply_replace_directive(trimmed, &mut st.replace_table);
                } else {
                    replace_buf = Some(trimmed.to_string());
                }
                continue;
            }

            if upper.starts_with("COPY ") || upper == "COPY" {
                if trimmed.ends_with('.') {
                    self.finish_copy(trimmed, line_no, file, depth, st);
                } else {
                    copy_buf = Some((line_no, trimmed.to_string()));
                }
                continue;
            }

            if let Some(kind) = exec_kind(&upper) {
                st.emit(format!("{EXEC_BEGIN_SENTINEL} {}", kind.as_str()), file, line_no);
                let start = st.lines.len() as u32 + 1;
                if upper.contains("END-EXEC") {
                    st.emit(raw.clone(), file, line_no);
                    st.emit(EXEC_END_SENTINEL.to_string(), file, line_no);
                    st.exec_blocks.push(ExecBlock {
                        kind,
                        span: LineSpan::single(start),
                        text: raw.clone(),
                    });
                } else {
                    st.emit(raw.clone(), file, line_no);
                    exec = Some((kind, start, vec![raw.clone()]));
                }
                continue;
            }

            let emitted = if st.replace_table.is_empty() {
                raw.clone()
            } else {
                apply_replacements(raw, &st.replace_table)
            };
            st.emit(emitted, file, line_no);
        }

        if let Some((start, buf)) = copy_buf {
            st.warnings.push(
                Diagnostic::warning("unterminated-copy", format!("unterminated COPY: {buf}"))
                    .at(SrcPos::new(start, 8)),
            );
        }
        if let Some((kind, start, body)) = exec {
            let span = LineSpan::new(start, st.lines.len() as u32);
            st.emit(EXEC_END_SENTINEL.to_string(), file, lines.len() as u32);
            st.exec_blocks.push(ExecBlock {
                kind,
                span,
                text: body.join("\n"),
            });
        }
    }

    fn finish_copy(
        &self,
        stmt: &str,
        line: u32,
        file: Option<&Path>,
        depth: usize,
        st: &mut ExpandState,
    ) {
        let Some(mut directive) = parse_copy(stmt, line) else {
            st.warnings.push(
                Diagnostic::warning("malformed-copy", format!("unparsable COPY: {stmt}"))
                    .at(SrcPos::new(line, 8)),
            );
            st.emit(format!("      *> {stmt}"), file, line);
            return;
        };

        let Some(path) = self.resolver.resolve(&directive.name) else {
            st.warnings.push(
                Diagnostic::warning(
                    "unresolved-copy",
                    format!("copybook '{}' not found on search path", directive.name),
                )
                .at(SrcPos::new(line, 8)),
            );
            st.emit(
                format!("      *> COPY {} (unresolved)", directive.name),
                file,
                line,
            );
            st.copies.push(directive);
            return;
        };

        directive.resolved = true;
        directive.resolved_path = Some(path.clone());

        if st.expanding.contains(&directive.name) {
            st.warnings.push(
                Diagnostic::warning(
                    "cyclic-copy",
                    format!("COPY cycle via '{}'; expansion skipped", directive.name),
                )
                .at(SrcPos::new(line, 8)),
            );
            st.emit(
                format!("      *> COPY {} (cycle skipped)", directive.name),
                file,
                line,
            );
            st.copies.push(directive);
            return;
        }

        if depth >= self.max_depth {
            st.warnings.push(
                Diagnostic::warning(
                    "copy-depth",
                    format!(
                        "COPY nesting deeper than {} at '{}'",
                        self.max_depth, directive.name
                    ),
                )
                .at(SrcPos::new(line, 8)),
            );
            st.emit(
                format!("      *> COPY {} (depth limit)", directive.name),
                file,
                line,
            );
            st.copies.push(directive);
            return;
        }

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                st.warnings.push(
                    Diagnostic::warning(
                        "unresolved-copy",
                        format!("cannot read copybook '{}': {err}", directive.name),
                    )
                    .at(SrcPos::new(line, 8)),
                );
                st.emit(
                    format!("      *> COPY {} (unreadable)", directive.name),
                    file,
                    line,
                );
                directive.resolved = false;
                directive.resolved_path = None;
                st.copies.push(directive);
                return;
            }
        };

        let replacements = directive
            .replacing
            .as_deref()
            .map(parse_replacement_pairs)
            .unwrap_or_default();

        let normalized = normalize(&text);
        let body: Vec<String> = if replacements.is_empty() {
            normalized.lines
        } else {
            normalized
                .lines
                .iter()
                .map(|l| apply_replacements(l, &replacements))
                .collect()
        };

        st.emit(
            format!("      *> COPY {} (from {})", directive.name, path.display()),
            file,
            line,
        );
        st.expanding.push(directive.name.clone());
        self.expand_lines(&body, Some(&path), depth + 1, st);
        st.expanding.pop();
        st.copies.push(directive);
    }
}

const EXEC_BEGIN_SENTINEL: &str = "      *>EXEC-BEGIN";
const EXEC_END_SENTINEL: &str = "      *>EXEC-END";

fn is_comment_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() > 6 && (bytes[6] == b'*' || bytes[6] == b'/') {
        return true;
    }
    let leading = line.len() - line.trim_start().len();
    leading < 7 && line.trim_start().starts_with('*')
}

fn exec_kind(upper_trimmed: &str) -> Option<ExecKind> {
    let rest = upper_trimmed.strip_prefix("EXEC")?;
    let rest = rest.trim_start();
    if rest.starts_with("SQL") {
        Some(ExecKind::Sql)
    } else if rest.starts_with("CICS") {
        Some(ExecKind::Cics)
    } else if rest.starts_with("DLI") {
        Some(ExecKind::Dli)
    } else {
        None
    }
}

/// Apply a REPLACE directive body to the active substitution table.
fn apply_replace_directive(stmt: &str, table: &mut Vec<Replacement>) {
    let body = stmt
        .trim()
        .strip_prefix("REPLACE")
        .or_else(|| stmt.trim().strip_prefix("replace"))
        .unwrap_or(stmt)
        .trim()
        .trim_end_matches('.')
        .trim();

    if body.eq_ignore_ascii_case("OFF") {
        table.clear();
        return;
    }

    // A new REPLACE statement supersedes the previous one.
    *table = parse_replacement_pairs(body);
}

/// Parse `==from== BY ==to==` pairs (word operands also accepted).
pub fn parse_replacement_pairs(body: &str) -> Vec<Replacement> {
    let mut pairs = Vec::new();
    let mut rest = body.trim();

    while !rest.is_empty() {
        let Some((from, after_from)) = extract_operand(rest) else {
            break;
        };
        rest = after_from.trim_start();

        let upper = rest.to_ascii_uppercase();
        if !(upper.starts_with("BY ") || upper.starts_with("BY=")) {
            break;
        }
        rest = rest[2..].trim_start();

        let Some((to, after_to)) = extract_operand(rest) else {
            break;
        };
        rest = after_to.trim_start();

        pairs.push(Replacement::new(from, to));
    }

    pairs
}

/// Pull one operand off the front: pseudo-text `==…==` or a single word.
fn extract_operand(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    if let Some(inner) = text.strip_prefix("==") {
        let close = inner.find("==")?;
        return Some((inner[..close].trim().to_string(), &inner[close + 2..]));
    }
    let end = text
        .find(char::is_whitespace)
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    Some((text[..end].trim_end_matches('.').to_string(), &text[end..]))
}

/// Apply substitutions to one line of text.
///
/// Pseudo-text matching is whitespace-insensitive and case-insensitive;
/// operands bounded by word characters replace whole words only, while
/// partial-word tags (`:TAG:`) substitute inside words.
pub fn apply_replacements(line: &str, replacements: &[Replacement]) -> String {
    let mut result = line.to_string();
    for replacement in replacements {
        if replacement.from.is_empty() {
            continue;
        }
        if let Some(re) = replacement_regex(&replacement.from) {
            // `$` is the only special character in a replacement string.
            let literal = replacement.to.replace('$', "$$");
            result = re.replace_all(&result, literal.as_str()).into_owned();
        }
    }
    result
}

fn replacement_regex(from: &str) -> Option<Regex> {
    let tokens: Vec<String> = from.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return None;
    }
    let mut pattern = tokens.join(r"\s+");
    if from.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        pattern = format!(r"\b{pattern}");
    }
    if from.ends_with(|c: char| c.is_ascii_alphanumeric()) {
        pattern = format!(r"{pattern}\b");
    }
    Regex::new(&format!("(?i){pattern}")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn expand_with(dir: Option<&Path>, source: &str) -> Expansion {
        let resolver = CopybookResolver::new(dir.map(Path::to_path_buf).into_iter().collect());
        let preprocessor = Preprocessor::new(&resolver);
        preprocessor.expand(&normalize(source))
    }

    #[test]
    fn test_passthrough_without_directives() {
        let source = "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. T.\n";
        let expansion = expand_with(None, source);
        assert_eq!(expansion.lines.len(), 2);
        assert_eq!(expansion.lines[0], "       IDENTIFICATION DIVISION.");
        assert!(expansion.warnings.is_empty());
        let origin = expansion.origin_map.lookup(2).unwrap();
        assert_eq!(origin.file, None);
        assert_eq!(origin.line, 2);
    }

    #[test]
    fn test_resolved_copy_inlined_with_origin() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("custrec.cpy"),
            "       01  CUST-REC.\n           05  CUST-ID  PIC 9(6).\n",
        )
        .unwrap();

        let source = "       DATA DIVISION.\n       COPY CUSTREC.\n       PROCEDURE DIVISION.\n";
        let expansion = expand_with(Some(tmp.path()), source);

        assert!(expansion.warnings.is_empty());
        assert_eq!(expansion.copies.len(), 1);
        assert!(expansion.copies[0].resolved);

        let joined = expansion.lines.join("\n");
        assert!(joined.contains("CUST-ID"));

        // Lines pulled from the copybook map back to the copybook file.
        let copybook_line = expansion
            .lines
            .iter()
            .position(|l| l.contains("CUST-ID"))
            .unwrap() as u32
            + 1;
        let origin = expansion.origin_map.lookup(copybook_line).unwrap();
        assert!(origin.file.as_ref().unwrap().ends_with("custrec.cpy"));
        assert_eq!(origin.line, 2);
    }

    #[test]
    fn test_unresolved_copy_placeholder() {
        let source = "       DATA DIVISION.\n       COPY DATEUTIL.\n       PROCEDURE DIVISION.\n";
        let expansion = expand_with(None, source);

        assert_eq!(expansion.warnings.len(), 1);
        assert_eq!(expansion.warnings[0].code, "unresolved-copy");
        assert!(expansion.warnings[0].message.contains("DATEUTIL"));
        assert_eq!(expansion.warnings[0].pos.unwrap().line, 2);

        // The directive became exactly one placeholder line, so the
        // following line keeps its anchor.
        assert_eq!(expansion.lines.len(), 3);
        assert!(expansion.lines[1].contains("unresolved"));
        assert_eq!(expansion.origin_map.lookup(3).unwrap().line, 3);

        assert_eq!(expansion.copies.len(), 1);
        assert!(!expansion.copies[0].resolved);
    }

    #[test]
    fn test_copy_replacing_pseudo_text() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("flags.cpy"),
            "       01  :PRE:-FLAGS.\n           05  :PRE:-EOF  PIC X.\n",
        )
        .unwrap();

        let source = "       DATA DIVISION.\n       COPY FLAGS REPLACING ==:PRE:== BY ==WS==.\n";
        let expansion = expand_with(Some(tmp.path()), source);

        let joined = expansion.lines.join("\n");
        assert!(joined.contains("WS-FLAGS"));
        assert!(joined.contains("WS-EOF"));
        assert!(!joined.contains(":PRE:"));
    }

    #[test]
    fn test_self_copy_cycle_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("selfref.cpy"), "       COPY SELFREF.\n").unwrap();

        let source = "       DATA DIVISION.\n       COPY SELFREF.\n";
        let expansion = expand_with(Some(tmp.path()), source);

        assert_eq!(
            expansion
                .warnings
                .iter()
                .filter(|w| w.code == "cyclic-copy")
                .count(),
            1
        );
        assert!(expansion.lines.iter().any(|l| l.contains("cycle skipped")));
    }

    #[test]
    fn test_replace_directive_scope() {
        let source = "\
       DATA DIVISION.
       REPLACE ==OLD-NAME== BY ==NEW-NAME==.
       01  OLD-NAME  PIC X.
       REPLACE OFF.
       01  OLD-NAME-2  PIC X.
";
        let expansion = expand_with(None, source);
        let joined = expansion.lines.join("\n");
        assert!(joined.contains("01  NEW-NAME "));
        // After REPLACE OFF the substitution no longer applies.
        assert!(joined.contains("OLD-NAME-2"));
    }

    #[test]
    fn test_exec_block_sentinels() {
        let source = "\
       PROCEDURE DIVISION.
       P1.
           EXEC SQL
               SELECT 1 FROM T1
           END-EXEC.
";
        let expansion = expand_with(None, source);
        assert_eq!(expansion.exec_blocks.len(), 1);
        assert_eq!(expansion.exec_blocks[0].kind, ExecKind::Sql);
        let joined = expansion.lines.join("\n");
        assert!(joined.contains("*>EXEC-BEGIN SQL"));
        assert!(joined.contains("*>EXEC-END"));
        // Original text preserved between the sentinels.
        assert!(joined.contains("SELECT 1 FROM T1"));
    }

    #[test]
    fn test_deterministic_expansion() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.cpy"), "       01  A-REC PIC X.\n").unwrap();
        let source = "       DATA DIVISION.\n       COPY A.\n";

        let first = expand_with(Some(tmp.path()), source);
        let second = expand_with(Some(tmp.path()), source);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_replacement_pairs() {
        let pairs = parse_replacement_pairs("==:A:== BY ==X== ==:B:== BY ==Y==");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], Replacement::new(":A:", "X"));
        assert_eq!(pairs[1], Replacement::new(":B:", "Y"));

        let pairs = parse_replacement_pairs("OLD BY NEW");
        assert_eq!(pairs, vec![Replacement::new("OLD", "NEW")]);
    }

    #[test]
    fn test_apply_replacements_word_boundary() {
        let replacements = [Replacement::new("WS-A", "WS-B")];
        assert_eq!(
            apply_replacements("MOVE WS-A TO X-WS-AB", &replacements),
            "MOVE WS-B TO X-WS-AB"
        );
    }

    #[test]
    fn test_apply_replacements_whitespace_insensitive() {
        let replacements = [Replacement::new("PIC X", "PIC 9")];
        assert_eq!(
            apply_replacements("05 F PIC    X.", &replacements),
            "05 F PIC 9."
        );
    }
}

//! Search queries: find, references, where-used.

use regex::Regex;

use crate::analyze::{ChunkAnalyzer, RefKind};
use crate::error::{CoquError, Result};
use crate::query::command::ParsedCommand;
use crate::query::result::{QueryItem, QueryResult};
use crate::query::{require_arg, targets};
use crate::workspace::{Program, Workspace};

pub fn find(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let pattern = require_arg(cmd, 0, "regex pattern")?;
    let re = Regex::new(pattern)
        .map_err(|e| CoquError::Usage(format!("invalid regex '{pattern}': {e}")))?;
    let scope = cmd.flag("in");

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        let range = match scope {
            Some(name) => match scope_span(program, name) {
                Some(span) => span,
                None => continue,
            },
            None => coqu_lang_core::LineSpan::new(1, program.lines()),
        };

        for line_no in range.start..=range.end {
            let Some(text) = program.normalized.line(line_no) else {
                continue;
            };
            if re.is_match(text) {
                items.push(
                    QueryItem::new(text.trim_end())
                        .at_line(line_no)
                        .with_detail("program", &program.name),
                );
            }
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn references(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "name")?;
    let upper = name.to_ascii_uppercase();
    let writes_only = cmd.has("writes");
    let reads_only = cmd.has("reads");

    let word_re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&upper)))
        .map_err(|e| CoquError::Usage(format!("unsearchable name '{name}': {e}")))?;

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        let Some(span) = program.procedure_span() else {
            continue;
        };

        // Lines where the name is a MOVE receiving field count as writes.
        let mut write_lines = std::collections::HashSet::new();
        for edge in ChunkAnalyzer::analyze(&program.body(span), span.start) {
            if edge.kind == RefKind::MoveTo && edge.target == upper {
                write_lines.insert(edge.line);
            }
        }

        for line_no in span.start..=span.end {
            let Some(text) = program.normalized.line(line_no) else {
                continue;
            };
            if !word_re.is_match(text) {
                continue;
            }
            let is_write = write_lines.contains(&line_no);
            if writes_only && !is_write {
                continue;
            }
            if reads_only && is_write {
                continue;
            }
            items.push(
                QueryItem::new(text.trim())
                    .at_line(line_no)
                    .with_detail("access", if is_write { "write" } else { "read" })
                    .with_detail("program", &program.name),
            );
        }
    }

    if items.is_empty() {
        return Ok(QueryResult::miss(format!("no references to '{upper}'")));
    }
    Ok(QueryResult::with_items(items))
}

pub fn where_used(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "copybook name")?;
    let upper = name.to_ascii_uppercase();

    let mut items = Vec::new();
    for program in ws.programs() {
        for directive in &program.index.copy_directives {
            if directive.name == upper {
                items.push(
                    QueryItem::new(&program.name)
                        .at_line(directive.line)
                        .with_detail("copybook", &upper)
                        .with_detail(
                            "status",
                            if directive.resolved { "Resolved" } else { "Unresolved" },
                        ),
                );
            }
        }
    }

    if items.is_empty() {
        return Ok(QueryResult::miss(format!("copybook '{upper}' is not used")));
    }
    Ok(QueryResult::with_items(items))
}

fn scope_span(program: &Program, name: &str) -> Option<coqu_lang_core::LineSpan> {
    if let Some(paragraph) = program.index.paragraph(name) {
        return Some(paragraph.span);
    }
    if let Some(section) = program.index.section(name) {
        return Some(section.span);
    }
    crate::index::DivisionName::parse(name)
        .and_then(|d| program.index.division(d))
        .map(|d| d.span)
}

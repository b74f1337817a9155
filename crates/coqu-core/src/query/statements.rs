//! Statement queries: calls, performs, moves, embedded EXEC blocks,
//! comments.

use crate::analyze::{ChunkAnalyzer, ChunkReference, RefKind};
use crate::error::Result;
use crate::index::{CommentClass, ExecKind};
use crate::query::command::ParsedCommand;
use crate::query::result::{QueryItem, QueryResult};
use crate::query::targets;
use crate::workspace::{Program, Workspace};

/// Edges of the whole PROCEDURE DIVISION of one program.
fn procedure_edges(program: &Program) -> Vec<ChunkReference> {
    let Some(span) = program.procedure_span() else {
        return Vec::new();
    };
    ChunkAnalyzer::analyze(&program.body(span), span.start)
}

/// Name of the paragraph containing a line, if any.
fn paragraph_at(program: &Program, line: u32) -> Option<&str> {
    program
        .index
        .paragraphs
        .iter()
        .find(|p| p.span.contains_line(line))
        .map(|p| p.name.as_str())
}

pub fn calls(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let external_only = cmd.has("external");

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for edge in procedure_edges(program) {
            let keep = match edge.kind {
                RefKind::CallLiteral => true,
                RefKind::CallIdentifier => !external_only,
                _ => false,
            };
            if !keep {
                continue;
            }
            let mut item = QueryItem::new(&edge.target)
                .at_line(edge.line)
                .with_detail("kind", edge.kind.as_str())
                .with_detail("program", &program.name);
            if let Some(paragraph) = paragraph_at(program, edge.line) {
                item = item.with_detail("paragraph", paragraph);
            }
            items.push(item);
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn performs(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let thru_only = cmd.has("thru");
    let paragraph_filter = cmd.flag("paragraph");

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        let edges = match paragraph_filter {
            Some(name) => match program.index.paragraph(name) {
                Some(paragraph) => {
                    ChunkAnalyzer::analyze(&program.paragraph_chunk(paragraph), paragraph.span.start)
                }
                None => continue,
            },
            None => procedure_edges(program),
        };

        for edge in edges {
            let keep = match edge.kind {
                RefKind::PerformThru => true,
                RefKind::Perform => !thru_only,
                _ => false,
            };
            if !keep {
                continue;
            }
            let mut item = QueryItem::new(&edge.target)
                .at_line(edge.line)
                .with_detail("kind", edge.kind.as_str())
                .with_detail("program", &program.name);
            if let Some(paragraph) = paragraph_at(program, edge.line) {
                item = item.with_detail("paragraph", paragraph);
            }
            items.push(item);
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn moves(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let to_filter = cmd.flag("to").map(str::to_ascii_uppercase);
    let from_filter = cmd.flag("from").map(str::to_ascii_uppercase);

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        let mut current_from: Option<(u32, String)> = None;
        for edge in procedure_edges(program) {
            match edge.kind {
                RefKind::MoveFrom => current_from = Some((edge.line, edge.target)),
                RefKind::MoveTo => {
                    let Some((from_line, from)) = current_from.as_ref() else {
                        continue;
                    };
                    if *from_line != edge.line {
                        continue;
                    }
                    if to_filter.as_deref().is_some_and(|t| edge.target.as_str() != t) {
                        continue;
                    }
                    if from_filter.as_deref().is_some_and(|f| from.as_str() != f) {
                        continue;
                    }
                    items.push(
                        QueryItem::new(format!("{from} -> {}", edge.target))
                            .at_line(edge.line)
                            .with_detail("from", from)
                            .with_detail("to", &edge.target)
                            .with_detail("program", &program.name),
                    );
                }
                _ => {}
            }
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn exec_blocks(ws: &Workspace, cmd: &ParsedCommand, kind: ExecKind) -> Result<QueryResult> {
    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for block in &program.index.exec_blocks {
            if block.kind != kind {
                continue;
            }
            let operation = exec_operation(&block.text, kind);
            let mut item = QueryItem::new(operation)
                .with_span(block.span)
                .with_detail("kind", kind.as_str())
                .with_detail("program", &program.name);
            if cmd.has("body") {
                item = item.with_body(block.text.clone());
            }
            items.push(item);
        }
    }
    Ok(QueryResult::with_items(items))
}

/// First word after `EXEC SQL` / `EXEC CICS`, e.g. SELECT or LINK.
fn exec_operation(text: &str, kind: ExecKind) -> String {
    let upper = text.to_ascii_uppercase();
    let marker = kind.as_str();
    upper
        .find(marker)
        .map(|pos| &upper[pos + marker.len()..])
        .and_then(|rest| rest.split_whitespace().next().map(String::from))
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

pub fn comments(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let class_filter = if cmd.has("orphan") {
        Some(CommentClass::Orphan)
    } else if cmd.has("header") {
        Some(CommentClass::Header)
    } else {
        None
    };
    let for_element = cmd.flag("for");

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        let element_span = for_element.and_then(|name| element_span(program, name));
        if for_element.is_some() && element_span.is_none() {
            continue;
        }

        for comment in &program.index.comments {
            if class_filter.is_some_and(|c| comment.class != c) {
                continue;
            }
            if let Some(span) = element_span {
                let attached = span.contains_line(comment.line)
                    || preceding_run_reaches(program, comment.line, span.start);
                if !attached {
                    continue;
                }
            }
            items.push(
                QueryItem::new(&comment.text)
                    .at_line(comment.line)
                    .with_detail("class", class_name(comment.class))
                    .with_detail("column", comment.column.to_string())
                    .with_detail("program", &program.name),
            );
        }
    }
    Ok(QueryResult::with_items(items))
}

fn class_name(class: CommentClass) -> &'static str {
    match class {
        CommentClass::Header => "header",
        CommentClass::Inline => "inline",
        CommentClass::Orphan => "orphan",
    }
}

/// Span of a named index element: paragraph, then section, then division.
fn element_span(program: &Program, name: &str) -> Option<coqu_lang_core::LineSpan> {
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

/// Whether a contiguous run of comment lines starting at `line` runs down
/// to the header at `header_line`.
fn preceding_run_reaches(program: &Program, line: u32, header_line: u32) -> bool {
    if line >= header_line {
        return false;
    }
    let comment_lines: std::collections::HashSet<u32> =
        program.index.comments.iter().map(|c| c.line).collect();
    (line..header_line).all(|n| {
        comment_lines.contains(&n)
            || program
                .normalized
                .line(n)
                .is_some_and(|l| l.trim().is_empty())
    })
}

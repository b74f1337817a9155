//! Structural listing queries: divisions, sections, paragraphs.
//!
//! These read the structural index only and never trigger full parsing;
//! `--body` reads original source lines for the resolved span.

use crate::analyze::{ChunkAnalyzer, RefKind};
use crate::error::Result;
use crate::index::{DivisionName, Paragraph};
use crate::query::command::ParsedCommand;
use crate::query::result::{QueryItem, QueryResult};
use crate::query::{require_arg, targets};
use crate::workspace::{Program, Workspace};

pub fn divisions(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let programs = targets(ws, cmd)?;
    if programs.is_empty() {
        return Ok(QueryResult::miss("no programs loaded"));
    }

    let mut items = Vec::new();
    for program in &programs {
        for division in &program.index.divisions {
            let mut item = QueryItem::new(division.name.as_str()).with_span(division.span);
            if programs.len() > 1 {
                item = item.with_detail("program", &program.name);
            }
            items.push(item);
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn division(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "division name")?;
    let Some(wanted) = DivisionName::parse(name) else {
        return Ok(QueryResult::miss(format!("no division named '{name}'")));
    };

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        if let Some(division) = program.index.division(wanted) {
            let mut item = QueryItem::new(division.name.as_str())
                .with_span(division.span)
                .with_detail("program", &program.name);
            if cmd.has("body") {
                item = item.with_body(program.body(division.span));
            }
            items.push(item);
        }
    }
    if items.is_empty() {
        return Ok(QueryResult::miss(format!("no division named '{name}'")));
    }
    Ok(QueryResult::with_items(items))
}

pub fn sections(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let filter = cmd.flag("division").and_then(DivisionName::parse);

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for section in &program.index.sections {
            if filter.is_some_and(|f| section.division != f) {
                continue;
            }
            items.push(
                QueryItem::new(&section.name)
                    .with_span(section.span)
                    .with_detail("division", section.division.as_str())
                    .with_detail("program", &program.name),
            );
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn section(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "section name")?;

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        if let Some(section) = program.index.section(name) {
            let mut item = QueryItem::new(&section.name)
                .with_span(section.span)
                .with_detail("division", section.division.as_str())
                .with_detail("program", &program.name);
            if cmd.has("body") {
                item = item.with_body(program.body(section.span));
            }
            items.push(item);
        }
    }
    if items.is_empty() {
        return Ok(QueryResult::miss(format!("no section named '{name}'")));
    }
    Ok(QueryResult::with_items(items))
}

pub fn paragraphs(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let section_filter = cmd.flag("section");

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for paragraph in &program.index.paragraphs {
            if let Some(wanted) = section_filter {
                let in_section = paragraph
                    .section
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(wanted));
                if !in_section {
                    continue;
                }
            }
            let mut item = QueryItem::new(&paragraph.name).with_span(paragraph.span);
            if let Some(section) = &paragraph.section {
                item = item.with_detail("section", section);
            }
            item = item.with_detail("program", &program.name);
            items.push(item);
        }
    }
    // A section with no paragraphs is an empty list, not an error.
    Ok(QueryResult::with_items(items))
}

pub fn paragraph(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "paragraph name")?;

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        let Some(paragraph) = program.index.paragraph(name) else {
            continue;
        };

        if cmd.has("analyze") || cmd.has("calls") {
            items.extend(edge_items(program, paragraph, cmd));
            continue;
        }
        if cmd.has("called-by") {
            items.extend(called_by_items(ws, &paragraph.name));
            continue;
        }

        let mut item = QueryItem::new(&paragraph.name)
            .with_span(paragraph.span)
            .with_detail("program", &program.name);
        if let Some(section) = &paragraph.section {
            item = item.with_detail("section", section);
        }
        if cmd.has("body") {
            item = item.with_body(program.paragraph_chunk(paragraph));
        }
        items.push(item);
    }

    if items.is_empty() {
        return Ok(QueryResult::miss(format!("no paragraph named '{name}'")));
    }
    Ok(QueryResult::with_items(items))
}

/// Outgoing edges of one paragraph. `--calls` narrows to CALL edges;
/// `--analyze` reports everything the chunk analyzer finds. An AST built
/// for the program is preferred over the regex path.
fn edge_items(program: &Program, paragraph: &Paragraph, cmd: &ParsedCommand) -> Vec<QueryItem> {
    let edges = match program
        .ast
        .as_ref()
        .and_then(|ast| ast.root.paragraph(&paragraph.name))
    {
        Some(node) => ChunkAnalyzer::analyze_ast(node),
        None => {
            let chunk = program.paragraph_chunk(paragraph);
            ChunkAnalyzer::analyze(&chunk, paragraph.span.start)
        }
    };

    let calls_only = cmd.has("calls") && !cmd.has("analyze");
    edges
        .into_iter()
        .filter(|edge| {
            !calls_only || matches!(edge.kind, RefKind::CallLiteral | RefKind::CallIdentifier)
        })
        .map(|edge| {
            QueryItem::new(&edge.target)
                .at_line(edge.line)
                .with_detail("kind", edge.kind.as_str())
                .with_detail("paragraph", &paragraph.name)
                .with_detail("program", &program.name)
        })
        .collect()
}

/// Paragraphs anywhere in the workspace that transfer control here.
fn called_by_items(ws: &Workspace, target: &str) -> Vec<QueryItem> {
    let mut items = Vec::new();
    for program in ws.programs() {
        for paragraph in &program.index.paragraphs {
            if paragraph.name.eq_ignore_ascii_case(target) {
                continue;
            }
            let chunk = program.paragraph_chunk(paragraph);
            for edge in ChunkAnalyzer::analyze(&chunk, paragraph.span.start) {
                let transfers = matches!(
                    edge.kind,
                    RefKind::Perform | RefKind::PerformThru | RefKind::Goto
                );
                if transfers && edge.target.eq_ignore_ascii_case(target) {
                    items.push(
                        QueryItem::new(&paragraph.name)
                            .at_line(edge.line)
                            .with_detail("kind", edge.kind.as_str())
                            .with_detail("program", &program.name),
                    );
                }
            }
        }
    }
    items
}

//! Data-division queries: working-storage, variable, file-section, linkage.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoquError, Result};
use crate::index::{DataItem, StorageKind};
use crate::query::command::ParsedCommand;
use crate::query::result::{QueryItem, QueryResult};
use crate::query::{require_arg, targets};
use crate::workspace::{Program, Workspace};

pub fn working_storage(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    storage_listing(ws, cmd, StorageKind::WorkingStorage)
}

pub fn file_section(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    storage_listing(ws, cmd, StorageKind::File)
}

pub fn linkage(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    storage_listing(ws, cmd, StorageKind::Linkage)
}

fn storage_listing(ws: &Workspace, cmd: &ParsedCommand, storage: StorageKind) -> Result<QueryResult> {
    let level_filter: Option<u8> = match cmd.flag("level") {
        Some(text) => Some(
            text.parse()
                .map_err(|_| CoquError::Usage(format!("invalid level '{text}'")))?,
        ),
        None => None,
    };

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for item in program.index.data_items_in(storage) {
            if level_filter.is_some_and(|l| item.level != l) {
                continue;
            }
            items.push(data_item_row(program, item));
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn variable(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "variable name")?;

    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for item in &program.index.data_items {
            if !item.name.eq_ignore_ascii_case(name) {
                continue;
            }
            let mut row = data_item_row(program, item);
            if cmd.has("body") {
                if let Some(text) = program.normalized.line(item.line) {
                    row = row.with_body(text.trim_end());
                }
            }
            items.push(row);

            if cmd.has("references") {
                items.extend(reference_rows(program, name));
            }
        }
    }

    if items.is_empty() {
        return Ok(QueryResult::miss(format!("no variable named '{name}'")));
    }
    Ok(QueryResult::with_items(items))
}

fn data_item_row(program: &Program, item: &DataItem) -> QueryItem {
    let mut row = QueryItem::new(&item.name)
        .at_line(item.line)
        .with_detail("level", format!("{:02}", item.level))
        .with_detail("program", &program.name);
    if let Some(pic) = &item.pic {
        row = row.with_detail("pic", pic);
    }
    if let Some(parent) = &item.parent {
        row = row.with_detail("parent", parent);
    }
    row
}

static NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9-]+").expect("name chars pattern"));

/// Occurrences of a name in the PROCEDURE DIVISION, whole-word.
fn reference_rows(program: &Program, name: &str) -> Vec<QueryItem> {
    let Some(span) = program.procedure_span() else {
        return Vec::new();
    };
    let upper = name.to_ascii_uppercase();

    let mut rows = Vec::new();
    for line_no in span.start..=span.end {
        let Some(text) = program.normalized.line(line_no) else {
            continue;
        };
        let hit = NAME_CHARS
            .find_iter(text)
            .any(|m| m.as_str().eq_ignore_ascii_case(&upper));
        if hit {
            rows.push(
                QueryItem::new(text.trim())
                    .at_line(line_no)
                    .with_detail("kind", "reference")
                    .with_detail("program", &program.name),
            );
        }
    }
    rows
}

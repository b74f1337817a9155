//! Copybook queries: listing, inspection, dependency trees.

use std::fmt::Write as _;

use crate::error::Result;
use crate::preprocess::CopybookDep;
use crate::query::command::ParsedCommand;
use crate::query::result::{QueryItem, QueryResult};
use crate::query::{require_arg, targets};
use crate::workspace::Workspace;

pub fn copybooks(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let mut items = Vec::new();
    for program in targets(ws, cmd)? {
        for directive in &program.index.copy_directives {
            let mut item = QueryItem::new(&directive.name)
                .at_line(directive.line)
                .with_detail("program", &program.name)
                .with_detail(
                    "status",
                    if directive.resolved { "Resolved" } else { "Unresolved" },
                );
            if let Some(path) = &directive.resolved_path {
                item = item.with_detail("path", path.display().to_string());
            }
            if let Some(library) = &directive.library {
                item = item.with_detail("library", library);
            }
            if let Some(replacing) = &directive.replacing {
                item = item.with_detail("replacing", replacing);
            }
            items.push(item);
        }
    }
    Ok(QueryResult::with_items(items))
}

pub fn copybook(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let name = require_arg(cmd, 0, "copybook name")?;
    let upper = name.to_ascii_uppercase();

    if cmd.has("used-by") {
        let mut items = Vec::new();
        for program in ws.programs() {
            for directive in &program.index.copy_directives {
                if directive.name == upper {
                    items.push(
                        QueryItem::new(&program.name)
                            .at_line(directive.line)
                            .with_detail("copybook", &upper),
                    );
                }
            }
        }
        if items.is_empty() {
            return Ok(QueryResult::miss(format!("copybook '{upper}' is not used")));
        }
        return Ok(QueryResult::with_items(items));
    }

    let Some(path) = ws.resolver().resolve(&upper) else {
        return Ok(QueryResult::miss(format!(
            "copybook '{upper}' not found on search path"
        )));
    };

    let mut item = QueryItem::new(&upper).with_detail("path", path.display().to_string());
    if let Ok(text) = std::fs::read_to_string(&path) {
        item = item.with_detail("lines", text.lines().count().to_string());
        if cmd.has("contents") {
            item = item.with_body(text);
        }
    }
    Ok(QueryResult::with_items(vec![item]))
}

pub fn copybook_deps(ws: &Workspace, cmd: &ParsedCommand) -> Result<QueryResult> {
    let dot = cmd.flag("format").is_some_and(|f| f.eq_ignore_ascii_case("dot"));

    let mut trees: Vec<(String, CopybookDep)> = Vec::new();
    for program in targets(ws, cmd)? {
        for directive in &program.index.copy_directives {
            trees.push((
                program.name.clone(),
                ws.resolver().dependency_tree(&directive.name),
            ));
        }
    }

    if trees.is_empty() {
        return Ok(QueryResult::miss("no COPY directives in loaded programs"));
    }

    if dot {
        let mut out = String::from("digraph copydeps {\n");
        for (program, tree) in &trees {
            let _ = writeln!(out, "  \"{program}\" -> \"{}\";", tree.name);
            dot_edges(&mut out, tree);
        }
        out.push_str("}\n");
        return Ok(QueryResult::with_items(vec![
            QueryItem::new("copybook dependency graph").with_body(out),
        ]));
    }

    let mut items = Vec::new();
    for (program, tree) in &trees {
        flatten(&mut items, program, tree, 0);
    }
    Ok(QueryResult::with_items(items))
}

fn dot_edges(out: &mut String, node: &CopybookDep) {
    for child in &node.children {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", node.name, child.name);
        if !child.circular {
            dot_edges(out, child);
        }
    }
}

fn flatten(items: &mut Vec<QueryItem>, program: &str, node: &CopybookDep, depth: usize) {
    let status = if node.circular {
        "Circular"
    } else if node.resolved {
        "Resolved"
    } else {
        "Unresolved"
    };
    let mut item = QueryItem::new(format!("{}{}", "  ".repeat(depth), node.name))
        .with_detail("program", program)
        .with_detail("status", status);
    if node.lines > 0 {
        item = item.with_detail("lines", node.lines.to_string());
    }
    items.push(item);

    if !node.circular {
        for child in &node.children {
            flatten(items, program, child, depth + 1);
        }
    }
}

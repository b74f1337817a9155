//! Query engine: command dispatch over a workspace snapshot.
//!
//! Every handler is a deterministic, read-only function of the workspace.
//! Listing queries touch only the structural index; body queries read
//! original source lines; semantic queries run the chunk analyzer on
//! demand. Full parsing happens only when a query carries `--exact`, and
//! never in `index-only` parse mode.

mod command;
mod copybooks;
mod result;
mod search;
mod statements;
mod structure;
mod variables;

pub use command::ParsedCommand;
pub use result::{QueryItem, QueryResult, SpanOut};

use crate::error::{CoquError, Result};
use crate::index::ExecKind;
use crate::workspace::{Program, Workspace};

/// Executes queries against an owned workspace.
#[derive(Debug)]
pub struct QueryEngine {
    workspace: Workspace,
}

impl QueryEngine {
    /// Wrap a workspace.
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Read-only workspace access.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Mutable workspace access (for `/load` and friends).
    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    /// Parse and execute one query line.
    pub fn execute_line(&mut self, line: &str) -> Result<QueryResult> {
        let Some(cmd) = ParsedCommand::parse(line) else {
            return Err(CoquError::Usage("empty query".to_string()));
        };
        self.execute(&cmd)
    }

    /// Execute a parsed command.
    pub fn execute(&mut self, cmd: &ParsedCommand) -> Result<QueryResult> {
        // `--exact` upgrades semantic queries to the grammar-parsed AST.
        if cmd.has("exact") {
            let names: Vec<String> = match cmd.flag("program") {
                Some(name) => vec![name.to_string()],
                None => self.workspace.programs().map(|p| p.name.clone()).collect(),
            };
            for name in names {
                self.workspace.ensure_ast(&name)?;
            }
        }

        let ws = &self.workspace;
        let mut result = match cmd.name.as_str() {
            "divisions" => structure::divisions(ws, cmd)?,
            "division" => structure::division(ws, cmd)?,
            "sections" => structure::sections(ws, cmd)?,
            "section" => structure::section(ws, cmd)?,
            "paragraphs" => structure::paragraphs(ws, cmd)?,
            "paragraph" => structure::paragraph(ws, cmd)?,
            "working-storage" => variables::working_storage(ws, cmd)?,
            "variable" => variables::variable(ws, cmd)?,
            "file-section" => variables::file_section(ws, cmd)?,
            "linkage" => variables::linkage(ws, cmd)?,
            "copybooks" => copybooks::copybooks(ws, cmd)?,
            "copybook" => copybooks::copybook(ws, cmd)?,
            "copybook-deps" => copybooks::copybook_deps(ws, cmd)?,
            "calls" => statements::calls(ws, cmd)?,
            "performs" => statements::performs(ws, cmd)?,
            "moves" => statements::moves(ws, cmd)?,
            "sql" => statements::exec_blocks(ws, cmd, ExecKind::Sql)?,
            "cics" => statements::exec_blocks(ws, cmd, ExecKind::Cics)?,
            "comments" => statements::comments(ws, cmd)?,
            "find" => search::find(ws, cmd)?,
            "references" => search::references(ws, cmd)?,
            "where-used" => search::where_used(ws, cmd)?,
            other => return Err(CoquError::Usage(format!("unknown command '{other}'"))),
        };

        if cmd.has("count") {
            result.count_only = true;
        }
        Ok(result)
    }
}

/// Programs a query targets: `--program <name>` or every loaded program.
pub(crate) fn targets<'a>(ws: &'a Workspace, cmd: &ParsedCommand) -> Result<Vec<&'a Program>> {
    if let Some(name) = cmd.flag("program") {
        let program = ws
            .get(name)
            .ok_or_else(|| CoquError::Usage(format!("program '{name}' not loaded")))?;
        return Ok(vec![program]);
    }
    Ok(ws.programs().collect())
}

/// A required positional argument.
pub(crate) fn require_arg<'a>(cmd: &'a ParsedCommand, i: usize, what: &str) -> Result<&'a str> {
    cmd.arg(i)
        .ok_or_else(|| CoquError::Usage(format!("{what} required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use std::path::PathBuf;

    const PROGRAM: &str = "\
       IDENTIFICATION DIVISION.
       PROGRAM-ID. QDEMO.
       ENVIRONMENT DIVISION.
       DATA DIVISION.
       WORKING-STORAGE SECTION.
       01  WS-TOTALS.
           05  WS-COUNT   PIC 9(5) VALUE ZERO.
       PROCEDURE DIVISION.
       MAIN-PARA.
           PERFORM WORK-PARA
           STOP RUN.
       WORK-PARA.
           MOVE ZERO TO WS-COUNT
           CALL 'HELPER' USING WS-TOTALS.
";

    fn engine_with(tmp: &tempfile::TempDir, source: &str) -> QueryEngine {
        let path: PathBuf = tmp.path().join("qdemo.cbl");
        fs::write(&path, source).unwrap();
        let config = Config {
            cache_dir: tmp.path().join("cache"),
            ..Config::default()
        };
        let mut ws = crate::workspace::Workspace::new(config).unwrap();
        ws.load(&path).unwrap();
        QueryEngine::new(ws)
    }

    #[test]
    fn test_divisions_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("divisions").unwrap();
        let labels: Vec<_> = result.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["IDENTIFICATION", "ENVIRONMENT", "DATA", "PROCEDURE"]);
    }

    #[test]
    fn test_unknown_command_is_usage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let err = engine.execute_line("frobnicate").unwrap_err();
        assert!(matches!(err, CoquError::Usage(_)));
    }

    #[test]
    fn test_query_miss_is_empty_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("paragraph NO-SUCH-PARA").unwrap();
        assert!(result.is_empty());
        assert!(result.message.is_some());
    }

    #[test]
    fn test_paragraph_body() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("paragraph WORK-PARA --body").unwrap();
        assert_eq!(result.count(), 1);
        let body = result.items[0].body.as_deref().unwrap();
        assert!(body.contains("CALL 'HELPER'"));
    }

    #[test]
    fn test_paragraph_analyze_edges() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("paragraph WORK-PARA --analyze").unwrap();
        let kinds: Vec<_> = result
            .items
            .iter()
            .map(|i| i.detail.get("kind").unwrap().as_str())
            .collect();
        assert!(kinds.contains(&"call-literal"));
        assert!(kinds.contains(&"move-to"));
        assert!(!kinds.contains(&"perform"));
    }

    #[test]
    fn test_paragraph_called_by() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("paragraph WORK-PARA --called-by").unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(result.items[0].label, "MAIN-PARA");
    }

    #[test]
    fn test_working_storage_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("working-storage").unwrap();
        assert_eq!(result.count(), 2);
        let level5 = engine.execute_line("working-storage --level 5").unwrap();
        assert_eq!(level5.count(), 1);
        assert_eq!(level5.items[0].label, "WS-COUNT");
    }

    #[test]
    fn test_variable_references() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine
            .execute_line("variable WS-COUNT --references")
            .unwrap();
        assert!(result
            .items
            .iter()
            .any(|i| i.detail.get("kind").is_some_and(|k| k == "reference")));
    }

    #[test]
    fn test_references_writes_and_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let writes = engine.execute_line("references WS-COUNT --writes").unwrap();
        assert_eq!(writes.count(), 1);
        assert!(writes.items[0].label.contains("MOVE ZERO TO WS-COUNT"));
    }

    #[test]
    fn test_calls_external() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("calls --external").unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(result.items[0].label, "HELPER");
        assert_eq!(result.items[0].line, Some(14));
    }

    #[test]
    fn test_performs() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("performs").unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(result.items[0].label, "WORK-PARA");
    }

    #[test]
    fn test_moves_with_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let all = engine.execute_line("moves").unwrap();
        assert_eq!(all.count(), 1);
        assert_eq!(all.items[0].label, "ZERO -> WS-COUNT");

        let none = engine.execute_line("moves --to NOPE").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_find_count_modifier() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line(r"find PERFORM --count").unwrap();
        assert!(result.count_only);
        assert_eq!(result.count(), 1);
    }

    #[test]
    fn test_find_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("find CALL --in WORK-PARA").unwrap();
        assert_eq!(result.count(), 1);
        let outside = engine.execute_line("find CALL --in MAIN-PARA").unwrap();
        assert!(outside.is_empty());
    }

    #[test]
    fn test_find_invalid_regex() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let err = engine.execute_line("find [unclosed").unwrap_err();
        assert!(matches!(err, CoquError::Usage(_)));
    }

    #[test]
    fn test_sql_query_empty_without_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        let result = engine.execute_line("sql").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_exact_triggers_full_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_with(&tmp, PROGRAM);
        assert!(engine.workspace().get("QDEMO").unwrap().ast.is_none());
        engine
            .execute_line("paragraph WORK-PARA --analyze --exact")
            .unwrap();
        assert!(engine.workspace().get("QDEMO").unwrap().ast.is_some());
    }
}

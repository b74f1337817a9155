//! End-to-end query scenarios over the bundled fixtures.

use std::path::PathBuf;

use coqu_core::{Config, QueryEngine, RefKind, Workspace};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn engine(tmp: &tempfile::TempDir) -> QueryEngine {
    let config = Config {
        cache_dir: tmp.path().join("cache"),
        ..Config::default()
    };
    let mut workspace = Workspace::new(config).unwrap();
    workspace.load(&fixture("sample.cbl")).unwrap();
    QueryEngine::new(workspace)
}

#[test]
fn divisions_of_sample() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("divisions").unwrap();
    let labels: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["IDENTIFICATION", "ENVIRONMENT", "DATA", "PROCEDURE"]
    );
    assert_eq!(result.items[0].span.unwrap().start, 1);
}

#[test]
fn paragraphs_of_sample() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("paragraphs").unwrap();
    let names: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
    for expected in [
        "0000-MAIN-PARA",
        "1000-INIT-PARA",
        "1100-READ-FIRST",
        "2000-PROCESS-PARA",
        "2100-VALIDATE",
        "2200-UPDATE",
        "3000-CLEANUP-PARA",
    ] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
    // Statement fragments must not be mistaken for paragraphs.
    assert!(!names.contains(&"END-READ"));
}

#[test]
fn analyze_validate_paragraph() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine
        .execute_line("paragraph 2100-VALIDATE --analyze")
        .unwrap();

    let call_edges: Vec<_> = result
        .items
        .iter()
        .filter(|i| i.detail.get("kind").is_some_and(|k| k == "call-literal"))
        .collect();
    assert_eq!(call_edges.len(), 1);
    assert_eq!(call_edges[0].label, "AUDITLOG");

    let perform_edges = result
        .items
        .iter()
        .filter(|i| {
            i.detail
                .get("kind")
                .is_some_and(|k| k.starts_with("perform"))
        })
        .count();
    assert_eq!(perform_edges, 0);
}

#[test]
fn external_calls_of_caller() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);
    engine
        .workspace_mut()
        .load(&fixture("caller.cbl"))
        .unwrap();

    let result = engine
        .execute_line("calls --external --program CALLER")
        .unwrap();
    assert_eq!(result.count(), 2);
    assert_eq!(result.items[0].label, "SAMPLE");
    assert_eq!(result.items[0].line, Some(9));
    assert_eq!(result.items[1].label, "UTILITY");
    assert_eq!(result.items[1].line, Some(10));

    // Both calls sit inside CALLER's procedure division.
    let proc_span = engine
        .workspace()
        .get("CALLER")
        .unwrap()
        .procedure_span()
        .unwrap();
    for item in &result.items {
        assert!(proc_span.contains_line(item.line.unwrap()));
    }
}

#[test]
fn find_move_spaces() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine
        .execute_line(r"find MOVE\s+SPACES\s+TO")
        .unwrap();
    assert_eq!(result.count(), 3);
    let lines: Vec<u32> = result.items.iter().map(|i| i.line.unwrap()).collect();
    assert_eq!(lines, vec![35, 55, 57]);
}

#[test]
fn find_is_subset_of_naive_scan() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line(r"find PERFORM").unwrap();
    let naive: Vec<u32> = std::fs::read_to_string(fixture("sample.cbl"))
        .unwrap()
        .lines()
        .enumerate()
        .filter(|(_, l)| l.contains("PERFORM"))
        .map(|(i, _)| i as u32 + 1)
        .collect();
    for item in &result.items {
        assert!(naive.contains(&item.line.unwrap()));
    }
}

#[test]
fn unresolved_copybook_is_listed() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("copybooks").unwrap();
    assert_eq!(result.count(), 1);
    assert_eq!(result.items[0].label, "DATEUTIL");
    assert_eq!(result.items[0].line, Some(18));
    assert_eq!(
        result.items[0].detail.get("status").map(String::as_str),
        Some("Unresolved")
    );

    let used = engine.execute_line("where-used DATEUTIL").unwrap();
    assert_eq!(used.count(), 1);
    assert_eq!(used.items[0].label, "SAMPLE");
}

#[test]
fn working_storage_and_condition_names() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("working-storage").unwrap();
    let names: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
    assert!(names.contains(&"WS-FLAGS"));
    assert!(names.contains(&"END-OF-FILE"));
    assert!(names.contains(&"WS-RETURN-CODE"));
    // FILE SECTION items are not part of working-storage.
    assert!(!names.contains(&"CUSTOMER-RECORD"));

    let eof = result
        .items
        .iter()
        .find(|i| i.label == "END-OF-FILE")
        .unwrap();
    assert_eq!(eof.detail.get("level").map(String::as_str), Some("88"));
    assert_eq!(
        eof.detail.get("parent").map(String::as_str),
        Some("WS-EOF-FLAG")
    );
}

#[test]
fn linkage_and_file_section() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let linkage = engine.execute_line("linkage").unwrap();
    assert_eq!(linkage.count(), 1);
    assert_eq!(linkage.items[0].label, "LS-PARM-AREA");

    let file = engine.execute_line("file-section").unwrap();
    let names: Vec<&str> = file.items.iter().map(|i| i.label.as_str()).collect();
    assert!(names.contains(&"CUSTOMER-RECORD"));
    assert!(names.contains(&"CUST-BALANCE"));
}

#[test]
fn performs_listing_in_source_order() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("performs").unwrap();
    let targets: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(
        targets,
        vec![
            "1000-INIT-PARA",
            "2000-PROCESS-PARA",
            "3000-CLEANUP-PARA",
            "1100-READ-FIRST",
            "2100-VALIDATE",
            "2200-UPDATE",
        ]
    );
}

#[test]
fn moves_to_filter() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("moves --from SPACES").unwrap();
    assert_eq!(result.count(), 3);

    let narrowed = engine.execute_line("moves --to CUST-NAME").unwrap();
    assert_eq!(narrowed.count(), 1);
    assert_eq!(narrowed.items[0].line, Some(55));
}

#[test]
fn header_comment_classified() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("comments --header").unwrap();
    assert_eq!(result.count(), 1);
    assert!(result.items[0].label.contains("Nightly customer master"));
}

#[test]
fn variable_lookup_miss_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("variable NOT-A-FIELD").unwrap();
    assert!(result.is_empty());
    assert!(result.message.is_some());
}

#[test]
fn references_to_counter() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let result = engine.execute_line("references WS-READ-COUNT").unwrap();
    // ADD at 54 and DISPLAY at 59; both are reads (no MOVE ... TO it).
    assert_eq!(result.count(), 2);
    assert!(result
        .items
        .iter()
        .all(|i| i.detail.get("access").is_some_and(|a| a == "read")));
}

#[test]
fn spans_nest_correctly() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(&tmp);

    let program = engine.workspace().get("SAMPLE").unwrap();
    assert!(program.index.validate().is_empty(), "{:?}", program.index.validate());

    // Sum of paragraph lines never exceeds the program's line count.
    let total: u32 = program.index.paragraphs.iter().map(|p| p.span.len()).sum();
    assert!(total <= program.lines());
}

#[test]
fn exact_analysis_agrees_with_regex_path() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = engine(&tmp);

    let regex_path = engine
        .execute_line("paragraph 2100-VALIDATE --analyze")
        .unwrap();
    let ast_path = engine
        .execute_line("paragraph 2100-VALIDATE --analyze --exact")
        .unwrap();

    let kind_of = |r: &coqu_core::QueryResult| -> Vec<(String, String)> {
        r.items
            .iter()
            .filter(|i| {
                i.detail
                    .get("kind")
                    .is_some_and(|k| k.starts_with("call") || k.starts_with("perform"))
            })
            .map(|i| (i.detail.get("kind").unwrap().clone(), i.label.clone()))
            .collect()
    };
    assert_eq!(kind_of(&regex_path), kind_of(&ast_path));
}

#[test]
fn chunk_analyzer_perform_count_invariant() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine(&tmp);

    let program = engine.workspace().get("SAMPLE").unwrap();
    let main = program.index.paragraph("0000-MAIN-PARA").unwrap();
    let chunk = program.paragraph_chunk(main);

    let edges = coqu_core::ChunkAnalyzer::analyze(&chunk, main.span.start);
    let performs: Vec<_> = edges
        .iter()
        .filter(|e| e.kind == RefKind::Perform)
        .collect();
    assert_eq!(performs.len(), 3);
    assert!(performs.windows(2).all(|w| w[0].line <= w[1].line));
}

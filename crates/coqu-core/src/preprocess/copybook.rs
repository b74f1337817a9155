//! Copybook resolution.
//!
//! Resolves COPY names against the ordered workspace search roots, probing
//! the allowed extensions. First match wins. The resolver also scans
//! resolved copybooks for nested COPY statements to build dependency trees
//! for the `copybook-deps` query.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Extension probe order. The empty string means "no extension".
pub const COPYBOOK_EXTENSIONS: [&str; 5] = [".cpy", ".copy", ".CPY", ".COPY", ""];

static NESTED_COPY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*COPY\s+['\x22]?([A-Z0-9][A-Z0-9-]*)").expect("nested copy pattern"));

/// A node in a copybook dependency tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CopybookDep {
    pub name: String,
    pub resolved: bool,
    pub path: Option<PathBuf>,
    pub lines: u32,
    /// Nested COPY dependencies, in source order.
    pub children: Vec<CopybookDep>,
    /// True when this node closes a cycle; children are not descended.
    pub circular: bool,
}

/// Resolves copybook names to files on the search path.
#[derive(Debug, Clone, Default)]
pub struct CopybookResolver {
    search_paths: Vec<PathBuf>,
}

impl CopybookResolver {
    /// Create a resolver over an ordered list of search roots.
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// The current search roots, in order.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Append a search root if not already present.
    pub fn add_path(&mut self, path: PathBuf) {
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    /// Remove all search roots.
    pub fn clear_paths(&mut self) {
        self.search_paths.clear();
    }

    /// Resolve a copybook name to a file. Roots are probed in order, and
    /// for each root every allowed extension is tried with the name as
    /// written, lowercased, and uppercased.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        for root in &self.search_paths {
            for ext in COPYBOOK_EXTENSIONS {
                for candidate_name in [
                    name.to_string(),
                    name.to_lowercase(),
                    name.to_uppercase(),
                ] {
                    let candidate = root.join(format!("{candidate_name}{ext}"));
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Names of copybooks referenced by COPY statements inside a file.
    pub fn nested_refs(&self, path: &Path) -> Vec<String> {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for line in text.lines() {
            if let Some(caps) = NESTED_COPY_RE.captures(line) {
                let name = caps[1].to_ascii_uppercase();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Build the dependency tree rooted at a copybook name.
    pub fn dependency_tree(&self, name: &str) -> CopybookDep {
        let mut visited = Vec::new();
        self.tree_node(name, &mut visited)
    }

    fn tree_node(&self, name: &str, visited: &mut Vec<String>) -> CopybookDep {
        let upper = name.to_ascii_uppercase();
        if visited.contains(&upper) {
            return CopybookDep {
                name: upper,
                resolved: true,
                path: None,
                lines: 0,
                children: Vec::new(),
                circular: true,
            };
        }

        let Some(path) = self.resolve(&upper) else {
            return CopybookDep {
                name: upper,
                resolved: false,
                path: None,
                lines: 0,
                children: Vec::new(),
                circular: false,
            };
        };

        visited.push(upper.clone());
        let lines = std::fs::read_to_string(&path)
            .map(|t| t.lines().count() as u32)
            .unwrap_or(0);
        let children = self
            .nested_refs(&path)
            .iter()
            .map(|nested| self.tree_node(nested, visited))
            .collect();
        visited.pop();

        CopybookDep {
            name: upper,
            resolved: true,
            path: Some(path),
            lines,
            children,
            circular: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_resolve_probe_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "custrec.cpy", "       01  CUST-REC.\n");
        let resolver = CopybookResolver::new(vec![tmp.path().to_path_buf()]);

        let found = resolver.resolve("CUSTREC").unwrap();
        assert!(found.ends_with("custrec.cpy"));
    }

    #[test]
    fn test_first_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(first.path(), "SHARED.cpy", "FIRST\n");
        write(second.path(), "SHARED.cpy", "SECOND\n");
        let resolver = CopybookResolver::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);

        let found = resolver.resolve("SHARED").unwrap();
        assert!(found.starts_with(first.path()));
    }

    #[test]
    fn test_no_extension_match() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "PAYREC", "       01  PAY-REC.\n");
        let resolver = CopybookResolver::new(vec![tmp.path().to_path_buf()]);
        assert!(resolver.resolve("PAYREC").is_some());
    }

    #[test]
    fn test_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = CopybookResolver::new(vec![tmp.path().to_path_buf()]);
        assert!(resolver.resolve("NOPE").is_none());
    }

    #[test]
    fn test_dependency_tree_with_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "outer.cpy", "       COPY INNER.\n");
        write(tmp.path(), "inner.cpy", "       COPY OUTER.\n");
        let resolver = CopybookResolver::new(vec![tmp.path().to_path_buf()]);

        let tree = resolver.dependency_tree("OUTER");
        assert!(tree.resolved);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "INNER");
        assert!(tree.children[0].children[0].circular);
    }

    #[test]
    fn test_add_path_dedupes() {
        let mut resolver = CopybookResolver::default();
        resolver.add_path(PathBuf::from("/a"));
        resolver.add_path(PathBuf::from("/a"));
        assert_eq!(resolver.search_paths().len(), 1);
    }
}

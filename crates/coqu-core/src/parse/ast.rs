//! Abstract syntax tree types.
//!
//! The AST is a sum over node kinds with span metadata; queries pattern
//! match on [`NodeKind`] instead of visiting a class hierarchy. Equality is
//! structural, which is what cache round-trip verification relies on.

use coqu_lang_core::TextSpan;
use serde::{Deserialize, Serialize};

use crate::index::{DivisionName, ExecKind};

/// Kind-specific payload of an AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeKind {
    /// Root of a compilation unit.
    Program,
    Division { name: DivisionName },
    Section { name: String },
    Paragraph { name: String },
    Statement { verb: String },
    DataDescription { level: u8, name: String },
    ExecBlock { exec: ExecKind },
    /// Placeholder left where a COPY directive could not be expanded.
    CopyPlaceholder { name: String },
    /// Text the grammar could not classify; kept for span accounting.
    Unknown,
}

/// A node in the AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    pub kind: NodeKind,
    pub span: TextSpan,
    /// Source text, retained for leaf statements so semantic extraction
    /// can work from the tree without re-reading the file.
    pub text: Option<String>,
    pub children: Vec<AstNode>,
}

impl AstNode {
    /// Create a node with no children.
    pub fn leaf(kind: NodeKind, span: TextSpan) -> Self {
        Self {
            kind,
            span,
            text: None,
            children: Vec::new(),
        }
    }

    /// Attach source text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Total number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(AstNode::node_count).sum::<usize>()
    }

    /// Depth-first iteration over the subtree.
    pub fn walk(&self) -> impl Iterator<Item = &AstNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            // Push in reverse so children come out in source order.
            for child in node.children.iter().rev() {
                stack.push(child);
            }
            Some(node)
        })
    }

    /// All statement nodes in the subtree, source order.
    pub fn statements(&self) -> Vec<&AstNode> {
        self.walk()
            .filter(|n| matches!(n.kind, NodeKind::Statement { .. }))
            .collect()
    }

    /// Find the first paragraph node with the given name.
    pub fn paragraph(&self, name: &str) -> Option<&AstNode> {
        self.walk().find(|n| {
            matches!(&n.kind, NodeKind::Paragraph { name: n2 } if n2.eq_ignore_ascii_case(name))
        })
    }
}

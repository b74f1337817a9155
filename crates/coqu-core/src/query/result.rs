//! Structured query results.
//!
//! Handlers return data, never formatted text: the presentation layer
//! (REPL, script runner, JSON emitter) decides rendering. A name lookup
//! with no hit is an empty result with a message, not an error.

use std::collections::BTreeMap;

use coqu_lang_core::LineSpan;
use serde::Serialize;

/// One result row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryItem {
    /// Primary label (a name, a line of text, an edge description).
    pub label: String,
    /// Single source line, when the item is line-anchored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Line span, when the item covers a range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SpanOut>,
    /// Additional key/value detail (program, section, kind, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
    /// Source body, when `--body` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Serializable span (inclusive lines).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpanOut {
    pub start: u32,
    pub end: u32,
}

impl From<LineSpan> for SpanOut {
    fn from(span: LineSpan) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

impl QueryItem {
    /// A labeled item.
    pub fn new(label: impl ToString) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Anchor to a single line.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Anchor to a span.
    pub fn with_span(mut self, span: LineSpan) -> Self {
        self.span = Some(span.into());
        self
    }

    /// Add a detail pair.
    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.detail.insert(key.to_string(), value.to_string());
        self
    }

    /// Attach a source body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Result of one query execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub items: Vec<QueryItem>,
    /// Explanatory message (misses, context).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `--count` was requested: render only the count.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub count_only: bool,
}

impl QueryResult {
    /// A result holding items.
    pub fn with_items(items: Vec<QueryItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// An empty result with an explanatory message (a query miss).
    pub fn miss(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Number of items.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_builders() {
        let item = QueryItem::new("0000-MAIN")
            .with_span(LineSpan::new(10, 20))
            .with_detail("program", "SAMPLE");
        assert_eq!(item.label, "0000-MAIN");
        assert_eq!(item.span, Some(SpanOut { start: 10, end: 20 }));
        assert_eq!(item.detail.get("program").map(String::as_str), Some("SAMPLE"));
    }

    #[test]
    fn test_miss_is_not_error() {
        let result = QueryResult::miss("no paragraph named 'NOPE'");
        assert!(result.is_empty());
        assert!(result.message.is_some());
    }

    #[test]
    fn test_serializes_compactly() {
        let result = QueryResult::with_items(vec![QueryItem::new("X").at_line(3)]);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"line\":3"));
        assert!(!json.contains("count_only"));
        assert!(!json.contains("body"));
    }
}

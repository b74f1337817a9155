//! Source location tracking.
//!
//! Every index entry, AST node, and diagnostic carries a position in the
//! original source. Positions are 1-based lines and columns; line spans are
//! inclusive on both ends, matching how COBOL programmers talk about their
//! listings ("lines 120-145").

use std::fmt;

/// Unique identifier for a source file.
///
/// Used to distinguish lines originating in the main source from lines
/// pulled in from copybooks during COPY expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileId(pub u32);

impl FileId {
    /// The file ID of the root compilation unit.
    pub const MAIN: FileId = FileId(0);
}

/// A position in source text (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SrcPos {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

impl SrcPos {
    /// Create a new position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SrcPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An inclusive range of source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSpan {
    /// First line of the span (1-indexed, inclusive).
    pub start: u32,
    /// Last line of the span (inclusive).
    pub end: u32,
}

impl LineSpan {
    /// Create a new line span.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A span covering a single line.
    pub fn single(line: u32) -> Self {
        Self {
            start: line,
            end: line,
        }
    }

    /// Number of lines covered.
    pub fn len(&self) -> u32 {
        if self.end >= self.start {
            self.end - self.start + 1
        } else {
            0
        }
    }

    /// Check whether the span covers no lines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether a line falls within the span.
    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start && line <= self.end
    }

    /// Check whether this span is entirely inside another.
    pub fn is_within(&self, outer: LineSpan) -> bool {
        self.start >= outer.start && self.end <= outer.end
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "line {}", self.start)
        } else {
            write!(f, "lines {}-{}", self.start, self.end)
        }
    }
}

/// A position range with column precision, used by AST nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextSpan {
    /// Start position (inclusive).
    pub start: SrcPos,
    /// End position (inclusive).
    pub end: SrcPos,
}

impl TextSpan {
    /// Create a new text span.
    pub fn new(start: SrcPos, end: SrcPos) -> Self {
        Self { start, end }
    }

    /// Create a span covering whole lines (column 1 to a large sentinel).
    pub fn lines(span: LineSpan) -> Self {
        Self {
            start: SrcPos::new(span.start, 1),
            end: SrcPos::new(span.end, u32::MAX),
        }
    }

    /// Extend this span to include another.
    pub fn extend(self, other: TextSpan) -> Self {
        let start = if (other.start.line, other.start.column) < (self.start.line, self.start.column)
        {
            other.start
        } else {
            self.start
        };
        let end = if (other.end.line, other.end.column) > (self.end.line, self.end.column) {
            other.end
        } else {
            self.end
        };
        Self { start, end }
    }

    /// The line span this text span covers.
    pub fn line_span(&self) -> LineSpan {
        LineSpan::new(self.start.line, self.end.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_span_len() {
        assert_eq!(LineSpan::new(3, 7).len(), 5);
        assert_eq!(LineSpan::single(4).len(), 1);
        assert_eq!(LineSpan::new(7, 3).len(), 0);
    }

    #[test]
    fn test_line_span_contains() {
        let span = LineSpan::new(10, 20);
        assert!(span.contains_line(10));
        assert!(span.contains_line(20));
        assert!(!span.contains_line(9));
        assert!(!span.contains_line(21));
    }

    #[test]
    fn test_line_span_within() {
        assert!(LineSpan::new(5, 8).is_within(LineSpan::new(1, 10)));
        assert!(!LineSpan::new(5, 12).is_within(LineSpan::new(1, 10)));
    }

    #[test]
    fn test_line_span_display() {
        assert_eq!(format!("{}", LineSpan::new(4, 4)), "line 4");
        assert_eq!(format!("{}", LineSpan::new(4, 9)), "lines 4-9");
    }

    #[test]
    fn test_text_span_extend() {
        let a = TextSpan::new(SrcPos::new(2, 5), SrcPos::new(2, 9));
        let b = TextSpan::new(SrcPos::new(1, 8), SrcPos::new(3, 1));
        let joined = a.extend(b);
        assert_eq!(joined.start, SrcPos::new(1, 8));
        assert_eq!(joined.end, SrcPos::new(3, 1));
    }

    #[test]
    fn test_text_span_line_span() {
        let span = TextSpan::new(SrcPos::new(2, 5), SrcPos::new(6, 3));
        assert_eq!(span.line_span(), LineSpan::new(2, 6));
    }

    #[test]
    fn test_file_id_main() {
        assert_eq!(FileId::MAIN, FileId(0));
    }
}

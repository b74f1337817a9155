//! COBOL source layout detection and normalization.
//!
//! Three layouts are recognized:
//!
//! - **Standard**: columns 1-6 blank (or code starts at column 1 for
//!   free-form output), indicator at column 7, code in columns 8-72.
//! - **Sequence**: columns 1-6 carry digit sequence numbers; columns 73+
//!   carry identification text. Both are stripped.
//! - **Panvalet**: lines open with a version stamp (`1.1`, `07.141A`) or a
//!   `+`/`-` change marker, as emitted by Panvalet/Librarian extracts.
//!
//! Normalization blanks the non-code columns in place rather than deleting
//! them, so column positions (the indicator at column 7, Area A at column
//! 8) stay meaningful and a second normalization pass is the identity.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Detected source layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Blank sequence area or free-form; no stripping needed.
    #[default]
    Standard,
    /// Digit sequence numbers in columns 1-6.
    Sequence,
    /// Panvalet/Librarian version markers in column 1.
    Panvalet,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Standard => write!(f, "standard"),
            SourceFormat::Sequence => write!(f, "sequence"),
            SourceFormat::Panvalet => write!(f, "panvalet"),
        }
    }
}

/// Source text after layout normalization.
///
/// `lines[i]` corresponds to original line `i + 1`; normalization never
/// inserts or deletes lines.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSource {
    /// The layout the text was normalized from.
    pub format: SourceFormat,
    /// Normalized lines, original order and count preserved.
    pub lines: Vec<String>,
}

impl NormalizedSource {
    /// Line count.
    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    /// A 1-based line, if present.
    pub fn line(&self, number: u32) -> Option<&str> {
        self.lines.get(number.checked_sub(1)? as usize).map(String::as_str)
    }

    /// Join an inclusive 1-based line range into a chunk of text.
    pub fn slice(&self, start: u32, end: u32) -> String {
        let start = start.max(1) as usize - 1;
        let end = (end as usize).min(self.lines.len());
        if start >= end {
            return String::new();
        }
        self.lines[start..end].join("\n")
    }
}

/// How many non-empty lines the detector samples.
const SAMPLE_SIZE: usize = 200;

/// Panvalet version stamp: `1.1`, `07.141`, `7.682A`, followed by space.
static PANVALET_STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][0-9.]{0,5}[AB]?\s").expect("panvalet stamp pattern"));

/// Classify the layout of source text by sampling its leading lines.
pub fn detect_format(text: &str) -> SourceFormat {
    let mut sampled = 0usize;
    let mut sequence_hits = 0usize;
    let mut panvalet_hits = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        sampled += 1;

        if has_sequence_number(line) {
            sequence_hits += 1;
        }
        if is_panvalet_marked(line) {
            panvalet_hits += 1;
        }

        if sampled >= SAMPLE_SIZE {
            break;
        }
    }

    if sampled == 0 {
        return SourceFormat::Standard;
    }
    if sequence_hits * 10 >= sampled * 9 {
        return SourceFormat::Sequence;
    }
    if panvalet_hits * 20 >= sampled {
        return SourceFormat::Panvalet;
    }
    SourceFormat::Standard
}

/// Normalize source text: classify, then blank the non-code columns.
pub fn normalize(text: &str) -> NormalizedSource {
    let format = detect_format(text);
    let lines = text
        .lines()
        .map(|line| normalize_line(line, format))
        .collect();
    NormalizedSource { format, lines }
}

fn normalize_line(line: &str, format: SourceFormat) -> String {
    match format {
        SourceFormat::Standard => line.to_string(),
        SourceFormat::Sequence => {
            let mut out: String = line
                .char_indices()
                .map(|(i, c)| if i < 6 { ' ' } else { c })
                .take(72)
                .collect();
            // All-blank remnants collapse to an empty line.
            if out.trim().is_empty() {
                out.clear();
            }
            out
        }
        SourceFormat::Panvalet => {
            if let Some(m) = PANVALET_STAMP.find(line) {
                let blank = " ".repeat(m.end());
                format!("{blank}{}", &line[m.end()..])
            } else if line.starts_with('+') || line.starts_with('-') {
                format!(" {}", &line[1..])
            } else {
                line.to_string()
            }
        }
    }
}

fn has_sequence_number(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= 6 && bytes[..6].iter().all(u8::is_ascii_digit)
}

fn is_panvalet_marked(line: &str) -> bool {
    PANVALET_STAMP.is_match(line) || line.starts_with('+') || line.starts_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_line(code: &str) -> String {
        format!("000100 {code}")
    }

    #[test]
    fn test_detect_standard() {
        let text = "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. T.\n";
        assert_eq!(detect_format(text), SourceFormat::Standard);
    }

    #[test]
    fn test_detect_sequence() {
        let text = "000100 IDENTIFICATION DIVISION.\n000200 PROGRAM-ID. T.\n000300 DATA DIVISION.\n";
        assert_eq!(detect_format(text), SourceFormat::Sequence);
    }

    #[test]
    fn test_detect_panvalet() {
        let text = "1.1    IDENTIFICATION DIVISION.\n1.1    PROGRAM-ID. T.\n";
        assert_eq!(detect_format(text), SourceFormat::Panvalet);
    }

    #[test]
    fn test_sequence_stripping() {
        // Pad the second line so SERIAL01 lands in columns 73-80.
        let mut padded = seq_line("MOVE A TO B.");
        padded.push_str(&" ".repeat(72 - padded.len()));
        let text = format!("{}\n{padded}SERIAL01\n", seq_line("IDENTIFICATION DIVISION."));
        let normalized = normalize(&text);
        assert_eq!(normalized.format, SourceFormat::Sequence);
        // Sequence digits blanked, code preserved at its original column.
        assert!(normalized.lines[0].starts_with("       IDENT"));
        // Identification area (columns 73+) removed.
        assert!(!normalized.lines[1].contains("SERIAL01"));
    }

    #[test]
    fn test_panvalet_stripping() {
        let text = "1.1    IDENTIFICATION DIVISION.\n7.682A PROCEDURE DIVISION.\n";
        let normalized = normalize(text);
        assert_eq!(normalized.format, SourceFormat::Panvalet);
        assert!(normalized.lines[0].trim_start().starts_with("IDENTIFICATION"));
        assert!(normalized.lines[1].trim_start().starts_with("PROCEDURE"));
        assert!(!normalized.lines[1].contains("7.682"));
    }

    #[test]
    fn test_normalization_idempotent() {
        let text = "000100 IDENTIFICATION DIVISION.\n000200 PROGRAM-ID. T.\n000300 PROCEDURE DIVISION.\n";
        let once = normalize(text);
        let again = normalize(&once.lines.join("\n"));
        assert_eq!(once.lines, again.lines);
    }

    #[test]
    fn test_line_count_preserved() {
        let text = "000100 A.\n\n000300 B.\n";
        let normalized = normalize(text);
        assert_eq!(normalized.line_count(), 3);
        assert_eq!(normalized.line(2), Some(""));
    }

    #[test]
    fn test_slice() {
        let normalized = normalize("       A.\n       B.\n       C.\n");
        assert_eq!(normalized.slice(2, 3), "       B.\n       C.");
        assert_eq!(normalized.slice(5, 9), "");
    }

    #[test]
    fn test_comment_indicator_preserved() {
        let text = "000100* HEADER COMMENT\n000200 PROCEDURE DIVISION.\n";
        let normalized = normalize(text);
        assert_eq!(normalized.lines[0].as_bytes()[6], b'*');
    }
}

//! Text preparation shared by the source reader and preprocessor.

/// Normalize line endings to `\n`.
///
/// Handles `\r\n` (Windows) and bare `\r` (classic Mac) inputs. Every
/// consumer of source text calls this first so that line numbering never
/// drifts between components.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\r\nc"), "a\nb\nc");
        assert_eq!(normalize_line_endings("a\rb\rc"), "a\nb\nc");
        assert_eq!(normalize_line_endings("a\nb\nc"), "a\nb\nc");
    }

    #[test]
    fn test_normalize_no_allocation_change() {
        let clean = "no carriage returns here";
        assert_eq!(normalize_line_endings(clean), clean);
    }
}

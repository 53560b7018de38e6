//! Small text helpers shared across services

/// Truncates a string to at most `max_chars` characters, appending an
/// ellipsis when anything was cut. Operates on char boundaries, so
/// multi-byte text never produces a panic or a broken code point.
#[must_use]
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_short_input_untouched() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_str_cuts_and_marks() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn test_truncate_str_unicode() {
        let s = "привет мир";
        let out = truncate_str(s, 6);
        assert_eq!(out, "привет...");
    }
}

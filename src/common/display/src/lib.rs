//! Display helpers for hyperlens.
//!
//! Provides text truncation for diagnostics and tree rendering for
//! propagation plans.

mod tree;

pub use tree::TextTree;

/// Truncate a string to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Keep the first `n` lines of a multi-line string.
pub fn first_lines(s: &str, n: usize) -> String {
    s.lines().take(n).collect::<Vec<_>>().join("\n")
}

/// Indent a multi-line string.
pub fn indent(s: &str, prefix: &str) -> String {
    s.lines()
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Supplier", 20), "Supplier");
        assert_eq!(truncate_string("Supplier country", 10), "Supplie...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("αβγδεζηθ", 5), "αβ...");
    }

    #[test]
    fn test_first_lines() {
        assert_eq!(first_lines("a\nb\nc\nd", 2), "a\nb");
        assert_eq!(first_lines("single", 3), "single");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("SELECT 1\nFROM t", "  "), "  SELECT 1\n  FROM t");
    }
}

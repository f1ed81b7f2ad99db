use std::borrow::Cow;

/// Ellipsis appended to truncated text
const ELLIPSIS: &str = "...";

/// Makes arbitrary feed text safe to embed in a single protocol line.
///
/// CR, LF and TAB become spaces (a raw CR or LF would end the line early and
/// let feed content inject commands). Other C0 control bytes and DEL are
/// dropped. Runs of whitespace produced this way collapse to one space and
/// the result is trimmed.
///
/// Returns `Cow::Borrowed` when nothing needs changing.
///
/// # Examples
///
/// ```
/// use feedbridge::util::strip_control_chars;
///
/// assert_eq!(strip_control_chars("Plain title"), "Plain title");
/// assert_eq!(strip_control_chars("Line one\r\nQUIT :bye"), "Line one QUIT :bye");
/// assert_eq!(strip_control_chars("bell\x07 here"), "bell here");
/// ```
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    // Fast path: scan for any byte that needs attention
    let needs_strip = s.bytes().any(|b| b < 0x20 || b == 0x7f)
        || s.starts_with(' ')
        || s.ends_with(' ')
        || s.contains("  ");

    if !needs_strip {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;

    for c in s.chars() {
        match c {
            '\r' | '\n' | '\t' | ' ' => pending_space = true,
            c if c.is_ascii_control() => {}
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }

    Cow::Owned(out)
}

/// Truncates `s` to at most `max_bytes` bytes, cutting on a char boundary.
///
/// When text is cut, "..." is appended inside the budget. Budgets too small
/// to hold the ellipsis get a plain cut.
///
/// # Examples
///
/// ```
/// use feedbridge::util::truncate_to_bytes;
///
/// assert_eq!(truncate_to_bytes("Short", 10), "Short");
/// assert_eq!(truncate_to_bytes("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_bytes("Test", 2), "Te");
/// ```
pub fn truncate_to_bytes(s: &str, max_bytes: usize) -> Cow<'_, str> {
    if s.len() <= max_bytes {
        return Cow::Borrowed(s);
    }

    if max_bytes <= ELLIPSIS.len() {
        return Cow::Owned(s[..floor_char_boundary(s, max_bytes)].to_string());
    }

    let cut = floor_char_boundary(s, max_bytes - ELLIPSIS.len());
    let mut out = String::with_capacity(cut + ELLIPSIS.len());
    out.push_str(&s[..cut]);
    out.push_str(ELLIPSIS);
    Cow::Owned(out)
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut index = index.min(s.len());
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_borrowed() {
        assert!(matches!(strip_control_chars("a b c"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_newlines_become_single_spaces() {
        assert_eq!(strip_control_chars("a\r\n\r\nb\tc"), "a b c");
    }

    #[test]
    fn test_edges_trimmed() {
        assert_eq!(strip_control_chars("\n  padded \r\n"), "padded");
        assert_eq!(strip_control_chars("\r\n"), "");
    }

    #[test]
    fn test_control_bytes_dropped() {
        assert_eq!(strip_control_chars("\x02bold\x02 \x1b[0m"), "bold [0m");
        assert_eq!(strip_control_chars("del\x7f"), "del");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(strip_control_chars("caf\u{e9}\n\u{4f60}\u{597d}"), "caf\u{e9} \u{4f60}\u{597d}");
    }

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_to_bytes("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_bytes("Hello World", 11), "Hello World");
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        // Each CJK char is 3 bytes: budget 8 leaves 5 for text, one char fits
        assert_eq!(truncate_to_bytes("\u{4f60}\u{597d}\u{4e16}\u{754c}", 8), "\u{4f60}...");
        assert!(truncate_to_bytes("\u{4f60}\u{597d}\u{4e16}\u{754c}", 8).len() <= 8);
    }

    #[test]
    fn test_truncate_tiny_budgets() {
        assert_eq!(truncate_to_bytes("Test", 0), "");
        assert_eq!(truncate_to_bytes("Test", 3), "Tes");
        assert_eq!(truncate_to_bytes("\u{e9}t\u{e9}", 1), "");
    }
}

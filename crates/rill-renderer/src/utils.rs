use pulldown_cmark_escape::escape_html;

/// Escape `& < > " '` for embedding in element content or attribute values.
pub fn escape_text(out: &mut String, text: &str) {
    let mut parts = text.split('\'');
    if let Some(first) = parts.next() {
        // These won't fail writing to String
        let _ = escape_html(&mut *out, first);
    }
    for part in parts {
        out.push_str("&#39;");
        let _ = escape_html(&mut *out, part);
    }
}

pub fn escaped(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text(&mut out, text);
    out
}

/// Case-insensitive search for an ASCII needle. Returns a byte offset into `haystack`.
pub fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

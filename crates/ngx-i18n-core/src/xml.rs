//! Small XML text helpers shared by the XLIFF and workbook writers.

/// Escape character data for element content.
pub fn escape_text(text: &str) -> String {
    escape(text, false)
}

/// Escape a value for a double-quoted attribute.
pub fn escape_attr(text: &str) -> String {
    escape(text, true)
}

fn escape(text: &str, attr: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\n' if attr => out.push_str("&#10;"),
            '\t' if attr => out.push_str("&#9;"),
            // Not representable in XML 1.0.
            c if is_forbidden(c) => {}
            c => out.push(c),
        }
    }
    out
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

/// Byte offset just past the `>` closing the start tag that begins at `start`.
///
/// Quoted attribute values may contain `>`; they are skipped.
pub fn start_tag_end(raw: &str, start: usize) -> usize {
    let mut quote: Option<char> = None;
    for (i, c) in raw[start..].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return start + i + 1,
            None => {}
        }
    }
    raw.len()
}

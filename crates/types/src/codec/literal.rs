//! Minimal scanner for CQL literal text: quote-aware unwrapping and
//! top-level splitting used by the collection codec `parse` paths.

/// Strips `open`/`close` from around `s`, returning the interior.
pub(crate) fn unwrap_delimited(s: &str, open: char, close: char) -> Option<&str> {
    let s = s.trim();
    let inner = s.strip_prefix(open)?.strip_suffix(close)?;
    Some(inner.trim())
}

/// Splits `s` on `sep` at nesting depth zero, honoring single-quoted
/// strings (with `''` escapes) and `[`/`{`/`(` nesting.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut start = 0usize;
    let bytes = s.char_indices().collect::<Vec<_>>();
    let mut i = 0;
    while i < bytes.len() {
        let (pos, c) = bytes[i];
        if in_quote {
            if c == '\'' {
                // '' is an escaped quote inside a string literal
                if matches!(bytes.get(i + 1), Some((_, '\''))) {
                    i += 1;
                } else {
                    in_quote = false;
                }
            }
        } else {
            match c {
                '\'' => in_quote = true,
                '[' | '{' | '(' => depth += 1,
                ']' | '}' | ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    parts.push(s[start..pos].trim());
                    start = pos + c.len_utf8();
                }
                _ => {}
            }
        }
        i += 1;
    }
    let tail = s[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Quotes a string as a CQL text literal, doubling embedded quotes.
pub(crate) fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Undoes [`quote_string`]. Returns `None` when `s` is not a quoted literal.
pub(crate) fn unquote_string(s: &str) -> Option<String> {
    let inner = s.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_respect_quotes_and_nesting() {
        assert_eq!(split_top_level("1, 2, 3", ','), vec!["1", "2", "3"]);
        assert_eq!(split_top_level("'a,b', 'c'", ','), vec!["'a,b'", "'c'"]);
        assert_eq!(split_top_level("[1, 2], {3: 4}", ','), vec!["[1, 2]", "{3: 4}"]);
        assert_eq!(split_top_level("'it''s', 2", ','), vec!["'it''s'", "2"]);
        assert!(split_top_level("  ", ',').is_empty());
    }

    #[test]
    fn string_quoting_round_trips() {
        let quoted = quote_string("it's");
        assert_eq!(quoted, "'it''s'");
        assert_eq!(unquote_string(&quoted).unwrap(), "it's");
    }
}

use super::keywords;
use crate::error::LowerError;
use std::sync::Arc;
use tessera_types::codec::Codec;
use tessera_types::CqlValue;

/// Accumulates one CQL statement's text.
///
/// Identifiers go through [`CqlWriter::ident`], which double-quotes reserved
/// words and anything that is not a plain lower-case identifier; values go
/// through [`CqlWriter::literal`], which renders them with the column's
/// codec.
#[derive(Debug, Default)]
pub struct CqlWriter {
    buf: String,
}

impl CqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.buf.push_str(text);
        self
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        if needs_quoting(name) {
            self.buf.push('"');
            for c in name.chars() {
                if c == '"' {
                    self.buf.push('"');
                }
                self.buf.push(c);
            }
            self.buf.push('"');
        } else {
            self.buf.push_str(name);
        }
        self
    }

    /// Writes `keyspace.name`, quoting each part independently.
    pub fn qualified(&mut self, keyspace: &str, name: &str) -> &mut Self {
        self.ident(keyspace);
        self.buf.push('.');
        self.ident(name)
    }

    pub fn literal(&mut self, codec: &Arc<dyn Codec>, value: &CqlValue) -> Result<&mut Self, LowerError> {
        let text = codec.format(value)?;
        self.buf.push_str(&text);
        Ok(self)
    }

    /// Writes `sep` on every call but the first of a comma-style list.
    pub fn sep(&mut self, first: &mut bool, sep: &str) -> &mut Self {
        if *first {
            *first = false;
        } else {
            self.buf.push_str(sep);
        }
        self
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// An identifier can stay bare only if it is a non-reserved word made of
/// lower-case ASCII letters, digits, and underscores, not starting with a
/// digit.
fn needs_quoting(name: &str) -> bool {
    if keywords::is_reserved(name) {
        return true;
    }
    let mut chars = name.chars();
    match chars.next() {
        None => return true,
        Some(c) if !c.is_ascii_lowercase() && c != '_' => return true,
        _ => {}
    }
    !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reserved_words_are_quoted_and_non_reserved_are_not() {
        let mut w = CqlWriter::new();
        w.ident("order").raw(", ").ident("ttl").raw(", ").ident("user_id");
        assert_eq!(w.finish(), "\"order\", ttl, user_id");
    }

    #[test]
    fn case_and_odd_characters_force_quotes() {
        let mut w = CqlWriter::new();
        w.ident("MixedCase").raw(", ").ident("with space").raw(", ").ident("7start");
        assert_eq!(w.finish(), "\"MixedCase\", \"with space\", \"7start\"");
    }

    #[test]
    fn qualified_names_quote_each_part() {
        let mut w = CqlWriter::new();
        w.qualified("app_acme", "order");
        assert_eq!(w.finish(), "app_acme.\"order\"");
    }
}

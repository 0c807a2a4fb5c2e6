//! Tolerant parser for configuration patch text.
//!
//! Patches arrive as JSON-ish `key: value` text from a server that is not
//! under the node's control, so the parser accepts rather than validates:
//! an optional `{ ... }` wrapper, bare or quoted tokens, missing values,
//! junk between a value and the next comma. Nothing here fails; malformed
//! input just yields fewer or stranger entries, and the consumer ignores
//! what it does not recognize.
//!
//! Parsing is zero-copy: [`Entry`] borrows key and value slices straight
//! out of the input text.

/// One `key: value` pair scanned out of a patch.
///
/// A missing or empty value means "leave this field unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Field name, unquoted, with surrounding whitespace removed.
    pub key: &'a str,
    /// Field value, unquoted. Empty when the entry had no `:` part.
    pub value: &'a str,
}

/// Iterate the entries of a patch.
///
/// Strips one optional brace wrapper, then walks comma-separated entries.
pub fn entries(text: &str) -> Entries<'_> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while start < bytes.len() && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    let mut end = bytes.len();
    if start < bytes.len() && bytes[start] == b'{' {
        start += 1;
        while start < bytes.len() && bytes[start].is_ascii_whitespace() {
            start += 1;
        }
        let mut last = bytes.len();
        while last > start && bytes[last - 1].is_ascii_whitespace() {
            last -= 1;
        }
        if last > start && bytes[last - 1] == b'}' {
            last -= 1;
        }
        end = last;
    }
    Entries {
        body: &text[start..end],
        pos: 0,
    }
}

/// Iterator over [`Entry`] values in a patch body.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    body: &'a str,
    pos: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Entry<'a>> {
        let bytes = self.body.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }
        let key = self.take_token();
        self.pos = next_separator(bytes, self.pos);
        let mut value = "";
        if self.pos < bytes.len() && bytes[self.pos] == b':' {
            self.pos += 1;
            value = self.take_token();
        }
        // Anything between the value and the next comma is skipped.
        self.pos = index_of(bytes, b',', self.pos);
        if self.pos < bytes.len() {
            self.pos += 1;
        }
        Some(Entry { key, value })
    }
}

impl<'a> Entries<'a> {
    /// Scan one token: a quoted run taken verbatim to the matching quote,
    /// or a bare run ending at `:` / `,` / end of input with trailing
    /// whitespace dropped. An unclosed quote swallows the rest of the input.
    fn take_token(&mut self) -> &'a str {
        let bytes = self.body.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return "";
        }
        let start = self.pos;
        match bytes[start] {
            quote @ (b'"' | b'\'') => {
                let content = start + 1;
                let close = index_of(bytes, quote, content);
                self.pos = close + 1;
                &self.body[content..close]
            }
            _ => {
                let separator = next_separator(bytes, start);
                self.pos = separator;
                let mut end = separator;
                while end > start && bytes[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
                &self.body[start..end]
            }
        }
    }
}

fn index_of(bytes: &[u8], needle: u8, mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos] != needle {
        pos += 1;
    }
    pos
}

fn next_separator(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos] != b':' && bytes[pos] != b',' {
        pos += 1;
    }
    pos
}

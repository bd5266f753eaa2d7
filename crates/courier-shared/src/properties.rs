//! Flat `key=value` text format used for every file in the exchange directory.
//!
//! The format follows the classic properties layout: one entry per line,
//! `#` or `!` comment lines, `=` or `:` as separator, and backslash escapes
//! for line breaks and separators. Multi-valued fields are flattened into
//! numbered keys (`follows.0`, `follows.1`, ...).
//!
//! Parsing never fails. Lines that cannot be understood (for example the
//! truncated tail of a file that is still being written) are skipped, and it
//! is up to the entity decoder to decide whether what remains is usable.

use std::collections::BTreeMap;
use std::fmt;

/// An ordered set of string properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text, skipping comments and malformed lines.
    pub fn parse(text: &str) -> Self {
        let mut props = Self::new();

        for raw_line in text.lines() {
            let line = raw_line.trim_start_matches(is_blank);
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some(split) = find_separator(line) else {
                continue;
            };

            let key = unescape(line[..split].trim_end_matches(is_blank));
            if key.is_empty() {
                continue;
            }
            let value = unescape(line[split + 1..].trim_start_matches(is_blank));
            props.entries.insert(key, value);
        }

        props
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a multi-valued field as `prefix.0 .. prefix.n`, replacing any
    /// previous entries under the same prefix.
    pub fn set_list<I, S>(&mut self, prefix: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dotted = format!("{prefix}.");
        self.entries.retain(|k, _| !k.starts_with(&dotted));

        for (index, item) in items.into_iter().enumerate() {
            self.entries.insert(format!("{prefix}.{index}"), item.into());
        }
    }

    /// Values of a multi-valued field, ordered by their numeric index.
    /// Keys whose suffix is not a number are ignored; gaps are tolerated.
    pub fn list(&self, prefix: &str) -> Vec<&str> {
        let dotted = format!("{prefix}.");
        let mut indexed: Vec<(usize, &str)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| {
                let index = k.strip_prefix(&dotted)?.parse::<usize>().ok()?;
                Some((index, v.as_str()))
            })
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, v)| v).collect()
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{}={}", escape(key, true), escape(value, false))?;
        }
        Ok(())
    }
}

/// Whitespace the parser strips around keys and before values. Anything
/// else, including non-ASCII spaces, is part of the value.
fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

/// Byte offset of the first unescaped `=` or `:` in a line.
fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return Some(i),
            _ => {}
        }
    }
    None
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\x0c'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

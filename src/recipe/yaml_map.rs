//! Byte-preserving edits of a top-level YAML mapping.
//!
//! `config.yml` and `conandata.yml` are hand-maintained, so they are never
//! re-serialized. Instead the text is scanned line by line to find the
//! entries of one top-level mapping (`versions:` or `sources:`), and a new
//! entry is spliced in as a block of lines. Every other byte of the file is
//! kept as it was.
//!
//! The scan understands block-style mappings only, which is what recipe files
//! use:
//!
//! ```yaml
//! sources:
//!   "1.128.8786":
//!     url: "https://github.com/bkaradzic/bgfx/archive/....tar.gz"
//!     sha256: "..."
//! patches:
//!   ...
//! ```
//!
//! After splicing, both documents are parsed with `serde_yaml` to confirm the
//! edit added exactly one entry and changed nothing else.

use std::collections::BTreeMap;

use serde_yaml::Value as YamlValue;

use crate::version;

/// How an existing mapping key is quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyQuote {
    Double,
    Single,
    Plain,
}

impl KeyQuote {
    fn render(self, key: &str) -> String {
        match self {
            KeyQuote::Double => format!("\"{}\"", key),
            KeyQuote::Single => format!("'{}'", key),
            KeyQuote::Plain => key.to_string(),
        }
    }
}

/// One entry of the mapping and the byte range of its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub quote: KeyQuote,
    /// Offset of the entry's key line.
    pub start: usize,
    /// Offset just past the entry's last content line.
    pub end: usize,
}

/// The entries of a top-level block mapping.
#[derive(Debug, Clone)]
pub struct MappingSection {
    pub entries: Vec<Entry>,
    /// Offset just past the `section:` header line.
    header_end: usize,
    child_indent: Option<usize>,
    field_indent: Option<usize>,
    eol: &'static str,
}

/// A block of text spliced into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// Offset in the original text where `text` was inserted.
    pub offset: usize,
    pub text: String,
    /// The full updated document.
    pub updated: String,
}

struct Line<'a> {
    start: usize,
    end: usize,
    content: &'a str,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for piece in text.split_inclusive('\n') {
        let end = start + piece.len();
        lines.push(Line {
            start,
            end,
            content: piece.trim_end_matches(['\n', '\r']),
        });
        start = end;
    }
    lines
}

fn indent_of(content: &str) -> usize {
    content.len() - content.trim_start_matches(' ').len()
}

fn is_blank_or_comment(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse the key of a `key:` line, returning it unquoted.
fn parse_key(content: &str) -> Option<(String, KeyQuote)> {
    let trimmed = content.trim_start();

    for (quote_char, quote) in [('"', KeyQuote::Double), ('\'', KeyQuote::Single)] {
        if let Some(rest) = trimmed.strip_prefix(quote_char) {
            let close = rest.find(quote_char)?;
            let after = rest[close + 1..].trim_start();
            return after
                .starts_with(':')
                .then(|| (rest[..close].to_string(), quote));
        }
    }

    let bytes = trimmed.as_bytes();
    let colon = trimmed.char_indices().find_map(|(i, c)| {
        let followed_by_space = bytes.get(i + 1).is_none_or(|b| *b == b' ');
        (c == ':' && followed_by_space).then_some(i)
    })?;
    let key = trimmed[..colon].trim();
    (!key.is_empty()).then(|| (key.to_string(), KeyQuote::Plain))
}

impl MappingSection {
    /// Locate the `section:` mapping in `text`.
    ///
    /// Fails with a description when the header is missing or the mapping is
    /// not written in block style.
    pub fn parse(text: &str, section: &str) -> std::result::Result<Self, String> {
        let lines = split_lines(text);
        let header_prefix = format!("{}:", section);

        let header_index = lines
            .iter()
            .position(|line| {
                line.content.starts_with(&header_prefix) && {
                    let rest = line.content[header_prefix.len()..].trim();
                    rest.is_empty() || rest.starts_with('#')
                }
            })
            .ok_or_else(|| {
                if lines
                    .iter()
                    .any(|line| line.content.starts_with(&header_prefix))
                {
                    format!("'{}' is not a block-style mapping", section)
                } else {
                    format!("no top-level '{}' mapping", section)
                }
            })?;

        let mut entries: Vec<Entry> = Vec::new();
        let mut child_indent = None;
        let mut field_indent = None;

        for line in &lines[header_index + 1..] {
            if is_blank_or_comment(line.content) {
                continue;
            }
            let indent = indent_of(line.content);
            let expected = match child_indent {
                Some(expected) => {
                    if indent < expected {
                        break;
                    }
                    expected
                }
                None => {
                    if indent == 0 {
                        break;
                    }
                    child_indent = Some(indent);
                    indent
                }
            };

            if indent == expected {
                let (key, quote) = parse_key(line.content)
                    .ok_or_else(|| format!("cannot parse '{}' entry: {}", section, line.content))?;
                entries.push(Entry {
                    key,
                    quote,
                    start: line.start,
                    end: line.end,
                });
            } else if let Some(entry) = entries.last_mut() {
                entry.end = line.end;
                field_indent.get_or_insert(indent);
            }
        }

        Ok(Self {
            entries,
            header_end: lines[header_index].end,
            child_indent,
            field_indent,
            eol: if text.contains("\r\n") { "\r\n" } else { "\n" },
        })
    }

    /// Entry keys in file order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.key.as_str()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Render a new entry block in this mapping's layout.
    fn render(&self, key: &str, fields: &[(&str, String)]) -> String {
        let child_indent = self.child_indent.unwrap_or(2);
        let field_indent = self.field_indent.unwrap_or(child_indent + 2);
        let quote = self
            .entries
            .first()
            .map(|e| e.quote)
            .unwrap_or(KeyQuote::Double);

        let mut block = format!(
            "{}{}:{}",
            " ".repeat(child_indent),
            quote.render(key),
            self.eol
        );
        for (name, value) in fields {
            block.push_str(&format!(
                "{}{}: {}{}",
                " ".repeat(field_indent),
                name,
                value,
                self.eol
            ));
        }
        block
    }

    /// Insert `key` with `fields` at the position the list's ordering
    /// convention calls for.
    pub fn insert(&self, text: &str, key: &str, fields: &[(&str, String)]) -> Insertion {
        let index = version::insertion_index(&self.keys(), key);
        let offset = match (self.entries.get(index), self.entries.last()) {
            (Some(entry), _) => entry.start,
            (None, Some(last)) => last.end,
            (None, None) => self.header_end,
        };

        let mut block = self.render(key, fields);
        if offset == text.len() && !text.is_empty() && !text.ends_with('\n') {
            block.insert_str(0, self.eol);
        }

        let mut updated = String::with_capacity(text.len() + block.len());
        updated.push_str(&text[..offset]);
        updated.push_str(&block);
        updated.push_str(&text[offset..]);

        Insertion {
            offset,
            text: block,
            updated,
        }
    }
}

/// Render a scalar the way conan-center-index writes URLs and checksums.
pub fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn key_string(key: &YamlValue) -> Option<String> {
    match key {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Entries of `section`, keyed by their string form.
fn section_entries(
    document: &YamlValue,
    section: &str,
) -> std::result::Result<BTreeMap<String, YamlValue>, String> {
    match document.get(section) {
        Some(YamlValue::Mapping(mapping)) => Ok(mapping
            .iter()
            .filter_map(|(k, v)| key_string(k).map(|k| (k, v.clone())))
            .collect()),
        Some(YamlValue::Null) | None => Ok(BTreeMap::new()),
        Some(_) => Err(format!("'{}' is not a mapping", section)),
    }
}

/// String value of `field` in the `key` entry of `section`.
pub fn field_value(
    text: &str,
    section: &str,
    key: &str,
    field: &str,
) -> std::result::Result<Option<String>, String> {
    let document: YamlValue = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let entries = section_entries(&document, section)?;
    Ok(entries
        .get(key)
        .and_then(|entry| entry.get(field))
        .and_then(|value| match value {
            YamlValue::String(s) => Some(s.clone()),
            other => key_string(other),
        }))
}

/// Confirm `after` is `before` plus exactly one `section` entry, `key`.
pub fn verify_single_insertion(
    before: &str,
    after: &str,
    section: &str,
    key: &str,
) -> std::result::Result<(), String> {
    let before_doc: YamlValue = serde_yaml::from_str(before).map_err(|e| e.to_string())?;
    let after_doc: YamlValue = serde_yaml::from_str(after)
        .map_err(|e| format!("edit produced invalid YAML: {}", e))?;

    let before_entries = section_entries(&before_doc, section)?;
    let mut after_entries = section_entries(&after_doc, section)?;

    if after_entries.remove(key).is_none() {
        return Err(format!("new '{}' entry {} did not parse", section, key));
    }
    if after_entries != before_entries {
        return Err(format!("existing '{}' entries changed", section));
    }

    let without_section = |mut doc: YamlValue| {
        if let Some(mapping) = doc.as_mapping_mut() {
            mapping.remove(section);
        }
        doc
    };
    if without_section(before_doc) != without_section(after_doc) {
        return Err(format!("content outside '{}' changed", section));
    }

    Ok(())
}

//! Document attribute table.
//!
//! Attributes are document-scoped variables referenced with `{name}`. Values
//! are substituted when an entry is assigned, so a later change to a referenced
//! attribute does not affect attributes assigned earlier.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Matches `:name: value`, `:!name:` and `:name!:` entries.
static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:(!)?([^:\s!]+)(!)?:(?:[ \t]+(.*))?$").unwrap());

/// Matches an attribute reference with any run of preceding backslashes.
static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\*)\{([\p{L}\p{N}_][\p{L}\p{N}_-]*)\}").unwrap());

/// Built-in character replacement attributes.
const INTRINSICS: &[(&str, &str)] = &[
    ("amp", "&amp;"),
    ("apos", "&#39;"),
    ("asterisk", "*"),
    ("backslash", "\\"),
    ("backtick", "`"),
    ("blank", ""),
    ("caret", "^"),
    ("cpp", "C++"),
    ("deg", "&#176;"),
    ("empty", ""),
    ("endsb", "]"),
    ("gt", ">"),
    ("lt", "&lt;"),
    ("nbsp", "&#160;"),
    ("plus", "&#43;"),
    ("pp", "&#43;&#43;"),
    ("quot", "&#34;"),
    ("sp", " "),
    ("startsb", "["),
    ("tilde", "~"),
    ("two-colons", "::"),
    ("two-semicolons", ";;"),
    ("vbar", "|"),
    ("wj", "&#8288;"),
    ("zwsp", "&#8203;"),
];

/// Check whether `name` is a valid attribute name.
///
/// Names consist of letters, digits, underscores and hyphens and must not
/// begin with a hyphen.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphanumeric() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// A parsed attribute entry line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttributeEntry<'a> {
    pub name: &'a str,
    /// `None` when the entry unsets the attribute.
    pub value: Option<&'a str>,
}

/// Parse an attribute entry line such as `:name: value`.
pub(crate) fn parse_entry(line: &str) -> Option<AttributeEntry<'_>> {
    let caps = ENTRY_RE.captures(line)?;
    let name = caps.get(2)?.as_str();
    if !is_valid_name(name) {
        return None;
    }
    let negated = caps.get(1).is_some() || caps.get(3).is_some();
    let value = caps.get(4).map_or("", |m| m.as_str().trim_end());
    Some(AttributeEntry {
        name,
        value: if negated { None } else { Some(value) },
    })
}

/// Attribute table owned by a single conversion.
///
/// Attributes seeded by the caller are locked: document entries cannot change
/// or unset them. The `doctitle` attribute is the exception, as the parsed
/// document title always replaces it.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    values: HashMap<String, String>,
    locked: HashSet<String>,
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeTable {
    /// Create a table holding only the intrinsic attributes.
    #[must_use]
    pub fn new() -> Self {
        let values = INTRINSICS
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        Self {
            values,
            locked: HashSet::new(),
        }
    }

    /// Create a table from caller-provided seed attributes.
    ///
    /// A `None` value seeds an unset attribute that the document cannot set.
    #[must_use]
    pub fn seeded<'a, I>(seeds: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut table = Self::new();
        for (name, value) in seeds {
            match value {
                Some(value) => table.values.insert(name.to_owned(), value.to_owned()),
                None => table.values.remove(name),
            };
            if name != "doctitle" {
                table.locked.insert(name.to_owned());
            }
        }
        table
    }

    /// Get the value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Check whether an attribute is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Set an attribute unless it is locked. Returns whether the value changed.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.locked.contains(name) {
            return false;
        }
        self.values.insert(name.to_owned(), value.into());
        true
    }

    /// Unset an attribute unless it is locked.
    pub fn unset(&mut self, name: &str) -> bool {
        if self.locked.contains(name) {
            return false;
        }
        self.values.remove(name).is_some()
    }

    /// Apply a parsed entry, substituting references in the value first.
    pub(crate) fn assign(&mut self, entry: &AttributeEntry<'_>) {
        match entry.value {
            Some(value) => {
                let value = self.expand(value);
                self.set(entry.name, value);
            }
            None => {
                self.unset(entry.name);
            }
        }
    }

    /// Replace `{name}` references with attribute values.
    ///
    /// Unknown references are left intact. A backslash before a reference
    /// suppresses it and is consumed; each further backslash is kept.
    #[must_use]
    pub fn expand(&self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_owned();
        }
        REFERENCE_RE
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let slashes = &caps[1];
                let name = &caps[2];
                if slashes.is_empty() {
                    return self
                        .get(name)
                        .map_or_else(|| caps[0].to_owned(), ToOwned::to_owned);
                }
                format!("{}{{{name}}}", &slashes[1..])
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_entry_with_value() {
        let entry = parse_entry(":url-org: https://example.org").unwrap();
        assert_eq!(entry.name, "url-org");
        assert_eq!(entry.value, Some("https://example.org"));
    }

    #[test]
    fn test_parse_entry_without_value() {
        let entry = parse_entry(":hide-uri-scheme:").unwrap();
        assert_eq!(entry.value, Some(""));
    }

    #[test]
    fn test_parse_entry_negated() {
        assert_eq!(parse_entry(":!foo:").unwrap().value, None);
        assert_eq!(parse_entry(":foo!:").unwrap().value, None);
    }

    #[test]
    fn test_parse_entry_rejects_leading_hyphen() {
        assert!(parse_entry(":-foo: bar").is_none());
    }

    #[test]
    fn test_parse_entry_requires_space_before_value() {
        assert!(parse_entry(":foo:bar").is_none());
    }

    #[test]
    fn test_parse_entry_unicode_name() {
        assert_eq!(parse_entry(":dépôt-git: x").unwrap().name, "dépôt-git");
        assert_eq!(parse_entry(":1st-author: Jim").unwrap().name, "1st-author");
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("_"));
        assert!(is_valid_name("url-org"));
        assert!(!is_valid_name("-foo"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn test_expand_assignment_time() {
        let mut table = AttributeTable::new();
        table.assign(&parse_entry(":b: one").unwrap());
        table.assign(&parse_entry(":a: {b}").unwrap());
        table.assign(&parse_entry(":b: two").unwrap());
        assert_eq!(table.get("a"), Some("one"));
        assert_eq!(table.expand("{a} {b}"), "one two");
    }

    #[test]
    fn test_expand_leaves_unknown_reference() {
        let table = AttributeTable::new();
        assert_eq!(table.expand("{nope} and {-foo}"), "{nope} and {-foo}");
    }

    #[test]
    fn test_expand_escaped_reference() {
        let table = AttributeTable::new();
        assert_eq!(table.expand(r"\{nbsp}"), "{nbsp}");
        assert_eq!(table.expand(r"\\{nbsp}"), r"\{nbsp}");
    }

    #[test]
    fn test_intrinsics() {
        let table = AttributeTable::new();
        assert_eq!(table.expand("a{sp}b{vbar}c{empty}"), "a b|c");
    }

    #[test]
    fn test_seeded_attributes_are_locked() {
        let mut table = AttributeTable::seeded([("foo", Some("seed")), ("gone", None)]);
        table.assign(&parse_entry(":foo: doc").unwrap());
        table.assign(&parse_entry(":gone: doc").unwrap());
        assert_eq!(table.get("foo"), Some("seed"));
        assert!(!table.contains("gone"));
    }

    #[test]
    fn test_seeded_doctitle_is_not_locked() {
        let mut table = AttributeTable::seeded([("doctitle", Some("Seeded"))]);
        assert!(table.set("doctitle", "Parsed"));
        assert_eq!(table.get("doctitle"), Some("Parsed"));
    }
}

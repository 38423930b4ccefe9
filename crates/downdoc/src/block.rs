//! Line classification and block attribute lists.
//!
//! Every physical line is classified into one [`LineKind`] before the
//! converter makes any state transition. Classification is context free; the
//! converter decides what a kind means in its current state (a list marker
//! inside a plain paragraph is just text).

use std::sync::LazyLock;

use regex::Regex;

use crate::attributes::{self, AttributeEntry};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(={1,6})[ \t]+(\S.*?)\s*$").unwrap());

static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(\*{1,5}|-|\.{1,5}|\d+\.|<(?:\d+|\.)>)[ \t]+(\S.*)$").unwrap()
});

static DLIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(\S.*?)(:{2,4}|;;)(?:[ \t]+(.*))?$").unwrap());

static BLOCK_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^image::([^\s\[][^\[]*)\[(.*)\]$").unwrap());

static BLOCK_ATTRS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[((?:|[\p{L}\p{N}_.#%{,"'\[=].*))\]$"#).unwrap());

static ADMONITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(NOTE|TIP|IMPORTANT|CAUTION|WARNING): (.*)$").unwrap());

static ATTR_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\p{L}\p{N}_][\p{L}\p{N}_-]*)[ \t]*=[ \t]*(.*)$").unwrap());

/// Check whether `id` is usable as an anchor id.
pub(crate) fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'))
}

/// Kind of a delimited block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Listing,
    Literal,
    Fenced,
    Example,
    Sidebar,
    Quote,
    Open,
    Pass,
    Table,
}

/// An opening or closing delimiter line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Delimiter<'a> {
    pub kind: BlockKind,
    /// The delimiter text a closing line must match.
    pub text: &'a str,
    /// Language given on a Markdown-style fence.
    pub lang: Option<&'a str>,
}

/// Marker family of a list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    Unordered,
    Ordered,
    Callout,
    Description,
}

/// A list item line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListItem<'a> {
    pub kind: ListKind,
    /// Marker structure that identifies the nesting level.
    pub signature: String,
    /// Principal text, or the term of a description list item.
    pub text: &'a str,
    /// Inline description of a description list item.
    pub desc: Option<&'a str>,
}

/// Classified physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineKind<'a> {
    Blank,
    AttributeEntry(AttributeEntry<'a>),
    /// Block attribute line, holding the text between the brackets.
    BlockAttributes(&'a str),
    BlockTitle(&'a str),
    Heading { level: usize, title: &'a str },
    Delimiter(Delimiter<'a>),
    ListItem(ListItem<'a>),
    /// A lone `+` list continuation.
    Continuation,
    BlockImage { target: &'a str, attrlist: &'a str },
    ThematicBreak,
    PageBreak,
    Toc,
    Admonition { label: &'a str, text: &'a str },
    MarkdownQuote,
    Indented,
    Text,
}

/// Classify one preprocessed line.
pub(crate) fn classify(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    if line == "+" {
        return LineKind::Continuation;
    }
    if let Some(delimiter) = delimiter(line) {
        return LineKind::Delimiter(delimiter);
    }
    match line {
        "'''" | "---" | "***" => return LineKind::ThematicBreak,
        "<<<" => return LineKind::PageBreak,
        _ => {}
    }
    if let Some(entry) = attributes::parse_entry(line) {
        return LineKind::AttributeEntry(entry);
    }
    if let Some(caps) = BLOCK_ATTRS_RE.captures(line) {
        return LineKind::BlockAttributes(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(title) = block_title(line) {
        return LineKind::BlockTitle(title);
    }
    if let Some(caps) = HEADING_RE.captures(line) {
        return LineKind::Heading {
            level: caps[1].len(),
            title: caps.get(2).map_or("", |m| m.as_str()),
        };
    }
    if let Some(item) = list_item(line) {
        return LineKind::ListItem(item);
    }
    if line.starts_with("toc::[") && line.ends_with(']') {
        return LineKind::Toc;
    }
    if let Some(caps) = BLOCK_IMAGE_RE.captures(line) {
        return LineKind::BlockImage {
            target: caps.get(1).map_or("", |m| m.as_str()),
            attrlist: caps.get(2).map_or("", |m| m.as_str()),
        };
    }
    if let Some(caps) = ADMONITION_RE.captures(line) {
        return LineKind::Admonition {
            label: caps.get(1).map_or("", |m| m.as_str()),
            text: caps.get(2).map_or("", |m| m.as_str()),
        };
    }
    if line == ">" || line.starts_with("> ") {
        return LineKind::MarkdownQuote;
    }
    if line.starts_with([' ', '\t']) {
        return LineKind::Indented;
    }
    LineKind::Text
}

/// Recognize a delimited block line.
pub(crate) fn delimiter(line: &str) -> Option<Delimiter<'_>> {
    if let Some(rest) = line.strip_prefix("```") {
        let lang = rest.trim();
        if lang.contains('`') {
            return None;
        }
        return Some(Delimiter {
            kind: BlockKind::Fenced,
            text: "```",
            lang: (!lang.is_empty()).then_some(lang),
        });
    }
    if line == "--" {
        return Some(Delimiter {
            kind: BlockKind::Open,
            text: line,
            lang: None,
        });
    }
    if line.len() >= 4 && line.starts_with("|=") && line[1..].bytes().all(|b| b == b'=') {
        return Some(Delimiter {
            kind: BlockKind::Table,
            text: line,
            lang: None,
        });
    }
    let first = line.bytes().next()?;
    if line.len() < 4 || !line.bytes().all(|b| b == first) {
        return None;
    }
    let kind = match first {
        b'-' => BlockKind::Listing,
        b'.' => BlockKind::Literal,
        b'=' => BlockKind::Example,
        b'*' => BlockKind::Sidebar,
        b'_' => BlockKind::Quote,
        b'+' => BlockKind::Pass,
        _ => return None,
    };
    Some(Delimiter {
        kind,
        text: line,
        lang: None,
    })
}

/// A block title is `.` followed by text, not `..` followed by another dot
/// or whitespace.
fn block_title(line: &str) -> Option<&str> {
    let title = line.strip_prefix('.')?;
    let probe = title.strip_prefix('.').unwrap_or(title);
    match probe.chars().next() {
        Some(c) if !c.is_whitespace() && c != '.' => Some(title),
        _ => None,
    }
}

/// Recognize a list item of any family.
pub(crate) fn list_item(line: &str) -> Option<ListItem<'_>> {
    if let Some(caps) = LIST_ITEM_RE.captures(line) {
        let marker = caps.get(1).map_or("", |m| m.as_str());
        let text = caps.get(2).map_or("", |m| m.as_str()).trim_end();
        let (kind, signature) = if marker.starts_with('*') || marker == "-" {
            (ListKind::Unordered, marker.to_owned())
        } else if marker.starts_with('<') {
            (ListKind::Callout, "<>".to_owned())
        } else if marker.starts_with('.') {
            (ListKind::Ordered, marker.to_owned())
        } else {
            (ListKind::Ordered, "1.".to_owned())
        };
        return Some(ListItem {
            kind,
            signature,
            text,
            desc: None,
        });
    }
    let caps = DLIST_ITEM_RE.captures(line)?;
    let term = caps.get(1).map_or("", |m| m.as_str());
    if term.starts_with("//") || term.chars().all(|c| c == ':') {
        return None;
    }
    Some(ListItem {
        kind: ListKind::Description,
        signature: caps[2].to_owned(),
        text: term,
        desc: caps.get(3).map(|m| m.as_str().trim_end()),
    })
}

/// Parsed block attribute list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BlockAttrs {
    /// Block style from the first positional attribute.
    pub style: Option<String>,
    pub id: Option<String>,
    pub reftext: Option<String>,
    pub roles: Vec<String>,
    pub options: Vec<String>,
    /// Positional attributes after the style, starting with the second.
    pub positional: Vec<Option<String>>,
    pub named: Vec<(String, String)>,
}

impl BlockAttrs {
    /// Parse the text between the brackets of a block attribute line.
    pub fn parse(text: &str) -> Self {
        let mut attrs = Self::default();
        if let Some(anchor) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let (id, reftext) = match anchor.split_once(',') {
                Some((id, reftext)) => (id.trim(), Some(reftext.trim())),
                None => (anchor.trim(), None),
            };
            if is_valid_id(id) {
                attrs.id = Some(id.to_owned());
                attrs.reftext = reftext.filter(|r| !r.is_empty()).map(ToOwned::to_owned);
            }
            return attrs;
        }
        for (idx, entry) in split_attrlist(text).into_iter().enumerate() {
            if let Some(caps) = ATTR_NAME_RE.captures(&entry) {
                let name = caps[1].to_owned();
                let value = unquote(caps[2].trim()).to_owned();
                attrs.set_named(name, value);
                continue;
            }
            let value = unquote(entry.trim());
            if idx == 0 {
                attrs.parse_shorthand(value);
            } else {
                attrs
                    .positional
                    .push((!value.is_empty()).then(|| value.to_owned()));
            }
        }
        attrs
    }

    fn set_named(&mut self, name: String, value: String) {
        match name.as_str() {
            "id" if is_valid_id(&value) => self.id = Some(value),
            "reftext" => self.reftext = Some(value),
            "role" => self.roles.extend(value.split_whitespace().map(ToOwned::to_owned)),
            "opts" | "options" => self
                .options
                .extend(value.split(',').map(|o| o.trim().to_owned())),
            _ => self.named.push((name, value)),
        }
    }

    /// Parse `style#id.role%option` shorthand.
    fn parse_shorthand(&mut self, value: &str) {
        if value.contains(' ') && !value.starts_with(['#', '.', '%']) {
            self.style = Some(value.to_owned());
            return;
        }
        let mut kind = '\0';
        let mut current = String::new();
        let flush = |kind: char, current: &mut String, attrs: &mut Self| {
            let part = std::mem::take(current);
            if part.is_empty() {
                return;
            }
            match kind {
                '#' if is_valid_id(&part) => attrs.id = Some(part),
                '.' => attrs.roles.push(part),
                '%' => attrs.options.push(part),
                '\0' => attrs.style = Some(part),
                _ => {}
            }
        };
        for c in value.chars() {
            if matches!(c, '#' | '.' | '%') {
                flush(kind, &mut current, self);
                kind = c;
            } else {
                current.push(c);
            }
        }
        flush(kind, &mut current, self);
    }

    /// Merge attributes from a later attribute line into this one.
    pub fn merge(&mut self, other: Self) {
        if other.style.is_some() {
            self.style = other.style;
        }
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.reftext.is_some() {
            self.reftext = other.reftext;
        }
        self.roles.extend(other.roles);
        self.options.extend(other.options);
        for (idx, value) in other.positional.into_iter().enumerate() {
            if self.positional.len() <= idx {
                self.positional.resize(idx + 1, None);
            }
            if value.is_some() {
                self.positional[idx] = value;
            }
        }
        self.named.extend(other.named);
    }

    /// Positional attribute by 1-based index; index 1 is the style.
    pub fn positional(&self, index: usize) -> Option<&str> {
        if index == 1 {
            return self.style.as_deref();
        }
        self.positional.get(index - 2)?.as_deref()
    }

    /// Last value of a named attribute.
    pub fn named(&self, name: &str) -> Option<&str> {
        self.named
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// Split an attribute list on commas outside of quotes.
pub(crate) fn split_attrlist(text: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    for c in text.chars() {
        match (c, quote) {
            ('"' | '\'', None) if current.trim().is_empty() || current.trim_end().ends_with('=') => {
                quote = Some(c);
                current.push(c);
            }
            (q, Some(open)) if q == open => {
                quote = None;
                current.push(c);
            }
            (',', None) => entries.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !entries.is_empty() {
        entries.push(current);
    }
    entries
}

pub(crate) fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

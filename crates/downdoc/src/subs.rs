//! Inline substitutions.
//!
//! Text produced by a substitution step that later steps must not touch is
//! stashed: replaced with a private-use placeholder character and restored
//! once the whole pipeline has run. Cross-references become registry
//! placeholders that survive until the final resolution pass.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::attributes::AttributeTable;
use crate::block::{split_attrlist, unquote};
use crate::xref::Registry;

/// First codepoint of the stash range (supplementary private use area A).
const STASH_BASE: u32 = 0xF_0000;
const STASH_LIMIT: u32 = 0xF_FFFD;

const URL_SCHEMES: &[&str] = &["https://", "http://", "ftp://", "irc://", "mailto:"];

static PASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`\+(.+?)\+`").unwrap());

static STEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:stem|latexmath|asciimath):\[((?:\\\]|[^\]])*)\]").unwrap()
});

static DOUBLE_QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""`(\S|\S.*?\S)`""#).unwrap());

static SINGLE_QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'`(\S|\S.*?\S)`'").unwrap());

static MONOSPACE_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\((?:https?|ftp|irc)://|\.\.\.)").unwrap());

static ESCAPED_REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(\{[\p{L}\p{N}_][\p{L}\p{N}_-]*\})").unwrap());

static URL_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\((?:https?|ftp|irc)://)").unwrap());

static MACRO_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\((?:link|xref|image|mailto):)").unwrap());

static UNCONSTRAINED_STRONG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(\S|\S.*?\S)\*\*").unwrap());

static UNCONSTRAINED_MARK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"##(\S|\S.*?\S)##").unwrap());

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([\p{L}_:][\p{L}\p{N}_:.\-]*)(?:, *([^\]]*?))?\]\]").unwrap()
});

static XREF_SHORTHAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<([^\s<>,][^<>,]*?)(?:,([^>]*))?>>").unwrap());

/// Apply the normal substitution set to one line of text.
pub(crate) fn normal(text: &str, attrs: &AttributeTable, registry: &mut Registry) -> String {
    Substitutor {
        attrs,
        registry,
        stash: Stash::default(),
    }
    .run(text)
}

/// Render an image macro as Markdown.
pub(crate) fn image(target: &str, attrlist: &str, attrs: &AttributeTable) -> String {
    let mut alt = None;
    let mut link = None;
    for (idx, entry) in split_attrlist(attrlist).iter().enumerate() {
        if let Some((name, value)) = entry.split_once('=')
            && crate::attributes::is_valid_name(name.trim())
        {
            let value = unquote(value.trim());
            match name.trim() {
                "alt" => alt = Some(value.to_owned()),
                "link" => link = Some(value.to_owned()),
                _ => {}
            }
        } else if idx == 0 {
            let value = unquote(entry.trim());
            if !value.is_empty() {
                alt = Some(value.to_owned());
            }
        }
    }
    let alt = alt.unwrap_or_else(|| default_alt(target));
    let target = match attrs.get("imagesdir") {
        Some(dir) if !dir.is_empty() && !is_absolute(target) => {
            format!("{}/{target}", dir.trim_end_matches('/'))
        }
        _ => target.to_owned(),
    };
    let image = format!("![{alt}]({target})");
    match link {
        Some(link) => format!("[{image}]({link})"),
        None => image,
    }
}

fn default_alt(target: &str) -> String {
    let basename = target.rsplit('/').next().unwrap_or(target);
    match basename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_owned(),
        _ => basename.to_owned(),
    }
}

fn is_absolute(target: &str) -> bool {
    target.starts_with('/') || target.contains("://") || target.starts_with("data:")
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn starts_with_at(chars: &[char], at: usize, prefix: &str) -> bool {
    let mut idx = at;
    for expected in prefix.chars() {
        if chars.get(idx) != Some(&expected) {
            return false;
        }
        idx += 1;
    }
    true
}

fn left_boundary(chars: &[char], at: usize) -> bool {
    at == 0 || !is_word(chars[at - 1])
}

/// Index of the `]` closing the bracket opened at `open`, honoring `\]`.
fn close_bracket(chars: &[char], open: usize) -> Option<usize> {
    let mut idx = open + 1;
    while idx < chars.len() {
        match chars[idx] {
            '\\' => idx += 2,
            ']' => return Some(idx),
            _ => idx += 1,
        }
    }
    None
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Target and bracketed text of an inline macro whose target starts at
/// `start`. Returns the index of the closing bracket.
fn macro_parts(chars: &[char], start: usize) -> Option<(String, String, usize)> {
    let open = start + chars[start..].iter().position(|&c| c == '[')?;
    let close = close_bracket(chars, open)?;
    Some((
        collect(&chars[start..open]),
        collect(&chars[open + 1..close]),
        close,
    ))
}

fn valid_target(target: &str) -> bool {
    match (target.chars().next(), target.chars().last()) {
        (Some(first), Some(last)) => {
            !first.is_whitespace()
                && !matches!(first, '`' | ':' | '[')
                && !last.is_whitespace()
                && !target.contains('\\')
        }
        _ => false,
    }
}

fn valid_xref_target(target: &str) -> bool {
    valid_target(target)
        && target
            .split_once('#')
            .is_none_or(|(_, fragment)| !fragment.contains(char::is_whitespace))
}

fn hide_scheme(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => rest,
        None => url.strip_prefix("mailto:").unwrap_or(url),
    }
}

/// Replace constrained formatting spans delimited by `marker`.
///
/// An opening mark must be followed by a non-space character and must not
/// follow a word character or a backslash. A closing mark must follow a
/// non-space character and must not be followed by a word character. A
/// boxed attribute list directly before the opening mark is consumed unless
/// it is itself attached to a word; `render` receives its content.
fn constrained<F>(text: &str, marker: char, mut render: F) -> String
where
    F: FnMut(Option<&str>, &str) -> String,
{
    if !text.contains(marker) {
        return text.to_owned();
    }
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut idx = 0;
    while idx < chars.len() {
        if chars[idx] != marker || !opens(&chars, idx) {
            idx += 1;
            continue;
        }
        let Some(close) = closer(&chars, idx, marker) else {
            idx += 1;
            continue;
        };
        let attrlist = attrlist_before(&chars, idx, copied);
        let start = attrlist.as_ref().map_or(idx, |(start, _)| *start);
        out.extend(&chars[copied..start]);
        let content = collect(&chars[idx + 1..close]);
        let role = attrlist.as_ref().map(|(_, role)| role.as_str());
        out.push_str(&render(role, &content));
        copied = close + 1;
        idx = close + 1;
    }
    out.extend(&chars[copied..]);
    out
}

fn opens(chars: &[char], idx: usize) -> bool {
    let next_ok = chars.get(idx + 1).is_some_and(|c| !c.is_whitespace());
    let prev_ok = idx == 0 || (!is_word(chars[idx - 1]) && chars[idx - 1] != '\\');
    next_ok && prev_ok
}

fn closer(chars: &[char], open: usize, marker: char) -> Option<usize> {
    (open + 2..chars.len()).find(|&j| {
        chars[j] == marker
            && !chars[j - 1].is_whitespace()
            && chars.get(j + 1).is_none_or(|&c| !is_word(c))
    })
}

/// Consumable `[role]` ending right before `idx`, not reaching before `floor`.
fn attrlist_before(chars: &[char], idx: usize, floor: usize) -> Option<(usize, String)> {
    if idx == 0 || chars[idx - 1] != ']' {
        return None;
    }
    let mut open = idx - 1;
    loop {
        if open <= floor {
            return None;
        }
        open -= 1;
        match chars[open] {
            '[' => break,
            ']' => return None,
            _ => {}
        }
    }
    if open > 0 && (is_word(chars[open - 1]) || matches!(chars[open - 1], '[' | '\\')) {
        return None;
    }
    Some((open, collect(&chars[open + 1..idx - 1])))
}

/// Turn `'` between a letter or digit and a letter into a curly apostrophe.
fn apostrophes(text: &str) -> String {
    let text = text.replace("`'", "\u{2019}");
    if !text.contains('\'') {
        return text;
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(idx, &c)| {
            let contraction = c == '\''
                && idx > 0
                && chars[idx - 1].is_alphanumeric()
                && chars.get(idx + 1).is_some_and(|n| n.is_alphabetic());
            if contraction { '\u{2019}' } else { c }
        })
        .collect()
}

/// A split `open close` pair, or one mark used on both sides.
fn mark_pair(value: &str) -> (String, String) {
    match value.split_once(' ') {
        Some((open, close)) => (open.to_owned(), close.trim().to_owned()),
        None => (value.to_owned(), value.to_owned()),
    }
}

#[derive(Debug, Default)]
struct Stash {
    items: Vec<String>,
}

impl Stash {
    /// Stash `text`, returning the placeholder to put in its place.
    fn push(&mut self, text: impl Into<String>) -> String {
        let text = text.into();
        let token = u32::try_from(self.items.len())
            .ok()
            .and_then(|n| n.checked_add(STASH_BASE))
            .filter(|&code| code <= STASH_LIMIT)
            .and_then(char::from_u32);
        match token {
            Some(token) => {
                self.items.push(text);
                token.to_string()
            }
            None => text,
        }
    }

    fn get(&self, c: char) -> Option<&str> {
        let index = u32::from(c).checked_sub(STASH_BASE)?;
        self.items
            .get(usize::try_from(index).ok()?)
            .map(String::as_str)
    }

    fn restore(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        self.restore_into(text, &mut out);
        out
    }

    fn restore_into(&self, text: &str, out: &mut String) {
        for c in text.chars() {
            match self.get(c) {
                Some(item) => self.restore_into(item, out),
                None => out.push(c),
            }
        }
    }
}

struct Substitutor<'a> {
    attrs: &'a AttributeTable,
    registry: &'a mut Registry,
    stash: Stash,
}

impl Substitutor<'_> {
    fn run(mut self, text: &str) -> String {
        let text = self.passthroughs(text);
        let text = self.smart_quotes(&text);
        let text = constrained(&text, '`', |_, content| self.monospace(content));
        let text = self.attribute_references(&text);
        let text = self.escapes(&text);
        let text = self.formatting(&text);
        let text = apostrophes(&text);
        let text = self.anchors(&text);
        let text = self.xrefs(&text);
        let text = self.images(&text);
        let text = self.links(&text);
        let text = text.replace('<', "&lt;");
        self.stash.restore(&text)
    }

    fn passthroughs(&mut self, text: &str) -> String {
        let text = if text.contains("`+") {
            PASS_RE
                .replace_all(text, |caps: &Captures<'_>| {
                    self.stash.push(format!("`{}`", &caps[1]))
                })
                .into_owned()
        } else {
            text.to_owned()
        };
        if !text.contains(":[") {
            return text;
        }
        STEM_RE
            .replace_all(&text, |caps: &Captures<'_>| {
                self.stash.push(format!("${}$", caps[1].replace("\\]", "]")))
            })
            .into_owned()
    }

    fn smart_quotes(&mut self, text: &str) -> String {
        if !text.contains("\"`") && !text.contains("'`") {
            return text.to_owned();
        }
        let (double_open, double_close) = match self.attrs.get("quotes") {
            Some(quotes) if !quotes.trim().is_empty() => mark_pair(quotes.trim()),
            _ => ("<q>".to_owned(), "</q>".to_owned()),
        };
        let open = self.stash.push(double_open);
        let close = self.stash.push(double_close);
        let text = DOUBLE_QUOTE_RE.replace_all(text, format!("{open}${{1}}{close}").as_str());
        let open = self.stash.push("<q>");
        let close = self.stash.push("</q>");
        SINGLE_QUOTE_RE
            .replace_all(&text, format!("{open}${{1}}{close}").as_str())
            .into_owned()
    }

    fn monospace(&mut self, content: &str) -> String {
        let literal_xref = self.stash.push("xref:");
        let content = content.replace("\\xref:", &literal_xref);
        let content = MONOSPACE_ESCAPE_RE.replace_all(&content, "$1");
        let content = self.attrs.expand(&content);
        let content = self.xrefs(&content);
        self.stash.push(format!("`{content}`"))
    }

    /// Resolve `{name}` references. An escaped `\{name}` is stashed so the
    /// braces stay literal.
    fn attribute_references(&mut self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_owned();
        }
        let text = ESCAPED_REFERENCE_RE
            .replace_all(text, |caps: &Captures<'_>| self.stash.push(&caps[1]));
        self.attrs.expand(&text)
    }

    fn escapes(&mut self, text: &str) -> String {
        if !text.contains('\\') {
            return text.to_owned();
        }
        let text = URL_ESCAPE_RE.replace_all(text, |caps: &Captures<'_>| {
            self.stash.push(format!("<span>{}</span>", &caps[1]))
        });
        MACRO_ESCAPE_RE
            .replace_all(&text, |caps: &Captures<'_>| self.stash.push(&caps[1]))
            .into_owned()
    }

    fn formatting(&mut self, text: &str) -> String {
        let strong = self.stash.push("**");
        let mark_open = self.stash.push("<mark>");
        let mark_close = self.stash.push("</mark>");
        let text = UNCONSTRAINED_STRONG_RE.replace_all(text, format!("{strong}${{1}}{strong}").as_str());
        let text = UNCONSTRAINED_MARK_RE
            .replace_all(&text, format!("{mark_open}${{1}}{mark_close}").as_str());

        let text = constrained(&text, '*', |_, content| format!("{strong}{content}{strong}"));

        let (strike_open, strike_close) = match self.attrs.get("markdown-strikethrough") {
            Some(value) if !value.is_empty() => mark_pair(value),
            _ => ("~~".to_owned(), "~~".to_owned()),
        };
        let strike_open = self.stash.push(strike_open);
        let strike_close = self.stash.push(strike_close);
        let text = constrained(&text, '#', |role, content| match role {
            None => format!("{mark_open}{content}{mark_close}"),
            Some(role) if role.split(['.', ' ']).any(|r| r == "line-through") => {
                format!("{strike_open}{content}{strike_close}")
            }
            Some(_) => content.to_owned(),
        });

        let emphasis = self.stash.push("_");
        constrained(&text, '_', |_, content| format!("{emphasis}{content}{emphasis}"))
    }

    fn anchors(&mut self, text: &str) -> String {
        if !text.contains("[[") {
            return text.to_owned();
        }
        ANCHOR_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let id = &caps[1];
                let reftext = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_owned())
                    .filter(|r| !r.is_empty());
                self.registry.register(id, reftext, id.to_owned());
                self.stash.push(format!("<a name=\"{id}\"></a>"))
            })
            .into_owned()
    }

    fn xrefs(&mut self, text: &str) -> String {
        let text = if text.contains("<<") {
            XREF_SHORTHAND_RE
                .replace_all(text, |caps: &Captures<'_>| {
                    let reftext = caps.get(2).map(|m| m.as_str().trim().to_owned());
                    self.registry.placeholder(&caps[1], reftext).to_string()
                })
                .into_owned()
        } else {
            text.to_owned()
        };
        if !text.contains("xref:") {
            return text;
        }
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut idx = 0;
        while idx < chars.len() {
            if starts_with_at(&chars, idx, "xref:")
                && left_boundary(&chars, idx)
                && let Some((target, reftext, close)) = macro_parts(&chars, idx + 5)
                && valid_xref_target(&target)
            {
                out.push(self.registry.placeholder(&target, Some(reftext)));
                idx = close + 1;
                continue;
            }
            out.push(chars[idx]);
            idx += 1;
        }
        out
    }

    fn images(&mut self, text: &str) -> String {
        if !text.contains("image:") {
            return text.to_owned();
        }
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut idx = 0;
        while idx < chars.len() {
            if starts_with_at(&chars, idx, "image:")
                && left_boundary(&chars, idx)
                && let Some((target, attrlist, close)) = macro_parts(&chars, idx + 6)
                && valid_target(&target)
            {
                out.push_str(&self.stash.push(image(&target, &attrlist, self.attrs)));
                idx = close + 1;
                continue;
            }
            out.push(chars[idx]);
            idx += 1;
        }
        out
    }

    fn links(&mut self, text: &str) -> String {
        if !text.contains(':') {
            return text.to_owned();
        }
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut idx = 0;
        while idx < chars.len() {
            if left_boundary(&chars, idx)
                && let Some((rendered, next)) = self.link_at(&chars, idx)
            {
                out.push_str(&rendered);
                idx = next;
                continue;
            }
            out.push(chars[idx]);
            idx += 1;
        }
        out
    }

    /// Recognize a link macro, URL macro or bare URL starting at `idx`.
    fn link_at(&mut self, chars: &[char], idx: usize) -> Option<(String, usize)> {
        if starts_with_at(chars, idx, "link:") {
            let (target, text, close) = macro_parts(chars, idx + 5)?;
            if target.is_empty() || target.starts_with(':') || target.contains(char::is_whitespace) {
                return None;
            }
            return Some((self.link(&target, &text), close + 1));
        }
        let scheme = URL_SCHEMES
            .iter()
            .find(|scheme| starts_with_at(chars, idx, scheme))?;
        let host = idx + scheme.chars().count();
        let end = (host..chars.len())
            .find(|&j| chars[j].is_whitespace() || matches!(chars[j], '[' | '<' | '>' | '"'))
            .unwrap_or(chars.len());
        if end == host {
            return None;
        }
        if chars.get(end) == Some(&'[')
            && let Some(close) = close_bracket(chars, end)
        {
            let target = collect(&chars[idx..end]);
            let text = collect(&chars[end + 1..close]);
            return Some((self.link(&target, &text), close + 1));
        }
        if *scheme == "mailto:" {
            return None;
        }
        let mut url_end = end;
        while url_end > host && matches!(chars[url_end - 1], '.' | ',' | ';' | ':' | '!' | '?' | ')') {
            url_end -= 1;
        }
        let url = collect(&chars[idx..url_end]);
        let rendered = if self.attrs.contains("hide-uri-scheme") {
            format!("[{}]({url})", hide_scheme(&url))
        } else {
            url
        };
        Some((self.stash.push(rendered), url_end))
    }

    fn link(&mut self, target: &str, text: &str) -> String {
        let text = text.strip_suffix('^').unwrap_or(text);
        let text = if text.is_empty() {
            if self.attrs.contains("hide-uri-scheme") {
                hide_scheme(target)
            } else {
                target
            }
        } else {
            text
        };
        self.stash.push(format!("[{text}]({target})"))
    }
}

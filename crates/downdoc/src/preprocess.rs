//! Preprocessor line filter.
//!
//! Evaluates `ifdef`/`ifndef` conditionals, drops comments and `include`
//! directives, and unescapes escaped directives. Runs one line at a time
//! against the live attribute table so entries above a conditional affect it.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::attributes::AttributeTable;

static CONDITIONAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\\)?(ifdef|ifndef|endif)::([^\[\s]*)\[(.*)\]$").unwrap());

static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\\)?include::\S.*\[.*\]$").unwrap());

/// Result of filtering one line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Filtered<'a> {
    /// Pass the line on to the converter.
    Line(Cow<'a, str>),
    /// Drop the line.
    Skip,
    /// A block comment opened here. Ends an open paragraph.
    CommentStart,
}

/// Line filter for conditionals and comments.
#[derive(Debug, Default)]
pub(crate) struct Preprocessor {
    /// Evaluated conditions of open block conditionals. Inside a false
    /// region every nested opener is pushed as `false`.
    conditions: Vec<bool>,
    /// Delimiter of the open block comment.
    comment: Option<String>,
}

impl Preprocessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn skipping(&self) -> bool {
        self.conditions.last() == Some(&false)
    }

    /// Filter one line.
    ///
    /// In `verbatim` regions comments are content, but conditionals are still
    /// evaluated and includes dropped.
    pub fn filter<'a>(
        &mut self,
        line: &'a str,
        attrs: &AttributeTable,
        verbatim: bool,
    ) -> Filtered<'a> {
        if let Some(delimiter) = &self.comment {
            if line == delimiter.as_str() {
                self.comment = None;
            }
            return Filtered::Skip;
        }

        if let Some(caps) = CONDITIONAL_RE.captures(line) {
            if caps.get(1).is_some() {
                if self.skipping() {
                    return Filtered::Skip;
                }
                return Filtered::Line(Cow::Borrowed(&line[1..]));
            }
            let names = caps.get(3).map_or("", |m| m.as_str());
            let body = caps.get(4).map_or("", |m| m.as_str());
            if &caps[2] == "endif" {
                if self.conditions.pop().is_none() {
                    return Filtered::Line(Cow::Borrowed(line));
                }
                return Filtered::Skip;
            }
            if self.skipping() {
                if body.is_empty() {
                    self.conditions.push(false);
                }
                return Filtered::Skip;
            }
            if names.is_empty() {
                return Filtered::Line(Cow::Borrowed(line));
            }
            let outcome = evaluate(names, &caps[2] == "ifndef", attrs);
            if body.is_empty() {
                self.conditions.push(outcome);
                return Filtered::Skip;
            }
            return if outcome {
                Filtered::Line(Cow::Borrowed(body))
            } else {
                Filtered::Skip
            };
        }

        if self.skipping() {
            return Filtered::Skip;
        }

        if !verbatim {
            if is_comment_delimiter(line) {
                self.comment = Some(line.to_owned());
                return Filtered::CommentStart;
            }
            if line.starts_with("//") && !line.starts_with("///") {
                return Filtered::Skip;
            }
        }

        if INCLUDE_RE.is_match(line) {
            if line.starts_with('\\') {
                return Filtered::Line(Cow::Borrowed(&line[1..]));
            }
            return Filtered::Skip;
        }

        Filtered::Line(Cow::Borrowed(line))
    }

    /// Report regions left open at the end of input.
    pub fn finish(&mut self) {
        if !self.conditions.is_empty() {
            warn!(open = self.conditions.len(), "unterminated preprocessor conditional");
            self.conditions.clear();
        }
        if self.comment.take().is_some() {
            warn!("unterminated block comment");
        }
    }
}

/// A block comment delimiter is a line of four or more slashes.
fn is_comment_delimiter(line: &str) -> bool {
    line.len() >= 4 && line.bytes().all(|b| b == b'/')
}

/// Evaluate a conditional's attribute names.
///
/// `a,b` is true when any of the names is set, `a+b` when all are.
fn evaluate(names: &str, negate: bool, attrs: &AttributeTable) -> bool {
    let defined = if names.contains(',') {
        names.split(',').any(|name| attrs.contains(name))
    } else {
        names.split('+').all(|name| attrs.contains(name))
    };
    defined != negate
}

//! Document header processing.
//!
//! The header is the document title followed, without a blank line, by an
//! optional author line, an optional revision line and attribute entries.
//! Attribute entries above the title also belong to the header.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::attributes::{self, AttributeTable};

static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^([\p{L}\p{N}_][\p{L}\p{N}_\-'.]*)",
        r"(?: +([\p{L}\p{N}_][\p{L}\p{N}_\-'.]*))?",
        r"(?: +([\p{L}\p{N}_][\p{L}\p{N}_\-'.]*))?",
        r"(?: +<([^>\s]+)>)?$",
    ))
    .unwrap()
});

static REVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:v(\d[^\s,:]*))?(?:,? *(\d{4}-\d{2}-\d{2}))?(?:: +(.+))?$").unwrap()
});

/// A document author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Author {
    pub firstname: String,
    pub middlename: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
}

impl Author {
    fn name(&self) -> String {
        [
            Some(self.firstname.as_str()),
            self.middlename.as_deref(),
            self.lastname.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }

    fn initials(&self) -> String {
        [
            Some(self.firstname.as_str()),
            self.middlename.as_deref(),
            self.lastname.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(|part| part.chars().next())
        .collect()
    }
}

/// Parse an author line: one or more `Name <email>` entries separated by `;`.
pub(crate) fn parse_authors(line: &str) -> Option<Vec<Author>> {
    line.split(';')
        .map(|segment| {
            let caps = AUTHOR_RE.captures(segment.trim())?;
            let part = |idx| caps.get(idx).map(|m| m.as_str().to_owned());
            let (middlename, lastname) = match (part(2), part(3)) {
                (Some(middle), Some(last)) => (Some(middle), Some(last)),
                (last, None) => (None, last),
                (None, Some(last)) => (None, Some(last)),
            };
            Some(Author {
                firstname: part(1)?,
                middlename,
                lastname,
                email: part(4),
            })
        })
        .collect()
}

/// A parsed revision line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Revision {
    pub number: Option<String>,
    pub date: Option<String>,
    pub remark: Option<String>,
}

/// Parse a revision line such as `v1.0.0`, `2022-10-22` or `v2, 2022-10-22`.
pub(crate) fn parse_revision(line: &str) -> Option<Revision> {
    let caps = REVISION_RE.captures(line)?;
    let field = |idx| caps.get(idx).map(|m| m.as_str().to_owned());
    let revision = Revision {
        number: field(1),
        date: field(2),
        remark: field(3),
    };
    if revision.number.is_none() && revision.date.is_none() {
        return None;
    }
    Some(revision)
}

/// Extract the document title from a level-0 heading line.
pub(crate) fn doctitle(line: &str) -> Option<&str> {
    let title = line.strip_prefix("= ")?.trim();
    (!title.is_empty()).then_some(title)
}

fn apply_authors(authors: &[Author], attrs: &mut AttributeTable) {
    let Some(first) = authors.first() else {
        return;
    };
    let names: Vec<String> = authors.iter().map(Author::name).collect();
    attrs.set("author", names[0].clone());
    attrs.set("authors", names.join(", "));
    attrs.set("authorcount", authors.len().to_string());
    attrs.set("firstname", first.firstname.clone());
    if let Some(middlename) = &first.middlename {
        attrs.set("middlename", middlename.clone());
    }
    if let Some(lastname) = &first.lastname {
        attrs.set("lastname", lastname.clone());
    }
    attrs.set("authorinitials", first.initials());
    if let Some(email) = &first.email {
        attrs.set("email", email.clone());
    }
    for (idx, (author, name)) in authors.iter().zip(&names).enumerate().skip(1) {
        let n = idx + 1;
        attrs.set(&format!("author_{n}"), name.clone());
        if let Some(email) = &author.email {
            attrs.set(&format!("email_{n}"), email.clone());
        }
    }
}

fn apply_revision(revision: Revision, attrs: &mut AttributeTable) {
    if let Some(number) = revision.number {
        attrs.set("revnumber", number);
    }
    if let Some(date) = revision.date {
        attrs.set("revdate", date);
    }
    if let Some(remark) = revision.remark {
        attrs.set("revremark", remark);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the title: blank lines, attribute entries and block attributes.
    Preamble { seen_entry: bool },
    /// Lines directly below the title.
    AfterTitle { lines: usize, has_author: bool },
    Done,
}

/// Outcome of feeding a line to the header processor.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeaderStep<'a> {
    /// The line belongs to the header and produces no output.
    Consumed,
    /// The line is the document title.
    Title(&'a str),
    /// The header is over; the line starts the body.
    Body,
}

/// Consumes header lines and seeds the attribute table.
#[derive(Debug)]
pub(crate) struct HeaderProcessor {
    state: State,
}

impl Default for HeaderProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Preamble { seen_entry: false },
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Whether the title has not been seen yet.
    pub fn in_preamble(&self) -> bool {
        matches!(self.state, State::Preamble { .. })
    }

    /// Feed one preprocessed line. `discrete` is set when the pending block
    /// attributes mark the next heading as discrete.
    pub fn process<'a>(
        &mut self,
        line: &'a str,
        attrs: &mut AttributeTable,
        discrete: bool,
    ) -> HeaderStep<'a> {
        match self.state {
            State::Done => HeaderStep::Body,
            State::Preamble { seen_entry } => {
                if line.trim().is_empty() {
                    if seen_entry {
                        self.state = State::Done;
                        return HeaderStep::Body;
                    }
                    return HeaderStep::Consumed;
                }
                if let Some(entry) = attributes::parse_entry(line) {
                    attrs.assign(&entry);
                    self.state = State::Preamble { seen_entry: true };
                    return HeaderStep::Consumed;
                }
                if !discrete && let Some(title) = doctitle(line) {
                    let value = attrs.expand(title);
                    attrs.set("doctitle", value);
                    debug!(title, "parsed document title");
                    self.state = State::AfterTitle {
                        lines: 0,
                        has_author: false,
                    };
                    return HeaderStep::Title(title);
                }
                self.state = State::Done;
                HeaderStep::Body
            }
            State::AfterTitle { lines, has_author } => {
                if line.trim().is_empty() {
                    self.state = State::Done;
                    return HeaderStep::Body;
                }
                let mut has_author = has_author;
                if let Some(entry) = attributes::parse_entry(line) {
                    attrs.assign(&entry);
                } else if lines == 0 {
                    if let Some(authors) = parse_authors(line) {
                        apply_authors(&authors, attrs);
                        has_author = true;
                    }
                } else if lines == 1
                    && has_author
                    && let Some(revision) = parse_revision(line)
                {
                    apply_revision(revision, attrs);
                }
                self.state = State::AfterTitle {
                    lines: lines + 1,
                    has_author,
                };
                HeaderStep::Consumed
            }
        }
    }

    /// Close the header at the end of input.
    pub fn finish(&mut self) {
        self.state = State::Done;
    }
}

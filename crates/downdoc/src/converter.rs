//! Block and list context stack machine.
//!
//! Lines arrive one at a time, already filtered by the preprocessor. Each line
//! is classified by [`block::classify`] and then interpreted against the
//! current state:
//!
//! - an optional *leaf* block that collects lines (paragraph, literal
//!   paragraph, verbatim block, passthrough block or table),
//! - a stack of *frames* (list contexts and delimited containers) that decides
//!   the prefix of every emitted line,
//! - pending block metadata (attribute list and title) for the next block.
//!
//! Output lines may contain cross-reference placeholders; they are resolved
//! by the output assembler once the whole document has been seen.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::attributes::AttributeTable;
use crate::block::{self, BlockAttrs, BlockKind, Delimiter, LineKind, ListItem, ListKind};
use crate::header::{HeaderProcessor, HeaderStep};
use crate::output;
use crate::preprocess::{Filtered, Preprocessor};
use crate::subs;
use crate::table::Table;
use crate::xref::{self, Registry};

/// Trailing run of callout markers on a verbatim line.
static CONUM_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:(?:^|[ \t]+)<(?:\d+|\.)>)+[ \t]*$").unwrap());

static CONUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(\d+|\.)>").unwrap());

const ADMONITIONS: &[(&str, &str)] = &[
    ("NOTE", "📌"),
    ("TIP", "💡"),
    ("IMPORTANT", "❗"),
    ("CAUTION", "🔥"),
    ("WARNING", "⚠️"),
];

fn admonition_emoji(label: &str) -> Option<&'static str> {
    ADMONITIONS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, emoji)| *emoji)
}

/// One nesting level of a list.
#[derive(Debug)]
struct Level {
    kind: ListKind,
    signature: String,
    qanda: bool,
    counter: usize,
    /// Column of the marker.
    marker_indent: usize,
    /// Column of content attached to the item.
    content_indent: usize,
}

/// A list and the state of its current item.
#[derive(Debug, Default)]
struct ListContext {
    levels: Vec<Level>,
    /// Blocks attached to the current item are being emitted.
    attached: bool,
    /// A list continuation was seen; the next block attaches.
    attach_next: bool,
    after_blank: bool,
}

impl ListContext {
    fn content_indent(&self) -> usize {
        self.levels.last().map_or(0, |level| level.content_indent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ContainerStyle {
    Plain,
    Quote { attribution: Option<String> },
    Admonition,
    Details,
    Spoiler,
}

/// An open delimited container.
#[derive(Debug)]
struct Container {
    kind: BlockKind,
    delimiter: String,
    style: ContainerStyle,
    /// Output length when the container opened.
    start: usize,
}

#[derive(Debug)]
enum Frame {
    List(ListContext),
    Container(Container),
}

/// What precedes the text lines of a paragraph.
#[derive(Debug)]
enum Lead {
    None,
    Admonition { label: String, emoji: &'static str },
    /// A rendered list marker such as `* ` or `2. `.
    Item { marker: String, indent: usize },
    /// A rendered description list term.
    Term {
        term: String,
        indent: usize,
        inline: bool,
    },
    MarkdownQuote,
}

#[derive(Debug)]
struct Paragraph {
    lead: Lead,
    lines: Vec<String>,
    attrs: BlockAttrs,
    title: Option<String>,
}

#[derive(Debug)]
struct Literal {
    lines: Vec<String>,
    attrs: BlockAttrs,
    title: Option<String>,
}

#[derive(Debug)]
struct Verbatim {
    delimiter: String,
    lang: Option<String>,
    lines: Vec<String>,
    attrs: BlockAttrs,
    title: Option<String>,
}

#[derive(Debug)]
struct Pass {
    delimiter: String,
    lines: Vec<String>,
    stem: bool,
}

#[derive(Debug)]
struct TableBlock {
    delimiter: String,
    table: Table,
    attrs: BlockAttrs,
    title: Option<String>,
}

/// The block currently collecting lines.
#[derive(Debug)]
enum Leaf {
    Paragraph(Paragraph),
    Literal(Literal),
    Verbatim(Verbatim),
    Pass(Pass),
    Table(TableBlock),
}

impl Leaf {
    /// Closing delimiter of a delimited leaf block.
    fn delimiter(&self) -> Option<&str> {
        match self {
            Self::Verbatim(block) => Some(&block.delimiter),
            Self::Pass(block) => Some(&block.delimiter),
            Self::Table(block) => Some(&block.delimiter),
            Self::Paragraph(_) | Self::Literal(_) => None,
        }
    }

    fn push_raw(&mut self, line: &str) {
        match self {
            Self::Verbatim(block) => block.lines.push(line.to_owned()),
            Self::Pass(block) => block.lines.push(line.to_owned()),
            Self::Table(block) => block.table.push_line(line),
            Self::Paragraph(block) => block.lines.push(line.to_owned()),
            Self::Literal(block) => block.lines.push(line.to_owned()),
        }
    }
}

/// Converts one document.
#[derive(Debug)]
pub(crate) struct Converter {
    attrs: AttributeTable,
    registry: Registry,
    preprocessor: Preprocessor,
    header: HeaderProcessor,
    frames: Vec<Frame>,
    leaf: Option<Leaf>,
    pending_attrs: BlockAttrs,
    pending_title: Option<String>,
    pending_blank: bool,
    /// Occurrences of each heading slug, for de-duplicated fragments.
    slugs: HashMap<String, usize>,
    out: Vec<String>,
}

impl Converter {
    pub fn new(attrs: AttributeTable) -> Self {
        Self {
            attrs,
            registry: Registry::new(),
            preprocessor: Preprocessor::new(),
            header: HeaderProcessor::new(),
            frames: Vec::new(),
            leaf: None,
            pending_attrs: BlockAttrs::default(),
            pending_title: None,
            pending_blank: false,
            slugs: HashMap::new(),
            out: Vec::new(),
        }
    }

    /// Convert `source` and assemble the final output.
    pub fn convert(mut self, source: &str) -> String {
        for line in source.lines() {
            self.feed(line);
        }
        self.finish();
        let line_break = self.line_break();
        output::assemble(&self.out, &self.registry, &line_break)
    }

    fn feed(&mut self, raw: &str) {
        let verbatim = matches!(self.leaf, Some(Leaf::Verbatim(_) | Leaf::Pass(_)));
        let line = match self.preprocessor.filter(raw, &self.attrs, verbatim) {
            Filtered::Skip => return,
            Filtered::CommentStart => {
                if matches!(self.leaf, Some(Leaf::Paragraph(_) | Leaf::Literal(_))) {
                    self.flush_leaf();
                }
                return;
            }
            Filtered::Line(line) => line,
        };
        if !self.header.is_done() && !self.header_line(&line) {
            return;
        }
        self.line(&line);
    }

    /// Route a line through the header processor. Returns whether the line
    /// belongs to the body.
    fn header_line(&mut self, line: &str) -> bool {
        if self.header.in_preamble()
            && let LineKind::BlockAttributes(inner) = block::classify(line)
        {
            self.pending_attrs.merge(BlockAttrs::parse(inner));
            return false;
        }
        let discrete = self.is_discrete();
        match self.header.process(line, &mut self.attrs, discrete) {
            HeaderStep::Consumed => false,
            HeaderStep::Title(title) => {
                self.doctitle(title);
                false
            }
            HeaderStep::Body => true,
        }
    }

    fn doctitle(&mut self, title: &str) {
        let (attrs, _) = self.take_metadata();
        let text = self.subs(title);
        let fragment = self.fragment(&text);
        if let Some(id) = &attrs.id {
            let reftext = attrs.reftext.clone().unwrap_or_else(|| text.clone());
            self.registry.register(id, Some(reftext), fragment);
        }
        self.emit(&format!("# {text}"));
    }

    fn line(&mut self, line: &str) {
        if self.raw_line(line) {
            return;
        }
        let kind = block::classify(line);
        if self.leaf.is_some() && self.continue_leaf(line, &kind) {
            return;
        }
        self.block_line(line, kind);
    }

    /// Feed a line to an open delimited leaf. Returns whether it took the line.
    fn raw_line(&mut self, line: &str) -> bool {
        let Some(leaf) = &mut self.leaf else {
            return false;
        };
        let Some(delimiter) = leaf.delimiter() else {
            return false;
        };
        if line == delimiter {
            self.flush_leaf();
        } else {
            leaf.push_raw(line);
        }
        true
    }

    /// Offer a line to the open paragraph. When the line does not belong to
    /// it, the paragraph is flushed and `false` returned.
    fn continue_leaf(&mut self, line: &str, kind: &LineKind<'_>) -> bool {
        let in_list = matches!(self.frames.last(), Some(Frame::List(_)));
        let continues = match &self.leaf {
            Some(Leaf::Paragraph(_)) => match kind {
                LineKind::Blank | LineKind::BlockAttributes(_) | LineKind::Delimiter(_) => false,
                LineKind::ListItem(_) | LineKind::Continuation => !in_list,
                _ => true,
            },
            Some(Leaf::Literal(_)) => matches!(kind, LineKind::Indented),
            _ => false,
        };
        if continues {
            if let Some(leaf) = &mut self.leaf {
                leaf.push_raw(line);
            }
        } else {
            self.flush_leaf();
        }
        continues
    }

    fn block_line(&mut self, line: &str, kind: LineKind<'_>) {
        match kind {
            LineKind::Blank => {
                if let Some(Frame::List(list)) = self.frames.last_mut() {
                    list.after_blank = true;
                }
                self.pending_blank = true;
            }
            LineKind::AttributeEntry(entry) => self.attrs.assign(&entry),
            LineKind::BlockAttributes(inner) => {
                if let Some(Frame::List(list)) = self.frames.last()
                    && !list.attach_next
                    && (list.attached || list.after_blank)
                {
                    self.end_lists();
                }
                self.pending_attrs.merge(BlockAttrs::parse(inner));
            }
            LineKind::BlockTitle(title) => self.pending_title = Some(title.to_owned()),
            LineKind::Heading { level, title } => {
                if self.in_container() && !self.is_discrete() {
                    self.start_paragraph(line, Lead::None);
                } else {
                    self.heading(level, title);
                }
            }
            LineKind::Delimiter(delimiter) => self.delimiter(&delimiter),
            LineKind::ListItem(item) => self.list_item(&item),
            LineKind::Continuation => {
                if let Some(Frame::List(list)) = self.frames.last_mut() {
                    list.attach_next = true;
                    list.after_blank = false;
                    self.pending_blank = true;
                } else {
                    self.start_paragraph(line, Lead::None);
                }
            }
            LineKind::BlockImage { target, attrlist } => self.block_image(target, attrlist),
            LineKind::ThematicBreak => {
                self.attach_or_end_list(false);
                self.take_metadata();
                self.emit("---");
            }
            LineKind::PageBreak | LineKind::Toc => {
                self.take_metadata();
            }
            LineKind::Admonition { label, text } => match admonition_emoji(label) {
                Some(emoji) => self.start_paragraph(
                    text,
                    Lead::Admonition {
                        label: label.to_owned(),
                        emoji,
                    },
                ),
                None => self.start_paragraph(line, Lead::None),
            },
            LineKind::MarkdownQuote => self.start_paragraph(line, Lead::MarkdownQuote),
            LineKind::Indented => self.literal(line),
            LineKind::Text => self.start_paragraph(line, Lead::None),
        }
    }

    fn heading(&mut self, level: usize, title: &str) {
        self.end_lists();
        let (attrs, _) = self.take_metadata();
        let text = self.subs(title);
        let id = match attrs.id {
            Some(id) => id,
            None => self.section_id(&text),
        };
        let reftext = attrs.reftext.unwrap_or_else(|| text.clone());
        let fragment = self.fragment(&text);
        self.registry.register(&id, Some(reftext), fragment);
        self.registry.register_title(&text, &id);
        debug!(level, id = %id, "section");
        self.emit(&format!("{} {text}", "#".repeat(level)));
    }

    /// Generated id for a section without an explicit one, made unique with
    /// a numeric suffix.
    fn section_id(&self, title: &str) -> String {
        let prefix = self.attrs.get("idprefix").unwrap_or("_");
        let separator = self.attrs.get("idseparator").unwrap_or("_");
        let base = xref::section_id(title, prefix, separator);
        if !self.registry.contains(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let id = format!("{base}{separator}{n}");
            if !self.registry.contains(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Fragment Markdown renderers give a heading, counting repeats.
    fn fragment(&mut self, title: &str) -> String {
        let slug = xref::markdown_slug(title);
        let seen = self.slugs.entry(slug.clone()).or_insert(0);
        let fragment = match *seen {
            0 => slug,
            n => format!("{slug}-{n}"),
        };
        *seen += 1;
        fragment
    }

    fn delimiter(&mut self, delimiter: &Delimiter<'_>) {
        if self.close_container(delimiter.text) {
            return;
        }
        self.attach_or_end_list(false);
        let (attrs, title) = self.take_metadata();
        match delimiter.kind {
            BlockKind::Listing | BlockKind::Literal | BlockKind::Fenced => {
                let lang = self.verbatim_lang(delimiter, &attrs);
                self.leaf = Some(Leaf::Verbatim(Verbatim {
                    delimiter: delimiter.text.to_owned(),
                    lang,
                    lines: Vec::new(),
                    attrs,
                    title,
                }));
            }
            BlockKind::Pass => {
                let stem = matches!(
                    attrs.style.as_deref(),
                    Some("stem" | "latexmath" | "asciimath")
                );
                self.leaf = Some(Leaf::Pass(Pass {
                    delimiter: delimiter.text.to_owned(),
                    lines: Vec::new(),
                    stem,
                }));
            }
            BlockKind::Table => {
                self.leaf = Some(Leaf::Table(TableBlock {
                    delimiter: delimiter.text.to_owned(),
                    table: Table::new(&attrs),
                    attrs,
                    title,
                }));
            }
            BlockKind::Example | BlockKind::Sidebar | BlockKind::Quote | BlockKind::Open => {
                self.open_container(delimiter, &attrs, title);
            }
        }
    }

    fn verbatim_lang(&self, delimiter: &Delimiter<'_>, attrs: &BlockAttrs) -> Option<String> {
        if delimiter.kind == BlockKind::Fenced {
            return delimiter.lang.map(ToOwned::to_owned);
        }
        let explicit = || attrs.positional(2).map(ToOwned::to_owned);
        let default = || {
            self.attrs
                .get("source-language")
                .filter(|lang| !lang.is_empty())
                .map(ToOwned::to_owned)
        };
        match attrs.style.as_deref() {
            Some("source") => explicit().or_else(default),
            Some("listing" | "literal") => None,
            Some(style) => Some(style.to_owned()),
            None if delimiter.kind == BlockKind::Listing => explicit().or_else(default),
            None => None,
        }
    }

    fn open_container(&mut self, delimiter: &Delimiter<'_>, attrs: &BlockAttrs, title: Option<String>) {
        self.flush_blank();
        let kind = delimiter.kind;
        let style_name = attrs.style.as_deref();
        let admonition = style_name
            .filter(|_| matches!(kind, BlockKind::Example | BlockKind::Open))
            .and_then(|label| admonition_emoji(label).map(|emoji| (label, emoji)));

        let style = if let Some((label, emoji)) = admonition {
            let anchor = attrs.id.as_deref().map(anchor).unwrap_or_default();
            let title = match title {
                Some(title) => format!(": {}", self.subs(&title)),
                None => String::new(),
            };
            self.emit(&format!(
                "<dl><dt><strong>{anchor}{emoji} {label}{title}</strong></dt><dd>"
            ));
            self.emit("");
            ContainerStyle::Admonition
        } else if kind == BlockKind::Example && attrs.has_option("collapsible") {
            let summary = title.map(|title| self.subs(&title));
            if self.attrs.get("markdown-collapsible-variant") == Some("spoiler") {
                match summary {
                    Some(summary) => self.emit(&format!("```spoiler {summary}")),
                    None => self.emit("```spoiler"),
                }
                ContainerStyle::Spoiler
            } else {
                self.emit(if attrs.has_option("open") {
                    "<details open>"
                } else {
                    "<details>"
                });
                let summary = summary.as_deref().unwrap_or("Details");
                self.emit(&format!("<summary>{summary}</summary>"));
                self.emit("");
                ContainerStyle::Details
            }
        } else {
            self.block_title(title, attrs);
            if kind == BlockKind::Quote || matches!(style_name, Some("quote" | "verse")) {
                let attribution = self.attribution(attrs);
                ContainerStyle::Quote { attribution }
            } else {
                ContainerStyle::Plain
            }
        };

        debug!(?kind, ?style, "opened container");
        self.frames.push(Frame::Container(Container {
            kind,
            delimiter: delimiter.text.to_owned(),
            style,
            start: self.out.len(),
        }));
    }

    fn attribution(&mut self, attrs: &BlockAttrs) -> Option<String> {
        let attribution = attrs
            .positional(2)
            .or_else(|| attrs.named("attribution"))
            .map(ToOwned::to_owned)?;
        let mut line = format!("— {}", self.subs(&attribution));
        if let Some(cite) = attrs
            .positional(3)
            .or_else(|| attrs.named("citetitle"))
            .map(ToOwned::to_owned)
        {
            line.push_str(", ");
            line.push_str(&self.subs(&cite));
        }
        Some(line)
    }

    /// Close the nearest open container with this delimiter, along with any
    /// list opened inside it.
    fn close_container(&mut self, delimiter: &str) -> bool {
        let Some(pos) = self.frames.iter().rposition(
            |frame| matches!(frame, Frame::Container(container) if container.delimiter == delimiter),
        ) else {
            return false;
        };
        self.pending_blank = false;
        self.take_metadata();
        self.frames.truncate(pos + 1);

        if let Some(Frame::Container(Container {
            style: ContainerStyle::Quote {
                attribution: Some(attribution),
            },
            ..
        })) = self.frames.last()
        {
            let attribution = attribution.clone();
            self.emit("");
            self.emit(&attribution);
        }
        let Some(Frame::Container(container)) = self.frames.pop() else {
            return false;
        };
        debug!(kind = ?container.kind, "closed container");
        match container.style {
            ContainerStyle::Admonition => self.emit("</dd></dl>"),
            ContainerStyle::Details => self.emit("</details>"),
            ContainerStyle::Spoiler => self.emit("```"),
            ContainerStyle::Plain | ContainerStyle::Quote { .. } => {}
        }
        true
    }

    fn list_item(&mut self, item: &ListItem<'_>) {
        let (attrs, title) = self.take_metadata();
        if matches!(self.frames.last(), Some(Frame::List(_))) {
            self.pending_blank = false;
        } else {
            self.block_title(title, &attrs);
            debug!("opened list");
            self.frames.push(Frame::List(ListContext::default()));
        }
        let step = self
            .attrs
            .get("markdown-list-indent")
            .and_then(|value| value.trim().parse::<usize>().ok());
        let qanda = item.kind == ListKind::Description && attrs.style.as_deref() == Some("qanda");

        let Some(Frame::List(list)) = self.frames.last_mut() else {
            return;
        };
        list.attached = false;
        list.attach_next = false;
        list.after_blank = false;
        let content_indent = list.content_indent();
        let level = match list
            .levels
            .iter()
            .position(|level| level.signature == item.signature)
        {
            Some(idx) => {
                list.levels.truncate(idx + 1);
                &mut list.levels[idx]
            }
            None => {
                let numbered = qanda || matches!(item.kind, ListKind::Ordered | ListKind::Callout);
                let step = step.unwrap_or(if numbered { 3 } else { 2 });
                list.levels.push(Level {
                    kind: item.kind,
                    signature: item.signature.clone(),
                    qanda,
                    counter: 0,
                    marker_indent: content_indent,
                    content_indent: content_indent + step,
                });
                let last = list.levels.len() - 1;
                &mut list.levels[last]
            }
        };
        level.counter += 1;
        let (kind, counter, indent, qanda) = (level.kind, level.counter, level.marker_indent, level.qanda);

        let (lead, lines) = match kind {
            ListKind::Unordered => (
                Lead::Item {
                    marker: "* ".to_owned(),
                    indent,
                },
                vec![item.text.to_owned()],
            ),
            ListKind::Ordered | ListKind::Callout => (
                Lead::Item {
                    marker: format!("{counter}. "),
                    indent,
                },
                vec![item.text.to_owned()],
            ),
            ListKind::Description => {
                let term = self.subs(item.text);
                let term = if qanda {
                    format!("{counter}. _{term}_")
                } else {
                    format!("* **{term}**")
                };
                let desc = item.desc.filter(|desc| !desc.is_empty());
                (
                    Lead::Term {
                        term,
                        indent,
                        inline: desc.is_some(),
                    },
                    desc.map(|desc| vec![desc.to_owned()]).unwrap_or_default(),
                )
            }
        };
        self.leaf = Some(Leaf::Paragraph(Paragraph {
            lead,
            lines,
            attrs: BlockAttrs::default(),
            title: None,
        }));
    }

    fn block_image(&mut self, target: &str, attrlist: &str) {
        self.attach_or_end_list(false);
        let (attrs, title) = self.take_metadata();
        self.block_title(title, &attrs);
        let target = self.attrs.expand(target);
        let attrlist = self.attrs.expand(attrlist);
        let image = subs::image(&target, &attrlist, &self.attrs);
        self.emit(&image);
    }

    fn literal(&mut self, line: &str) {
        self.attach_or_end_list(true);
        let (attrs, title) = self.take_metadata();
        self.leaf = Some(Leaf::Literal(Literal {
            lines: vec![line.to_owned()],
            attrs,
            title,
        }));
    }

    fn start_paragraph(&mut self, text: &str, lead: Lead) {
        self.attach_or_end_list(false);
        let (attrs, title) = self.take_metadata();
        self.leaf = Some(Leaf::Paragraph(Paragraph {
            lead,
            lines: vec![text.to_owned()],
            attrs,
            title,
        }));
    }

    /// Attach the block starting here to the current list item, or end the
    /// list when it cannot be attached.
    fn attach_or_end_list(&mut self, indented: bool) {
        let Some(Frame::List(list)) = self.frames.last_mut() else {
            return;
        };
        if list.attach_next || (indented && list.after_blank) {
            list.attach_next = false;
            list.after_blank = false;
            list.attached = true;
        } else {
            self.end_lists();
        }
    }

    fn end_lists(&mut self) {
        while matches!(self.frames.last(), Some(Frame::List(_))) {
            self.frames.pop();
            debug!("closed list");
        }
    }

    fn flush_leaf(&mut self) {
        match self.leaf.take() {
            Some(Leaf::Paragraph(paragraph)) => self.render_paragraph(paragraph),
            Some(Leaf::Literal(literal)) => self.render_literal(literal),
            Some(Leaf::Verbatim(verbatim)) => self.render_verbatim(verbatim),
            Some(Leaf::Pass(pass)) => self.render_pass(pass),
            Some(Leaf::Table(table)) => self.render_table(table),
            None => {}
        }
    }

    fn render_paragraph(&mut self, paragraph: Paragraph) {
        let Paragraph {
            lead,
            lines,
            attrs,
            title,
        } = paragraph;
        match lead {
            Lead::Item { marker, indent } => {
                let body = self.prose(&lines, false);
                let pad = " ".repeat(indent);
                let mut body = body.into_iter();
                let first = body.next().unwrap_or_default();
                self.emit(&format!("{pad}{marker}{first}"));
                self.emit_indented(body, &pad);
            }
            Lead::Term {
                term,
                indent,
                inline,
            } => {
                let body = self.prose(&lines, false);
                let pad = " ".repeat(indent);
                if body.is_empty() || (inline && body.iter().all(String::is_empty)) {
                    self.emit(&format!("{pad}{term}"));
                    return;
                }
                let mark = self.line_break();
                self.emit(&format!("{pad}{term}{mark}"));
                self.emit_indented(body.into_iter(), &pad);
            }
            Lead::Admonition { label, emoji } => {
                self.block_title(title, &attrs);
                let body = self.prose(&lines, attrs.has_option("hardbreaks"));
                let label = format!("**{emoji} {label}**");
                if body.iter().all(String::is_empty) {
                    self.emit(&label);
                    return;
                }
                let mark = self.line_break();
                self.emit(&format!("{label}{mark}"));
                for line in body {
                    self.emit(&line);
                }
            }
            Lead::MarkdownQuote => {
                for line in self.markdown_quote(&lines) {
                    self.emit(&line);
                }
            }
            Lead::None => {
                let anchor = match (&title, &attrs.id) {
                    (None, Some(id)) => {
                        if let Some(reftext) = &attrs.reftext {
                            self.registry.register(id, Some(reftext.clone()), id.clone());
                        }
                        anchor(id)
                    }
                    _ => String::new(),
                };
                self.block_title(title, &attrs);
                let body = self.prose(&lines, attrs.has_option("hardbreaks"));
                for (idx, line) in body.into_iter().enumerate() {
                    if idx == 0 {
                        self.emit(&format!("{anchor}{line}"));
                    } else {
                        self.emit(&line);
                    }
                }
            }
        }
    }

    /// Substitute paragraph lines and apply hard breaks and unwrapping.
    fn prose(&mut self, lines: &[String], hardbreaks: bool) -> Vec<String> {
        let mark = self.line_break();
        let last = lines.len().saturating_sub(1);
        let mut rendered = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let (text, broken) = match line.strip_suffix(" +") {
                Some(text) => (text, true),
                None => (line.as_str(), hardbreaks && idx < last),
            };
            let mut text = self.subs(text);
            if broken {
                text.push_str(&mark);
            }
            rendered.push((text, broken));
        }
        if !self.attrs.contains("markdown-unwrap-prose") {
            return rendered.into_iter().map(|(text, _)| text).collect();
        }
        let mut joined: Vec<String> = Vec::new();
        let mut joinable = false;
        for (text, broken) in rendered {
            if joinable && let Some(previous) = joined.last_mut() {
                previous.push(' ');
                previous.push_str(&text);
            } else {
                joined.push(text);
            }
            joinable = !broken;
        }
        joined
    }

    fn markdown_quote(&mut self, lines: &[String]) -> Vec<String> {
        let unwrap = self.attrs.contains("markdown-unwrap-prose");
        let mut quoted: Vec<String> = Vec::new();
        let mut joinable = false;
        for line in lines {
            if line == ">" {
                quoted.push(">".to_owned());
                joinable = false;
                continue;
            }
            let (text, marked) = match line.strip_prefix("> ") {
                Some(text) => (text, true),
                None => (line.as_str(), false),
            };
            let text = self.subs(text);
            if unwrap && joinable && let Some(previous) = quoted.last_mut() {
                previous.push(' ');
                previous.push_str(&text);
            } else if marked {
                quoted.push(format!("> {text}"));
            } else {
                quoted.push(text);
            }
            joinable = true;
        }
        quoted
    }

    fn render_literal(&mut self, literal: Literal) {
        self.block_title(literal.title, &literal.attrs);
        let mut lines = literal.lines;
        if wants_attributes(&literal.attrs) {
            lines = lines.iter().map(|line| self.attrs.expand(line)).collect();
        }
        outdent(&mut lines);
        if lines.first().is_some_and(|line| line.starts_with("$ ")) {
            self.fence(Some("console"), lines);
        } else {
            for line in lines {
                self.emit(&format!("    {line}"));
            }
        }
    }

    fn render_verbatim(&mut self, verbatim: Verbatim) {
        self.block_title(verbatim.title, &verbatim.attrs);
        let mut lines = verbatim.lines;
        if wants_attributes(&verbatim.attrs) {
            lines = lines.iter().map(|line| self.attrs.expand(line)).collect();
        }
        if let Some(indent) = verbatim
            .attrs
            .named("indent")
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            outdent(&mut lines);
            if indent > 0 {
                let pad = " ".repeat(indent);
                for line in lines.iter_mut().filter(|line| !line.is_empty()) {
                    line.insert_str(0, &pad);
                }
            }
        }
        let mut autonumber = 0;
        let lines = lines
            .iter()
            .map(|line| replace_conums(line, &mut autonumber))
            .collect();
        self.fence(verbatim.lang.as_deref(), lines);
    }

    fn fence(&mut self, lang: Option<&str>, lines: Vec<String>) {
        self.emit(&format!("```{}", lang.unwrap_or_default()));
        for line in lines {
            self.emit(&line);
        }
        self.emit("```");
    }

    fn render_pass(&mut self, pass: Pass) {
        if pass.stem {
            self.fence(Some("math"), pass.lines);
            return;
        }
        for line in pass.lines {
            self.emit(&line);
        }
    }

    fn render_table(&mut self, block: TableBlock) {
        let rows = block.table.render(&self.attrs, &mut self.registry);
        debug!(rows = rows.len(), "flushed table");
        if rows.is_empty() {
            return;
        }
        self.block_title(block.title, &block.attrs);
        for row in rows {
            self.emit(&row);
        }
    }

    /// Emit a block title as a bold line followed by a blank line. An id on
    /// a titled block becomes an anchor and is registered with the title.
    fn block_title(&mut self, title: Option<String>, attrs: &BlockAttrs) {
        let Some(title) = title else {
            return;
        };
        let text = self.subs(&title);
        let mut line = String::new();
        if let Some(id) = &attrs.id {
            let reftext = attrs.reftext.clone().unwrap_or_else(|| text.clone());
            self.registry.register(id, Some(reftext), id.clone());
            line.push_str(&anchor(id));
        }
        if text.len() > 4 && text.starts_with("**") && text.ends_with("**") {
            line.push_str(&text);
        } else {
            line.push_str(&format!("**{text}**"));
        }
        self.emit(&line);
        self.emit("");
    }

    fn emit_indented(&mut self, lines: impl Iterator<Item = String>, pad: &str) {
        for line in lines {
            if line.is_empty() {
                self.emit("");
            } else {
                self.emit(&format!("{pad}{line}"));
            }
        }
    }

    /// Prefix contributed by the open frames.
    fn prefix(&self) -> String {
        let mut prefix = String::new();
        for frame in &self.frames {
            match frame {
                Frame::List(list) if list.attached => {
                    prefix.push_str(&" ".repeat(list.content_indent()));
                }
                Frame::Container(Container {
                    style: ContainerStyle::Quote { .. },
                    ..
                }) => prefix.push_str("> "),
                _ => {}
            }
        }
        prefix
    }

    fn emit(&mut self, line: &str) {
        self.flush_blank();
        let prefix = self.prefix();
        if line.is_empty() {
            self.out.push(prefix.trim_end().to_owned());
        } else {
            self.out.push(format!("{prefix}{line}"));
        }
    }

    /// Emit the deferred blank line, unless the output already ends with one
    /// or the innermost container has no content yet.
    fn flush_blank(&mut self) {
        if !std::mem::take(&mut self.pending_blank) {
            return;
        }
        let Some(last) = self.out.last() else {
            return;
        };
        if last
            .trim_matches(|c: char| c == '>' || c.is_whitespace())
            .is_empty()
        {
            return;
        }
        if let Some(Frame::Container(container)) = self.frames.last()
            && container.start == self.out.len()
        {
            return;
        }
        let prefix = self.prefix();
        self.out.push(prefix.trim_end().to_owned());
    }

    fn finish(&mut self) {
        self.preprocessor.finish();
        self.header.finish();
        if self.leaf.as_ref().and_then(Leaf::delimiter).is_some() {
            warn!("unterminated delimited block");
        }
        self.flush_leaf();
        while let Some(delimiter) = self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Container(container) => Some(container.delimiter.clone()),
            Frame::List(_) => None,
        }) {
            warn!(delimiter = %delimiter, "unterminated delimited block");
            self.close_container(&delimiter);
        }
        self.frames.clear();
    }

    fn take_metadata(&mut self) -> (BlockAttrs, Option<String>) {
        (
            std::mem::take(&mut self.pending_attrs),
            self.pending_title.take(),
        )
    }

    fn is_discrete(&self) -> bool {
        matches!(self.pending_attrs.style.as_deref(), Some("discrete" | "float"))
    }

    fn in_container(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| matches!(frame, Frame::Container(_)))
    }

    fn line_break(&self) -> String {
        self.attrs
            .get("markdown-line-break")
            .unwrap_or("\\")
            .to_owned()
    }

    fn subs(&mut self, text: &str) -> String {
        subs::normal(text, &self.attrs, &mut self.registry)
    }
}

fn anchor(id: &str) -> String {
    format!("<a name=\"{id}\"></a>")
}

/// Whether a `subs` attribute asks for attribute references.
fn wants_attributes(attrs: &BlockAttrs) -> bool {
    attrs.named("subs").is_some_and(|subs| {
        subs.split(',')
            .any(|sub| sub.trim().trim_matches('+') == "attributes")
    })
}

/// Strip the indentation common to all non-blank lines.
fn outdent(lines: &mut [String]) {
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    for line in lines.iter_mut() {
        if line.trim().is_empty() {
            line.clear();
        } else if indent > 0 {
            line.drain(..indent);
        }
    }
}

/// Replace callout markers at the end of a verbatim line with circled
/// numbers. `autonumber` counts `<.>` markers across the block.
fn replace_conums(line: &str, autonumber: &mut usize) -> String {
    let Some(run) = CONUM_RUN_RE.find(line) else {
        return line.to_owned();
    };
    let tail = CONUM_RE.replace_all(run.as_str(), |caps: &Captures<'_>| {
        let number = if &caps[1] == "." {
            *autonumber += 1;
            *autonumber
        } else {
            caps[1].parse().unwrap_or(0)
        };
        circled(number).map_or_else(|| caps[0].to_owned(), String::from)
    });
    format!("{}{tail}", &line[..run.start()])
}

fn circled(number: usize) -> Option<char> {
    if !(1..=10).contains(&number) {
        return None;
    }
    let offset = u32::try_from(number - 1).ok()?;
    char::from_u32(0x2460 + offset)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Options, convert};

    fn md(input: &str) -> String {
        convert(input, &Options::default())
    }

    fn md_with(input: &str, name: &str, value: &str) -> String {
        convert(input, &Options::new().with_attribute(name, value))
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(md(""), "");
        assert_eq!(md("\n\n"), "");
    }

    #[test]
    fn test_plain_text_is_identity() {
        let input = "Just some text.\nOn two lines.\n\nAnd another paragraph.";
        assert_eq!(md(input), input);
    }

    #[test]
    fn test_document_title_and_sections() {
        let input = "= Title\n\n== Section\n\ncontent\n\n=== Sub\n\nmore";
        assert_eq!(md(input), "# Title\n\n## Section\n\ncontent\n\n### Sub\n\nmore");
    }

    #[test]
    fn test_too_deep_heading_is_text() {
        assert_eq!(md("======= Seven"), "======= Seven");
    }

    #[test]
    fn test_header_attributes_and_author() {
        let input = "= Title\nDoc Writer <doc@example.org>\n:project: ACME\n\n{project} by {author}.";
        assert_eq!(md(input), "# Title\n\nACME by Doc Writer.");
    }

    #[test]
    fn test_assignment_time_expansion() {
        assert_eq!(md(":b: one\n:a: {b}\n:b: two\n\n{a} {b}"), "one two");
        assert_eq!(md(":x: 1\n:x: 2\n\n{x}"), "2");
    }

    #[test]
    fn test_forward_xref_to_section() {
        let input = "See <<sec>>.\n\n[#sec]\n== Sec Title\n\nBody";
        assert_eq!(md(input), "See [Sec Title](#sec-title).\n\n## Sec Title\n\nBody");
    }

    #[test]
    fn test_backward_natural_xref() {
        let input = "== Get Started\n\nintro\n\n== Usage\n\nSee <<Get Started>>.";
        assert_eq!(
            md(input),
            "## Get Started\n\nintro\n\n## Usage\n\nSee [Get Started](#get-started)."
        );
    }

    #[test]
    fn test_generated_section_id() {
        let input = "== First Steps\n\nSee <<_first_steps>>.";
        assert_eq!(md(input), "## First Steps\n\nSee [First Steps](#first-steps).");
    }

    #[test]
    fn test_block_title_with_id() {
        let input = ".Hello, World!\n[source#hello,ruby]\n----\nputs 'Hello, World!'\n----\n\nSee <<hello>>.";
        assert_eq!(
            md(input),
            "<a name=\"hello\"></a>**Hello, World!**\n\n```ruby\nputs 'Hello, World!'\n```\n\nSee [Hello, World!](#hello)."
        );
    }

    #[test]
    fn test_paragraph_id() {
        assert_eq!(md("[#intro]\nWelcome."), "<a name=\"intro\"></a>Welcome.");
    }

    #[test]
    fn test_hard_breaks() {
        assert_eq!(md("one +\ntwo"), "one\\\ntwo");
        assert_eq!(md("[%hardbreaks]\none\ntwo\nthree"), "one\\\ntwo\\\nthree");
        assert_eq!(md_with("one +\ntwo", "markdown-line-break", "<br>"), "one<br>\ntwo");
    }

    #[test]
    fn test_trailing_spaces_are_trimmed() {
        assert_eq!(md("foo   \nbar\n\n----\ncode  \n----"), "foo\nbar\n\n```\ncode\n```");
        assert_eq!(md_with("one +\ntwo", "markdown-line-break", "  "), "one  \ntwo");
    }

    #[test]
    fn test_unwrap_prose() {
        assert_eq!(md_with("one\ntwo\nthree", "markdown-unwrap-prose", ""), "one two three");
    }

    #[test]
    fn test_admonition_paragraph() {
        let input = ":milk-type: oat\n\nNOTE: Remember the {milk-type} milk.";
        assert_eq!(md(input), "**📌 NOTE**\\\nRemember the oat milk.");
        assert_eq!(md("TIP: "), "**💡 TIP**");
    }

    #[test]
    fn test_thematic_break_and_dropped_lines() {
        assert_eq!(md("above\n\n'''\n\n<<<\n\ntoc::[]\n\nbelow"), "above\n\n---\n\nbelow");
    }

    #[test]
    fn test_listing_block_languages() {
        assert_eq!(md("[,js]\n----\nx()\n----"), "```js\nx()\n```");
        assert_eq!(md("[listing,ignored]\n----\nplain\n----"), "```\nplain\n```");
        assert_eq!(md("[,tree]\n....\nfolder/\n...."), "```\nfolder/\n```");
        assert_eq!(md("[plantuml]\n....\nstart;\n...."), "```plantuml\nstart;\n```");
        assert_eq!(
            md(":source-language: js\n\n[#hello]\n----\nx()\n----"),
            "```js\nx()\n```"
        );
    }

    #[test]
    fn test_verbatim_block_is_not_substituted() {
        let input = ":name: ACME\n\n----\n{name} *bold*\n= Not a title\n----\n\n{name}";
        assert_eq!(md(input), "```\n{name} *bold*\n= Not a title\n```\n\nACME");
    }

    #[test]
    fn test_verbatim_subs_attribute() {
        let input = ":url: https://example.org\n\n[,console,subs=+attributes]\n----\n$ curl {url}\n----";
        assert_eq!(md(input), "```console\n$ curl https://example.org\n```");
    }

    #[test]
    fn test_verbatim_outdent() {
        let input = "[indent=0]\n----\n    foo\n  bar\n\n  baz\n----";
        assert_eq!(md(input), "```\n  foo\nbar\n\nbaz\n```");
    }

    #[test]
    fn test_callouts() {
        let input = "[,js]\n----\n'use strict' // <1>\n\nconst fs = require('node:fs') // <2>\n----\n<1> Enables strict mode.\n<2> Requires fs.";
        assert_eq!(
            md(input),
            "```js\n'use strict' // ①\n\nconst fs = require('node:fs') // ②\n```\n1. Enables strict mode.\n2. Requires fs."
        );
    }

    #[test]
    fn test_autonumbered_callouts_on_one_line() {
        let input = "----\nrequire('x')() <.> <.>\nload() <.> <4>\n----";
        assert_eq!(md(input), "```\nrequire('x')() ① ②\nload() ③ ④\n```");
    }

    #[test]
    fn test_literal_paragraph() {
        assert_eq!(md("beginning\n\n literal\n   more\n\nend"), "beginning\n\n    literal\n      more\n\nend");
    }

    #[test]
    fn test_console_literal_paragraph() {
        assert_eq!(md("Run:\n\n $ npx downdoc -h"), "Run:\n\n```console\n$ npx downdoc -h\n```");
    }

    #[test]
    fn test_literal_paragraph_ends_at_block_attributes() {
        assert_eq!(md(" literal\n[]\nparagraph"), "    literal\nparagraph");
    }

    #[test]
    fn test_literal_paragraph_ends_at_unindented_line() {
        assert_eq!(md("foo\n +\nbar\n\n +\n\n +\nbaz"), "foo\n\\\nbar\n\n    +\n\n    +\nbaz");
    }

    #[test]
    fn test_underscore_attribute_name() {
        assert_eq!(md("= Title\n:_: {sp}\n\none{_}two{_}three"), "# Title\n\none two three");
    }

    #[test]
    fn test_unordered_list_nesting() {
        let input = "* foo\n** bar\n*** baz\n** bar\n* foo";
        assert_eq!(md(input), "* foo\n  * bar\n    * baz\n  * bar\n* foo");
        assert_eq!(
            md_with("* foo\n** bar", "markdown-list-indent", "4"),
            "* foo\n    * bar"
        );
    }

    #[test]
    fn test_blank_lines_between_items_are_removed() {
        let input = "* work\n\n** more work\n\n* play\n\n\n* drink\n\nand party!";
        assert_eq!(md(input), "* work\n  * more work\n* play\n* drink\n\nand party!");
    }

    #[test]
    fn test_ordered_list_numbering() {
        let input = ". one\n.. extra\n. two\n\nparagraph\n\n. again";
        assert_eq!(md(input), "1. one\n   1. extra\n2. two\n\nparagraph\n\n1. again");
    }

    #[test]
    fn test_list_marker_in_paragraph_is_text() {
        let input = "Let the paragraph begin.\n* is the formatting mark for bold.";
        assert_eq!(md(input), input);
    }

    #[test]
    fn test_description_list() {
        let input = "term:: desc\n\nanother term::\ndesc\n+\nattached paragraph\n\nlast::";
        assert_eq!(
            md(input),
            "* **term**\\\ndesc\n* **another term**\\\ndesc\n\n  attached paragraph\n* **last**"
        );
    }

    #[test]
    fn test_nested_description_list() {
        let input = "foo:: bar\nyin::: yang\nfoo::\nbar";
        assert_eq!(
            md(input),
            "* **foo**\\\nbar\n  * **yin**\\\n  yang\n* **foo**\\\nbar"
        );
    }

    #[test]
    fn test_qanda_list() {
        let input = "[qanda]\nWhat's the answer?:: 47\n\nWho?::\nNobody.";
        assert_eq!(md(input), "1. _What’s the answer?_\\\n47\n2. _Who?_\\\nNobody.");
    }

    #[test]
    fn test_attached_listing() {
        let input = "* Install\n+\n[,console]\n----\n$ npm i downdoc\n----\n\n* Use";
        assert_eq!(
            md(input),
            "* Install\n\n  ```console\n  $ npm i downdoc\n  ```\n* Use"
        );
    }

    #[test]
    fn test_second_continued_block_with_title() {
        let input = "* Say hello\n+\n.With Ruby\n[,ruby]\n----\nputs 'Hello!'\n----\n+\n.With JavaScript\n[,js]\n----\nconsole.log('Hello!')\n----";
        assert_eq!(
            md(input),
            "* Say hello\n\n  **With Ruby**\n\n  ```ruby\n  puts 'Hello!'\n  ```\n\n  **With JavaScript**\n\n  ```js\n  console.log('Hello!')\n  ```"
        );
    }

    #[test]
    fn test_implicit_literal_attachment() {
        let input = "* Query the version:\n\n $ app -v\n\n* Look for:\n\n v1.0.0\n\n* Done.";
        assert_eq!(
            md(input),
            "* Query the version:\n\n  ```console\n  $ app -v\n  ```\n* Look for:\n\n      v1.0.0\n* Done."
        );
    }

    #[test]
    fn test_ordered_list_attachment_indent() {
        let input = ". one\n\n literal\n+\nparagraph\n\n. two";
        assert_eq!(md(input), "1. one\n\n       literal\n\n   paragraph\n2. two");
    }

    #[test]
    fn test_block_attribute_line_after_blank_ends_list() {
        let input = ". one\n[loweralpha]\n.. nested\n. two\n\n[]\n. one";
        assert_eq!(md(input), "1. one\n   1. nested\n2. two\n\n1. one");
    }

    #[test]
    fn test_adjacent_delimited_block_ends_list() {
        assert_eq!(md("term::\n----\nlisting\n----"), "* **term**\n```\nlisting\n```");
    }

    #[test]
    fn test_isolated_list_inside_attached_block() {
        let input = "* outside\n+\n--\n* inside\n+\nmore\n--\n* outside";
        assert_eq!(md(input), "* outside\n\n  * inside\n\n    more\n* outside");
    }

    #[test]
    fn test_quote_block() {
        let input = "[,Doc Brown]\n____\nRoads?\n\nWhere we're going.\n____\n\nAfter.";
        assert_eq!(
            md(input),
            "> Roads?\n>\n> Where we’re going.\n>\n> — Doc Brown\n\nAfter."
        );
    }

    #[test]
    fn test_quote_attached_to_list_item() {
        let input = "* foo\n+\n____\nbar\n\nbaz\n____\n\nfin";
        assert_eq!(md(input), "* foo\n\n  > bar\n  >\n  > baz\n\nfin");
    }

    #[test]
    fn test_list_inside_quote() {
        let input = "____\n* foo\n+\nbar\n____";
        assert_eq!(md(input), "> * foo\n>\n>   bar");
    }

    #[test]
    fn test_markdown_blockquote() {
        let input = "> Roads?\n>\n> Where we're going.";
        assert_eq!(md(input), "> Roads?\n>\n> Where we’re going.");
        assert_eq!(
            md_with("> one,\n> two\n>\n> three", "markdown-unwrap-prose", ""),
            "> one, two\n>\n> three"
        );
    }

    #[test]
    fn test_example_and_sidebar_are_unwrapped() {
        let input = ".Something like this\n====\ncontent\n====\n\n****\naside\n****";
        assert_eq!(md(input), "**Something like this**\n\ncontent\n\naside");
    }

    #[test]
    fn test_heading_inside_container_is_text_unless_discrete() {
        assert_eq!(md("====\n== Not a heading\n===="), "== Not a heading");
        assert_eq!(md("====\n[discrete]\n== Heading\n\ntext\n===="), "## Heading\n\ntext");
    }

    #[test]
    fn test_admonition_block() {
        let input = ".Key points\n[IMPORTANT#key]\n====\nBeware.\n\nTruly.\n====";
        assert_eq!(
            md(input),
            "<dl><dt><strong><a name=\"key\"></a>❗ IMPORTANT: Key points</strong></dt><dd>\n\nBeware.\n\nTruly.\n</dd></dl>"
        );
        assert_eq!(md("[INFO]\n====\nPlain.\n===="), "Plain.");
    }

    #[test]
    fn test_collapsible_block() {
        assert_eq!(
            md(".Reveal Answer\n[%collapsible]\n====\n42\n===="),
            "<details>\n<summary>Reveal Answer</summary>\n\n42\n</details>"
        );
        assert_eq!(
            md("[%collapsible]\n[%open]\n====\n42\n===="),
            "<details open>\n<summary>Details</summary>\n\n42\n</details>"
        );
        assert_eq!(
            md_with(".Click\n[%collapsible]\n====\n42\n====", "markdown-collapsible-variant", "spoiler"),
            "```spoiler Click\n42\n```"
        );
    }

    #[test]
    fn test_collapsible_attached_to_list_item() {
        let input = ". Square root of 4?\n+\n.Reveal Answer\n[%collapsible]\n====\n2\n====\n\n. Next";
        assert_eq!(
            md(input),
            "1. Square root of 4?\n\n   <details>\n   <summary>Reveal Answer</summary>\n\n   2\n   </details>\n2. Next"
        );
    }

    #[test]
    fn test_passthrough_and_stem_blocks() {
        assert_eq!(md(".ignored\n++++\n<aside>*raw*</aside>\n++++"), "<aside>*raw*</aside>");
        assert_eq!(md("[stem]\n++++\nx^2\n++++"), "```math\nx^2\n```");
    }

    #[test]
    fn test_table_with_title() {
        let input = ".Results\n|===\n| A | B\n\n| 1 | 2\n|===";
        assert_eq!(md(input), "**Results**\n\n| A | B |\n| --- | --- |\n| 1 | 2 |");
        assert_eq!(md(".Empty\n|===\n|==="), "");
    }

    #[test]
    fn test_block_image() {
        let input = ".Package Explorer\n[#pe]\nimage::{dir}/pe.png[Package Explorer]";
        assert_eq!(
            md_with(input, "dir", "images"),
            "<a name=\"pe\"></a>**Package Explorer**\n\n![Package Explorer](images/pe.png)"
        );
    }

    #[test]
    fn test_comments() {
        let input = "// line comment\nparagraph\n// inside\nstill\n\n////\nblock\n////\nafter";
        assert_eq!(md(input), "paragraph\nstill\n\nafter");
    }

    #[test]
    fn test_conditionals() {
        let input = ":env-github:\n\nifdef::env-github[]\nOn GitHub.\nendif::[]\nifndef::env-github[]\nElsewhere.\nendif::[]";
        assert_eq!(md(input), "On GitHub.");
    }

    #[test]
    fn test_unclosed_blocks_are_flushed() {
        assert_eq!(md("----\nunterminated"), "```\nunterminated\n```");
        assert_eq!(md("[%collapsible]\n====\nopen"), "<details>\n<summary>Details</summary>\n\nopen\n</details>");
    }

    #[test]
    fn test_seeded_attribute_is_locked() {
        let options = Options::new().with_attribute("name", "seeded");
        assert_eq!(convert(":name: document\n\n{name}", &options), "seeded");
    }

    #[test]
    fn test_seeded_doctitle_is_overridden() {
        let options = Options::new().with_attribute("doctitle", "Seeded");
        assert_eq!(convert("= Parsed\n\n{doctitle}", &options), "# Parsed\n\nParsed");
    }

    #[test]
    fn test_replace_conums() {
        let mut auto = 0;
        assert_eq!(super::replace_conums("<1>", &mut auto), "①");
        assert_eq!(super::replace_conums("List<String>", &mut auto), "List<String>");
        assert_eq!(super::replace_conums("x <11>", &mut auto), "x <11>");
    }
}

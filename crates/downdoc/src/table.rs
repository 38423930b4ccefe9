//! Table reshaping.
//!
//! Cells are collected from the physical lines between the table delimiters
//! and re-segmented into rows strictly by column count, so the way cells are
//! wrapped across lines never affects the output.

use std::sync::LazyLock;

use regex::Regex;

use crate::attributes::AttributeTable;
use crate::block::BlockAttrs;
use crate::subs;
use crate::xref::Registry;

/// A cell specifier such as `2+`, `^.<` or `s`, set off by whitespace
/// directly in front of a cell separator.
static CELL_SPEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]+((?:\d+[*+]|\d*\.\d+\+)?[<^>]?(?:\.[<^>])?[adehlmsv]?)$").unwrap()
});

/// A cell specifier before the first separator on a line, which may also
/// make up the whole text.
static LEAD_SPEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[ \t]+)((?:\d+[*+]|\d*\.\d+\+)?[<^>]?(?:\.[<^>])?[adehlmsv]?)$").unwrap()
});

/// Most columns a `cols` attribute can declare.
const MAX_COLUMNS: usize = 1000;

/// Horizontal alignment of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Align {
    Default,
    Left,
    Center,
    Right,
}

impl Align {
    fn separator(self) -> &'static str {
        match self {
            Self::Default => "---",
            Self::Left => ":--",
            Self::Center => ":-:",
            Self::Right => "--:",
        }
    }
}

/// Parse a `cols` attribute value into column alignments.
///
/// Specs are separated by commas or semicolons and may start with a repeat
/// count such as `3*`. Columns past [`MAX_COLUMNS`] are dropped.
pub(crate) fn parse_cols(value: &str) -> Vec<Align> {
    let mut cols = Vec::new();
    for spec in value.split([',', ';']).map(str::trim) {
        if spec.is_empty() {
            continue;
        }
        let (repeat, spec) = match spec.split_once('*') {
            Some((count, rest)) => match count.trim().parse::<usize>() {
                Ok(count) => (count, rest),
                Err(_) => (1, spec),
            },
            None => (1, spec),
        };
        let align = match spec.chars().next() {
            Some('<') => Align::Left,
            Some('^') => Align::Center,
            Some('>') => Align::Right,
            _ => Align::Default,
        };
        let repeat = repeat.min(MAX_COLUMNS - cols.len());
        cols.extend(std::iter::repeat_n(align, repeat));
        if cols.len() == MAX_COLUMNS {
            break;
        }
    }
    cols
}

/// A table cell made of the physical line segments it spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Cell {
    segments: Vec<String>,
}

/// Accumulates the lines of one table.
#[derive(Debug)]
pub(crate) struct Table {
    cols: Vec<Align>,
    header: Option<bool>,
    cells: Vec<Cell>,
    /// Number of cells started on the first content line.
    first_line_cells: Option<usize>,
    leading_blank: bool,
    blank_after_first: Option<bool>,
    content_lines: usize,
}

impl Table {
    pub fn new(attrs: &BlockAttrs) -> Self {
        let header = if attrs.has_option("noheader") {
            Some(false)
        } else if attrs.has_option("header") {
            Some(true)
        } else {
            None
        };
        Self {
            cols: attrs.named("cols").map(parse_cols).unwrap_or_default(),
            header,
            cells: Vec::new(),
            first_line_cells: None,
            leading_blank: false,
            blank_after_first: None,
            content_lines: 0,
        }
    }

    /// Add one physical line from inside the table.
    pub fn push_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            match self.content_lines {
                0 => self.leading_blank = true,
                1 => {
                    self.blank_after_first.get_or_insert(true);
                }
                _ => {}
            }
            return;
        }
        self.content_lines += 1;
        if self.content_lines == 2 {
            self.blank_after_first.get_or_insert(false);
        }

        let parts = split_cells(line);
        let (lead, rest) = parts.split_first().map_or(("", &[][..]), |(lead, rest)| (lead.as_str(), rest));
        let lead = if rest.is_empty() { lead } else { strip_spec(&LEAD_SPEC_RE, lead) };
        if !lead.trim().is_empty() {
            match self.cells.last_mut() {
                Some(cell) => cell.segments.push(lead.trim().to_owned()),
                None => self.cells.push(Cell {
                    segments: vec![lead.trim().to_owned()],
                }),
            }
        }
        for (idx, part) in rest.iter().enumerate() {
            let text = if idx + 1 < rest.len() {
                strip_spec(&CELL_SPEC_RE, part)
            } else {
                part.as_str()
            };
            self.cells.push(Cell {
                segments: vec![text.trim().to_owned()],
            });
        }
        if self.content_lines == 1 {
            self.first_line_cells = Some(rest.len());
        }
    }

    /// Render the table as Markdown lines.
    pub fn render(&self, attrs: &AttributeTable, registry: &mut Registry) -> Vec<String> {
        if self.cells.is_empty() {
            return Vec::new();
        }
        let ncols = if self.cols.is_empty() {
            self.first_line_cells.filter(|&n| n > 0).unwrap_or(1)
        } else {
            self.cols.len()
        };
        let header = self.header.unwrap_or_else(|| {
            !self.leading_blank
                && self.blank_after_first == Some(true)
                && self.first_line_cells == Some(ncols)
        });

        let mut rows = self
            .cells
            .chunks(ncols)
            .map(|row| {
                let mut cells: Vec<String> =
                    row.iter().map(|cell| render_cell(cell, attrs, registry)).collect();
                cells.resize(ncols, String::new());
                format!("| {} |", cells.join(" | "))
            })
            .collect::<Vec<_>>()
            .into_iter();

        let mut lines = Vec::new();
        match header.then(|| rows.next()).flatten() {
            Some(row) => lines.push(row),
            None => lines.push(format!("{}|", "|     ".repeat(ncols))),
        }
        let aligns: Vec<&str> = (0..ncols)
            .map(|idx| self.cols.get(idx).copied().unwrap_or(Align::Default).separator())
            .collect();
        lines.push(format!("| {} |", aligns.join(" | ")));
        lines.extend(rows);
        lines
    }
}

fn render_cell(cell: &Cell, attrs: &AttributeTable, registry: &mut Registry) -> String {
    let segments: Vec<&str> = cell
        .segments
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| match segment.strip_suffix(" +") {
            Some(text) if idx < last => format!("{}<br>", subs::normal(text, attrs, registry)),
            _ => subs::normal(segment, attrs, registry),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a line on unescaped `|`, unescaping `\|`.
fn split_cells(line: &str) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                if let Some(part) = parts.last_mut() {
                    part.push('|');
                }
            }
            '|' => parts.push(String::new()),
            _ => {
                if let Some(part) = parts.last_mut() {
                    part.push(c);
                }
            }
        }
    }
    parts
}

fn strip_spec<'a>(spec: &Regex, text: &'a str) -> &'a str {
    match spec.captures(text) {
        Some(caps) if caps.get(1).is_some_and(|m| !m.is_empty()) => {
            caps.get(0).map_or(text, |m| &text[..m.start()])
        }
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn table(attrlist: &str, input: &str) -> Vec<String> {
        let mut table = Table::new(&BlockAttrs::parse(attrlist));
        for line in input.lines() {
            table.push_line(line);
        }
        table.render(&AttributeTable::new(), &mut Registry::new())
    }

    #[test]
    fn test_body_only() {
        assert_eq!(
            table("", "| A1 | B1\n| A2 | B2"),
            vec!["|     |     |", "| --- | --- |", "| A1 | B1 |", "| A2 | B2 |"]
        );
    }

    #[test]
    fn test_implicit_header() {
        assert_eq!(
            table("", "| Col A | Col B\n\n| A1\n| B1\n\n\n| A2\n| B2"),
            vec!["| Col A | Col B |", "| --- | --- |", "| A1 | B1 |", "| A2 | B2 |"]
        );
    }

    #[test]
    fn test_ragged_rows() {
        let input = "| A | B | C\n\n| A1\n| B1 | C1\n| A2 | B2 | C2 | A3\n| B3 | C3";
        assert_eq!(
            table("", input),
            vec!["| A | B | C |", "| --- | --- | --- |", "| A1 | B1 | C1 |", "| A2 | B2 | C2 |", "| A3 | B3 | C3 |"]
        );
    }

    #[test]
    fn test_wrapping_does_not_change_output() {
        let wrapped = table("cols=2*", "| A\n| B\n| C\n| D");
        let flat = table("cols=2*", "| A | B | C | D");
        assert_eq!(wrapped, flat);
    }

    #[test]
    fn test_leading_blank_suppresses_header() {
        assert_eq!(table("", "\n| A1\n\n| A2"), vec!["|     |", "| --- |", "| A1 |", "| A2 |"]);
    }

    #[test]
    fn test_header_options() {
        assert_eq!(
            table("%header", "| Col A | Col B\n| A1\n| B1"),
            vec!["| Col A | Col B |", "| --- | --- |", "| A1 | B1 |"]
        );
        assert_eq!(table("%noheader", "| A1\n\n| A2"), vec!["|     |", "| --- |", "| A1 |", "| A2 |"]);
    }

    #[test]
    fn test_first_line_shorter_than_cols_is_not_header() {
        assert_eq!(
            table("cols=3*", "| A | B\n| C\n\n| A1\n| B1 | C1"),
            vec!["|     |     |     |", "| --- | --- | --- |", "| A | B | C |", "| A1 | B1 | C1 |"]
        );
    }

    #[test]
    fn test_parse_cols() {
        assert_eq!(parse_cols("2*d,1").len(), 3);
        assert_eq!(parse_cols("1;2d").len(), 2);
        assert_eq!(
            parse_cols("2*^.>10;>40;.^40"),
            vec![Align::Center, Align::Center, Align::Right, Align::Default]
        );
    }

    #[test]
    fn test_huge_repeat_count_is_capped() {
        assert_eq!(parse_cols("4000000000000*").len(), MAX_COLUMNS);
        assert_eq!(parse_cols("999*,5*<,1").len(), MAX_COLUMNS);
        assert_eq!(table("cols=\"4000000000000*\"", "| a").len(), 3);
    }

    #[test]
    fn test_alignment_row() {
        assert_eq!(
            table("%header,cols=>1;2d,width=75%", "| A | B\n| A1\n| B1"),
            vec!["| A | B |", "| --: | --- |", "| A1 | B1 |"]
        );
    }

    #[test]
    fn test_wrapped_cells() {
        assert_eq!(
            table("%header", "| A | B\nmore\n| A1\n| B1"),
            vec!["| A | B more |", "| --- | --- |", "| A1 | B1 |"]
        );
        assert_eq!(
            table("", "| foo | bar\n\n|\nfizz\n|\nbuzz"),
            vec!["| foo | bar |", "| --- | --- |", "| fizz | buzz |"]
        );
    }

    #[test]
    fn test_cell_substitutions() {
        assert_eq!(
            table("", "| E | S\n\n| _em_\n| *strong*\n*still*"),
            vec!["| E | S |", "| --- | --- |", "| _em_ | **strong** **still** |"]
        );
    }

    #[test]
    fn test_hard_breaks() {
        assert_eq!(
            table("cols=2*", "| A +\n1\n| B +\n1"),
            vec!["|     |     |", "| --- | --- |", "| A<br> 1 | B<br> 1 |"]
        );
        assert_eq!(
            table("cols=2*", "| A\n1 +\n| B\n1 +"),
            vec!["|     |     |", "| --- | --- |", "| A 1 + | B 1 + |"]
        );
    }

    #[test]
    fn test_cell_specs_are_ignored() {
        assert_eq!(
            table("", "|A |B |C\n\ns| strong >m| monospace ^.<| normal"),
            vec!["| A | B | C |", "| --- | --- | --- |", "| strong | monospace | normal |"]
        );
    }

    #[test]
    fn test_single_letter_cells_are_content() {
        assert_eq!(
            table("", "|Size |Code\n\n|s |small\n|m|medium\n|e|extra"),
            vec![
                "| Size | Code |",
                "| --- | --- |",
                "| s | small |",
                "| m | medium |",
                "| e | extra |"
            ]
        );
        assert_eq!(table("", "|a|b\n|c|d"), vec!["|     |     |", "| --- | --- |", "| a | b |", "| c | d |"]);
    }

    #[test]
    fn test_empty_table() {
        assert!(table("", "").is_empty());
    }
}

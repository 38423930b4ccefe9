//! Output assembly.

use crate::xref::Registry;

/// Join emitted lines into the final document.
///
/// Leading blank lines are dropped, cross-reference placeholders are replaced
/// with links and trailing whitespace is trimmed from every line. A
/// `line_break` mark ending in whitespace is kept where it closes a line.
pub(crate) fn assemble(lines: &[String], registry: &Registry, line_break: &str) -> String {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let keep_break = line_break.len() != line_break.trim_end().len();
    let text = lines[start..]
        .iter()
        .map(|line| {
            if keep_break && line.ends_with(line_break) {
                line.as_str()
            } else {
                line.trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let mut text = registry.resolve(&text);
    text.truncate(text.trim_end().len());
    text
}

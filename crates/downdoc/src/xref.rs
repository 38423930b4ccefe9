//! Cross-reference registry and resolver.
//!
//! References are recorded as placeholder characters while the document is
//! converted and rewritten to Markdown links once every id is known, so a
//! reference resolves the same way whether it appears before or after its
//! target.

use std::collections::HashMap;

use tracing::{debug, warn};

/// First codepoint of the placeholder range (supplementary private use area B).
const PLACEHOLDER_BASE: u32 = 0x10_0000;
const PLACEHOLDER_LIMIT: u32 = 0x10_FFFD;

/// A resolvable anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Anchor {
    /// Display text. `None` falls back to the id.
    text: Option<String>,
    /// Fragment the Markdown link points at.
    fragment: String,
}

/// A deferred reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    target: String,
    text: Option<String>,
}

/// Ids, titles and unresolved references of one conversion.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    anchors: HashMap<String, Anchor>,
    titles: HashMap<String, String>,
    refs: Vec<Reference>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id. The first registration of an id wins.
    pub fn register(&mut self, id: &str, text: Option<String>, fragment: String) {
        if self.anchors.contains_key(id) {
            warn!(id, "duplicate id, keeping first occurrence");
            return;
        }
        debug!(id, fragment = %fragment, "registered anchor");
        self.anchors.insert(id.to_owned(), Anchor { text, fragment });
    }

    /// Register a title for natural references. The first occurrence wins.
    pub fn register_title(&mut self, title: &str, id: &str) {
        self.titles
            .entry(title.to_owned())
            .or_insert_with(|| id.to_owned());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.anchors.contains_key(id)
    }

    /// Record a reference and return the placeholder that stands for it.
    pub fn placeholder(&mut self, target: &str, text: Option<String>) -> char {
        let index = u32::try_from(self.refs.len())
            .ok()
            .and_then(|n| n.checked_add(PLACEHOLDER_BASE))
            .filter(|&code| code <= PLACEHOLDER_LIMIT)
            .and_then(char::from_u32);
        let Some(token) = index else {
            warn!(target, "too many references, leaving link unresolved");
            return '\u{FFFD}';
        };
        self.refs.push(Reference {
            target: target.to_owned(),
            text: text.filter(|t| !t.is_empty()),
        });
        token
    }

    /// Replace every placeholder in `text` with its Markdown link.
    #[must_use]
    pub fn resolve(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match self.reference(c) {
                Some(reference) => out.push_str(&self.link(reference)),
                None => out.push(c),
            }
        }
        out
    }

    fn reference(&self, c: char) -> Option<&Reference> {
        let code = u32::from(c);
        if code < PLACEHOLDER_BASE {
            return None;
        }
        let index = usize::try_from(code - PLACEHOLDER_BASE).ok()?;
        self.refs.get(index)
    }

    fn link(&self, reference: &Reference) -> String {
        let target = reference.target.as_str();
        if let Some((path, fragment)) = target.split_once('#')
            && !path.is_empty()
        {
            let dest = if fragment.is_empty() { path } else { target };
            let text = reference.text.as_deref().unwrap_or(dest);
            return format!("[{text}]({dest})");
        }
        if target.ends_with(".adoc") {
            let text = reference.text.as_deref().unwrap_or(target);
            return format!("[{text}]({target})");
        }

        let id = target.strip_prefix('#').unwrap_or(target);
        let anchor = self.anchors.get(id).or_else(|| {
            self.titles
                .get(id)
                .and_then(|resolved| self.anchors.get(resolved))
        });
        match anchor {
            Some(anchor) => {
                let text = reference
                    .text
                    .as_deref()
                    .or(anchor.text.as_deref())
                    .unwrap_or(id);
                format!("[{text}](#{})", anchor.fragment)
            }
            None => {
                debug!(id, "unresolved reference");
                let text = reference.text.as_deref().unwrap_or(id);
                format!("[{text}](#{id})")
            }
        }
    }
}

/// Fragment a Markdown renderer generates for a heading.
///
/// Lowercases, strips HTML tags and punctuation except `-` and `_`, and
/// turns spaces into hyphens.
pub(crate) fn markdown_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut in_tag = false;
    for c in title.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            ' ' => slug.push('-'),
            '-' | '_' => slug.push(c),
            _ if c.is_alphanumeric() => slug.extend(c.to_lowercase()),
            _ => {}
        }
    }
    slug
}

/// Id generated for a section title without an explicit id.
pub(crate) fn section_id(title: &str, prefix: &str, separator: &str) -> String {
    let mut id = String::from(prefix);
    let mut pending_separator = false;
    let mut in_tag = false;
    for c in title.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ if c.is_whitespace() || c == '-' || c == '.' => pending_separator = true,
            _ if c.is_alphanumeric() || c == '_' => {
                if pending_separator && id.len() > prefix.len() {
                    id.push_str(separator);
                }
                pending_separator = false;
                id.extend(c.to_lowercase());
            }
            _ => {}
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_forward_and_backward_resolve_identically() {
        let mut registry = Registry::new();
        let before = registry.placeholder("usage", None);
        registry.register("usage", Some("Usage".to_owned()), "usage".to_owned());
        let after = registry.placeholder("usage", None);
        assert_eq!(registry.resolve(&before.to_string()), "[Usage](#usage)");
        assert_eq!(registry.resolve(&after.to_string()), "[Usage](#usage)");
    }

    #[test]
    fn test_explicit_text_wins() {
        let mut registry = Registry::new();
        registry.register("ex1", Some("Configuration Example".to_owned()), "ex1".to_owned());
        let token = registry.placeholder("ex1", Some("Example 1".to_owned()));
        assert_eq!(registry.resolve(&format!("See {token}.")), "See [Example 1](#ex1).");
    }

    #[test]
    fn test_unresolved_uses_id() {
        let mut registry = Registry::new();
        let token = registry.placeholder("#webserver", None);
        assert_eq!(registry.resolve(&token.to_string()), "[webserver](#webserver)");
    }

    #[test]
    fn test_external_targets() {
        let mut registry = Registry::new();
        let a = registry.placeholder("contributing.html#", None);
        let b = registry.placeholder("guide.adoc#build", Some("build".to_owned()));
        let c = registry.placeholder("how to contribute.adoc", None);
        assert_eq!(registry.resolve(&a.to_string()), "[contributing.html](contributing.html)");
        assert_eq!(registry.resolve(&b.to_string()), "[build](guide.adoc#build)");
        assert_eq!(
            registry.resolve(&c.to_string()),
            "[how to contribute.adoc](how to contribute.adoc)"
        );
    }

    #[test]
    fn test_natural_reference_binds_first_title() {
        let mut registry = Registry::new();
        registry.register("one", Some("Get Started".to_owned()), "get-started".to_owned());
        registry.register_title("Get Started", "one");
        registry.register("two", Some("Get Started".to_owned()), "get-started-1".to_owned());
        registry.register_title("Get Started", "two");
        let token = registry.placeholder("Get Started", None);
        assert_eq!(registry.resolve(&token.to_string()), "[Get Started](#get-started)");
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let mut registry = Registry::new();
        registry.register("a", Some("First".to_owned()), "a".to_owned());
        registry.register("a", Some("Second".to_owned()), "a".to_owned());
        let token = registry.placeholder("a", None);
        assert_eq!(registry.resolve(&token.to_string()), "[First](#a)");
    }

    #[test]
    fn test_markdown_slug() {
        assert_eq!(markdown_slug("Get Started with ACME"), "get-started-with-acme");
        assert_eq!(markdown_slug("Link to Resource from Image"), "link-to-resource-from-image");
        assert_eq!(markdown_slug("What's <mark>new</mark>?"), "whats-new");
    }

    #[test]
    fn test_section_id() {
        assert_eq!(section_id("Foo Bar", "_", "_"), "_foo_bar");
        assert_eq!(section_id("Discrete Heading", "_", "-"), "_discrete-heading");
        assert_eq!(section_id("System Requirements", "ref_", "-"), "ref_system-requirements");
        assert_eq!(section_id("Usage", "", "_"), "usage");
        assert_eq!(section_id("A - B", "", "-"), "a-b");
    }
}

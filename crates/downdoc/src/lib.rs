//! AsciiDoc to Markdown converter.
//!
//! Converts an AsciiDoc document to GitHub-flavored Markdown in a single
//! pass over its lines. The core is pure: it performs no I/O and each call
//! owns its own attribute table and id registry.
//!
//! # Architecture
//!
//! - `preprocess`: conditionals, comments and dropped includes
//! - `header`: document title, author and revision lines
//! - `block`: context-free line classification
//! - `converter`: the block and list context stack machine
//! - `subs`: inline substitutions
//! - `table`: table reshaping
//! - `xref`: cross-reference registration and resolution
//! - `output`: final assembly
//!
//! # Example
//!
//! ```
//! use downdoc::{Options, convert};
//!
//! let markdown = convert("= Hello\n\n*Bold* text", &Options::default());
//! assert_eq!(markdown, "# Hello\n\n**Bold** text");
//! ```

mod attributes;
mod block;
mod converter;
mod error;
mod header;
mod options;
mod output;
mod preprocess;
mod subs;
mod table;
mod xref;

pub use attributes::{AttributeTable, is_valid_name};
pub use error::OptionsError;
pub use options::{AttributeSeed, Options};

use converter::Converter;

/// Convert an AsciiDoc document to Markdown.
#[must_use]
pub fn convert(source: &str, options: &Options) -> String {
    let attrs = AttributeTable::seeded(options.attributes());
    Converter::new(attrs).convert(source)
}

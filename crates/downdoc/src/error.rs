//! Error types for the conversion API.

/// A seed attribute given by the caller could not be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Attribute name is empty in '{0}'")]
    EmptyName(String),

    #[error("Invalid attribute name '{0}'")]
    InvalidName(String),
}

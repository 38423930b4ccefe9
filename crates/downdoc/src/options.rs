//! Conversion options.

use std::str::FromStr;

use crate::attributes::is_valid_name;
use crate::error::OptionsError;

/// An attribute seeded by the caller.
///
/// Parsed from `name=value` (set), `name` (set to an empty value) or `name!`
/// (unset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSeed {
    pub name: String,
    /// `None` seeds the attribute as unset.
    pub value: Option<String>,
}

impl AttributeSeed {
    #[must_use]
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    #[must_use]
    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

impl FromStr for AttributeSeed {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.to_owned())),
            None => match s.trim().strip_suffix('!') {
                Some(name) => (name, None),
                None => (s.trim(), Some(String::new())),
            },
        };
        if name.is_empty() {
            return Err(OptionsError::EmptyName(s.to_owned()));
        }
        if !is_valid_name(name) {
            return Err(OptionsError::InvalidName(name.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            value,
        })
    }
}

/// Options for one conversion.
///
/// Seed attributes are applied in order, so a later seed for the same name
/// replaces an earlier one.
#[derive(Debug, Clone, Default)]
pub struct Options {
    attributes: Vec<AttributeSeed>,
}

impl Options {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an attribute with a value.
    #[must_use]
    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_seed(AttributeSeed::set(name, value))
    }

    /// Seed an attribute as unset.
    #[must_use]
    pub fn without_attribute(self, name: impl Into<String>) -> Self {
        self.with_seed(AttributeSeed::unset(name))
    }

    #[must_use]
    pub fn with_seed(mut self, seed: AttributeSeed) -> Self {
        self.attributes.push(seed);
        self
    }

    #[must_use]
    pub fn with_seeds(mut self, seeds: impl IntoIterator<Item = AttributeSeed>) -> Self {
        self.attributes.extend(seeds);
        self
    }

    /// Seed attributes in application order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.attributes
            .iter()
            .map(|seed| (seed.name.as_str(), seed.value.as_deref()))
    }
}

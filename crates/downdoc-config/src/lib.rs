//! Configuration management for downdoc.
//!
//! Parses `downdoc.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! ```toml
//! [attributes]
//! source-language = "rust"
//! markdown-unwrap-prose = true
//! experimental = false
//!
//! [output]
//! extension = "md"
//! dir = "${DOCS_OUT:-build/docs}"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `output.dir` supports `~`, `${VAR}` (errors if unset) and
//! `${VAR:-default}`, and is resolved relative to the config file.

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use downdoc::AttributeSeed;
use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "downdoc.toml";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed attributes.
    attributes: BTreeMap<String, AttributeValue>,
    /// Output configuration.
    pub output: OutputConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Value of a seed attribute in `[attributes]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// `true` sets the attribute to an empty value, `false` unsets it.
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    fn to_seed(&self, name: &str) -> AttributeSeed {
        match self {
            Self::Bool(true) => AttributeSeed::set(name, ""),
            Self::Bool(false) => AttributeSeed::unset(name),
            Self::Integer(value) => AttributeSeed::set(name, value.to_string()),
            Self::Float(value) => AttributeSeed::set(name, value.to_string()),
            Self::String(value) => AttributeSeed::set(name, value.as_str()),
        }
    }
}

/// Output configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Extension given to output files derived from the input path.
    pub extension: String,
    /// Directory for derived output files. Defaults to the input's directory.
    pub dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: "md".to_owned(),
            dir: None,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`output.dir`").
        field: String,
        /// Error message (e.g., "${`DOCS_OUT`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise, searches
    /// for `downdoc.toml` in the current directory and its parents, falling
    /// back to the defaults when none is found.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Self::load_from_file(path);
        }
        match Self::discover_config() {
            Some(discovered) => Self::load_from_file(&discovered),
            None => Ok(Self::default()),
        }
    }

    /// Seed attributes in a stable order.
    #[must_use]
    pub fn seeds(&self) -> Vec<AttributeSeed> {
        self.attributes
            .iter()
            .map(|(name, value)| value.to_seed(name))
            .collect()
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        discover_from(current)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if an attribute name is invalid or
    /// the output extension is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = self
            .attributes
            .keys()
            .find(|name| !downdoc::is_valid_name(name))
        {
            return Err(ConfigError::Validation(format!(
                "invalid attribute name '{name}' in [attributes]"
            )));
        }
        if self.output.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Validation(
                "output.extension cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.output.dir {
            let expanded = expand::expand_env(&dir.to_string_lossy(), "output.dir")?;
            self.output.dir = Some(PathBuf::from(expanded));
        }
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        if let Some(dir) = &self.output.dir {
            self.output.dir = Some(config_dir.join(dir));
        }
    }
}

fn discover_from(mut current: PathBuf) -> Option<PathBuf> {
    loop {
        let candidate = current.join(CONFIG_FILENAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.output.extension, "md");
        assert!(config.output.dir.is_none());
        assert!(config.seeds().is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.output.extension, "md");
    }

    #[test]
    fn test_parse_attribute_values() {
        let toml = r#"
[attributes]
source-language = "rust"
markdown-unwrap-prose = true
experimental = false
list-indent = 4
ratio = 1.5
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.seeds(),
            vec![
                AttributeSeed::unset("experimental"),
                AttributeSeed::set("list-indent", "4"),
                AttributeSeed::set("markdown-unwrap-prose", ""),
                AttributeSeed::set("ratio", "1.5"),
                AttributeSeed::set("source-language", "rust"),
            ]
        );
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[output]\nextension = \"markdown\"\ndir = \"out\"\n",
        );

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.output.extension, "markdown");
        assert_eq!(config.output.dir, Some(dir.path().join("out")));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");

        let err = Config::load(Some(&path)).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_load_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[output\n");

        let err = Config::load(Some(&path)).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_discover_in_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let nested = dir.path().join("docs").join("guide");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(discover_from(nested), Some(path));
    }

    #[test]
    fn test_expand_env_vars_output_dir() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::set_var("DOWNDOC_TEST_OUT", "/tmp/downdoc-out");
        }

        let toml = r#"
[output]
dir = "${DOWNDOC_TEST_OUT}"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.expand_env_vars().unwrap();

        assert_eq!(config.output.dir, Some(PathBuf::from("/tmp/downdoc-out")));

        unsafe {
            std::env::remove_var("DOWNDOC_TEST_OUT");
        }
    }

    #[test]
    fn test_resolve_paths_keeps_absolute_dir() {
        let mut config: Config = toml::from_str("[output]\ndir = \"/abs/out\"\n").unwrap();
        config.resolve_paths(Path::new("/project"));
        assert_eq!(config.output.dir, Some(PathBuf::from("/abs/out")));
    }

    #[test]
    fn test_validate_attribute_name() {
        let config: Config = toml::from_str("[attributes]\n\"bad name\" = \"x\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("bad name"));
    }

    #[test]
    fn test_validate_empty_extension() {
        let config: Config = toml::from_str("[output]\nextension = \"\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output.extension"));
    }
}

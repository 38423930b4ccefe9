//! `downdoc` conversion command implementation.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use downdoc::{AttributeSeed, Options};
use downdoc_config::{Config, OutputConfig};
use tracing::info;

use crate::error::CliError;
use crate::output::Output;

/// Path argument standing for stdin or stdout.
const STDIO: &str = "-";

/// Arguments for the conversion command.
#[derive(Args)]
pub(crate) struct ConvertArgs {
    /// AsciiDoc input file, or `-` to read from stdin.
    input: PathBuf,

    /// Output file, or `-` to write to stdout (default: input path with the
    /// configured extension, or stdout when reading from stdin).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Set a document attribute: `name=value`, `name` or `name!` to unset.
    #[arg(short, long = "attribute", value_name = "ATTR")]
    attributes: Vec<AttributeSeed>,

    /// Path to configuration file (default: auto-discover downdoc.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

/// Where the converted document goes.
#[derive(Debug, PartialEq, Eq)]
enum Destination {
    Stdout,
    File(PathBuf),
}

impl ConvertArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref())?;
        if let Some(path) = &config.config_path {
            info!(path = %path.display(), "loaded configuration");
        }

        let from_stdin = is_stdio(&self.input);
        let destination = destination(&self.input, self.output.as_deref(), &config.output)?;
        let source = read_source(&self.input, from_stdin)?;

        let options = Options::new()
            .with_seeds(config.seeds())
            .with_seeds(self.attributes);
        let markdown = downdoc::convert(&source, &options);

        match destination {
            Destination::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(markdown.as_bytes())?;
                if !markdown.is_empty() {
                    stdout.write_all(b"\n")?;
                }
                stdout.flush()?;
            }
            Destination::File(path) => {
                write_file(&path, &markdown)?;
                output.success(&format!("Wrote {}", path.display()));
            }
        }
        Ok(())
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO
}

fn read_source(input: &Path, from_stdin: bool) -> Result<String, CliError> {
    if from_stdin {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    std::fs::read_to_string(input).map_err(|source| CliError::File {
        path: input.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, markdown: &str) -> Result<(), CliError> {
    let to_file_error = |source| CliError::File {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_file_error)?;
    }
    let mut content = markdown.to_owned();
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(path, content).map_err(to_file_error)
}

/// Resolve the output destination.
///
/// Without an explicit output, stdin input goes to stdout and file input to
/// the input path with the configured extension, inside the configured
/// output directory when one is set.
fn destination(
    input: &Path,
    output: Option<&Path>,
    config: &OutputConfig,
) -> Result<Destination, CliError> {
    if let Some(output) = output {
        if is_stdio(output) {
            return Ok(Destination::Stdout);
        }
        return Ok(Destination::File(output.to_path_buf()));
    }
    if is_stdio(input) {
        return Ok(Destination::Stdout);
    }

    let derived = input.with_extension(config.extension.trim_start_matches('.'));
    let derived = match (&config.dir, derived.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => derived,
    };
    if derived == input {
        return Err(CliError::Validation(format!(
            "Output path would overwrite input: {}",
            input.display()
        )));
    }
    Ok(Destination::File(derived))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn output_config(extension: &str, dir: Option<&str>) -> OutputConfig {
        OutputConfig {
            extension: extension.to_owned(),
            dir: dir.map(PathBuf::from),
        }
    }

    #[test]
    fn test_destination_explicit_output() {
        let config = output_config("md", None);
        assert_eq!(
            destination(Path::new("doc.adoc"), Some(Path::new("out.md")), &config).unwrap(),
            Destination::File(PathBuf::from("out.md"))
        );
        assert_eq!(
            destination(Path::new("doc.adoc"), Some(Path::new("-")), &config).unwrap(),
            Destination::Stdout
        );
    }

    #[test]
    fn test_destination_stdin_defaults_to_stdout() {
        let config = output_config("md", Some("/out"));
        assert_eq!(
            destination(Path::new("-"), None, &config).unwrap(),
            Destination::Stdout
        );
    }

    #[test]
    fn test_destination_derived_from_input() {
        assert_eq!(
            destination(Path::new("docs/README.adoc"), None, &output_config("md", None)).unwrap(),
            Destination::File(PathBuf::from("docs/README.md"))
        );
        assert_eq!(
            destination(
                Path::new("docs/README.adoc"),
                None,
                &output_config(".markdown", Some("/out"))
            )
            .unwrap(),
            Destination::File(PathBuf::from("/out/README.markdown"))
        );
    }

    #[test]
    fn test_destination_refuses_to_overwrite_input() {
        let err = destination(Path::new("notes.md"), None, &output_config("md", None)).unwrap_err();
        assert!(matches!(err, CliError::Validation(_)));
    }

    #[test]
    fn test_write_file_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.md");

        write_file(&path, "# Title").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Title\n");
    }

    #[test]
    fn test_read_source_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.adoc");

        let err = read_source(&path, false).unwrap_err();

        assert!(matches!(err, CliError::File { .. }));
        assert!(err.to_string().contains("missing.adoc"));
    }
}

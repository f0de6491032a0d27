//! `cmakels-format`: format list files from the command line.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use similar::TextDiff;
use thiserror::Error;

use crate::formatter::{FormatOptions, Formatter};
use crate::parser::parse_tokens;

/// Label used for standard input in diff headers
pub const STDIN_LABEL: &str = "(stdin)";

#[derive(Debug, Parser)]
#[command(
    name = "cmakels-format",
    version,
    about = "Format CMake list files.",
    after_help = "If no files are given, standard input is formatted and written to standard output."
)]
pub struct Cli {
    /// List files to format
    pub files: Vec<PathBuf>,

    /// Rewrite each file in place instead of printing it
    #[arg(short = 'i', long = "in-place", conflicts_with = "diff")]
    pub in_place: bool,

    /// Print a unified diff instead of the formatted text
    #[arg(short, long)]
    pub diff: bool,

    /// Spaces per indentation level
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub indent_width: usize,

    /// Keep command names as written instead of lowercasing them
    #[arg(long)]
    pub preserve_case: bool,
}

impl Cli {
    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::default()
            .with_indent_width(self.indent_width)
            .with_lowercase_identifiers(!self.preserve_case)
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot use -i when no files are given")]
    InPlaceWithoutFiles,

    #[error("failed to read standard input: {0}")]
    Stdin(#[source] io::Error),

    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InPlaceWithoutFiles => 2,
            CliError::Stdin(_) | CliError::Output(_) => 1,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Formats every input named by `cli`, in order.
///
/// A file that cannot be read or parsed is logged and skipped. In print mode
/// an unparseable file is echoed unchanged.
pub fn run(cli: &Cli, mut stdin: impl Read, stdout: &mut impl Write) -> CliResult<()> {
    if cli.in_place && cli.files.is_empty() {
        return Err(CliError::InPlaceWithoutFiles);
    }
    let formatter = Formatter::new(cli.format_options());

    if cli.files.is_empty() {
        let mut content = String::new();
        stdin
            .read_to_string(&mut content)
            .map_err(CliError::Stdin)?;
        let formatted = format_document(&formatter, STDIN_LABEL, &content);
        return emit(cli, STDIN_LABEL, &content, formatted.as_deref(), stdout);
    }

    for path in &cli.files {
        let label = path.display().to_string();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %label, %err, "skipping unreadable file");
                continue;
            }
        };
        let formatted = format_document(&formatter, &label, &content);

        if cli.in_place {
            if let Some(formatted) = formatted.filter(|f| *f != content) {
                write_in_place(path, &formatted);
            }
            continue;
        }
        emit(cli, &label, &content, formatted.as_deref(), stdout)?;
    }
    Ok(())
}

/// `None` when the document does not parse completely
fn format_document(formatter: &Formatter, label: &str, content: &str) -> Option<String> {
    match parse_tokens(content) {
        Ok(stream) if stream.is_complete() => Some(formatter.format(&stream.tokens)),
        Ok(stream) => {
            let at = content.len() - stream.remainder.len();
            tracing::warn!(path = %label, offset = at, "parse stopped early, leaving file unchanged");
            None
        }
        Err(err) => {
            tracing::warn!(path = %label, %err, "parse failed, leaving file unchanged");
            None
        }
    }
}

fn emit(
    cli: &Cli,
    label: &str,
    content: &str,
    formatted: Option<&str>,
    stdout: &mut impl Write,
) -> CliResult<()> {
    let formatted = formatted.unwrap_or(content);
    if cli.diff {
        let diff = TextDiff::from_lines(content, formatted);
        write!(
            stdout,
            "{}",
            diff.unified_diff().header(
                &format!("{label}\t(before formatting)"),
                &format!("{label}\t(after formatting)"),
            )
        )
        .map_err(CliError::Output)
    } else {
        stdout
            .write_all(formatted.as_bytes())
            .map_err(CliError::Output)
    }
}

fn write_in_place(path: &Path, formatted: &str) {
    if let Err(err) = fs::write(path, formatted) {
        tracing::warn!(path = %path.display(), %err, "failed to rewrite file");
    } else {
        tracing::debug!(path = %path.display(), "rewrote file");
    }
}

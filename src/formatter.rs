use tokio_util::sync::CancellationToken;

use crate::parser::parse_tokens;
use crate::token::{ArgumentToken, CommandToken, Token};

/// Keywords whose line is indented one level less than the line before
const DEDENT_KEYWORDS: &[&str] = &[
    "elseif",
    "else",
    "endif",
    "endforeach",
    "endwhile",
    "endmacro",
    "endfunction",
];

/// Keywords that indent the lines after them
const INDENT_KEYWORDS: &[&str] = &["if", "elseif", "else", "foreach", "while", "macro", "function"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Spaces per indentation level
    pub indent_width: usize,
    pub lowercase_identifiers: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent_width: 2,
            lowercase_identifiers: true,
        }
    }
}

impl FormatOptions {
    pub fn with_indent_width(mut self, indent_width: usize) -> Self {
        self.indent_width = indent_width;
        self
    }

    pub fn with_lowercase_identifiers(mut self, lowercase: bool) -> Self {
        self.lowercase_identifiers = lowercase;
        self
    }

    pub fn indent(&self, level: usize) -> String {
        " ".repeat(self.indent_width * level)
    }
}

/// Canonical layout for a token-mode stream
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    options: FormatOptions,
}

impl Formatter {
    pub fn new(options: FormatOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    /// Formats a complete token stream. The output always ends in exactly one newline.
    pub fn format(&self, tokens: &[Token<'_>]) -> String {
        self.format_tokens(tokens, None).unwrap_or_default()
    }

    /// Like [`Formatter::format`], giving up with `None` once `cancel` fires.
    pub fn format_with_cancellation(
        &self,
        tokens: &[Token<'_>],
        cancel: &CancellationToken,
    ) -> Option<String> {
        self.format_tokens(tokens, Some(cancel))
    }

    fn format_tokens(
        &self,
        tokens: &[Token<'_>],
        cancel: Option<&CancellationToken>,
    ) -> Option<String> {
        let mut lines = Vec::new();
        let mut line = LineBuilder::default();
        let mut level = 0usize;

        for token in tokens {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!("formatting cancelled");
                return None;
            }

            match token {
                Token::Command(command) => {
                    let keyword = command.identifier.to_ascii_lowercase();
                    if DEDENT_KEYWORDS.contains(&keyword.as_str()) {
                        level = level.saturating_sub(1);
                    }

                    line.start(&self.options.indent(level));
                    line.push(&self.render_command(command, level), true);

                    if INDENT_KEYWORDS.contains(&keyword.as_str()) {
                        level += 1;
                    }
                }
                Token::Comment(comment) => {
                    line.start(&self.options.indent(level));
                    line.push_comment(comment);
                }
                Token::Space(gap) => line.gap(gap),
                Token::Newline(_) => lines.push(std::mem::take(&mut line).finish().0),
            }
        }
        lines.push(line.finish().0);

        let mut out = trim_blank_lines(&lines).join("\n");
        out.push('\n');
        Some(out)
    }

    fn render_command(&self, command: &CommandToken<'_>, level: usize) -> String {
        let name = if self.options.lowercase_identifiers {
            command.identifier.to_ascii_lowercase()
        } else {
            command.identifier.to_owned()
        };

        let lines = argument_lines(&command.arguments);
        match lines.as_slice() {
            [] => format!("{name}()"),
            // A trailing line comment would swallow the closing paren.
            [(line, false)] => format!("{name}({line})"),
            _ => {
                let inner = self.options.indent(level + 1);
                let mut out = format!("{name}(\n");
                for (line, _) in &lines {
                    out.push_str(&inner);
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str(&self.options.indent(level));
                out.push(')');
                out
            }
        }
    }
}

/// Formats a whole document. Text that does not parse completely is returned unchanged.
pub fn format_source(text: &str, options: &FormatOptions) -> String {
    match parse_tokens(text) {
        Ok(stream) if stream.is_complete() => Formatter::new(options.clone()).format(&stream.tokens),
        Ok(stream) => {
            tracing::debug!(
                remaining = stream.remainder.len(),
                "input not fully parsed, leaving it unchanged"
            );
            text.to_owned()
        }
        Err(err) => {
            tracing::debug!(%err, "input rejected, leaving it unchanged");
            text.to_owned()
        }
    }
}

/// Argument block split at newlines, with spacing normalized and blank lines dropped.
/// The flag marks lines ending in a line comment.
fn argument_lines(arguments: &[ArgumentToken<'_>]) -> Vec<(String, bool)> {
    let mut lines = Vec::new();
    let mut line = LineBuilder::default();

    for argument in arguments {
        match argument {
            ArgumentToken::Newline(_) => lines.push(std::mem::take(&mut line).finish()),
            ArgumentToken::Space(gap) => line.gap(gap),
            ArgumentToken::Comment(comment) => line.push_comment(comment),
            other => line.push(other.text(), false),
        }
    }
    lines.push(line.finish());

    lines.retain(|(text, _)| !text.is_empty());
    lines
}

fn trim_blank_lines(lines: &[String]) -> &[String] {
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);
    &lines[start..end]
}

fn is_bracket_comment(comment: &str) -> bool {
    comment
        .strip_prefix("#[")
        .map(|rest| rest.trim_start_matches('='))
        .is_some_and(|rest| rest.starts_with('['))
}

/// One output line. Whitespace is held back until something follows it, so
/// trailing whitespace never reaches the output.
#[derive(Debug, Default)]
struct LineBuilder<'a> {
    text: String,
    gap: Option<&'a str>,
    ends_in_comment: bool,
}

impl<'a> LineBuilder<'a> {
    fn start(&mut self, indent: &str) {
        if self.text.is_empty() {
            self.text.push_str(indent);
        }
    }

    /// Leading whitespace is dropped.
    fn gap(&mut self, gap: &'a str) {
        if !self.text.is_empty() {
            self.gap = Some(gap);
        }
    }

    /// `exact_gap` keeps the pending whitespace as written, otherwise it becomes one space.
    fn push(&mut self, text: &str, exact_gap: bool) {
        if let Some(gap) = self.gap.take() {
            self.text.push_str(if exact_gap { gap } else { " " });
        }
        self.text.push_str(text);
        self.ends_in_comment = false;
    }

    fn push_comment(&mut self, comment: &str) {
        if is_bracket_comment(comment) {
            self.push(comment, true);
        } else {
            self.push(comment.trim_end(), true);
            self.ends_in_comment = true;
        }
    }

    fn finish(self) -> (String, bool) {
        (self.text, self.ends_in_comment)
    }
}

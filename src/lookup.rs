//! Position-based queries used by hover and completion.

use std::convert::Infallible;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{CommandInvocation, ListFile};
use crate::collaborator::{DocumentationProvider, ProjectModel};
use crate::location::{LineIndex, Position, Range};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word pattern is valid"));

/// Word under the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word<'a> {
    pub text: &'a str,
    pub range: Range,
}

/// Finds the `\w+` run touching `position`.
///
/// With `include_all` unset the word is cut at the cursor, which gives the
/// prefix typed so far.
pub fn word_at(text: &str, position: Position, include_all: bool) -> Option<Word<'_>> {
    let line = LineIndex::new(text).line_text(position.line)?;
    let cursor = byte_column(line, position.character)?;

    let found = WORD
        .find_iter(line)
        .find(|m| m.start() <= cursor && cursor <= m.end())?;
    let end = if include_all { found.end() } else { cursor };

    Some(Word {
        text: &line[found.start()..end],
        range: Range::new(
            Position::new(position.line, char_column(line, found.start())),
            Position::new(position.line, char_column(line, end)),
        ),
    })
}

/// Innermost invocation (including block declarations and end markers) whose
/// span contains `offset`.
pub fn invocation_at<'n, 'a>(tree: &'n ListFile<'a>, offset: usize) -> Option<&'n CommandInvocation<'a>> {
    let mut found = None;
    let Ok(()) = tree.walk(&mut |node| {
        if let Some(invocation) = node.as_invocation() {
            if invocation.span.contains(offset) {
                found = Some(invocation);
            }
        }
        Ok::<_, Infallible>(())
    });
    found
}

/// Hover text for `word`. Commands are looked up case-folded, then variables,
/// modules and finally `Find` modules; the first hit wins.
pub fn documentation_for(word: &str, docs: &dyn DocumentationProvider) -> Option<String> {
    docs.command_doc(&word.to_lowercase())
        .or_else(|| docs.variable_doc(word))
        .or_else(|| docs.module_doc(word, false))
        .or_else(|| docs.module_doc(word, true))
}

/// Hover text and the range of the word it belongs to
pub fn hover(
    text: &str,
    position: Position,
    docs: &dyn DocumentationProvider,
) -> Option<(String, Range)> {
    let word = word_at(text, position, true)?;
    documentation_for(word.text, docs).map(|doc| (doc, word.range))
}

/// Name of the command whose argument list the cursor is in, taken from the
/// word in front of the character before the cursor.
pub fn command_before(text: &str, position: Position) -> Option<String> {
    let offset = LineIndex::new(text).offset(position)?;
    let mut before = text[..offset].chars();
    before.next_back();

    before
        .as_str()
        .trim_end()
        .rsplit(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .next()
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    Command,
    Variable,
    Target,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub label: String,
    pub kind: CompletionKind,
    pub documentation: Option<String>,
}

impl Completion {
    fn new(label: String, kind: CompletionKind, documentation: Option<String>) -> Self {
        Self {
            label,
            kind,
            documentation,
        }
    }
}

/// Characters that open a completion context on their own
pub const TRIGGER_CHARACTERS: &[char] = &['{', '('];

/// Completion candidates at `position`.
///
/// `trigger` is the character that caused the request, if the editor reports one.
/// After `{` only variables are offered; after `(` only modules, and only
/// inside `include()` and `find_package()`.
pub fn completions(
    text: &str,
    position: Position,
    trigger: Option<char>,
    docs: &dyn DocumentationProvider,
    project: &dyn ProjectModel,
) -> Vec<Completion> {
    let (prefix, trigger) = match trigger.or_else(|| trigger_before(text, position)) {
        Some(trigger) => (String::new(), Some(trigger)),
        None => {
            let prefix = word_at(text, position, false).map_or(String::new(), |w| w.text.to_owned());
            (prefix, None)
        }
    };

    let mut items = Vec::new();
    if trigger.is_none() {
        items.extend(docs.search_commands(&prefix).into_iter().map(|name| {
            let doc = docs.command_doc(&name);
            Completion::new(name, CompletionKind::Command, doc)
        }));
    }

    if matches!(trigger, None | Some('{')) {
        items.extend(docs.search_variables(&prefix).into_iter().map(|name| {
            let doc = project
                .cached_variable(&name)
                .or_else(|| docs.variable_doc(&name));
            Completion::new(name, CompletionKind::Variable, doc)
        }));
    }

    if trigger.is_none() {
        items.extend(
            project
                .search_targets(&prefix)
                .into_iter()
                .map(|name| Completion::new(name, CompletionKind::Target, None)),
        );
    }

    if trigger == Some('(') {
        let package = match command_before(text, position).map(|c| c.to_lowercase()) {
            Some(command) if command == "include" => Some(false),
            Some(command) if command == "find_package" => Some(true),
            _ => None,
        };
        if let Some(package) = package {
            items.extend(docs.search_modules(&prefix, package).into_iter().map(|name| {
                let doc = docs.module_doc(&name, package);
                Completion::new(name, CompletionKind::Module, doc)
            }));
        }
    }

    tracing::trace!(count = items.len(), ?trigger, "completion candidates");
    items
}

fn trigger_before(text: &str, position: Position) -> Option<char> {
    let column = position.character.checked_sub(1)?;
    let line = LineIndex::new(text).line_text(position.line)?;
    line.chars()
        .nth(column)
        .filter(|c| TRIGGER_CHARACTERS.contains(c))
}

/// Byte offset of character `column`; the end of the line is a valid column.
fn byte_column(line: &str, column: usize) -> Option<usize> {
    line.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(line.len()))
        .nth(column)
}

fn char_column(line: &str, byte: usize) -> usize {
    line[..byte].chars().count()
}

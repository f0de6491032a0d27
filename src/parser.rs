use pest::{
    Parser,
    error::{Error as PestError, ErrorVariant, InputLocation},
    iterators::Pair,
};
use pest_derive::Parser;
use tokio_util::sync::CancellationToken;

use crate::ast::{
    Argument, ArgumentKind, Block, Branch, CommandDeclarationBlock, CommandInvocation,
    ConditionalBlock, ListFile, LoopBlock,
};
use crate::diagnostics::{Diagnostic, Severity};
use crate::error::ParseError;
use crate::location::{LineIndex, Range, Span};
use crate::token::{ArgumentToken, CommandToken, Token, TokenStream};

#[derive(Parser)]
#[grammar = "src/listfile.pest"]
pub struct ListFileGrammar;

/// Default bound on parenthesis and block nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

const BLOCK_OPENERS: &[&str] = &["function", "macro", "if", "foreach", "while"];
const BLOCK_CLOSERS: &[&str] = &["endfunction", "endmacro", "endif", "endforeach", "endwhile"];

/// Result of an AST-mode parse anchored at offset 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstParse<'a> {
    pub tree: ListFile<'a>,
    /// Unconsumed suffix of the input
    pub remainder: &'a str,
}

/// Parse driver for both output modes.
///
/// Holds no state between calls, so one parser can be shared across threads.
#[derive(Debug, Clone)]
pub struct ListParser {
    max_depth: usize,
    cancel: Option<CancellationToken>,
}

impl Default for ListParser {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            cancel: None,
        }
    }
}

impl ListParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on nested `(` groups and nested blocks
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Token mode: the longest whitespace-preserving token sequence matchable
    /// from offset 0, plus the unconsumed remainder.
    ///
    /// Only the nesting guard and cancellation can make this fail.
    pub fn parse_tokens<'a>(&self, text: &'a str) -> Result<TokenStream<'a>, ParseError> {
        self.check_cancelled()?;
        self.check_paren_depth(text)?;

        let stream = match ListFileGrammar::parse(Rule::token_stream, text) {
            Ok(mut pairs) => pairs.next(),
            Err(err) => {
                tracing::debug!(%err, "token stream rule rejected input");
                None
            }
        };
        let Some(stream) = stream else {
            return Ok(TokenStream {
                tokens: Vec::new(),
                remainder: text,
            });
        };

        let end = stream.as_span().end();
        let tokens = stream
            .into_inner()
            .filter_map(Self::parse_token)
            .collect::<Vec<_>>();
        let remainder = &text[end..];
        if !remainder.is_empty() {
            tracing::debug!(offset = end, "token stream stopped before end of input");
        }

        self.check_cancelled()?;
        Ok(TokenStream { tokens, remainder })
    }

    /// AST mode: a typed tree of everything matchable from offset 0.
    ///
    /// An unterminated or mismatched block fails with
    /// [`ParseError::Structural`]; an incomplete line only shortens the tree.
    pub fn parse_ast<'a>(&self, text: &'a str) -> Result<AstParse<'a>, ParseError> {
        let stream = self.parse_tokens(text)?;
        self.check_block_depth(text, &stream.tokens)?;
        self.check_cancelled()?;

        let file = match ListFileGrammar::parse(Rule::list_file, text) {
            Ok(mut pairs) => pairs.next(),
            Err(err) => {
                tracing::debug!(%err, "list file rule rejected input");
                None
            }
        };
        let (tree, end) = match file {
            Some(file) => {
                let span = Span::from_pest(file.as_span());
                let blocks = file
                    .into_inner()
                    .filter_map(Self::parse_block)
                    .collect::<Vec<_>>();
                (ListFile { blocks, span }, span.end)
            }
            None => (ListFile::default(), 0),
        };

        let remainder = &text[end..];
        if let Some(diagnostic) = Self::structural_failure(text, end) {
            tracing::debug!(message = %diagnostic.message, "structural mismatch");
            return Err(ParseError::Structural(diagnostic));
        }

        self.check_cancelled()?;
        Ok(AstParse { tree, remainder })
    }

    fn check_cancelled(&self) -> Result<(), ParseError> {
        match &self.cancel {
            Some(cancel) if cancel.is_cancelled() => Err(ParseError::Cancelled),
            _ => Ok(()),
        }
    }

    fn check_paren_depth(&self, text: &str) -> Result<(), ParseError> {
        match deepest_paren(text, self.max_depth) {
            Some(offset) => Err(ParseError::NestingTooDeep {
                depth: self.max_depth + 1,
                limit: self.max_depth,
                position: LineIndex::new(text).position(offset),
            }),
            None => Ok(()),
        }
    }

    fn check_block_depth(&self, text: &str, tokens: &[Token<'_>]) -> Result<(), ParseError> {
        let mut depth = 0usize;
        let mut offset = 0usize;
        for token in tokens {
            if let Token::Command(command) = token {
                let name = command.identifier.to_ascii_lowercase();
                if BLOCK_OPENERS.contains(&name.as_str()) {
                    depth += 1;
                    if depth > self.max_depth {
                        return Err(ParseError::NestingTooDeep {
                            depth,
                            limit: self.max_depth,
                            position: LineIndex::new(text).position(offset),
                        });
                    }
                } else if BLOCK_CLOSERS.contains(&name.as_str()) {
                    depth = depth.saturating_sub(1);
                }
            }
            offset += token.text().len();
        }
        Ok(())
    }

    fn parse_token(pair: Pair<'_, Rule>) -> Option<Token<'_>> {
        match pair.as_rule() {
            Rule::command_invocation => Self::parse_command_token(pair).map(Token::Command),
            Rule::space => Some(Token::Space(pair.as_str())),
            Rule::newline => Some(Token::Newline(pair.as_str())),
            Rule::line_comment | Rule::bracket_comment => Some(Token::Comment(pair.as_str())),
            _ => None,
        }
    }

    fn parse_command_token(pair: Pair<'_, Rule>) -> Option<CommandToken<'_>> {
        let lexeme = pair.as_str();
        let mut inner = pair.into_inner();

        let identifier = inner.next()?.as_str();
        let arguments = inner
            .find(|p| p.as_rule() == Rule::argument_list)
            .map(|list| {
                list.into_inner()
                    .filter_map(Self::parse_argument_token)
                    .collect()
            })
            .unwrap_or_default();

        Some(CommandToken {
            identifier,
            arguments,
            lexeme,
        })
    }

    fn parse_argument_token(pair: Pair<'_, Rule>) -> Option<ArgumentToken<'_>> {
        match pair.as_rule() {
            Rule::unquoted_argument | Rule::quoted_argument | Rule::bracket_argument => {
                Some(ArgumentToken::Argument(pair.as_str()))
            }
            Rule::space => Some(ArgumentToken::Space(pair.as_str())),
            Rule::newline => Some(ArgumentToken::Newline(pair.as_str())),
            Rule::line_comment | Rule::bracket_comment => {
                Some(ArgumentToken::Comment(pair.as_str()))
            }
            Rule::paren_open => Some(ArgumentToken::OpenParen),
            Rule::paren_close => Some(ArgumentToken::CloseParen),
            _ => None,
        }
    }

    fn parse_block(pair: Pair<'_, Rule>) -> Option<Block<'_>> {
        match pair.as_rule() {
            Rule::ast_command => Self::parse_invocation(pair).map(Block::Command),
            Rule::declaration_block => {
                let (declaration, body, end) = Self::parse_delimited(pair)?;
                Some(Block::Declaration(CommandDeclarationBlock {
                    span: Span::new(declaration.span.start, end.span.end),
                    declaration,
                    body,
                    end,
                }))
            }
            Rule::loop_block => {
                let (declaration, body, end) = Self::parse_delimited(pair)?;
                Some(Block::Loop(LoopBlock {
                    span: Span::new(declaration.span.start, end.span.end),
                    declaration,
                    body,
                    end,
                }))
            }
            Rule::conditional_block => Self::parse_conditional(pair).map(Block::Conditional),
            _ => None,
        }
    }

    /// Declaration line, body blocks, end line of a function/macro/loop block
    fn parse_delimited<'a>(
        pair: Pair<'a, Rule>,
    ) -> Option<(CommandInvocation<'a>, Vec<Block<'a>>, CommandInvocation<'a>)> {
        let mut inner = pair.into_inner().filter(|p| !is_trivia(p.as_rule()));
        let declaration = Self::parse_invocation(inner.next()?)?;

        let mut rest = inner.collect::<Vec<_>>();
        let end = Self::parse_invocation(rest.pop()?)?;
        let body = rest.into_iter().filter_map(Self::parse_block).collect();

        Some((declaration, body, end))
    }

    fn parse_conditional(pair: Pair<'_, Rule>) -> Option<ConditionalBlock<'_>> {
        let mut branches = Vec::new();
        let mut end = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::if_branch | Rule::elseif_branch | Rule::else_branch => {
                    branches.push(Self::parse_branch(inner)?);
                }
                Rule::endif_command => end = Self::parse_invocation(inner),
                _ => {}
            }
        }

        let end = end?;
        let start = branches.first()?.span.start;
        Some(ConditionalBlock {
            branches,
            span: Span::new(start, end.span.end),
            end,
        })
    }

    fn parse_branch(pair: Pair<'_, Rule>) -> Option<Branch<'_>> {
        let mut inner = pair.into_inner().filter(|p| !is_trivia(p.as_rule()));
        let declaration = Self::parse_invocation(inner.next()?)?;
        let body = inner.filter_map(Self::parse_block).collect::<Vec<_>>();

        let end = body
            .last()
            .map_or(declaration.span.end, |block| block.span().end);
        Some(Branch {
            span: Span::new(declaration.span.start, end),
            declaration,
            body,
        })
    }

    fn parse_invocation(pair: Pair<'_, Rule>) -> Option<CommandInvocation<'_>> {
        let span = Span::from_pest(pair.as_span());
        let mut inner = pair.into_inner();

        let identifier = inner.next()?;
        let arguments = inner
            .find(|p| p.as_rule() == Rule::argument_list)
            .map(|list| list.into_inner().filter_map(Self::parse_argument).collect())
            .unwrap_or_default();

        Some(CommandInvocation {
            identifier: identifier.as_str(),
            identifier_span: Span::from_pest(identifier.as_span()),
            arguments,
            span,
        })
    }

    fn parse_argument(pair: Pair<'_, Rule>) -> Option<Argument<'_>> {
        let span = Span::from_pest(pair.as_span());
        let (kind, value) = match pair.as_rule() {
            Rule::unquoted_argument | Rule::paren_open | Rule::paren_close => {
                (ArgumentKind::Unquoted, pair.as_str())
            }
            Rule::quoted_argument => (ArgumentKind::Quoted, inner_text(pair, Rule::quoted_content)),
            Rule::bracket_argument => {
                (ArgumentKind::Bracket, inner_text(pair, Rule::bracket_content))
            }
            _ => return None,
        };

        Some(Argument { kind, value, span })
    }

    /// Checks whether the text left over by `list_file` starts with a complete
    /// block keyword line. If so the parse failed structurally rather than lexically.
    fn structural_failure(text: &str, end: usize) -> Option<Diagnostic> {
        let remainder = &text[end..];
        let keyword_line = ListFileGrammar::parse(Rule::keyword_line, remainder)
            .ok()?
            .next()?;
        let keyword = keyword_line
            .into_inner()
            .find(|p| !is_trivia(p.as_rule()))?;
        let index = LineIndex::new(text);

        if !matches!(
            keyword.as_rule(),
            Rule::function_command
                | Rule::macro_command
                | Rule::if_command
                | Rule::foreach_command
                | Rule::while_command
        ) {
            let identifier = keyword.into_inner().next()?;
            let span = Span::from_pest(identifier.as_span());
            let at = Span::new(end + span.start, end + span.end);
            return Some(Diagnostic::new(
                index.range(at),
                format!("unexpected {}()", identifier.as_str().to_ascii_lowercase()),
                Severity::Error,
            ));
        }

        // The block was opened but never closed: let the grammar report
        // where it gave up and what it was waiting for.
        let err = match ListFileGrammar::parse(Rule::open_block, remainder) {
            Ok(_) => return None,
            Err(err) => err,
        };
        let offset = match err.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        Some(Diagnostic::new(
            Range::at(index.position(end + offset)),
            structural_message(&err),
            Severity::Error,
        ))
    }
}

/// Convenience wrapper: token mode with default settings
pub fn parse_tokens(text: &str) -> Result<TokenStream<'_>, ParseError> {
    ListParser::new().parse_tokens(text)
}

/// Convenience wrapper: AST mode with default settings
pub fn parse_ast(text: &str) -> Result<AstParse<'_>, ParseError> {
    ListParser::new().parse_ast(text)
}

fn is_trivia(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::space | Rule::newline | Rule::line_comment | Rule::bracket_comment | Rule::EOI
    )
}

fn inner_text<'a>(pair: Pair<'a, Rule>, rule: Rule) -> &'a str {
    pair.into_inner()
        .find(|p| p.as_rule() == rule)
        .map_or("", |p| p.as_str())
}

fn is_terminator(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::endfunction_command
            | Rule::kw_endfunction
            | Rule::endmacro_command
            | Rule::kw_endmacro
            | Rule::elseif_branch
            | Rule::elseif_command
            | Rule::kw_elseif
            | Rule::else_branch
            | Rule::else_command
            | Rule::kw_else
            | Rule::endif_command
            | Rule::kw_endif
            | Rule::endforeach_command
            | Rule::kw_endforeach
            | Rule::endwhile_command
            | Rule::kw_endwhile
    )
}

fn describe_rule(rule: Rule) -> &'static str {
    match rule {
        Rule::endfunction_command | Rule::kw_endfunction => "endfunction()",
        Rule::endmacro_command | Rule::kw_endmacro => "endmacro()",
        Rule::elseif_branch | Rule::elseif_command | Rule::kw_elseif => "elseif()",
        Rule::else_branch | Rule::else_command | Rule::kw_else => "else()",
        Rule::endif_command | Rule::kw_endif => "endif()",
        Rule::endforeach_command | Rule::kw_endforeach => "endforeach()",
        Rule::endwhile_command | Rule::kw_endwhile => "endwhile()",
        Rule::declaration_block | Rule::function_command | Rule::macro_command => {
            "function or macro block"
        }
        Rule::conditional_block | Rule::if_branch | Rule::if_command => "if block",
        Rule::loop_block | Rule::foreach_command | Rule::while_command => "loop block",
        Rule::ast_command | Rule::command_identifier => "command invocation",
        Rule::quoted_argument | Rule::quoted_content => "quoted argument",
        Rule::bracket_argument | Rule::bracket_content => "bracket argument",
        Rule::unquoted_argument => "unquoted argument",
        Rule::paren_open => "opening parenthesis",
        Rule::paren_close => "closing parenthesis",
        _ => "input",
    }
}

fn structural_message(err: &PestError<Rule>) -> String {
    let ErrorVariant::ParsingError {
        positives,
        negatives,
    } = &err.variant
    else {
        return headline(&err.variant.message()).to_owned();
    };

    let terminators = positives
        .iter()
        .copied()
        .filter(|rule| is_terminator(*rule))
        .collect::<Vec<_>>();
    let expected = if terminators.is_empty() {
        positives
            .iter()
            .copied()
            .filter(|rule| !is_trivia(*rule))
            .collect()
    } else {
        terminators
    };

    match (expected.is_empty(), negatives.is_empty()) {
        (false, _) => format!("expected {}", enumerate(&expected)),
        (true, false) => format!("unexpected {}", enumerate(negatives)),
        (true, true) => "unterminated block".to_owned(),
    }
}

/// `a`, `a or b`, `a, b, or c` over deduplicated rule descriptions
fn enumerate(rules: &[Rule]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for rule in rules {
        let name = describe_rule(*rule);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    match names.as_slice() {
        [] => String::new(),
        [one] => (*one).to_owned(),
        [a, b] => format!("{a} or {b}"),
        [init @ .., last] => format!("{}, or {last}", init.join(", ")),
    }
}

/// First sentence of an engine message, without parenthetical detail.
fn headline(message: &str) -> &str {
    let line = message.lines().next().unwrap_or_default();
    let line = line.split(" (").next().unwrap_or(line);
    line.split(". ").next().unwrap_or(line).trim_end_matches('.')
}

/// Offset of the first `(` that nests deeper than `limit`, skipping quoted
/// arguments, bracket arguments and comments.
fn deepest_paren(text: &str, limit: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'"' => {
                i = skip_quoted(bytes, i + 1);
                continue;
            }
            b'#' => {
                i = bracket_end(text, i + 1).unwrap_or_else(|| skip_line(bytes, i));
                continue;
            }
            b'[' => {
                if let Some(end) = bracket_end(text, i) {
                    i = end;
                    continue;
                }
            }
            b'(' => {
                depth += 1;
                if depth > limit {
                    return Some(i);
                }
            }
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    None
}

/// End of a bracket argument opening at `start`; unterminated brackets run to
/// the end of the text. `None` when no bracket opens at `start`.
fn bracket_end(text: &str, start: usize) -> Option<usize> {
    let fence = text.get(start..)?.strip_prefix('[')?;
    let equals = fence.bytes().take_while(|&b| b == b'=').count();
    if fence.as_bytes().get(equals) != Some(&b'[') {
        return None;
    }

    let content = start + equals + 2;
    let close = format!("]{}]", "=".repeat(equals));
    Some(
        text[content..]
            .find(&close)
            .map_or(text.len(), |at| content + at + close.len()),
    )
}

fn skip_quoted(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], i: usize) -> usize {
    bytes[i..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |n| i + n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::location::Position;
    use rstest::rstest;

    fn command<'a>(identifier: &'a str, arguments: Vec<ArgumentToken<'a>>) -> Token<'a> {
        Token::Command(CommandToken {
            identifier,
            arguments,
            lexeme: "",
        })
    }

    /// Compares streams ignoring command lexemes, which are covered by the round-trip tests.
    fn strip_lexemes(tokens: Vec<Token<'_>>) -> Vec<Token<'_>> {
        tokens
            .into_iter()
            .map(|token| match token {
                Token::Command(c) => Token::Command(CommandToken { lexeme: "", ..c }),
                other => other,
            })
            .collect()
    }

    use crate::token::ArgumentToken::{Argument as Arg, Comment as ArgComment, Newline as ArgNewline};
    use crate::token::ArgumentToken::{CloseParen, OpenParen, Space as ArgSpace};

    #[rstest]
    #[case::no_args("a()", vec![command("a", vec![])], "")]
    #[case::leading_space(" a ()", vec![Token::Space(" "), command("a", vec![])], "")]
    #[case::single_arg("a(b)", vec![command("a", vec![Arg("b")])], "")]
    #[case::spaced_arg("a ( b )", vec![command("a", vec![ArgSpace(" "), Arg("b"), ArgSpace(" ")])], "")]
    #[case::escapes(r#"a(\n\")"#, vec![command("a", vec![Arg(r#"\n\""#)])], "")]
    #[case::paren_group("a((b))", vec![command("a", vec![OpenParen, Arg("b"), CloseParen])], "")]
    #[case::paren_group_nested(
        "a(((b)))",
        vec![command("a", vec![OpenParen, OpenParen, Arg("b"), CloseParen, CloseParen])],
        ""
    )]
    #[case::quoted(r#"a("b\"")"#, vec![command("a", vec![Arg(r#""b\"""#)])], "")]
    #[case::quoted_continuation("a(\"\\\n\")", vec![command("a", vec![Arg("\"\\\n\"")])], "")]
    #[case::quoted_multiline("a(\"b\nc\n\")", vec![command("a", vec![Arg("\"b\nc\n\"")])], "")]
    #[case::bracket("a([[b]])", vec![command("a", vec![Arg("[[b]]")])], "")]
    #[case::bracket_fenced("a([=[b]]c]=])", vec![command("a", vec![Arg("[=[b]]c]=]")])], "")]
    #[case::multi_arg("a(b c)", vec![command("a", vec![Arg("b"), ArgSpace(" "), Arg("c")])], "")]
    #[case::line_comment("a() # b # c", vec![command("a", vec![]), Token::Space(" "), Token::Comment("# b # c")], "")]
    #[case::bracket_comments("#[[a]]#[[b]]", vec![Token::Comment("#[[a]]"), Token::Comment("#[[b]]")], "")]
    #[case::bracket_comment_nested("#[=[[[a]]]=]", vec![Token::Comment("#[=[[[a]]]=]")], "")]
    #[case::bracket_comment_multiline("#[[\na\nb\n]]", vec![Token::Comment("#[[\na\nb\n]]")], "")]
    #[case::bracket_comment_between_args(
        "a(b #[[x]] c)",
        vec![command("a", vec![Arg("b"), ArgSpace(" "), ArgComment("#[[x]]"), ArgSpace(" "), Arg("c")])],
        ""
    )]
    #[case::crlf("a()\r\nb()", vec![command("a", vec![]), Token::Newline("\r\n"), command("b", vec![])], "")]
    #[case::incomplete_identifier("a", vec![], "a")]
    #[case::incomplete_command("a(", vec![], "a(")]
    #[case::incomplete_after_command("a()\nb", vec![command("a", vec![]), Token::Newline("\n")], "b")]
    #[case::incomplete_args_after_command("a()\nb(c", vec![command("a", vec![]), Token::Newline("\n")], "b(c")]
    #[case::unterminated_quote("a(\"b)", vec![], "a(\"b)")]
    #[case::unterminated_bracket("a([=[b\n", vec![], "a([=[b\n")]
    fn test_token_mode(
        #[case] input: &str,
        #[case] expected: Vec<Token<'static>>,
        #[case] remainder: &str,
    ) {
        let stream = parse_tokens(input).unwrap();
        assert_eq!(strip_lexemes(stream.tokens), expected);
        assert_eq!(stream.remainder, remainder);
    }

    #[test]
    fn test_multiline_arguments_keep_layout_tokens() {
        let stream = parse_tokens("a(\n  b\n  c  # c\n)").unwrap();
        assert!(stream.is_complete());
        let Token::Command(cmd) = &stream.tokens[0] else {
            panic!("Expected command token");
        };
        assert_eq!(
            cmd.arguments,
            vec![
                ArgNewline("\n"),
                ArgSpace("  "),
                Arg("b"),
                ArgNewline("\n"),
                ArgSpace("  "),
                Arg("c"),
                ArgSpace("  "),
                ArgComment("# c"),
                ArgNewline("\n"),
            ]
        );
    }

    #[test]
    fn test_if_block_is_flat_in_token_mode() {
        let stream = parse_tokens("if()\n  a()\nelse()\n  b()\nendif()").unwrap();
        let identifiers: Vec<_> = stream
            .tokens
            .iter()
            .filter_map(|t| match t {
                Token::Command(c) => Some(c.identifier),
                _ => None,
            })
            .collect();
        assert_eq!(identifiers, vec!["if", "a", "else", "b", "endif"]);
    }

    #[test]
    fn test_token_text_round_trips() {
        let input = "  A ( b \"c\" [=[d]=] )  # e\n#[[f]]\n\nif(x)\r\n  g((h))\nendif()\n";
        let stream = parse_tokens(input).unwrap();
        assert!(stream.is_complete());
        assert_eq!(stream.source_text(), input);
    }

    #[test]
    fn test_ast_command_arguments() {
        let parsed = parse_ast("add_library(a \"b c\" [==[d]==] (e))").unwrap();
        assert!(parsed.remainder.is_empty());
        let [Block::Command(cmd)] = parsed.tree.blocks.as_slice() else {
            panic!("Expected a single command");
        };
        assert_eq!(cmd.identifier, "add_library");
        let args: Vec<_> = cmd.arguments.iter().map(|a| (a.kind, a.value)).collect();
        assert_eq!(
            args,
            vec![
                (ArgumentKind::Unquoted, "a"),
                (ArgumentKind::Quoted, "b c"),
                (ArgumentKind::Bracket, "d"),
                (ArgumentKind::Unquoted, "("),
                (ArgumentKind::Unquoted, "e"),
                (ArgumentKind::Unquoted, ")"),
            ]
        );
        assert_eq!(cmd.span, Span::new(0, 34));
        assert_eq!(cmd.identifier_span, Span::new(0, 11));
    }

    #[test]
    fn test_ast_blocks() {
        let text = "\
function(f x)
  foreach(i ${x})
    message(${i})
  endforeach()
endfunction()
IF(A)
  b()
ElseIf(B)
else()
  # nothing
endif()
while(c)
endwhile()
";
        let parsed = parse_ast(text).unwrap();
        assert!(parsed.remainder.is_empty());
        assert_eq!(parsed.tree.blocks.len(), 3);

        let Block::Declaration(function) = &parsed.tree.blocks[0] else {
            panic!("Expected declaration block");
        };
        assert_eq!(function.declared_name(), Some("f"));
        assert!(!function.is_macro());
        assert!(matches!(function.body.as_slice(), [Block::Loop(_)]));
        assert_eq!(function.end.identifier, "endfunction");

        let Block::Conditional(conditional) = &parsed.tree.blocks[1] else {
            panic!("Expected conditional block");
        };
        let heads: Vec<_> = conditional
            .branches
            .iter()
            .map(|b| b.declaration.identifier)
            .collect();
        assert_eq!(heads, vec!["IF", "ElseIf", "else"]);
        assert_eq!(conditional.branches[0].body.len(), 1);
        assert!(conditional.branches[2].is_else());
        assert!(conditional.branches[2].body.is_empty());

        assert!(matches!(&parsed.tree.blocks[2], Block::Loop(l) if l.declaration.is("while")));
    }

    #[test]
    fn test_keyword_prefix_is_plain_command() {
        let parsed = parse_ast("iffy()\nendif_x()\nelse_y()").unwrap();
        assert!(parsed.remainder.is_empty());
        assert_eq!(parsed.tree.blocks.len(), 3);
        assert!(
            parsed
                .tree
                .blocks
                .iter()
                .all(|b| matches!(b, Block::Command(_)))
        );
    }

    #[test]
    fn test_missing_terminator_is_structural() {
        let err = parse_ast("if(a)\n  b()\n").unwrap_err();
        let ParseError::Structural(diagnostic) = err else {
            panic!("Expected structural error, got {err:?}");
        };
        assert_eq!(diagnostic.severity, Severity::Error);
        assert!(diagnostic.message.contains("endif()"), "{}", diagnostic.message);
        assert!(!diagnostic.message.contains(" ("));
        assert_eq!(diagnostic.range.start.line, 2);
    }

    #[test]
    fn test_unterminated_argument_in_block_lists_alternatives() {
        let err = parse_ast("if(A)\n  a(\"x\nendif()\n").unwrap_err();
        let ParseError::Structural(diagnostic) = err else {
            panic!("Expected structural error, got {err:?}");
        };
        assert_eq!(
            diagnostic.message,
            "expected quoted argument, bracket argument, unquoted argument, or opening parenthesis"
        );
        assert_eq!(diagnostic.range.start, Position::new(1, 4));
    }

    #[test]
    fn test_mismatched_terminator_is_structural() {
        let err = parse_ast("function(f)\nendmacro()\n").unwrap_err();
        let diagnostic = err.to_diagnostic().unwrap();
        assert!(diagnostic.message.contains("endfunction()"), "{}", diagnostic.message);
        assert_eq!(diagnostic.range.start, Position::new(1, 0));

        let err = parse_ast("while(x)\nendforeach()\n").unwrap_err();
        assert!(matches!(err, ParseError::Structural(_)));
    }

    #[test]
    fn test_orphaned_terminator_is_structural() {
        let err = parse_ast("a()\n  endif()\n").unwrap_err();
        let diagnostic = err.to_diagnostic().unwrap();
        assert_eq!(diagnostic.message, "unexpected endif()");
        assert_eq!(diagnostic.range.start, Position::new(1, 2));
        assert_eq!(diagnostic.range.end, Position::new(1, 7));
    }

    #[test]
    fn test_lexical_incompleteness_is_not_structural() {
        let parsed = parse_ast("a()\nb(\"c").unwrap();
        assert_eq!(parsed.tree.blocks.len(), 1);
        assert_eq!(parsed.remainder, "b(\"c");

        // An incomplete keyword line has not opened a block yet.
        let parsed = parse_ast("a()\nif(\"c").unwrap();
        assert_eq!(parsed.remainder, "if(\"c");
    }

    #[test]
    fn test_paren_nesting_guard() {
        let deep = format!("a({}{})", "(".repeat(100), ")".repeat(100));
        let err = ListParser::new().with_max_depth(16).parse_tokens(&deep).unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { limit: 16, .. }));
        assert!(err.to_diagnostic().is_some());

        // Parentheses inside quotes and comments do not count.
        let quoted = format!("a(\"{}\") # {}", "(".repeat(100), "(".repeat(100));
        assert!(ListParser::new().with_max_depth(16).parse_tokens(&quoted).is_ok());
    }

    #[test]
    fn test_block_nesting_guard() {
        let deep = format!("{}{}", "if()\n".repeat(20), "endif()\n".repeat(20));
        let err = ListParser::new().with_max_depth(8).parse_ast(&deep).unwrap_err();
        assert!(matches!(
            err,
            ParseError::NestingTooDeep {
                depth: 9,
                limit: 8,
                position: Position { line: 8, character: 0 }
            }
        ));
        assert!(ListParser::new().parse_ast(&deep).is_ok());
    }

    #[test]
    fn test_cancelled_parse() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let parser = ListParser::new().with_cancellation(cancel);
        assert_eq!(parser.parse_tokens("a()"), Err(ParseError::Cancelled));
        assert_eq!(parser.parse_ast("a()").unwrap_err(), ParseError::Cancelled);
    }

    #[test]
    fn test_walk_order() {
        let parsed = parse_ast("foreach(x)\nbreak()\nendforeach()").unwrap();
        let mut kinds = Vec::new();
        parsed
            .tree
            .walk(&mut |node| {
                kinds.push(node.kind());
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(
            kinds,
            vec![
                NodeKind::ListFile,
                NodeKind::LoopBlock,
                NodeKind::LoopDeclaration,
                NodeKind::Argument,
                NodeKind::CommandInvocation,
                NodeKind::LoopEnd,
            ]
        );
    }

    #[test]
    fn test_headline_drops_detail() {
        assert_eq!(headline("expected endif() (at char 3), (line:1, col:4)"), "expected endif()");
        assert_eq!(headline("first. second"), "first");
    }
}

/// Top-level token of a token-mode parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Command invocation with its raw argument tokens
    Command(CommandToken<'a>),
    /// Run of spaces/tabs
    Space(&'a str),
    /// `\n` or `\r\n`
    Newline(&'a str),
    /// Line comment (`# ...`) or bracket comment (`#[[ ... ]]`)
    Comment(&'a str),
}

impl<'a> Token<'a> {
    /// Exact source text of the token
    pub fn text(&self) -> &'a str {
        match self {
            Token::Command(command) => command.lexeme,
            Token::Space(s) | Token::Newline(s) | Token::Comment(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandToken<'a> {
    pub identifier: &'a str,
    pub arguments: Vec<ArgumentToken<'a>>,
    /// Full invocation text, `identifier` through the closing `)`
    pub lexeme: &'a str,
}

/// Token inside a command's parentheses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentToken<'a> {
    /// Unquoted, quoted (with quotes) or bracket (with fences) argument
    Argument(&'a str),
    Space(&'a str),
    Newline(&'a str),
    Comment(&'a str),
    /// `(` opening a nested group
    OpenParen,
    /// `)` closing a nested group
    CloseParen,
}

impl<'a> ArgumentToken<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            ArgumentToken::Argument(s)
            | ArgumentToken::Space(s)
            | ArgumentToken::Newline(s)
            | ArgumentToken::Comment(s) => s,
            ArgumentToken::OpenParen => "(",
            ArgumentToken::CloseParen => ")",
        }
    }
}

/// Result of a token-mode parse anchored at offset 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStream<'a> {
    pub tokens: Vec<Token<'a>>,
    /// Unconsumed suffix of the input
    pub remainder: &'a str,
}

impl<'a> TokenStream<'a> {
    /// True when the whole input was consumed
    pub fn is_complete(&self) -> bool {
        self.remainder.is_empty()
    }

    /// Concatenated token text; equals the input when the stream is complete
    pub fn source_text(&self) -> String {
        self.tokens.iter().map(Token::text).collect()
    }
}

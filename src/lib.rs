pub mod ast;
pub mod cli;
pub mod collaborator;
pub mod diagnostics;
pub mod error;
pub mod formatter;
pub mod location;
pub mod lookup;
pub mod parser;
pub mod token;

pub use ast::{Block, CommandInvocation, ListFile, Node, NodeKind};
pub use diagnostics::{Diagnostic, Severity, diagnose};
pub use error::{ParseError, RuleFault};
pub use formatter::{FormatOptions, Formatter, format_source};
pub use location::{LineIndex, Position, Range, Span};
pub use parser::{AstParse, ListParser, parse_ast, parse_tokens};
pub use token::{ArgumentToken, CommandToken, Token, TokenStream};

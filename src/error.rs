use thiserror::Error;

use crate::diagnostics::{Diagnostic, Severity};
use crate::location::{Position, Range};

/// Failure of a parse call.
///
/// Lexical incompleteness (an unterminated quote, a missing `)`) is not an
/// error: the parse stops early and the rest is returned as the remainder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Unterminated or mismatched block pair
    #[error("{}", .0.message)]
    Structural(Diagnostic),

    #[error("nesting depth {depth} exceeds the limit of {limit}")]
    NestingTooDeep {
        depth: usize,
        limit: usize,
        position: Position,
    },

    #[error("parse cancelled")]
    Cancelled,
}

impl ParseError {
    /// Diagnostic for the editor, `None` for a cancelled parse.
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        match self {
            ParseError::Structural(diagnostic) => Some(diagnostic.clone()),
            ParseError::NestingTooDeep { position, .. } => Some(Diagnostic::new(
                Range::at(*position),
                self.to_string(),
                Severity::Error,
            )),
            ParseError::Cancelled => None,
        }
    }
}

/// Failure inside a diagnostic rule; the rule's pass is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleFault {
    #[error("{counter} counter went below zero")]
    CounterUnderflow { counter: &'static str },
}

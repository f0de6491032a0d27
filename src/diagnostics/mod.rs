//! Rule-based diagnostics over a parsed [`ListFile`].
//!
//! Every rule walks the whole tree on its own. A node is offered to a rule once
//! for each kind in its [`NodeKind::ancestry`] that the rule [`handles`](Rule::handles),
//! most specific first, so a rule written against `CommandInvocation` also sees
//! declaration, branch and end markers.

pub mod rules;

use std::panic::{self, AssertUnwindSafe};

use tokio_util::sync::CancellationToken;

use crate::ast::{ListFile, Node, NodeKind};
use crate::error::RuleFault;
use crate::location::{LineIndex, Range, Span};

pub use rules::{
    DuplicateBranch, ModernizeLowercaseCommands, ModernizePreferTargetCmds, OrphanedLoopCommand,
    RedundantAssignment, ReturnInMacro,
};

/// Source tag attached to every diagnostic this crate produces
pub const SOURCE: &str = "cmakels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: Range,
    pub message: String,
    pub severity: Severity,
    pub source: &'static str,
}

impl Diagnostic {
    pub fn new(range: Range, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            range,
            message: message.into(),
            severity,
            source: SOURCE,
        }
    }
}

/// A single diagnostic pass.
///
/// A fresh instance is used for every pass, so counters kept on `self` start at zero.
pub trait Rule {
    fn name(&self) -> &'static str;

    /// Node kinds this rule wants to see
    fn handles(&self) -> &'static [NodeKind];

    /// Called with `kind` set to the ancestry entry being dispatched, which may be
    /// less specific than `node.kind()`.
    fn visit(
        &mut self,
        kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault>;
}

/// Collects the findings of one rule pass
pub struct RuleContext<'i> {
    index: &'i LineIndex<'i>,
    diagnostics: Vec<Diagnostic>,
}

impl<'i> RuleContext<'i> {
    fn new(index: &'i LineIndex<'i>) -> Self {
        Self {
            index,
            diagnostics: Vec::new(),
        }
    }

    pub fn report(&mut self, span: Span, message: &str, severity: Severity) {
        let range = self.index.range(span);
        self.diagnostics
            .push(Diagnostic::new(range, message, severity));
    }

    fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Built-in rules in their fixed run order
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(DuplicateBranch),
        Box::new(ModernizeLowercaseCommands),
        Box::new(ModernizePreferTargetCmds),
        Box::new(OrphanedLoopCommand::default()),
        Box::new(RedundantAssignment),
        Box::new(ReturnInMacro::default()),
    ]
}

/// Runs the built-in rules over `tree`, which must have been parsed from `text`.
pub fn diagnose(tree: &ListFile<'_>, text: &str) -> Vec<Diagnostic> {
    diagnose_with(tree, text, default_rules(), None).unwrap_or_default()
}

/// Runs `rules` in order and concatenates their findings.
///
/// A rule that faults or panics loses its whole pass; the other rules still run.
/// Returns `None` if `cancel` fires before all passes finish.
pub fn diagnose_with(
    tree: &ListFile<'_>,
    text: &str,
    rules: Vec<Box<dyn Rule>>,
    cancel: Option<&CancellationToken>,
) -> Option<Vec<Diagnostic>> {
    let index = LineIndex::new(text);
    let mut diagnostics = Vec::new();

    for mut rule in rules {
        match run_pass(rule.as_mut(), tree, &index, cancel) {
            Ok(found) => {
                tracing::trace!(rule = rule.name(), count = found.len(), "rule pass finished");
                diagnostics.extend(found);
            }
            Err(PassError::Cancelled) => {
                tracing::debug!(rule = rule.name(), "diagnostics cancelled");
                return None;
            }
            Err(PassError::Fault(fault)) => {
                tracing::warn!(rule = rule.name(), %fault, "rule pass skipped");
            }
            Err(PassError::Panicked) => {
                tracing::warn!(rule = rule.name(), "rule pass panicked and was skipped");
            }
        }
    }

    Some(diagnostics)
}

enum PassError {
    Cancelled,
    Fault(RuleFault),
    Panicked,
}

fn run_pass(
    rule: &mut dyn Rule,
    tree: &ListFile<'_>,
    index: &LineIndex<'_>,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<Diagnostic>, PassError> {
    let mut cx = RuleContext::new(index);
    let handles = rule.handles();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        tree.walk(&mut |node| {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(PassError::Cancelled);
            }
            for &kind in node.kind().ancestry() {
                if handles.contains(&kind) {
                    rule.visit(kind, node, &mut cx).map_err(PassError::Fault)?;
                }
            }
            Ok(())
        })
    }));

    match outcome {
        Ok(result) => result.map(|()| cx.into_diagnostics()),
        Err(_) => Err(PassError::Panicked),
    }
}

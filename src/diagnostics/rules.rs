use crate::ast::{Branch, Node, NodeKind};
use crate::error::RuleFault;

use super::{Rule, RuleContext, Severity};

const DIRECTORY_COMMANDS: &[&str] = &[
    "add_definitions",
    "add_compile_options",
    "add_compile_definitions",
    "include_directories",
    "link_libraries",
];

/// `break()`/`continue()` outside of any loop
#[derive(Debug, Default)]
pub struct OrphanedLoopCommand {
    loops: usize,
}

impl Rule for OrphanedLoopCommand {
    fn name(&self) -> &'static str {
        "OrphanedLoopCommand"
    }

    fn handles(&self) -> &'static [NodeKind] {
        &[
            NodeKind::LoopDeclaration,
            NodeKind::LoopEnd,
            NodeKind::CommandInvocation,
        ]
    }

    fn visit(
        &mut self,
        kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault> {
        let Some(invocation) = node.as_invocation() else {
            return Ok(());
        };

        match kind {
            NodeKind::LoopDeclaration => self.loops += 1,
            NodeKind::LoopEnd => {
                self.loops = self
                    .loops
                    .checked_sub(1)
                    .ok_or(RuleFault::CounterUnderflow { counter: "loop" })?;
            }
            _ if self.loops == 0 && (invocation.is("break") || invocation.is("continue")) => {
                cx.report(
                    invocation.identifier_span,
                    "Orphaned loop command: Break or continue without parent loop",
                    Severity::Error,
                );
            }
            _ => {}
        }
        Ok(())
    }
}

/// `return()` inside a macro body, where it returns from the caller instead
#[derive(Debug, Default)]
pub struct ReturnInMacro {
    macros: usize,
}

impl Rule for ReturnInMacro {
    fn name(&self) -> &'static str {
        "ReturnInMacro"
    }

    fn handles(&self) -> &'static [NodeKind] {
        &[
            NodeKind::CommandDeclarationStart,
            NodeKind::CommandDeclarationEnd,
            NodeKind::CommandInvocation,
        ]
    }

    fn visit(
        &mut self,
        kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault> {
        let Some(invocation) = node.as_invocation() else {
            return Ok(());
        };

        match kind {
            NodeKind::CommandDeclarationStart if invocation.is("macro") => self.macros += 1,
            NodeKind::CommandDeclarationEnd if invocation.is("endmacro") => {
                self.macros = self
                    .macros
                    .checked_sub(1)
                    .ok_or(RuleFault::CounterUnderflow { counter: "macro" })?;
            }
            NodeKind::CommandInvocation if self.macros > 0 && invocation.is("return") => {
                cx.report(
                    invocation.identifier_span,
                    "Return in macro: Prefer message(FATAL_ERROR ...) to halt execution in macro",
                    Severity::Warning,
                );
            }
            _ => {}
        }
        Ok(())
    }
}

/// `set(A ${A})`
#[derive(Debug, Default)]
pub struct RedundantAssignment;

impl Rule for RedundantAssignment {
    fn name(&self) -> &'static str {
        "RedundantAssignment"
    }

    fn handles(&self) -> &'static [NodeKind] {
        &[NodeKind::CommandInvocation]
    }

    fn visit(
        &mut self,
        _kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault> {
        let Some(invocation) = node.as_invocation() else {
            return Ok(());
        };
        if !invocation.is("set") {
            return Ok(());
        }
        let [lhs, rhs] = invocation.arguments.as_slice() else {
            return Ok(());
        };
        // More than one expansion is a real computation.
        if rhs.value.matches('$').count() != 1 {
            return Ok(());
        }

        let source = rhs
            .value
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'));
        if source == Some(lhs.value) {
            cx.report(
                invocation.identifier_span,
                "Redundant assignment: Destination and source variable names match",
                Severity::Warning,
            );
        }
        Ok(())
    }
}

/// `if`/`elseif` branches repeating an earlier condition
#[derive(Debug, Default)]
pub struct DuplicateBranch;

impl DuplicateBranch {
    fn same_condition(a: &Branch<'_>, b: &Branch<'_>) -> bool {
        let (a, b) = (&a.declaration.arguments, &b.declaration.arguments);
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.value == y.value)
    }
}

impl Rule for DuplicateBranch {
    fn name(&self) -> &'static str {
        "DuplicateBranch"
    }

    fn handles(&self) -> &'static [NodeKind] {
        &[NodeKind::ConditionalBlock]
    }

    fn visit(
        &mut self,
        _kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault> {
        let Node::ConditionalBlock(block) = node else {
            return Ok(());
        };

        let conditions: Vec<&Branch<'_>> =
            block.branches.iter().filter(|b| !b.is_else()).collect();
        for (i, earlier) in conditions.iter().enumerate() {
            if let Some(duplicate) = conditions[i + 1..]
                .iter()
                .find(|later| Self::same_condition(earlier, later))
            {
                cx.report(
                    duplicate.declaration.identifier_span,
                    "Duplicate conditional branch: Condition matches a previous branch",
                    Severity::Warning,
                );
                break;
            }
        }
        Ok(())
    }
}

/// Upper-case command names
#[derive(Debug, Default)]
pub struct ModernizeLowercaseCommands;

impl Rule for ModernizeLowercaseCommands {
    fn name(&self) -> &'static str {
        "ModernizeLowercaseCommands"
    }

    fn handles(&self) -> &'static [NodeKind] {
        &[NodeKind::CommandInvocation]
    }

    fn visit(
        &mut self,
        _kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault> {
        let Some(invocation) = node.as_invocation() else {
            return Ok(());
        };
        let identifier = invocation.identifier;
        let upper = identifier.chars().any(|c| c.is_ascii_alphabetic())
            && !identifier.chars().any(|c| c.is_ascii_lowercase());

        if upper {
            cx.report(
                invocation.identifier_span,
                "Modernize: prefer lowercase commands",
                Severity::Information,
            );
        }
        Ok(())
    }
}

/// Directory-scoped commands with a target-scoped replacement
#[derive(Debug, Default)]
pub struct ModernizePreferTargetCmds;

impl Rule for ModernizePreferTargetCmds {
    fn name(&self) -> &'static str {
        "ModernizePreferTargetCmds"
    }

    fn handles(&self) -> &'static [NodeKind] {
        &[NodeKind::CommandInvocation]
    }

    fn visit(
        &mut self,
        _kind: NodeKind,
        node: Node<'_, '_>,
        cx: &mut RuleContext<'_>,
    ) -> Result<(), RuleFault> {
        let Some(invocation) = node.as_invocation() else {
            return Ok(());
        };

        if DIRECTORY_COMMANDS.contains(&invocation.name().as_str()) {
            cx.report(
                invocation.identifier_span,
                "Modernize: prefer target-based commands over directory-based commands",
                Severity::Information,
            );
        }
        Ok(())
    }
}

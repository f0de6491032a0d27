use crate::location::Span;

/// Whole parsed list file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListFile<'a> {
    pub blocks: Vec<Block<'a>>,
    pub span: Span,
}

/// Top-level or nested statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    Command(CommandInvocation<'a>),
    Declaration(CommandDeclarationBlock<'a>),
    Conditional(ConditionalBlock<'a>),
    Loop(LoopBlock<'a>),
}

impl Block<'_> {
    pub fn span(&self) -> Span {
        match self {
            Block::Command(command) => command.span,
            Block::Declaration(block) => block.span,
            Block::Conditional(block) => block.span,
            Block::Loop(block) => block.span,
        }
    }
}

/// `identifier(arguments...)`. Also the shape of every block declaration and end marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation<'a> {
    /// Identifier with its source casing
    pub identifier: &'a str,
    pub arguments: Vec<Argument<'a>>,
    /// From the identifier through the closing `)`
    pub span: Span,
    pub identifier_span: Span,
}

impl CommandInvocation<'_> {
    /// Case-folded identifier, used for every keyword comparison
    pub fn name(&self) -> String {
        self.identifier.to_ascii_lowercase()
    }

    pub fn is(&self, name: &str) -> bool {
        self.identifier.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    Unquoted,
    Quoted,
    Bracket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument<'a> {
    pub kind: ArgumentKind,
    /// Raw text without quotes or bracket fences. Escapes are left as written.
    /// Parentheses of a nested group appear as unquoted `(` and `)` arguments.
    pub value: &'a str,
    pub span: Span,
}

/// `function()`/`macro()` through the matching end command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDeclarationBlock<'a> {
    pub declaration: CommandInvocation<'a>,
    pub body: Vec<Block<'a>>,
    pub end: CommandInvocation<'a>,
    pub span: Span,
}

impl CommandDeclarationBlock<'_> {
    pub fn is_macro(&self) -> bool {
        self.declaration.is("macro")
    }

    /// First declaration argument: the name of the declared command
    pub fn declared_name(&self) -> Option<&str> {
        self.declaration.arguments.first().map(|arg| arg.value)
    }
}

/// `if()` / `elseif()`* / `else()`? / `endif()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalBlock<'a> {
    pub branches: Vec<Branch<'a>>,
    pub end: CommandInvocation<'a>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch<'a> {
    pub declaration: CommandInvocation<'a>,
    pub body: Vec<Block<'a>>,
    pub span: Span,
}

impl Branch<'_> {
    pub fn is_else(&self) -> bool {
        self.declaration.is("else")
    }
}

/// `foreach()`/`while()` through the matching end command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBlock<'a> {
    pub declaration: CommandInvocation<'a>,
    pub body: Vec<Block<'a>>,
    pub end: CommandInvocation<'a>,
    pub span: Span,
}

/// Tag of every visitable node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    ListFile,
    CommandInvocation,
    Argument,
    CommandDeclarationBlock,
    CommandDeclarationStart,
    CommandDeclarationEnd,
    ConditionalBlock,
    ConditionalBranch,
    ConditionalBranchDeclaration,
    ConditionalEnd,
    LoopBlock,
    LoopDeclaration,
    LoopEnd,
}

impl NodeKind {
    /// The kind itself followed by its semantic supertypes, most specific first.
    pub fn ancestry(self) -> &'static [NodeKind] {
        const INVOCATION: NodeKind = NodeKind::CommandInvocation;
        match self {
            Self::ListFile => &[Self::ListFile],
            Self::CommandInvocation => &[INVOCATION],
            Self::Argument => &[Self::Argument],
            Self::CommandDeclarationBlock => &[Self::CommandDeclarationBlock],
            Self::CommandDeclarationStart => &[Self::CommandDeclarationStart, INVOCATION],
            Self::CommandDeclarationEnd => &[Self::CommandDeclarationEnd, INVOCATION],
            Self::ConditionalBlock => &[Self::ConditionalBlock],
            Self::ConditionalBranch => &[Self::ConditionalBranch],
            Self::ConditionalBranchDeclaration => &[Self::ConditionalBranchDeclaration, INVOCATION],
            Self::ConditionalEnd => &[Self::ConditionalEnd, INVOCATION],
            Self::LoopBlock => &[Self::LoopBlock],
            Self::LoopDeclaration => &[Self::LoopDeclaration, INVOCATION],
            Self::LoopEnd => &[Self::LoopEnd, INVOCATION],
        }
    }
}

/// Borrowed view of one node during traversal
#[derive(Debug, Clone, Copy)]
pub enum Node<'n, 'a> {
    ListFile(&'n ListFile<'a>),
    /// Any invocation-shaped node; the kind tells which role it plays
    Invocation(NodeKind, &'n CommandInvocation<'a>),
    Argument(&'n Argument<'a>),
    DeclarationBlock(&'n CommandDeclarationBlock<'a>),
    ConditionalBlock(&'n ConditionalBlock<'a>),
    Branch(&'n Branch<'a>),
    LoopBlock(&'n LoopBlock<'a>),
}

impl<'n, 'a> Node<'n, 'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::ListFile(_) => NodeKind::ListFile,
            Node::Invocation(kind, _) => *kind,
            Node::Argument(_) => NodeKind::Argument,
            Node::DeclarationBlock(_) => NodeKind::CommandDeclarationBlock,
            Node::ConditionalBlock(_) => NodeKind::ConditionalBlock,
            Node::Branch(_) => NodeKind::ConditionalBranch,
            Node::LoopBlock(_) => NodeKind::LoopBlock,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Node::ListFile(file) => file.span,
            Node::Invocation(_, invocation) => invocation.span,
            Node::Argument(argument) => argument.span,
            Node::DeclarationBlock(block) => block.span,
            Node::ConditionalBlock(block) => block.span,
            Node::Branch(branch) => branch.span,
            Node::LoopBlock(block) => block.span,
        }
    }

    pub fn as_invocation(&self) -> Option<&'n CommandInvocation<'a>> {
        match *self {
            Node::Invocation(_, invocation) => Some(invocation),
            _ => None,
        }
    }

    /// Pre-order depth-first walk. A block visits itself, its declaration,
    /// its body, and finally its end marker. `f` stops the walk by returning `Err`.
    pub fn walk<E>(self, f: &mut impl FnMut(Node<'n, 'a>) -> Result<(), E>) -> Result<(), E> {
        f(self)?;
        match self {
            Node::ListFile(file) => walk_blocks(&file.blocks, f),
            Node::Invocation(_, invocation) => invocation
                .arguments
                .iter()
                .try_for_each(|argument| f(Node::Argument(argument))),
            Node::Argument(_) => Ok(()),
            Node::DeclarationBlock(block) => {
                Node::Invocation(NodeKind::CommandDeclarationStart, &block.declaration).walk(f)?;
                walk_blocks(&block.body, f)?;
                Node::Invocation(NodeKind::CommandDeclarationEnd, &block.end).walk(f)
            }
            Node::ConditionalBlock(block) => {
                for branch in &block.branches {
                    Node::Branch(branch).walk(f)?;
                }
                Node::Invocation(NodeKind::ConditionalEnd, &block.end).walk(f)
            }
            Node::Branch(branch) => {
                Node::Invocation(NodeKind::ConditionalBranchDeclaration, &branch.declaration)
                    .walk(f)?;
                walk_blocks(&branch.body, f)
            }
            Node::LoopBlock(block) => {
                Node::Invocation(NodeKind::LoopDeclaration, &block.declaration).walk(f)?;
                walk_blocks(&block.body, f)?;
                Node::Invocation(NodeKind::LoopEnd, &block.end).walk(f)
            }
        }
    }
}

impl<'n, 'a> From<&'n Block<'a>> for Node<'n, 'a> {
    fn from(block: &'n Block<'a>) -> Self {
        match block {
            Block::Command(command) => Node::Invocation(NodeKind::CommandInvocation, command),
            Block::Declaration(block) => Node::DeclarationBlock(block),
            Block::Conditional(block) => Node::ConditionalBlock(block),
            Block::Loop(block) => Node::LoopBlock(block),
        }
    }
}

fn walk_blocks<'n, 'a, E>(
    blocks: &'n [Block<'a>],
    f: &mut impl FnMut(Node<'n, 'a>) -> Result<(), E>,
) -> Result<(), E> {
    blocks.iter().try_for_each(|block| Node::from(block).walk(f))
}

impl<'a> ListFile<'a> {
    /// Walks the whole tree, see [`Node::walk`].
    pub fn walk<'n, E>(
        &'n self,
        f: &mut impl FnMut(Node<'n, 'a>) -> Result<(), E>,
    ) -> Result<(), E> {
        Node::ListFile(self).walk(f)
    }
}

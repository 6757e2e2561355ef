//! Abstract Syntax Tree (AST) types for JavaScript
//!
//! The node shapes follow ESTree naming, reduced to the subset the compiler
//! lowers to bytecode.

mod expr;
mod stmt;

pub use expr::*;
pub use stmt::*;

use crate::error::SourceLocation;

/// Source range of a node; `end` is just past its last token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl Span {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }
}

/// A parsed script
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Variable declaration kind
///
/// All three kinds are function-scoped in this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

/// One `name = init` in a declaration. Without an initializer the
/// statement does nothing at runtime; the name is bound on function entry.
#[derive(Debug, Clone)]
pub struct VariableDeclarator {
    pub id: Identifier,
    pub init: Option<Expression>,
    pub span: Span,
}

/// `var x = 1, y = 2`
#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
    pub span: Span,
}

/// A function declaration or expression
#[derive(Debug, Clone)]
pub struct Function {
    /// Absent for anonymous function expressions
    pub id: Option<Identifier>,
    pub params: Vec<Identifier>,
    /// Trailing `...name`, bound to an array of the remaining arguments
    pub rest: Option<Identifier>,
    pub body: Vec<Statement>,
    pub span: Span,
}

impl Function {
    /// Name used in stack traces and `Function.prototype.name`
    pub fn display_name(&self) -> &str {
        self.id.as_ref().map(|id| id.name.as_str()).unwrap_or("")
    }
}

//! Statement nodes

use super::*;

#[derive(Debug, Clone)]
pub enum Statement {
    Block(BlockStatement),
    /// A lone `;`, also the body of `with ({});`
    Empty(Span),
    Expression(ExpressionStatement),
    If(Box<IfStatement>),
    While(Box<WhileStatement>),
    DoWhile(Box<DoWhileStatement>),
    For(Box<ForStatement>),
    Break(Span),
    Continue(Span),
    Return(ReturnStatement),
    /// `with (object) body`: pushes an object environment for `body`
    With(Box<WithStatement>),
    /// `var`, `let` and `const`, all function-scoped
    VariableDeclaration(VariableDeclaration),
    /// Compiled where its enclosing function starts, not where it appears
    FunctionDeclaration(Box<Function>),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Block(b) => b.span,
            Statement::Empty(span) | Statement::Break(span) | Statement::Continue(span) => *span,
            Statement::Expression(e) => e.span,
            Statement::If(i) => i.span,
            Statement::While(w) => w.span,
            Statement::DoWhile(d) => d.span,
            Statement::For(f) => f.span,
            Statement::Return(r) => r.span,
            Statement::With(w) => w.span,
            Statement::VariableDeclaration(v) => v.span,
            Statement::FunctionDeclaration(f) => f.span,
        }
    }

    /// Statements directly nested in this one. Function bodies are not entered,
    /// so hoisting walks stay inside a single function.
    pub fn nested(&self) -> Vec<&Statement> {
        match self {
            Statement::Block(block) => block.body.iter().collect(),
            Statement::If(if_stmt) => std::iter::once(&if_stmt.consequent)
                .chain(if_stmt.alternate.as_ref())
                .collect(),
            Statement::While(w) => vec![&w.body],
            Statement::DoWhile(d) => vec![&d.body],
            Statement::For(f) => vec![&f.body],
            Statement::With(w) => vec![&w.body],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockStatement {
    pub body: Vec<Statement>,
    pub span: Span,
}

/// At script level the value becomes the completion value
#[derive(Debug, Clone)]
pub struct ExpressionStatement {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Statement,
    pub alternate: Option<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Statement,
    pub span: Span,
}

/// `do body while (test)`; `continue` jumps to the test
#[derive(Debug, Clone)]
pub struct DoWhileStatement {
    pub body: Statement,
    pub test: Expression,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Declaration(VariableDeclaration),
    Expression(Expression),
}

/// `for (init; test; update) body`, each header part optional
#[derive(Debug, Clone)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Statement,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ReturnStatement {
    pub argument: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct WithStatement {
    pub object: Expression,
    pub body: Statement,
    pub span: Span,
}

//! JavaScript parser
//!
//! This module implements a recursive descent parser for the JavaScript
//! subset the engine runs. It produces an AST from a stream of tokens.

use crate::ast::*;
use crate::error::{Error, Result, SourceLocation};
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use crate::runtime::value::parse_radix_digits;

/// Parser state flags
#[derive(Debug, Clone, Copy, Default)]
struct ParserFlags {
    /// Inside a function
    in_function: bool,
    /// Inside a loop (for, while, etc.)
    in_loop: bool,
}

/// A recursive descent parser for JavaScript
pub struct Parser<'src> {
    /// Source code (kept for error messages)
    source: &'src str,
    /// Tokens to parse
    tokens: Vec<Token<'src>>,
    /// Current position in tokens
    pos: usize,
    /// Parser state flags
    flags: ParserFlags,
}

impl<'src> Parser<'src> {
    /// Create a new parser from source code
    pub fn new(source: &'src str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            flags: ParserFlags::default(),
        })
    }

    /// Parse the source as a complete program
    pub fn parse_program(&mut self) -> Result<Program> {
        let start = self.location();
        let mut body = Vec::new();

        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }

        Ok(Program {
            body,
            span: Span::new(start, self.location()),
        })
    }

    /// Parse a single expression, requiring the whole input to be consumed
    pub fn parse_expression(&mut self) -> Result<Expression> {
        let expr = self.parse_sequence_expression()?;
        if !self.is_eof() {
            let loc = self.location();
            return Err(self.error(format!("Unexpected token {:?}", self.peek()), loc));
        }
        Ok(expr)
    }

    // ========== Token Access ==========

    fn current(&self) -> &Token<'src> {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn is_eof(&self) -> bool {
        self.peek() == TokenKind::Eof
    }

    fn location(&self) -> SourceLocation {
        self.current().location
    }

    /// Location just past the previous token, used to close spans
    fn end_location(&self) -> SourceLocation {
        if self.pos == 0 {
            return self.location();
        }
        let prev = &self.tokens[self.pos - 1];
        SourceLocation {
            line: prev.location.line,
            column: prev.location.column + prev.text.chars().count() as u32,
            offset: prev.location.offset + prev.text.len(),
        }
    }

    fn span_from(&self, start: SourceLocation) -> Span {
        Span::new(start, self.end_location())
    }

    fn error(&self, message: impl Into<String>, location: SourceLocation) -> Error {
        Error::parse_error(message, location).with_source_context(self.source)
    }

    fn advance(&mut self) -> &Token<'src> {
        let token = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token<'src>> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            let loc = self.location();
            Err(self.error(
                format!("Expected {:?}, found {:?}", kind, self.peek()),
                loc,
            ))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<&Token<'src>> {
        if self.peek() == TokenKind::Keyword(keyword) {
            Ok(self.advance())
        } else {
            let loc = self.location();
            Err(self.error(
                format!("Expected '{}', found {:?}", keyword, self.peek()),
                loc,
            ))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Whether a line break separates the previous token from the current one
    fn newline_before(&self) -> bool {
        self.pos > 0 && self.tokens[self.pos - 1].location.line < self.current().location.line
    }

    fn consume_semicolon(&mut self) -> bool {
        if self.consume(TokenKind::Semicolon) {
            return true;
        }

        // ASI: newline, }, or EOF
        self.peek() == TokenKind::RightBrace || self.is_eof() || self.newline_before()
    }

    fn expect_semicolon(&mut self) -> Result<()> {
        if self.consume_semicolon() {
            Ok(())
        } else {
            let loc = self.location();
            Err(self.error(format!("Unexpected token {:?}", self.peek()), loc))
        }
    }

    // ========== Statements ==========

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek() {
            TokenKind::LeftBrace => self.parse_block_statement().map(Statement::Block),
            TokenKind::Semicolon => {
                let loc = self.location();
                self.advance();
                Ok(Statement::Empty(self.span_from(loc)))
            }
            TokenKind::Keyword(Keyword::Var) => self
                .parse_variable_declaration(VariableKind::Var)
                .map(Statement::VariableDeclaration),
            TokenKind::Keyword(Keyword::Let) => self
                .parse_variable_declaration(VariableKind::Let)
                .map(Statement::VariableDeclaration),
            TokenKind::Keyword(Keyword::Const) => self
                .parse_variable_declaration(VariableKind::Const)
                .map(Statement::VariableDeclaration),
            TokenKind::Keyword(Keyword::Function) => {
                let func = self.parse_function(true)?;
                Ok(Statement::FunctionDeclaration(Box::new(func)))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Break) => self.parse_jump_statement(Keyword::Break),
            TokenKind::Keyword(Keyword::Continue) => self.parse_jump_statement(Keyword::Continue),
            TokenKind::Keyword(Keyword::Return) => self.parse_return_statement(),
            TokenKind::Keyword(Keyword::With) => self.parse_with_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block_statement(&mut self) -> Result<BlockStatement> {
        let start = self.location();
        self.expect(TokenKind::LeftBrace)?;

        let mut body = Vec::new();
        while !self.consume(TokenKind::RightBrace) {
            if self.is_eof() {
                let loc = self.location();
                return Err(self.error("Unexpected end of input", loc));
            }
            body.push(self.parse_statement()?);
        }

        Ok(BlockStatement {
            body,
            span: self.span_from(start),
        })
    }

    fn parse_variable_declaration(&mut self, kind: VariableKind) -> Result<VariableDeclaration> {
        let decl = self.parse_variable_declaration_no_semi(kind)?;
        self.expect_semicolon()?;
        Ok(decl)
    }

    fn parse_variable_declaration_no_semi(
        &mut self,
        kind: VariableKind,
    ) -> Result<VariableDeclaration> {
        let start = self.location();
        self.advance(); // var/let/const

        let mut declarations = Vec::new();
        loop {
            let decl_start = self.location();
            let id = self.parse_identifier()?;
            let init = if self.consume(TokenKind::Equals) {
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };

            declarations.push(VariableDeclarator {
                id,
                init,
                span: self.span_from(decl_start),
            });

            if !self.consume(TokenKind::Comma) {
                break;
            }
        }

        Ok(VariableDeclaration {
            kind,
            declarations,
            span: self.span_from(start),
        })
    }

    fn parse_function(&mut self, require_name: bool) -> Result<Function> {
        let start = self.location();
        self.expect_keyword(Keyword::Function)?;

        let id = if self.peek() == TokenKind::Identifier {
            Some(self.parse_identifier()?)
        } else if require_name {
            let loc = self.location();
            return Err(self.error("Function declaration requires a name", loc));
        } else {
            None
        };

        self.expect(TokenKind::LeftParen)?;
        let (params, rest) = self.parse_function_params()?;
        self.expect(TokenKind::RightParen)?;

        let old_flags = self.flags;
        self.flags.in_function = true;
        self.flags.in_loop = false;
        let body = self.parse_block_statement();
        self.flags = old_flags;

        Ok(Function {
            id,
            params,
            rest,
            body: body?.body,
            span: self.span_from(start),
        })
    }

    fn parse_function_params(&mut self) -> Result<(Vec<Identifier>, Option<Identifier>)> {
        let mut params = Vec::new();
        let mut rest = None;

        while self.peek() != TokenKind::RightParen {
            if self.consume(TokenKind::DotDotDot) {
                rest = Some(self.parse_identifier()?);
                if self.peek() != TokenKind::RightParen {
                    let loc = self.location();
                    return Err(self.error("Rest parameter must be last formal parameter", loc));
                }
                break;
            }

            params.push(self.parse_identifier()?);

            if !self.consume(TokenKind::Comma) {
                break;
            }
        }

        Ok((params, rest))
    }

    fn parse_if_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::If)?;
        self.expect(TokenKind::LeftParen)?;
        let test = self.parse_sequence_expression()?;
        self.expect(TokenKind::RightParen)?;

        let consequent = self.parse_statement()?;

        let alternate = if self.consume(TokenKind::Keyword(Keyword::Else)) {
            Some(self.parse_statement()?)
        } else {
            None
        };

        Ok(Statement::If(Box::new(IfStatement {
            test,
            consequent,
            alternate,
            span: self.span_from(start),
        })))
    }

    fn parse_loop_body(&mut self) -> Result<Statement> {
        let old_in_loop = self.flags.in_loop;
        self.flags.in_loop = true;
        let body = self.parse_statement();
        self.flags.in_loop = old_in_loop;
        body
    }

    fn parse_while_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::While)?;
        self.expect(TokenKind::LeftParen)?;
        let test = self.parse_sequence_expression()?;
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_loop_body()?;

        Ok(Statement::While(Box::new(WhileStatement {
            test,
            body,
            span: self.span_from(start),
        })))
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_keyword(Keyword::While)?;
        self.expect(TokenKind::LeftParen)?;
        let test = self.parse_sequence_expression()?;
        self.expect(TokenKind::RightParen)?;
        self.consume(TokenKind::Semicolon);

        Ok(Statement::DoWhile(Box::new(DoWhileStatement {
            body,
            test,
            span: self.span_from(start),
        })))
    }

    fn parse_for_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::For)?;
        self.expect(TokenKind::LeftParen)?;

        let init = match self.peek() {
            TokenKind::Semicolon => None,
            TokenKind::Keyword(Keyword::Var) => Some(ForInit::Declaration(
                self.parse_variable_declaration_no_semi(VariableKind::Var)?,
            )),
            TokenKind::Keyword(Keyword::Let) => Some(ForInit::Declaration(
                self.parse_variable_declaration_no_semi(VariableKind::Let)?,
            )),
            TokenKind::Keyword(Keyword::Const) => Some(ForInit::Declaration(
                self.parse_variable_declaration_no_semi(VariableKind::Const)?,
            )),
            _ => Some(ForInit::Expression(self.parse_sequence_expression()?)),
        };
        self.expect(TokenKind::Semicolon)?;

        let test = if self.peek() != TokenKind::Semicolon {
            Some(self.parse_sequence_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;

        let update = if self.peek() != TokenKind::RightParen {
            Some(self.parse_sequence_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::RightParen)?;

        let body = self.parse_loop_body()?;

        Ok(Statement::For(Box::new(ForStatement {
            init,
            test,
            update,
            body,
            span: self.span_from(start),
        })))
    }

    fn parse_jump_statement(&mut self, keyword: Keyword) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(keyword)?;
        self.expect_semicolon()?;

        if !self.flags.in_loop {
            return Err(self.error(format!("Illegal {} statement", keyword), start));
        }

        let span = self.span_from(start);
        Ok(match keyword {
            Keyword::Break => Statement::Break(span),
            _ => Statement::Continue(span),
        })
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::Return)?;

        if !self.flags.in_function {
            return Err(self.error("Illegal return statement", start));
        }

        let argument = if self.consume_semicolon() {
            None
        } else {
            let expr = self.parse_sequence_expression()?;
            self.expect_semicolon()?;
            Some(expr)
        };

        Ok(Statement::Return(ReturnStatement {
            argument,
            span: self.span_from(start),
        }))
    }

    fn parse_with_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        self.expect_keyword(Keyword::With)?;
        self.expect(TokenKind::LeftParen)?;
        let object = self.parse_sequence_expression()?;
        self.expect(TokenKind::RightParen)?;
        let body = self.parse_statement()?;

        Ok(Statement::With(Box::new(WithStatement {
            object,
            body,
            span: self.span_from(start),
        })))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let start = self.location();
        let expression = self.parse_sequence_expression()?;
        self.expect_semicolon()?;

        Ok(Statement::Expression(ExpressionStatement {
            expression,
            span: self.span_from(start),
        }))
    }

    // ========== Expressions ==========

    fn parse_sequence_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let expr = self.parse_assignment_expression()?;

        if self.peek() != TokenKind::Comma {
            return Ok(expr);
        }

        let mut expressions = vec![expr];
        while self.consume(TokenKind::Comma) {
            expressions.push(self.parse_assignment_expression()?);
        }
        Ok(Expression::Sequence(Box::new(SequenceExpression {
            expressions,
            span: self.span_from(start),
        })))
    }

    fn parse_assignment_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let left = self.parse_conditional_expression()?;

        if !self.peek().is_assignment_operator() {
            return Ok(left);
        }

        let operator = self.parse_assignment_operator()?;
        if !left.is_valid_assignment_target() {
            return Err(self.error("Invalid left-hand side in assignment", start));
        }
        let right = self.parse_assignment_expression()?;

        Ok(Expression::Assignment(Box::new(AssignmentExpression {
            operator,
            left,
            right,
            span: self.span_from(start),
        })))
    }

    fn parse_assignment_operator(&mut self) -> Result<AssignmentOperator> {
        let op = match self.peek() {
            TokenKind::Equals => AssignmentOperator::Assign,
            TokenKind::PlusEquals => AssignmentOperator::AddAssign,
            TokenKind::MinusEquals => AssignmentOperator::SubAssign,
            TokenKind::StarEquals => AssignmentOperator::MulAssign,
            TokenKind::SlashEquals => AssignmentOperator::DivAssign,
            TokenKind::PercentEquals => AssignmentOperator::ModAssign,
            _ => {
                let loc = self.location();
                return Err(self.error("Expected assignment operator", loc));
            }
        };
        self.advance();
        Ok(op)
    }

    fn parse_conditional_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let test = self.parse_binary_expression(0)?;

        if !self.consume(TokenKind::Question) {
            return Ok(test);
        }

        let consequent = self.parse_assignment_expression()?;
        self.expect(TokenKind::Colon)?;
        let alternate = self.parse_assignment_expression()?;

        Ok(Expression::Conditional(Box::new(ConditionalExpression {
            test,
            consequent,
            alternate,
            span: self.span_from(start),
        })))
    }

    /// Precedence climbing over binary and logical operators
    fn parse_binary_expression(&mut self, min_prec: u8) -> Result<Expression> {
        let start = self.location();
        let mut left = self.parse_unary_expression()?;

        loop {
            let prec = self.binary_precedence();
            if prec == 0 || prec < min_prec {
                break;
            }

            let kind = self.peek();
            self.advance();
            let right = self.parse_binary_expression(prec + 1)?;
            let span = self.span_from(start);

            left = match kind {
                TokenKind::AmpersandAmpersand | TokenKind::PipePipe => {
                    let operator = if kind == TokenKind::AmpersandAmpersand {
                        LogicalOperator::And
                    } else {
                        LogicalOperator::Or
                    };
                    Expression::Logical(Box::new(LogicalExpression {
                        operator,
                        left,
                        right,
                        span,
                    }))
                }
                _ => Expression::Binary(Box::new(BinaryExpression {
                    operator: Self::binary_operator(kind)
                        .ok_or_else(|| self.error("Expected binary operator", start))?,
                    left,
                    right,
                    span,
                })),
            };
        }

        Ok(left)
    }

    fn binary_precedence(&self) -> u8 {
        match self.peek() {
            TokenKind::PipePipe => 4,
            TokenKind::AmpersandAmpersand => 5,
            TokenKind::EqualsEquals
            | TokenKind::BangEquals
            | TokenKind::EqualsEqualsEquals
            | TokenKind::BangEqualsEquals => 9,
            TokenKind::Less
            | TokenKind::Greater
            | TokenKind::LessEquals
            | TokenKind::GreaterEquals => 10,
            TokenKind::Plus | TokenKind::Minus => 12,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 13,
            _ => 0,
        }
    }

    fn binary_operator(kind: TokenKind) -> Option<BinaryOperator> {
        let op = match kind {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Sub,
            TokenKind::Star => BinaryOperator::Mul,
            TokenKind::Slash => BinaryOperator::Div,
            TokenKind::Percent => BinaryOperator::Mod,
            TokenKind::EqualsEquals => BinaryOperator::Eq,
            TokenKind::BangEquals => BinaryOperator::Ne,
            TokenKind::EqualsEqualsEquals => BinaryOperator::StrictEq,
            TokenKind::BangEqualsEquals => BinaryOperator::StrictNe,
            TokenKind::Less => BinaryOperator::Lt,
            TokenKind::LessEquals => BinaryOperator::Le,
            TokenKind::Greater => BinaryOperator::Gt,
            TokenKind::GreaterEquals => BinaryOperator::Ge,
            _ => return None,
        };
        Some(op)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression> {
        let start = self.location();

        // Prefix increment/decrement
        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let operator = if self.peek() == TokenKind::PlusPlus {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            self.advance();
            let argument = self.parse_unary_expression()?;
            if !argument.is_valid_assignment_target() {
                return Err(self.error("Invalid left-hand side expression in prefix operation", start));
            }

            return Ok(Expression::Update(Box::new(UpdateExpression {
                operator,
                argument,
                prefix: true,
                span: self.span_from(start),
            })));
        }

        let unary_op = match self.peek() {
            TokenKind::Plus => Some(UnaryOperator::Plus),
            TokenKind::Minus => Some(UnaryOperator::Minus),
            TokenKind::Bang => Some(UnaryOperator::Not),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOperator::Typeof),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOperator::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOperator::Delete),
            _ => None,
        };

        if let Some(operator) = unary_op {
            self.advance();
            let argument = self.parse_unary_expression()?;

            return Ok(Expression::Unary(Box::new(UnaryExpression {
                operator,
                argument,
                span: self.span_from(start),
            })));
        }

        self.parse_update_expression()
    }

    fn parse_update_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let argument = self.parse_left_hand_side_expression()?;

        // Postfix increment/decrement; a line break before the operator ends the expression
        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) && !self.newline_before() {
            let operator = if self.peek() == TokenKind::PlusPlus {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            if !argument.is_valid_assignment_target() {
                return Err(self.error("Invalid left-hand side expression in postfix operation", start));
            }
            self.advance();

            return Ok(Expression::Update(Box::new(UpdateExpression {
                operator,
                argument,
                prefix: false,
                span: self.span_from(start),
            })));
        }

        Ok(argument)
    }

    fn parse_left_hand_side_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        let mut expr = self.parse_primary_expression()?;

        // Call expressions and member accesses
        loop {
            match self.peek() {
                TokenKind::LeftParen => {
                    self.advance();
                    let arguments = self.parse_arguments()?;
                    expr = Expression::Call(Box::new(CallExpression {
                        callee: expr,
                        arguments,
                        span: self.span_from(start),
                    }));
                }
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_identifier_name()?;
                    expr = Expression::Member(Box::new(MemberExpression {
                        object: expr,
                        property: MemberProperty::Identifier(property),
                        span: self.span_from(start),
                    }));
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let property = self.parse_sequence_expression()?;
                    self.expect(TokenKind::RightBracket)?;
                    expr = Expression::Member(Box::new(MemberExpression {
                        object: expr,
                        property: MemberProperty::Expression(Box::new(property)),
                        span: self.span_from(start),
                    }));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression> {
        let start = self.location();

        let literal = |value: LiteralValue, raw: &str, span: Span| {
            Expression::Literal(Literal {
                value,
                raw: raw.to_string(),
                span,
            })
        };

        match self.peek() {
            TokenKind::Identifier => {
                let id = self.parse_identifier()?;
                Ok(Expression::Identifier(id))
            }
            TokenKind::NumberLiteral => {
                let raw = self.advance().text;
                let value = self.parse_number_value(raw, start)?;
                Ok(literal(LiteralValue::Number(value), raw, self.span_from(start)))
            }
            TokenKind::StringLiteral => {
                let raw = self.advance().text;
                let value = Self::parse_string_value(raw);
                Ok(literal(LiteralValue::String(value), raw, self.span_from(start)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(LiteralValue::Boolean(true), "true", self.span_from(start)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(LiteralValue::Boolean(false), "false", self.span_from(start)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(literal(LiteralValue::Null, "null", self.span_from(start)))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expression::This(self.span_from(start)))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_sequence_expression()?;
                self.expect(TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::LeftBrace => self.parse_object_literal(),
            TokenKind::Keyword(Keyword::Function) => {
                let func = self.parse_function(false)?;
                Ok(Expression::Function(Box::new(func)))
            }
            TokenKind::Eof => Err(self.error("Unexpected end of input", start)),
            _ => Err(self.error(format!("Unexpected token '{}'", self.current().text), start)),
        }
    }

    fn parse_spread_or_expression(&mut self) -> Result<Expression> {
        let start = self.location();
        if self.consume(TokenKind::DotDotDot) {
            let argument = self.parse_assignment_expression()?;
            Ok(Expression::Spread(Box::new(SpreadElement {
                argument,
                span: self.span_from(start),
            })))
        } else {
            self.parse_assignment_expression()
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expression> {
        let start = self.location();
        self.expect(TokenKind::LeftBracket)?;

        let mut elements = Vec::new();

        while !self.consume(TokenKind::RightBracket) {
            if self.consume(TokenKind::Comma) {
                elements.push(None);
                continue;
            }

            elements.push(Some(self.parse_spread_or_expression()?));

            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBracket)?;
                break;
            }
        }

        Ok(Expression::Array(ArrayExpression {
            elements,
            span: self.span_from(start),
        }))
    }

    fn parse_object_literal(&mut self) -> Result<Expression> {
        let start = self.location();
        self.expect(TokenKind::LeftBrace)?;

        let mut properties = Vec::new();

        while !self.consume(TokenKind::RightBrace) {
            properties.push(self.parse_object_property()?);

            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBrace)?;
                break;
            }
        }

        Ok(Expression::Object(ObjectExpression {
            properties,
            span: self.span_from(start),
        }))
    }

    fn parse_object_property(&mut self) -> Result<ObjectProperty> {
        let start = self.location();

        let key = match self.peek() {
            TokenKind::LeftBracket => {
                self.advance();
                let expr = self.parse_assignment_expression()?;
                self.expect(TokenKind::RightBracket)?;
                PropertyName::Computed(Box::new(expr))
            }
            TokenKind::StringLiteral => {
                let raw = self.advance().text;
                PropertyName::Static(Self::parse_string_value(raw))
            }
            TokenKind::NumberLiteral => {
                let raw = self.advance().text;
                let value = self.parse_number_value(raw, start)?;
                PropertyName::Static(crate::runtime::number_to_string(value))
            }
            _ => PropertyName::Static(self.parse_identifier_name()?.name),
        };

        self.expect(TokenKind::Colon)?;
        let value = self.parse_assignment_expression()?;

        Ok(ObjectProperty {
            key,
            value,
            span: self.span_from(start),
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();

        while !self.consume(TokenKind::RightParen) {
            args.push(self.parse_spread_or_expression()?);

            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightParen)?;
                break;
            }
        }

        Ok(args)
    }

    // ========== Helpers ==========

    fn parse_identifier(&mut self) -> Result<Identifier> {
        if self.peek() != TokenKind::Identifier {
            let loc = self.location();
            return Err(self.error(
                format!("Expected identifier, found {:?}", self.peek()),
                loc,
            ));
        }

        let start = self.location();
        let name = self.advance().text.to_string();
        Ok(Identifier::new(name, self.span_from(start)))
    }

    fn parse_identifier_name(&mut self) -> Result<Identifier> {
        // Keywords are allowed as property names
        match self.peek() {
            TokenKind::Identifier | TokenKind::Keyword(_) => {
                let start = self.location();
                let name = self.advance().text.to_string();
                Ok(Identifier::new(name, self.span_from(start)))
            }
            _ => {
                let loc = self.location();
                Err(self.error("Expected identifier", loc))
            }
        }
    }

    fn parse_string_value(text: &str) -> String {
        let inner = &text[1..text.len() - 1];
        let mut result = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '\\' {
                result.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('0') => result.push('\0'),
                Some('x') => {
                    let hex: String = chars.by_ref().take(2).collect();
                    if let Ok(code) = u8::from_str_radix(&hex, 16) {
                        result.push(code as char);
                    }
                }
                Some('u') => {
                    let hex: String = if chars.peek() == Some(&'{') {
                        chars.next();
                        chars.by_ref().take_while(|&c| c != '}').collect()
                    } else {
                        chars.by_ref().take(4).collect()
                    };
                    if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        result.push(c);
                    }
                }
                Some(other) => result.push(other),
                None => {}
            }
        }

        result
    }

    fn parse_number_value(&self, text: &str, location: SourceLocation) -> Result<f64> {
        let clean: String = text.chars().filter(|&c| c != '_').collect();
        let invalid = || self.error(format!("Invalid number: {}", text), location);

        let radix = match clean.get(..2) {
            Some("0x" | "0X") => Some(16),
            Some("0b" | "0B") => Some(2),
            Some("0o" | "0O") => Some(8),
            _ => None,
        };

        if let Some(radix) = radix {
            return parse_radix_digits(&clean[2..], radix).ok_or_else(invalid);
        }

        lexical_core::parse::<f64>(clean.as_bytes())
            .or_else(|_| clean.parse::<f64>())
            .map_err(|_| invalid())
    }
}

/// Parse JavaScript source code into an AST
pub fn parse(source: &str) -> Result<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parse a single JavaScript expression
pub fn parse_expression(source: &str) -> Result<Expression> {
    let mut parser = Parser::new(source)?;
    parser.parse_expression()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        let program = parse("42;").unwrap();
        assert_eq!(program.body.len(), 1);

        let program = parse("'hello';").unwrap();
        assert_eq!(program.body.len(), 1);

        let program = parse("true; false; null;").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_parse_number_forms() {
        for (source, expected) in [("0x1F", 31.0), ("0b101", 5.0), ("1e3", 1000.0), ("1_000", 1000.0), (".5", 0.5)] {
            match parse_expression(source).unwrap() {
                Expression::Literal(Literal {
                    value: LiteralValue::Number(n),
                    ..
                }) => assert_eq!(n, expected, "{}", source),
                other => panic!("Expected number literal, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_radix_literal_beyond_u64() {
        match parse_expression("0x10000000000000000").unwrap() {
            Expression::Literal(Literal {
                value: LiteralValue::Number(n),
                ..
            }) => assert_eq!(n, 18446744073709551616.0),
            other => panic!("Expected number literal, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_binary_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expression::Binary(b) => {
                assert_eq!(b.operator, BinaryOperator::Add);
                assert!(matches!(b.right, Expression::Binary(ref r) if r.operator == BinaryOperator::Mul));
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_parse_function_with_rest() {
        let program = parse("function fn(a, ...rest) { return add(...rest); }").unwrap();
        match &program.body[0] {
            Statement::FunctionDeclaration(func) => {
                assert_eq!(func.display_name(), "fn");
                assert_eq!(func.params.len(), 1);
                assert_eq!(func.rest.as_ref().unwrap().name, "rest");
                match &func.body[0] {
                    Statement::Return(ret) => match ret.argument.as_ref().unwrap() {
                        Expression::Call(call) => {
                            assert!(call.has_spread());
                            assert!(call.sole_spread().is_some());
                        }
                        other => panic!("Expected call, got {:?}", other),
                    },
                    other => panic!("Expected return, got {:?}", other),
                }
            }
            _ => panic!("Expected function declaration"),
        }
    }

    #[test]
    fn test_rest_must_be_last() {
        assert!(parse("function f(...a, b) {}").is_err());
    }

    #[test]
    fn test_mixed_spread_is_not_sole_spread() {
        match parse_expression("f(1, ...xs)").unwrap() {
            Expression::Call(call) => {
                assert!(call.has_spread());
                assert!(call.sole_spread().is_none());
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_with_empty_body() {
        let program = parse("with ({});").unwrap();
        match &program.body[0] {
            Statement::With(with) => {
                assert!(matches!(with.object, Expression::Object(_)));
                assert!(matches!(with.body, Statement::Empty(_)));
            }
            other => panic!("Expected with statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_array_holes_and_spread() {
        match parse_expression("[1, , ...xs]").unwrap() {
            Expression::Array(array) => {
                assert_eq!(array.elements.len(), 3);
                assert!(array.elements[1].is_none());
                assert!(matches!(array.elements[2], Some(Expression::Spread(_))));
            }
            other => panic!("Expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_computed_member_assignment() {
        let program = parse("Array.prototype[Symbol.iterator] = function() { return 1; };").unwrap();
        match &program.body[0] {
            Statement::Expression(stmt) => match &stmt.expression {
                Expression::Assignment(assign) => {
                    assert_eq!(assign.operator, AssignmentOperator::Assign);
                    assert_eq!(assign.left.describe(), "Array.prototype[Symbol.iterator]");
                }
                other => panic!("Expected assignment, got {:?}", other),
            },
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_conditional_and_update() {
        let program = parse("for (var i = 0; i < 4000; ++i) { x = i < 1900 ? 3 : 7; }").unwrap();
        match &program.body[0] {
            Statement::For(stmt) => {
                assert!(matches!(stmt.init, Some(ForInit::Declaration(_))));
                assert!(matches!(stmt.update, Some(Expression::Update(ref u)) if u.prefix));
            }
            other => panic!("Expected for statement, got {:?}", other),
        }
    }

    #[test]
    fn test_asi_and_errors() {
        assert!(parse("var a = 1\nvar b = 2").is_ok());
        assert!(parse("var a = 1 var b = 2").is_err());
        assert!(parse("return 1;").is_err());
        assert!(parse("break;").is_err());
        assert!(parse("1 = 2;").is_err());
    }

    #[test]
    fn test_parse_object_literal_keys() {
        match parse_expression("({a: 1, 'b': 2, 3: 3, [k]: 4})").unwrap() {
            Expression::Object(obj) => {
                assert_eq!(obj.properties.len(), 4);
                assert!(matches!(obj.properties[2].key, PropertyName::Static(ref s) if s == "3"));
                assert!(matches!(obj.properties[3].key, PropertyName::Computed(_)));
            }
            other => panic!("Expected object, got {:?}", other),
        }
    }
}

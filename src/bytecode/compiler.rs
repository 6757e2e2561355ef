//! Bytecode compiler
//!
//! This module compiles the AST into bytecode that can be executed
//! by the interpreter. Spread call sites are numbered program-wide here so
//! the optimizer can keep per-site state.

use super::{CallSiteId, CallSiteInfo, Chunk, FunctionTemplate, Opcode, Script};
use crate::ast::*;
use crate::error::{Error, Result};
use crate::runtime::Value;
use std::rc::Rc;

/// Loop information for break/continue
#[derive(Debug, Clone)]
struct LoopInfo {
    /// Target of `continue` when it is already known (while loops)
    continue_target: Option<usize>,
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
    /// `with` nesting at loop entry
    with_depth: u32,
}

/// Per-function compilation state
struct FunctionState {
    chunk: Chunk,
    loop_stack: Vec<LoopInfo>,
    with_depth: u32,
    /// Top-level code records expression statement values as the completion
    is_script: bool,
}

impl FunctionState {
    fn new(is_script: bool) -> Self {
        Self {
            chunk: Chunk::new(),
            loop_stack: Vec::new(),
            with_depth: 0,
            is_script,
        }
    }
}

/// Compiler state
pub struct Compiler {
    /// Function being compiled
    current: FunctionState,
    /// Enclosing functions, innermost last
    enclosing: Vec<FunctionState>,
    /// Current line number
    current_line: u32,
    /// Spread call sites seen so far
    call_sites: Vec<CallSiteInfo>,
    next_site_id: u16,
}

impl Compiler {
    /// Create a new compiler whose spread call sites start at `first_site_id`
    pub fn new(first_site_id: u16) -> Self {
        Self {
            current: FunctionState::new(true),
            enclosing: Vec::new(),
            current_line: 1,
            call_sites: Vec::new(),
            next_site_id: first_site_id,
        }
    }

    /// Compile a program to a script template
    pub fn compile_program(mut self, program: &Program) -> Result<Script> {
        self.hoist_function_declarations(&program.body)?;
        for stmt in &program.body {
            self.compile_statement(stmt)?;
        }
        self.emit(Opcode::Completion);
        self.emit(Opcode::Return);

        let state = self.current;
        let main = FunctionTemplate {
            name: String::new(),
            params: Vec::new(),
            rest: None,
            var_names: collect_var_names(&program.body),
            chunk: state.chunk,
            line: 0,
            self_binding: false,
        };

        Ok(Script {
            main: Rc::new(main),
            call_sites: self.call_sites,
        })
    }

    // ========== Helpers ==========

    fn state(&mut self) -> &mut FunctionState {
        &mut self.current
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.current.chunk
    }

    fn enter_function(&mut self) {
        let outer = std::mem::replace(&mut self.current, FunctionState::new(false));
        self.enclosing.push(outer);
    }

    fn leave_function(&mut self) -> Result<FunctionState> {
        let outer = self
            .enclosing
            .pop()
            .ok_or_else(|| Error::internal("function nesting underflow"))?;
        Ok(std::mem::replace(&mut self.current, outer))
    }

    fn code_len(&mut self) -> usize {
        self.chunk().code.len()
    }

    fn emit(&mut self, opcode: Opcode) {
        let line = self.current_line;
        self.chunk().write_opcode(opcode, line);
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.current_line;
        self.chunk().write(byte, line);
    }

    fn emit_u16(&mut self, value: u16) {
        let line = self.current_line;
        self.chunk().write_u16(value, line);
    }

    /// Update current source location from a span
    fn set_location(&mut self, span: &Span) {
        if span.start.line > 0 {
            self.current_line = span.start.line;
        }
    }

    fn add_constant(&mut self, value: Value) -> Result<u16> {
        self.chunk()
            .add_constant(value)
            .ok_or_else(|| Error::syntax_error("Too many constants in one function"))
    }

    fn emit_constant(&mut self, value: Value) -> Result<()> {
        let index = self.add_constant(value)?;
        self.emit(Opcode::Constant);
        self.emit_u16(index);
        Ok(())
    }

    /// Emit an opcode whose operand is a name in the constant pool
    fn emit_with_name(&mut self, opcode: Opcode, name: &str) -> Result<()> {
        let index = self.add_constant(Value::string(name))?;
        self.emit(opcode);
        self.emit_u16(index);
        Ok(())
    }

    fn emit_binary_operator(&mut self, op: BinaryOperator) {
        let opcode = match op {
            BinaryOperator::Add => Opcode::Add,
            BinaryOperator::Sub => Opcode::Sub,
            BinaryOperator::Mul => Opcode::Mul,
            BinaryOperator::Div => Opcode::Div,
            BinaryOperator::Mod => Opcode::Mod,
            BinaryOperator::Eq => Opcode::Eq,
            BinaryOperator::Ne => Opcode::Ne,
            BinaryOperator::StrictEq => Opcode::StrictEq,
            BinaryOperator::StrictNe => Opcode::StrictNe,
            BinaryOperator::Lt => Opcode::Lt,
            BinaryOperator::Le => Opcode::Le,
            BinaryOperator::Gt => Opcode::Gt,
            BinaryOperator::Ge => Opcode::Ge,
        };
        self.emit(opcode);
    }

    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        self.emit(opcode);
        let jump_addr = self.code_len();
        self.emit_u16(0xFFFF); // Placeholder
        jump_addr
    }

    fn patch_jump(&mut self, addr: usize) -> Result<()> {
        let distance = self.code_len() as isize - addr as isize - 2;
        let offset = i16::try_from(distance)
            .map_err(|_| Error::syntax_error("Too much code to jump over"))?;
        let bytes = offset.to_le_bytes();
        let chunk = self.chunk();
        chunk.code[addr] = bytes[0];
        chunk.code[addr + 1] = bytes[1];
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize) -> Result<()> {
        self.emit(Opcode::Jump);
        let distance = loop_start as isize - self.code_len() as isize - 2;
        let offset =
            i16::try_from(distance).map_err(|_| Error::syntax_error("Loop body too large"))?;
        self.emit_u16(offset as u16);
        Ok(())
    }

    fn next_site(&mut self) -> Result<CallSiteId> {
        let id = CallSiteId(self.next_site_id);
        self.next_site_id = self
            .next_site_id
            .checked_add(1)
            .ok_or_else(|| Error::syntax_error("Too many spread call sites"))?;
        Ok(id)
    }

    // ========== Functions ==========

    /// Emit closures for every function declaration in `body`, binding each name
    fn hoist_function_declarations(&mut self, body: &[Statement]) -> Result<()> {
        let mut funcs = Vec::new();
        collect_function_declarations(body, &mut funcs);
        for func in funcs {
            self.set_location(&func.span);
            self.compile_closure(func, None, false)?;
            self.emit_with_name(Opcode::DeclareFunction, func.display_name())?;
        }
        Ok(())
    }

    /// Compile a function body and emit `CreateClosure` for it
    fn compile_closure(
        &mut self,
        func: &Function,
        inferred_name: Option<&str>,
        is_expression: bool,
    ) -> Result<()> {
        let template = self.compile_function_body(func, inferred_name, is_expression)?;
        let chunk = self.chunk();
        let index = u16::try_from(chunk.functions.len())
            .map_err(|_| Error::syntax_error("Too many nested functions"))?;
        chunk.functions.push(Rc::new(template));
        self.emit(Opcode::CreateClosure);
        self.emit_u16(index);
        Ok(())
    }

    fn compile_function_body(
        &mut self,
        func: &Function,
        inferred_name: Option<&str>,
        is_expression: bool,
    ) -> Result<FunctionTemplate> {
        let saved_line = self.current_line;
        self.enter_function();

        self.hoist_function_declarations(&func.body)?;
        for stmt in &func.body {
            self.compile_statement(stmt)?;
        }
        self.emit(Opcode::ReturnUndefined);

        let state = self.leave_function()?;
        self.current_line = saved_line;

        let name = match (&func.id, inferred_name) {
            (Some(id), _) => id.name.clone(),
            (None, Some(inferred)) => inferred.to_string(),
            (None, None) => String::new(),
        };

        Ok(FunctionTemplate {
            name,
            params: func.params.iter().map(|p| p.name.clone()).collect(),
            rest: func.rest.as_ref().map(|r| r.name.clone()),
            var_names: collect_var_names(&func.body),
            chunk: state.chunk,
            line: func.span.start.line,
            self_binding: is_expression && func.id.is_some(),
        })
    }

    // ========== Statements ==========

    fn compile_statement(&mut self, stmt: &Statement) -> Result<()> {
        self.set_location(&stmt.span());

        match stmt {
            Statement::Block(block) => {
                for stmt in &block.body {
                    self.compile_statement(stmt)?;
                }
                Ok(())
            }
            Statement::Empty(_) => Ok(()),
            Statement::Expression(expr_stmt) => {
                self.compile_expr(&expr_stmt.expression)?;
                if self.state().is_script {
                    self.emit(Opcode::SetCompletion);
                } else {
                    self.emit(Opcode::Pop);
                }
                Ok(())
            }
            Statement::If(if_stmt) => self.compile_if(if_stmt),
            Statement::While(while_stmt) => self.compile_while(while_stmt),
            Statement::DoWhile(do_while) => self.compile_do_while(do_while),
            Statement::For(for_stmt) => self.compile_for(for_stmt),
            Statement::Break(_) => self.compile_break(),
            Statement::Continue(_) => self.compile_continue(),
            Statement::Return(ret) => self.compile_return(ret),
            Statement::With(with) => self.compile_with(with),
            Statement::VariableDeclaration(decl) => self.compile_var_decl(decl),
            // Hoisted to the top of the enclosing function
            Statement::FunctionDeclaration(_) => Ok(()),
        }
    }

    fn compile_var_decl(&mut self, decl: &VariableDeclaration) -> Result<()> {
        for declarator in &decl.declarations {
            if let Some(init) = &declarator.init {
                self.compile_named_value(init, &declarator.id.name)?;
                self.emit_with_name(Opcode::SetName, &declarator.id.name)?;
                self.emit(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// Compile a value bound to `name`, naming anonymous function expressions after it
    fn compile_named_value(&mut self, expr: &Expression, name: &str) -> Result<()> {
        match expr {
            Expression::Function(func) if func.id.is_none() => {
                self.set_location(&func.span);
                self.compile_closure(func, Some(name), true)
            }
            other => self.compile_expr(other),
        }
    }

    fn compile_if(&mut self, if_stmt: &IfStatement) -> Result<()> {
        self.compile_expr(&if_stmt.test)?;
        let else_jump = self.emit_jump(Opcode::JumpIfFalse);

        self.compile_statement(&if_stmt.consequent)?;

        match &if_stmt.alternate {
            Some(alternate) => {
                let end_jump = self.emit_jump(Opcode::Jump);
                self.patch_jump(else_jump)?;
                self.compile_statement(alternate)?;
                self.patch_jump(end_jump)
            }
            None => self.patch_jump(else_jump),
        }
    }

    fn begin_loop(&mut self, continue_target: Option<usize>) -> Result<()> {
        let state = self.state();
        let with_depth = state.with_depth;
        state.loop_stack.push(LoopInfo {
            continue_target,
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
            with_depth,
        });
        Ok(())
    }

    fn end_loop(&mut self) -> Result<()> {
        let loop_info = self
            .state()
            .loop_stack
            .pop()
            .ok_or_else(|| Error::internal("loop stack underflow"))?;
        for jump in loop_info.break_jumps {
            self.patch_jump(jump)?;
        }
        Ok(())
    }

    /// Patch pending `continue` jumps to the current position
    fn patch_continues(&mut self) -> Result<()> {
        let jumps = match self.state().loop_stack.last_mut() {
            Some(loop_info) => std::mem::take(&mut loop_info.continue_jumps),
            None => Vec::new(),
        };
        for jump in jumps {
            self.patch_jump(jump)?;
        }
        Ok(())
    }

    fn compile_while(&mut self, while_stmt: &WhileStatement) -> Result<()> {
        let loop_start = self.code_len();
        self.begin_loop(Some(loop_start))?;

        self.compile_expr(&while_stmt.test)?;
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse);

        self.compile_statement(&while_stmt.body)?;
        self.emit_loop(loop_start)?;

        self.patch_jump(exit_jump)?;
        self.end_loop()
    }

    fn compile_do_while(&mut self, do_while: &DoWhileStatement) -> Result<()> {
        let loop_start = self.code_len();
        self.begin_loop(None)?;

        self.compile_statement(&do_while.body)?;
        self.patch_continues()?;

        self.set_location(&do_while.test.span());
        self.compile_expr(&do_while.test)?;
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit_loop(loop_start)?;
        self.patch_jump(exit_jump)?;

        self.end_loop()
    }

    fn compile_for(&mut self, for_stmt: &ForStatement) -> Result<()> {
        match &for_stmt.init {
            Some(ForInit::Declaration(decl)) => self.compile_var_decl(decl)?,
            Some(ForInit::Expression(expr)) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Pop);
            }
            None => {}
        }

        let loop_start = self.code_len();
        self.begin_loop(None)?;

        let exit_jump = match &for_stmt.test {
            Some(test) => {
                self.compile_expr(test)?;
                Some(self.emit_jump(Opcode::JumpIfFalse))
            }
            None => None,
        };

        self.compile_statement(&for_stmt.body)?;
        self.patch_continues()?;

        if let Some(update) = &for_stmt.update {
            self.set_location(&update.span());
            self.compile_expr(update)?;
            self.emit(Opcode::Pop);
        }
        self.emit_loop(loop_start)?;

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump)?;
        }
        self.end_loop()
    }

    /// Leave every `with` scope entered since the innermost loop began
    fn emit_with_unwind(&mut self) -> Result<Option<LoopInfo>> {
        let state = self.state();
        let current_depth = state.with_depth;
        let Some(loop_info) = state.loop_stack.last().cloned() else {
            return Ok(None);
        };
        for _ in loop_info.with_depth..current_depth {
            self.emit(Opcode::PopWith);
        }
        Ok(Some(loop_info))
    }

    fn compile_break(&mut self) -> Result<()> {
        if self.emit_with_unwind()?.is_none() {
            return Err(Error::syntax_error("Illegal break statement"));
        }
        let jump = self.emit_jump(Opcode::Jump);
        if let Some(loop_info) = self.state().loop_stack.last_mut() {
            loop_info.break_jumps.push(jump);
        }
        Ok(())
    }

    fn compile_continue(&mut self) -> Result<()> {
        let Some(loop_info) = self.emit_with_unwind()? else {
            return Err(Error::syntax_error("Illegal continue statement"));
        };
        match loop_info.continue_target {
            Some(target) => self.emit_loop(target),
            None => {
                let jump = self.emit_jump(Opcode::Jump);
                if let Some(loop_info) = self.state().loop_stack.last_mut() {
                    loop_info.continue_jumps.push(jump);
                }
                Ok(())
            }
        }
    }

    fn compile_return(&mut self, ret: &ReturnStatement) -> Result<()> {
        match &ret.argument {
            Some(argument) => {
                self.compile_expr(argument)?;
                self.emit(Opcode::Return);
            }
            None => self.emit(Opcode::ReturnUndefined),
        }
        Ok(())
    }

    fn compile_with(&mut self, with: &WithStatement) -> Result<()> {
        self.compile_expr(&with.object)?;
        self.emit(Opcode::PushWith);

        self.state().with_depth += 1;
        let body = self.compile_statement(&with.body);
        self.state().with_depth -= 1;
        body?;

        self.emit(Opcode::PopWith);
        Ok(())
    }

    // ========== Expressions ==========

    fn compile_expr(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Identifier(id) => self.emit_with_name(Opcode::GetName, &id.name),
            Expression::Literal(lit) => self.compile_literal(lit),
            Expression::Array(arr) => {
                self.emit(Opcode::NewArray);
                self.compile_array_elements(arr.elements.iter().map(Option::as_ref))
            }
            Expression::Object(obj) => self.compile_object(obj),
            Expression::Function(func) => {
                self.set_location(&func.span);
                self.compile_closure(func, None, true)
            }
            Expression::This(_) => {
                self.emit(Opcode::This);
                Ok(())
            }
            Expression::Member(member) => {
                self.compile_expr(&member.object)?;
                self.compile_member_get(&member.property)
            }
            Expression::Call(call) => self.compile_call(call),
            Expression::Unary(unary) => self.compile_unary(unary),
            Expression::Update(update) => self.compile_update(update),
            Expression::Binary(binary) => {
                self.compile_expr(&binary.left)?;
                self.compile_expr(&binary.right)?;
                self.emit_binary_operator(binary.operator);
                Ok(())
            }
            Expression::Logical(logical) => self.compile_logical(logical),
            Expression::Assignment(assignment) => self.compile_assignment(assignment),
            Expression::Conditional(cond) => {
                self.compile_expr(&cond.test)?;
                let else_jump = self.emit_jump(Opcode::JumpIfFalse);
                self.compile_expr(&cond.consequent)?;
                let end_jump = self.emit_jump(Opcode::Jump);
                self.patch_jump(else_jump)?;
                self.compile_expr(&cond.alternate)?;
                self.patch_jump(end_jump)
            }
            Expression::Sequence(seq) => {
                for (i, expr) in seq.expressions.iter().enumerate() {
                    if i > 0 {
                        self.emit(Opcode::Pop);
                    }
                    self.compile_expr(expr)?;
                }
                Ok(())
            }
            Expression::Spread(_) => Err(Error::syntax_error("Unexpected token '...'")),
        }
    }

    fn compile_literal(&mut self, lit: &Literal) -> Result<()> {
        match &lit.value {
            LiteralValue::Null => self.emit(Opcode::Null),
            LiteralValue::Boolean(true) => self.emit(Opcode::True),
            LiteralValue::Boolean(false) => self.emit(Opcode::False),
            LiteralValue::Number(n) => self.emit_constant(Value::Number(*n))?,
            LiteralValue::String(s) => self.emit_constant(Value::string(s.as_str()))?,
        }
        Ok(())
    }

    /// Append elements to the array on top of the stack
    fn compile_array_elements<'a>(
        &mut self,
        elements: impl Iterator<Item = Option<&'a Expression>>,
    ) -> Result<()> {
        for element in elements {
            match element {
                None => self.emit(Opcode::ArrayHole),
                Some(Expression::Spread(spread)) => {
                    self.compile_expr(&spread.argument)?;
                    self.emit_with_name(Opcode::ArrayExtend, &spread.argument.describe())?;
                }
                Some(expr) => {
                    self.compile_expr(expr)?;
                    self.emit(Opcode::ArrayPush);
                }
            }
        }
        Ok(())
    }

    fn compile_object(&mut self, obj: &ObjectExpression) -> Result<()> {
        self.emit(Opcode::NewObject);
        for property in &obj.properties {
            match &property.key {
                PropertyName::Static(name) => {
                    self.emit_constant(Value::string(name.as_str()))?;
                    self.compile_named_value(&property.value, name)?;
                }
                PropertyName::Computed(key) => {
                    self.compile_expr(key)?;
                    self.compile_expr(&property.value)?;
                }
            }
            self.emit(Opcode::DefineField);
        }
        Ok(())
    }

    /// [object] -> [value]
    fn compile_member_get(&mut self, property: &MemberProperty) -> Result<()> {
        match property {
            MemberProperty::Identifier(id) => self.emit_with_name(Opcode::GetProperty, &id.name),
            MemberProperty::Expression(key) => {
                self.compile_expr(key)?;
                self.emit(Opcode::GetElement);
                Ok(())
            }
        }
    }

    /// Push the property key of a member expression
    fn compile_member_key(&mut self, property: &MemberProperty) -> Result<()> {
        match property {
            MemberProperty::Identifier(id) => self.emit_constant(Value::string(id.name.as_str())),
            MemberProperty::Expression(key) => self.compile_expr(key),
        }
    }

    fn compile_call(&mut self, call: &CallExpression) -> Result<()> {
        self.set_location(&call.span);

        // Push [this, callee]
        match &call.callee {
            Expression::Identifier(id) => self.emit_with_name(Opcode::ResolveCallee, &id.name)?,
            Expression::Member(member) => {
                self.compile_expr(&member.object)?;
                self.emit(Opcode::Dup);
                self.compile_member_get(&member.property)?;
            }
            other => {
                self.emit(Opcode::Undefined);
                self.compile_expr(other)?;
            }
        }

        if let Some(argument) = call.sole_spread() {
            let site = self.next_site()?;
            let description = argument.describe();
            self.call_sites.push(CallSiteInfo {
                id: site,
                line: call.span.start.line,
                label: format!("{}(...{})", call.callee.describe(), description),
            });

            self.compile_expr(argument)?;
            self.set_location(&call.span);
            let desc_index = self.add_constant(Value::string(description))?;
            self.emit(Opcode::CallSpread);
            self.emit_u16(site.0);
            self.emit_u16(desc_index);
            return Ok(());
        }

        if call.has_spread() {
            self.emit(Opcode::NewArray);
            self.compile_array_elements(call.arguments.iter().map(Some))?;
            self.set_location(&call.span);
            self.emit(Opcode::CallArray);
            return Ok(());
        }

        let arg_count = u8::try_from(call.arguments.len())
            .map_err(|_| Error::syntax_error("Too many arguments in function call"))?;
        for arg in &call.arguments {
            self.compile_expr(arg)?;
        }
        self.set_location(&call.span);
        self.emit(Opcode::Call);
        self.emit_byte(arg_count);
        Ok(())
    }

    fn compile_unary(&mut self, unary: &UnaryExpression) -> Result<()> {
        match unary.operator {
            UnaryOperator::Minus => {
                self.compile_expr(&unary.argument)?;
                self.emit(Opcode::Neg);
            }
            UnaryOperator::Plus => {
                self.compile_expr(&unary.argument)?;
                self.emit(Opcode::ToNumber);
            }
            UnaryOperator::Not => {
                self.compile_expr(&unary.argument)?;
                self.emit(Opcode::Not);
            }
            UnaryOperator::Typeof => match &unary.argument {
                Expression::Identifier(id) => self.emit_with_name(Opcode::TypeofName, &id.name)?,
                other => {
                    self.compile_expr(other)?;
                    self.emit(Opcode::Typeof);
                }
            },
            UnaryOperator::Void => {
                self.compile_expr(&unary.argument)?;
                self.emit(Opcode::Pop);
                self.emit(Opcode::Undefined);
            }
            UnaryOperator::Delete => match &unary.argument {
                Expression::Identifier(id) => self.emit_with_name(Opcode::DeleteName, &id.name)?,
                Expression::Member(member) => {
                    self.compile_expr(&member.object)?;
                    self.compile_member_key(&member.property)?;
                    self.emit(Opcode::DeleteElement);
                }
                other => {
                    self.compile_expr(other)?;
                    self.emit(Opcode::Pop);
                    self.emit(Opcode::True);
                }
            },
        }
        Ok(())
    }

    fn compile_update(&mut self, update: &UpdateExpression) -> Result<()> {
        let step = match update.operator {
            UpdateOperator::Increment => Opcode::Increment,
            UpdateOperator::Decrement => Opcode::Decrement,
        };

        match &update.argument {
            Expression::Identifier(id) => {
                self.emit_with_name(Opcode::GetName, &id.name)?;
                self.emit(Opcode::ToNumber);
                if !update.prefix {
                    self.emit(Opcode::Dup);
                }
                self.emit(step);
                self.emit_with_name(Opcode::SetName, &id.name)?;
                if !update.prefix {
                    self.emit(Opcode::Pop);
                }
                Ok(())
            }
            Expression::Member(member) => {
                self.compile_expr(&member.object)?;
                self.compile_member_key(&member.property)?;
                self.emit(Opcode::Dup2);
                self.emit(Opcode::GetElement);
                self.emit(Opcode::ToNumber);
                if update.prefix {
                    self.emit(step);
                    self.emit(Opcode::SetElement);
                } else {
                    // [obj, key, old] -> [old, obj, key, new] -> [old]
                    self.emit(Opcode::Dup);
                    self.emit(Opcode::Rot4);
                    self.emit(step);
                    self.emit(Opcode::SetElement);
                    self.emit(Opcode::Pop);
                }
                Ok(())
            }
            _ => Err(Error::syntax_error(
                "Invalid left-hand side expression in update operation",
            )),
        }
    }

    fn compile_logical(&mut self, logical: &LogicalExpression) -> Result<()> {
        self.compile_expr(&logical.left)?;
        self.emit(Opcode::Dup);
        let short_circuit = match logical.operator {
            LogicalOperator::And => self.emit_jump(Opcode::JumpIfFalse),
            LogicalOperator::Or => self.emit_jump(Opcode::JumpIfTrue),
        };
        self.emit(Opcode::Pop);
        self.compile_expr(&logical.right)?;
        self.patch_jump(short_circuit)
    }

    fn compile_assignment(&mut self, assignment: &AssignmentExpression) -> Result<()> {
        let compound = assignment.operator.binary_operator();

        match &assignment.left {
            Expression::Identifier(id) => {
                match compound {
                    None => self.compile_named_value(&assignment.right, &id.name)?,
                    Some(op) => {
                        self.emit_with_name(Opcode::GetName, &id.name)?;
                        self.compile_expr(&assignment.right)?;
                        self.emit_binary_operator(op);
                    }
                }
                self.emit_with_name(Opcode::SetName, &id.name)
            }
            Expression::Member(member) => {
                self.compile_expr(&member.object)?;
                match (compound, &member.property) {
                    (None, MemberProperty::Identifier(id)) => {
                        self.compile_expr(&assignment.right)?;
                        self.emit_with_name(Opcode::SetProperty, &id.name)
                    }
                    (None, MemberProperty::Expression(key)) => {
                        self.compile_expr(key)?;
                        self.compile_expr(&assignment.right)?;
                        self.emit(Opcode::SetElement);
                        Ok(())
                    }
                    (Some(op), property) => {
                        self.compile_member_key(property)?;
                        self.emit(Opcode::Dup2);
                        self.emit(Opcode::GetElement);
                        self.compile_expr(&assignment.right)?;
                        self.emit_binary_operator(op);
                        self.emit(Opcode::SetElement);
                        Ok(())
                    }
                }
            }
            _ => Err(Error::syntax_error("Invalid left-hand side in assignment")),
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Names declared with var/let/const in a function body, excluding nested functions
fn collect_var_names(body: &[Statement]) -> Vec<String> {
    fn visit(stmt: &Statement, names: &mut Vec<String>) {
        let decl = match stmt {
            Statement::VariableDeclaration(decl) => Some(decl),
            Statement::For(f) => match &f.init {
                Some(ForInit::Declaration(decl)) => Some(decl),
                _ => None,
            },
            _ => None,
        };
        for declarator in decl.iter().flat_map(|d| &d.declarations) {
            if !names.contains(&declarator.id.name) {
                names.push(declarator.id.name.clone());
            }
        }
        for nested in stmt.nested() {
            visit(nested, names);
        }
    }

    let mut names = Vec::new();
    for stmt in body {
        visit(stmt, &mut names);
    }
    names
}

/// Function declarations anywhere in a body, excluding nested function bodies
fn collect_function_declarations<'a>(
    body: impl IntoIterator<Item = &'a Statement>,
    out: &mut Vec<&'a Function>,
) {
    for stmt in body {
        if let Statement::FunctionDeclaration(func) = stmt {
            out.push(func);
        }
        collect_function_declarations(stmt.nested(), out);
    }
}

/// Compile a parsed program, numbering spread call sites from `first_site_id`
pub fn compile_program(program: &Program, first_site_id: u16) -> Result<Script> {
    Compiler::new(first_site_id).compile_program(program)
}

/// Parse and compile JavaScript source
pub fn compile(source: &str) -> Result<Script> {
    let program = crate::parser::parse(source)?;
    compile_program(&program, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcodes(chunk: &Chunk) -> Vec<Opcode> {
        let mut ops = Vec::new();
        let mut offset = 0;
        while offset < chunk.code.len() {
            let op = Opcode::from_u8(chunk.code[offset]).unwrap();
            ops.push(op);
            offset += op.instruction_size();
        }
        ops
    }

    #[test]
    fn test_compile_literals() {
        let script = compile("42; 'x'; true; null;").unwrap();
        let ops = opcodes(&script.main.chunk);
        assert_eq!(ops.iter().filter(|op| **op == Opcode::SetCompletion).count(), 4);
        assert_eq!(ops.last(), Some(&Opcode::Return));
    }

    #[test]
    fn test_sole_spread_gets_call_site() {
        let script = compile("function fn(...rest) { return add(...rest); }").unwrap();
        assert_eq!(script.call_sites.len(), 1);
        let site = &script.call_sites[0];
        assert_eq!(site.id, CallSiteId(0));
        assert_eq!(site.label, "add(...rest)");
        assert_eq!(site.line, 1);

        let func = &script.main.chunk.functions[0];
        assert_eq!(func.name, "fn");
        assert_eq!(func.rest.as_deref(), Some("rest"));
        assert!(opcodes(&func.chunk).contains(&Opcode::CallSpread));
    }

    #[test]
    fn test_mixed_spread_builds_argument_array() {
        let script = compile("f(1, ...xs, 2);").unwrap();
        let ops = opcodes(&script.main.chunk);
        assert!(script.call_sites.is_empty());
        assert!(ops.contains(&Opcode::ArrayExtend));
        assert!(ops.contains(&Opcode::CallArray));
        assert!(!ops.contains(&Opcode::CallSpread));
    }

    #[test]
    fn test_site_ids_are_program_wide() {
        let program = crate::parser::parse(
            "function a() { f(...x); } function b() { g(...y); } h(...z);",
        )
        .unwrap();
        let script = compile_program(&program, 10).unwrap();
        let ids: Vec<u16> = script.call_sites.iter().map(|s| s.id.0).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, vec![10, 11, 12]);
    }

    #[test]
    fn test_hoisting_collects_vars_and_functions() {
        let script = compile(
            "function outer() { if (x) { var a = 1; } for (let i = 0; i < 1; i++) {} function inner() { var hidden; } }",
        )
        .unwrap();
        let outer = &script.main.chunk.functions[0];
        assert_eq!(outer.var_names, vec!["a".to_string(), "i".to_string()]);
        assert_eq!(outer.chunk.functions[0].name, "inner");
        assert_eq!(outer.chunk.functions[0].var_names, vec!["hidden".to_string()]);
    }

    #[test]
    fn test_break_inside_with_pops_scope() {
        let script = compile("while (true) { with ({}) { break; } }").unwrap();
        let ops = opcodes(&script.main.chunk);
        let pops = ops.iter().filter(|op| **op == Opcode::PopWith).count();
        assert_eq!(pops, 2);
    }

    #[test]
    fn test_anonymous_function_name_inference() {
        let script = compile("var f = function() {}; g = function() {};").unwrap();
        let names: Vec<&str> = script
            .main
            .chunk
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["f", "g"]);
    }

    #[test]
    fn test_disassembly_includes_nested_functions() {
        let script = compile("function add(a, b) { return a + b; }").unwrap();
        let text = script.main.disassemble();
        assert!(text.contains("<script>"));
        assert!(text.contains("add (line 1)"));
        assert!(text.contains("Add"));
    }
}

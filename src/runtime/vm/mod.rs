//! Virtual Machine for executing bytecode
//!
//! A stack-based interpreter over `FunctionTemplate`s. Script-to-script calls
//! push a frame and stay inside the same dispatch loop; calls from native code
//! back into script code re-enter the loop with a target frame depth.

mod spread;
mod types;

pub use types::{CallFrame, MAX_CALL_DEPTH};

use super::builtins::{create_realm, Realm};
use super::scope::{resolve, Binding, Scope, ScopeKind, ScopeRef};
use super::value::{
    get_property, string_unit_at, Closure, NativeFn, Object, ObjectKind, ObjectRef, PropertyKey,
    Value,
};
use super::RuntimeConfig;
use crate::bytecode::{CallSiteId, Opcode, Script};
use crate::error::{messages, Error, Result, StackFrame, StackTrace};
use crate::jit::{OptimizerStats, SpreadCallOptimizer, SpreadPath, WriteKind};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Maximum stack size
const MAX_STACK_SIZE: usize = 65536;

/// The spreadcall virtual machine
pub struct VM {
    /// Value stack
    stack: Vec<Value>,
    /// Call stack
    frames: Vec<CallFrame>,
    /// Intrinsic objects and the global object
    realm: Realm,
    /// Object-backed scope over the global object
    global_scope: ScopeRef,
    /// Spread call-site optimizer and invalidation monitor
    optimizer: SpreadCallOptimizer,
    /// Frame limit before RangeError
    max_call_depth: usize,
    /// Value of the last top-level expression statement
    completion: Value,
    /// Captured `print` output; `None` writes to stdout
    output: Option<Rc<RefCell<Vec<String>>>>,
    /// Current filename being executed
    current_file: Option<String>,
}

impl VM {
    /// Create a new VM with the default configuration
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    /// Create a new VM
    pub fn with_config(config: &RuntimeConfig) -> Self {
        let realm = create_realm();
        let optimizer = SpreadCallOptimizer::new(
            config.optimizer.clone(),
            realm.array_prototype.clone(),
            realm.array_iterator_prototype.clone(),
        );
        let global_scope = Scope::global(realm.global.clone());

        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            realm,
            global_scope,
            optimizer,
            max_call_depth: config.max_call_depth,
            completion: Value::Undefined,
            output: None,
            current_file: None,
        }
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn optimizer(&self) -> &SpreadCallOptimizer {
        &self.optimizer
    }

    pub fn stats(&self) -> OptimizerStats {
        self.optimizer.stats()
    }

    /// Set the file name shown in stack traces
    pub fn set_file_name(&mut self, name: impl Into<String>) {
        self.current_file = Some(name.into());
    }

    /// Capture `print` output instead of writing it to stdout
    pub fn capture_output(&mut self) -> Rc<RefCell<Vec<String>>> {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        self.output = Some(buffer.clone());
        buffer
    }

    /// Emit one line of script output
    pub fn write_line(&mut self, line: String) {
        match &self.output {
            Some(buffer) => buffer.borrow_mut().push(line),
            None => println!("{}", line),
        }
    }

    // ========== Globals ==========

    /// Get a global variable
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.realm.global.borrow().get_own(&PropertyKey::from(name))
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<()> {
        let global = self.realm.global.clone();
        self.set_property(&global, PropertyKey::from(name), value)
    }

    /// Register a native function as a global
    pub fn register_native<F>(&mut self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&mut VM, Value, &[Value]) -> Result<Value> + 'static,
    {
        let function = self.new_native_function(name, Rc::new(func));
        self.set_global(name, function)
    }

    // ========== Object helpers ==========

    /// Create an array with `Array.prototype` as its prototype
    pub fn new_array(&self, elements: Vec<Option<Value>>) -> Value {
        Value::Object(
            Object::new(
                ObjectKind::Array(elements),
                Some(self.realm.array_prototype.clone()),
            )
            .into_ref(),
        )
    }

    /// Create an ordinary object inheriting from `Object.prototype`
    pub fn new_object(&self) -> ObjectRef {
        Object::ordinary(Some(self.realm.object_prototype.clone())).into_ref()
    }

    pub fn new_native_function(&self, name: &str, func: NativeFn) -> Value {
        self.realm.native_function(name, func)
    }

    /// Create an iterator result object `{ value, done }`
    pub fn iter_result(&self, value: Value, done: bool) -> Result<Value> {
        let object = self.new_object();
        {
            let mut obj = object.borrow_mut();
            obj.set_own("value".into(), value)?;
            obj.set_own("done".into(), Value::Boolean(done))?;
        }
        Ok(Value::Object(object))
    }

    // ========== Property access ==========

    /// [[Get]] on any value
    pub fn get_member(&self, target: &Value, key: &PropertyKey) -> Result<Value> {
        match target {
            Value::Undefined | Value::Null => Err(Error::type_error(
                messages::cannot_read_property(&key.describe(), &target.to_js_string()),
            )),
            Value::String(s) => {
                if key.is_length() {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(index) = key.array_index() {
                    return Ok(string_unit_at(s, index)
                        .map(Value::string)
                        .unwrap_or(Value::Undefined));
                }
                Ok(get_property(&self.realm.string_prototype, key).unwrap_or(Value::Undefined))
            }
            Value::Object(object) => Ok(get_property(object, key).unwrap_or(Value::Undefined)),
            Value::Boolean(_) | Value::Number(_) | Value::Symbol(_) => Ok(Value::Undefined),
        }
    }

    /// [[Set]] on any value; primitives other than null/undefined ignore the write
    pub fn put_member(&mut self, target: &Value, key: PropertyKey, value: Value) -> Result<()> {
        match target {
            Value::Undefined | Value::Null => Err(Error::type_error(
                messages::cannot_set_property(&key.describe(), &target.to_js_string()),
            )),
            Value::Object(object) => self.set_property(object, key, value),
            _ => Ok(()),
        }
    }

    /// Store an own property, reporting writes to watched objects
    pub fn set_property(&mut self, object: &ObjectRef, key: PropertyKey, value: Value) -> Result<()> {
        let watched = object.borrow().is_watched();
        if watched {
            object.borrow_mut().set_own(key.clone(), value)?;
            self.optimizer.notify_write(object, &key, WriteKind::Store);
        } else {
            object.borrow_mut().set_own(key, value)?;
        }
        Ok(())
    }

    /// Delete an own property, reporting deletes on watched objects
    pub fn delete_property(&mut self, object: &ObjectRef, key: &PropertyKey) -> bool {
        let (deleted, watched) = {
            let mut obj = object.borrow_mut();
            (obj.delete_own(key), obj.is_watched())
        };
        if deleted && watched {
            self.optimizer.notify_write(object, key, WriteKind::Delete);
        }
        deleted
    }

    fn delete_member(&mut self, target: &Value, key: &PropertyKey) -> Result<bool> {
        match target {
            Value::Undefined | Value::Null => Err(Error::type_error(format!(
                "Cannot convert {} to object",
                target.to_js_string()
            ))),
            Value::Object(object) => Ok(self.delete_property(object, key)),
            _ => Ok(true),
        }
    }

    // ========== Names ==========

    fn current_scope(&self) -> Result<ScopeRef> {
        Ok(self.current_frame()?.scope.clone())
    }

    fn get_name(&self, name: &str) -> Result<Value> {
        let scope = self.current_scope()?;
        match resolve(&scope, name) {
            Some(Binding::Declarative(scope)) => {
                let value = scope.borrow().get(name);
                Ok(value.unwrap_or(Value::Undefined))
            }
            Some(Binding::Object { object, .. }) => {
                Ok(get_property(&object, &PropertyKey::from(name)).unwrap_or(Value::Undefined))
            }
            None => Err(Error::reference_error(messages::not_defined(name))),
        }
    }

    fn set_name(&mut self, name: &str, value: Value) -> Result<()> {
        let scope = self.current_scope()?;
        match resolve(&scope, name) {
            Some(Binding::Declarative(scope)) => {
                scope.borrow_mut().set(name, value);
                Ok(())
            }
            Some(Binding::Object { object, .. }) => {
                self.set_property(&object, PropertyKey::from(name), value)
            }
            None => {
                // Sloppy-mode assignment creates a global
                let global = self.realm.global.clone();
                self.set_property(&global, PropertyKey::from(name), value)
            }
        }
    }

    /// Bind a hoisted function declaration in the current variable scope
    fn declare_function(&mut self, name: &str, function: Value) -> Result<()> {
        let scope = self.current_scope()?;
        let object = match &scope.borrow().kind {
            ScopeKind::Object { object, .. } => Some(object.clone()),
            ScopeKind::Declarative(_) => None,
        };
        match object {
            Some(object) => self.set_property(&object, PropertyKey::from(name), function),
            None => {
                scope.borrow_mut().bind(name, function);
                Ok(())
            }
        }
    }

    fn delete_name(&mut self, name: &str) -> Result<bool> {
        let scope = self.current_scope()?;
        match resolve(&scope, name) {
            // Declared bindings are not deletable
            Some(Binding::Declarative(_)) => Ok(false),
            Some(Binding::Object { object, .. }) => {
                Ok(self.delete_property(&object, &PropertyKey::from(name)))
            }
            None => Ok(true),
        }
    }

    /// Resolve a callee name to `(this, function)`
    fn resolve_callee(&self, name: &str) -> Result<(Value, Value)> {
        let scope = self.current_scope()?;
        match resolve(&scope, name) {
            Some(Binding::Declarative(scope)) => {
                let func = scope.borrow().get(name);
                Ok((Value::Undefined, func.unwrap_or(Value::Undefined)))
            }
            Some(Binding::Object { object, with }) => {
                let func =
                    get_property(&object, &PropertyKey::from(name)).unwrap_or(Value::Undefined);
                let this = if with {
                    Value::Object(object)
                } else {
                    Value::Undefined
                };
                Ok((this, func))
            }
            None => Err(Error::reference_error(messages::not_defined(name))),
        }
    }

    // ========== Execution ==========

    /// Run a compiled script and return its completion value
    pub fn run_script(&mut self, script: &Script) -> Result<Value> {
        self.optimizer.register_sites(&script.call_sites);
        self.completion = Value::Undefined;

        let global = self.realm.global.clone();
        for name in &script.main.var_names {
            let key = PropertyKey::from(name.as_str());
            let declared = global.borrow().has_own(&key);
            if !declared {
                self.set_property(&global, key, Value::Undefined)?;
            }
        }

        tracing::debug!(
            target: "spreadcall::vm",
            sites = script.call_sites.len(),
            "running script"
        );

        let depth = self.frames.len();
        let stack_len = self.stack.len();
        self.frames.push(CallFrame::for_script(
            script.main.clone(),
            self.global_scope.clone(),
            Value::Object(global),
            stack_len,
        ));

        let result = self.execute_until_depth(depth);
        if result.is_err() {
            self.frames.truncate(depth);
            self.stack.truncate(stack_len);
        }
        result
    }

    /// Call a function value from native code
    pub fn call_function(&mut self, func: &Value, this: Value, args: &[Value]) -> Result<Value> {
        let Value::Object(object) = func else {
            return Err(Error::type_error(messages::not_a_function(&func.inspect())));
        };

        let kind = {
            let obj = object.borrow();
            match &obj.kind {
                ObjectKind::NativeFunction { func, .. } => Callee::Native(func.clone()),
                ObjectKind::Closure(closure) => Callee::Closure(closure.clone()),
                _ => return Err(Error::type_error(messages::not_a_function(&func.inspect()))),
            }
        };

        match kind {
            Callee::Native(native) => native(self, this, args),
            Callee::Closure(closure) => {
                let depth = self.frames.len();
                let stack_len = self.stack.len();
                self.enter_closure(object.clone(), closure, this, args.to_vec())?;
                let result = self.execute_until_depth(depth);
                if result.is_err() {
                    self.frames.truncate(depth);
                    self.stack.truncate(stack_len);
                }
                result
            }
        }
    }

    /// Call from bytecode: natives run now, closures push a frame
    fn call_value(&mut self, func: Value, this: Value, args: Vec<Value>) -> Result<()> {
        let Value::Object(object) = &func else {
            return Err(Error::type_error(messages::not_a_function(&func.inspect())));
        };

        let kind = {
            let obj = object.borrow();
            match &obj.kind {
                ObjectKind::NativeFunction { func, .. } => Callee::Native(func.clone()),
                ObjectKind::Closure(closure) => Callee::Closure(closure.clone()),
                _ => return Err(Error::type_error(messages::not_a_function(&func.inspect()))),
            }
        };

        match kind {
            Callee::Native(native) => {
                let result = native(self, this, &args)?;
                self.push(result)
            }
            Callee::Closure(closure) => self.enter_closure(object.clone(), closure, this, args),
        }
    }

    /// Push a frame for a closure with its parameters bound
    fn enter_closure(
        &mut self,
        callee: ObjectRef,
        closure: Closure,
        this: Value,
        args: Vec<Value>,
    ) -> Result<()> {
        if self.frames.len() >= self.max_call_depth {
            tracing::warn!(
                target: "spreadcall::vm",
                depth = self.frames.len(),
                "call stack limit reached"
            );
            return Err(Error::range_error(messages::MAXIMUM_CALL_STACK));
        }

        let template = closure.template;
        let rest = template.rest.as_ref().map(|_| {
            self.new_array(
                args.iter()
                    .skip(template.params.len())
                    .cloned()
                    .map(Some)
                    .collect(),
            )
        });

        let scope = Scope::declarative(closure.scope);
        {
            let mut s = scope.borrow_mut();
            if template.self_binding {
                s.bind(&template.name, Value::Object(callee.clone()));
            }
            for (i, param) in template.params.iter().enumerate() {
                s.bind(param, args.get(i).cloned().unwrap_or(Value::Undefined));
            }
            if let (Some(name), Some(rest)) = (&template.rest, rest) {
                s.bind(name, rest);
            }
            for name in &template.var_names {
                s.declare(name);
            }
        }

        let this = if this.is_nullish() {
            Value::Object(self.realm.global.clone())
        } else {
            this
        };

        let stack_base = self.stack.len();
        self.frames
            .push(CallFrame::for_closure(callee, template, scope, this, stack_base));
        Ok(())
    }

    /// Execute until frames.len() returns to target_depth
    fn execute_until_depth(&mut self, target_depth: usize) -> Result<Value> {
        loop {
            match self.step(target_depth) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(error) => return Err(self.error_with_stack(error)),
            }
        }
    }

    /// Execute one instruction; `Some` once the frame at `target_depth` returns
    fn step(&mut self, target_depth: usize) -> Result<Option<Value>> {
        let opcode = {
            let frame = self.current_frame_mut()?;
            let byte = *frame
                .template
                .chunk
                .code
                .get(frame.ip)
                .ok_or_else(|| Error::internal("Unexpected end of bytecode"))?;
            frame.ip += 1;
            Opcode::from_u8(byte)
                .ok_or_else(|| Error::internal(format!("Unknown opcode {:#04x}", byte)))?
        };

        match opcode {
            Opcode::Nop => {}

            // ========== Stack ==========
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek(0)?.clone();
                self.push(value)?;
            }
            Opcode::Dup2 => {
                let a = self.peek(1)?.clone();
                let b = self.peek(0)?.clone();
                self.push(a)?;
                self.push(b)?;
            }
            Opcode::Rot4 => {
                let top = self.pop()?;
                let at = self
                    .stack
                    .len()
                    .checked_sub(3)
                    .ok_or_else(|| Error::internal("Stack underflow"))?;
                self.stack.insert(at, top);
            }

            // ========== Constants ==========
            Opcode::Constant => {
                let index = self.read_u16()?;
                let value = self.constant(index)?;
                self.push(value)?;
            }
            Opcode::Undefined => self.push(Value::Undefined)?,
            Opcode::Null => self.push(Value::Null)?,
            Opcode::True => self.push(Value::Boolean(true))?,
            Opcode::False => self.push(Value::Boolean(false))?,

            // ========== Names ==========
            Opcode::GetName => {
                let name = self.read_name()?;
                let value = self.get_name(&name)?;
                self.push(value)?;
            }
            Opcode::SetName => {
                let name = self.read_name()?;
                let value = self.peek(0)?.clone();
                self.set_name(&name, value)?;
            }
            Opcode::DeclareFunction => {
                let name = self.read_name()?;
                let function = self.pop()?;
                self.declare_function(&name, function)?;
            }
            Opcode::TypeofName => {
                let name = self.read_name()?;
                let type_name = match self.get_name(&name) {
                    Ok(value) => value.type_of(),
                    Err(_) => "undefined",
                };
                self.push(Value::string(type_name))?;
            }
            Opcode::DeleteName => {
                let name = self.read_name()?;
                let deleted = self.delete_name(&name)?;
                self.push(Value::Boolean(deleted))?;
            }
            Opcode::ResolveCallee => {
                let name = self.read_name()?;
                let (this, func) = self.resolve_callee(&name)?;
                self.push(this)?;
                self.push(func)?;
            }

            // ========== Properties ==========
            Opcode::GetProperty => {
                let name = self.read_name()?;
                let object = self.pop()?;
                let value = self.get_member(&object, &PropertyKey::from(name))?;
                self.push(value)?;
            }
            Opcode::SetProperty => {
                let name = self.read_name()?;
                let value = self.pop()?;
                let object = self.pop()?;
                self.put_member(&object, PropertyKey::from(name), value.clone())?;
                self.push(value)?;
            }
            Opcode::GetElement => {
                let key = self.pop()?.to_property_key();
                let object = self.pop()?;
                let value = self.get_member(&object, &key)?;
                self.push(value)?;
            }
            Opcode::SetElement => {
                let value = self.pop()?;
                let key = self.pop()?.to_property_key();
                let object = self.pop()?;
                self.put_member(&object, key, value.clone())?;
                self.push(value)?;
            }
            Opcode::DeleteElement => {
                let key = self.pop()?.to_property_key();
                let object = self.pop()?;
                let deleted = self.delete_member(&object, &key)?;
                self.push(Value::Boolean(deleted))?;
            }
            Opcode::DefineField => {
                let value = self.pop()?;
                let key = self.pop()?.to_property_key();
                let object = self.peek(0)?.clone();
                if let Value::Object(object) = object {
                    object.borrow_mut().set_own(key, value)?;
                }
            }

            // ========== Arithmetic ==========
            Opcode::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = if matches!(a, Value::String(_) | Value::Object(_))
                    || matches!(b, Value::String(_) | Value::Object(_))
                {
                    let mut s = a.to_string_value()?;
                    s.push_str(&b.to_string_value()?);
                    Value::String(s)
                } else {
                    Value::Number(a.to_number()? + b.to_number()?)
                };
                self.push(result)?;
            }
            Opcode::Sub => self.binary_number_op(|a, b| a - b)?,
            Opcode::Mul => self.binary_number_op(|a, b| a * b)?,
            Opcode::Div => self.binary_number_op(|a, b| a / b)?,
            Opcode::Mod => self.binary_number_op(|a, b| a % b)?,
            Opcode::Neg => {
                let n = self.pop()?.to_number()?;
                self.push(Value::Number(-n))?;
            }
            Opcode::ToNumber => {
                let n = self.pop()?.to_number()?;
                self.push(Value::Number(n))?;
            }
            Opcode::Increment => {
                let n = self.pop()?.to_number()?;
                self.push(Value::Number(n + 1.0))?;
            }
            Opcode::Decrement => {
                let n = self.pop()?.to_number()?;
                self.push(Value::Number(n - 1.0))?;
            }

            // ========== Comparison ==========
            Opcode::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Boolean(a.loose_equals(&b)?))?;
            }
            Opcode::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Boolean(!a.loose_equals(&b)?))?;
            }
            Opcode::StrictEq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Boolean(a.strict_equals(&b)))?;
            }
            Opcode::StrictNe => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Boolean(!a.strict_equals(&b)))?;
            }
            Opcode::Lt => self.compare_op(|o| o == Ordering::Less)?,
            Opcode::Le => self.compare_op(|o| o != Ordering::Greater)?,
            Opcode::Gt => self.compare_op(|o| o == Ordering::Greater)?,
            Opcode::Ge => self.compare_op(|o| o != Ordering::Less)?,

            // ========== Unary ==========
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Boolean(!value.to_boolean()))?;
            }
            Opcode::Typeof => {
                let value = self.pop()?;
                self.push(Value::string(value.type_of()))?;
            }

            // ========== Control flow ==========
            Opcode::Jump => {
                let offset = self.read_i16()?;
                self.jump(offset)?;
            }
            Opcode::JumpIfFalse => {
                let offset = self.read_i16()?;
                if !self.pop()?.to_boolean() {
                    self.jump(offset)?;
                }
            }
            Opcode::JumpIfTrue => {
                let offset = self.read_i16()?;
                if self.pop()?.to_boolean() {
                    self.jump(offset)?;
                }
            }

            // ========== Functions ==========
            Opcode::Call => {
                let arg_count = self.read_u8()? as usize;
                let at = self
                    .stack
                    .len()
                    .checked_sub(arg_count)
                    .ok_or_else(|| Error::internal("Stack underflow"))?;
                let args = self.stack.split_off(at);
                let func = self.pop()?;
                let this = self.pop()?;
                self.call_value(func, this, args)?;
            }
            Opcode::CallSpread => {
                let site = CallSiteId(self.read_u16()?);
                let description = self.read_name()?;
                let iterable = self.pop()?;
                let func = self.pop()?;
                let this = self.pop()?;
                let args = match self.optimizer.on_spread_call(site, &iterable) {
                    SpreadPath::Fast(args) => args,
                    SpreadPath::Baseline => self.iterate_to_list(&iterable, &description)?,
                };
                self.call_value(func, this, args)?;
            }
            Opcode::CallArray => {
                let array = self.pop()?;
                let func = self.pop()?;
                let this = self.pop()?;
                let args = match &array {
                    Value::Object(object) => match &object.borrow().kind {
                        ObjectKind::Array(elements) => elements
                            .iter()
                            .map(|e| e.clone().unwrap_or(Value::Undefined))
                            .collect(),
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                self.call_value(func, this, args)?;
            }
            Opcode::CreateClosure => {
                let index = self.read_u16()?;
                let frame = self.current_frame()?;
                let template = frame
                    .template
                    .chunk
                    .functions
                    .get(index as usize)
                    .cloned()
                    .ok_or_else(|| Error::internal("Invalid function index"))?;
                let scope = frame.scope.clone();
                let closure = Object::new(
                    ObjectKind::Closure(Closure { template, scope }),
                    Some(self.realm.function_prototype.clone()),
                );
                self.push(Value::Object(closure.into_ref()))?;
            }
            Opcode::Return => {
                let result = self.pop()?;
                return self.return_from_frame(result, target_depth);
            }
            Opcode::ReturnUndefined => {
                return self.return_from_frame(Value::Undefined, target_depth);
            }
            Opcode::This => {
                let this = self.current_frame()?.this.clone();
                self.push(this)?;
            }

            // ========== Arrays and objects ==========
            Opcode::NewArray => {
                let array = self.new_array(Vec::new());
                self.push(array)?;
            }
            Opcode::ArrayPush => {
                let value = self.pop()?;
                self.with_top_array(|elements| elements.push(Some(value)))?;
            }
            Opcode::ArrayHole => {
                self.with_top_array(|elements| elements.push(None))?;
            }
            Opcode::ArrayExtend => {
                let description = self.read_name()?;
                let iterable = self.pop()?;
                let values = self.iterate_to_list(&iterable, &description)?;
                self.with_top_array(|elements| {
                    spread::extended_length(elements.len(), values.len())?;
                    elements.extend(values.into_iter().map(Some));
                    Ok::<(), Error>(())
                })??;
            }
            Opcode::NewObject => {
                let object = self.new_object();
                self.push(Value::Object(object))?;
            }

            // ========== Scopes ==========
            Opcode::PushWith => {
                let target = self.pop()?;
                let Value::Object(object) = target else {
                    return Err(Error::type_error(format!(
                        "Cannot use {} as a with scope object",
                        target.inspect()
                    )));
                };
                let frame = self.current_frame_mut()?;
                frame.scope = Scope::with_object(object, frame.scope.clone());
            }
            Opcode::PopWith => {
                let frame = self.current_frame_mut()?;
                let parent = frame
                    .scope
                    .borrow()
                    .parent
                    .clone()
                    .ok_or_else(|| Error::internal("with scope underflow"))?;
                frame.scope = parent;
            }

            // ========== Completion ==========
            Opcode::SetCompletion => {
                self.completion = self.pop()?;
            }
            Opcode::Completion => {
                let value = self.completion.clone();
                self.push(value)?;
            }
        }

        Ok(None)
    }

    fn return_from_frame(&mut self, result: Value, target_depth: usize) -> Result<Option<Value>> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::internal("Return without a frame"))?;
        self.stack.truncate(frame.stack_base);

        if self.frames.len() <= target_depth {
            return Ok(Some(result));
        }
        self.push(result)?;
        Ok(None)
    }

    /// Capture the current stack trace
    pub fn capture_stack_trace(&self) -> StackTrace {
        let mut trace = StackTrace::new();
        for frame in self.frames.iter().rev() {
            let mut stack_frame = StackFrame::new(frame.function_name(), frame.current_line());
            if let Some(ref file) = self.current_file {
                stack_frame = stack_frame.with_file(file.clone());
            }
            trace.push(stack_frame);
        }
        trace
    }

    /// Add stack trace to an error
    fn error_with_stack(&self, error: Error) -> Error {
        error.with_stack_trace(self.capture_stack_trace())
    }

    // ========== Stack helpers ==========

    #[inline]
    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= MAX_STACK_SIZE {
            return Err(Error::range_error(messages::MAXIMUM_CALL_STACK));
        }
        self.stack.push(value);
        Ok(())
    }

    #[inline]
    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Error::internal("Stack underflow"))
    }

    #[inline]
    fn peek(&self, offset: usize) -> Result<&Value> {
        self.stack
            .len()
            .checked_sub(1 + offset)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| Error::internal("Stack underflow"))
    }

    /// Pop two numbers and push `op(a, b)`
    #[inline]
    fn binary_number_op<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(f64, f64) -> f64,
    {
        let b = self.pop()?.to_number()?;
        let a = self.pop()?.to_number()?;
        self.push(Value::Number(op(a, b)))
    }

    /// Relational comparison; strings compare by code units, anything else numerically
    fn compare_op<F>(&mut self, accept: F) -> Result<()>
    where
        F: FnOnce(Ordering) -> bool,
    {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (&a, &b) {
            (Value::String(x), Value::String(y)) => Some(x.encode_utf16().cmp(y.encode_utf16())),
            _ => a.to_number()?.partial_cmp(&b.to_number()?),
        };
        self.push(Value::Boolean(ordering.map(accept).unwrap_or(false)))
    }

    fn with_top_array<R>(
        &mut self,
        update: impl FnOnce(&mut Vec<Option<Value>>) -> R,
    ) -> Result<R> {
        let Value::Object(object) = self.peek(0)? else {
            return Err(Error::internal("Expected array on stack"));
        };
        let mut obj = object.borrow_mut();
        match &mut obj.kind {
            ObjectKind::Array(elements) => Ok(update(elements)),
            _ => Err(Error::internal("Expected array on stack")),
        }
    }

    fn current_frame(&self) -> Result<&CallFrame> {
        self.frames
            .last()
            .ok_or_else(|| Error::internal("No active frame"))
    }

    fn current_frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::internal("No active frame"))
    }

    fn read_u8(&mut self) -> Result<u8> {
        let frame = self.current_frame_mut()?;
        let byte = *frame
            .template
            .chunk
            .code
            .get(frame.ip)
            .ok_or_else(|| Error::internal("Unexpected end of bytecode"))?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b1 = self.read_u8()?;
        let b2 = self.read_u8()?;
        Ok(u16::from_le_bytes([b1, b2]))
    }

    fn read_i16(&mut self) -> Result<i16> {
        let b1 = self.read_u8()?;
        let b2 = self.read_u8()?;
        Ok(i16::from_le_bytes([b1, b2]))
    }

    fn jump(&mut self, offset: i16) -> Result<()> {
        let frame = self.current_frame_mut()?;
        frame.ip = frame
            .ip
            .checked_add_signed(offset as isize)
            .ok_or_else(|| Error::internal("Jump out of bounds"))?;
        Ok(())
    }

    fn constant(&self, index: u16) -> Result<Value> {
        self.current_frame()?
            .template
            .chunk
            .get_constant(index)
            .cloned()
            .ok_or_else(|| Error::internal("Invalid constant index"))
    }

    /// Read a u16 operand naming a string constant
    fn read_name(&mut self) -> Result<String> {
        let index = self.read_u16()?;
        match self.constant(index)? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_js_string()),
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// What a call dispatches to, cloned out of the callee's borrow
enum Callee {
    Native(NativeFn),
    Closure(Closure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile;
    use crate::error::ErrorKind;
    use crate::jit::OptimizerConfig;

    fn run(source: &str) -> Result<Value> {
        let script = compile(source)?;
        VM::new().run_script(&script)
    }

    #[test]
    fn test_arithmetic_and_completion() {
        assert_eq!(run("1 + 2 * 3;").unwrap(), Value::Number(7.0));
        assert_eq!(run("'a' + 1;").unwrap(), Value::string("a1"));
        assert_eq!(run("7 % 4 - 1;").unwrap(), Value::Number(2.0));
        assert_eq!(run("var x = 1;").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_recursion_stays_on_frame_stack() {
        let result = run("function f(n) { return n === 0 ? 0 : 1 + f(n - 1); } f(500);").unwrap();
        assert_eq!(result, Value::Number(500.0));
    }

    #[test]
    fn test_call_depth_limit() {
        let err = run("function f() { return f(); } f();").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RangeError));
        assert!(err.to_string().contains("Maximum call stack size exceeded"));
    }

    #[test]
    fn test_custom_call_depth() {
        let config = RuntimeConfig {
            max_call_depth: 8,
            ..RuntimeConfig::default()
        };
        let mut vm = VM::with_config(&config);
        let script = compile("function f(n) { return n ? f(n - 1) : 0; } f(20);").unwrap();
        assert!(vm.run_script(&script).is_err());
        // The VM is usable after an error
        let script = compile("function g(n) { return n ? g(n - 1) : 'ok'; } g(3);").unwrap();
        assert_eq!(vm.run_script(&script).unwrap(), Value::string("ok"));
    }

    #[test]
    fn test_with_scope_this_and_lookup() {
        let result = run(
            r#"
            var o = { v: 5, get: function() { return this.v; } };
            var r;
            with (o) { r = get() + v; }
            r;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(10.0));
    }

    #[test]
    fn test_with_break_restores_scope() {
        let result = run(
            r#"
            var v = 'outer';
            for (var i = 0; i < 3; i++) { with ({ v: 'inner' }) { if (i === 1) break; } }
            v;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("outer"));
    }

    #[test]
    fn test_reference_error_has_stack_trace() {
        let err = run("function outer() { return missing; }\nouter();").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ReferenceError));
        let text = err.to_string();
        assert!(text.contains("missing is not defined"));
        assert!(text.contains("at outer"));
        assert!(text.contains("at <script>"));
    }

    #[test]
    fn test_watched_store_reaches_monitor() {
        let script = compile("Array.prototype[Symbol.iterator] = null;").unwrap();
        let mut vm = VM::new();
        vm.run_script(&script).unwrap();
        let stats = vm.stats();
        assert_eq!(stats.epoch, 1);
        assert!(!stats.fuse_intact);
    }

    #[test]
    fn test_spread_site_optimizes_in_vm() {
        let config = RuntimeConfig {
            optimizer: OptimizerConfig::default().with_warmup_threshold(5),
            ..RuntimeConfig::default()
        };
        let mut vm = VM::with_config(&config);
        let script = compile(
            "function add(a, b) { return a + b; } var s = 0; for (var i = 0; i < 20; i++) { s = s + add(...[i, 1]); } s;",
        )
        .unwrap();
        assert_eq!(vm.run_script(&script).unwrap(), Value::Number(210.0));
        let stats = vm.stats();
        assert_eq!(stats.sites[0].state, "optimized");
        assert_eq!(stats.sites[0].fast_path_hits, 15);
    }

    #[test]
    fn test_named_function_expression_sees_itself() {
        let result = run("var f = function fact(n) { return n <= 1 ? 1 : n * fact(n - 1); }; f(5);")
            .unwrap();
        assert_eq!(result, Value::Number(120.0));
    }
}

//! Runtime environment for spreadcall
//!
//! This module provides the runtime execution environment including
//! the interpreter, value types, and built-in functions.

mod builtins;
pub mod scope;
pub mod value;
mod vm;

pub use builtins::Realm;
pub use value::{number_to_string, Object, ObjectKind, ObjectRef, PropertyKey, Symbol, Value};
pub use vm::{CallFrame, MAX_CALL_DEPTH, VM};

use crate::bytecode::compile_program;
use crate::error::{Error, Result};
use crate::jit::{OptimizerConfig, OptimizerStats};
use crate::parser::parse;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub optimizer: OptimizerConfig,
    /// Frames allowed before `RangeError: Maximum call stack size exceeded`
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

/// The spreadcall runtime
///
/// Each `eval` compiles a new script against the same VM, so globals,
/// intrinsic mutations and call-site statistics persist across calls.
pub struct Runtime {
    vm: VM,
    /// First call-site id for the next compiled script
    next_site_id: u16,
}

impl Runtime {
    /// Create a new runtime with the default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            vm: VM::with_config(&config),
            next_site_id: 0,
        }
    }

    /// Evaluate JavaScript source code
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        let program = parse(source).map_err(|e| e.with_source_context(source))?;
        let script = compile_program(&program, self.next_site_id)?;
        self.next_site_id = self
            .next_site_id
            .checked_add(script.call_sites.len() as u16)
            .ok_or_else(|| Error::syntax_error("Too many spread call sites"))?;
        self.vm.run_script(&script)
    }

    /// Evaluate a script file's contents, naming the file in stack traces
    pub fn eval_file(&mut self, path: &Path, source: &str) -> Result<Value> {
        self.vm.set_file_name(path.display().to_string());
        self.eval(source)
    }

    /// Get a global value
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.vm.get_global(name)
    }

    /// Set a global value
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<()> {
        self.vm.set_global(name, value)
    }

    /// Register a native function
    pub fn register_function<F>(&mut self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        self.vm.register_native(name, move |_vm, _this, args| func(args))
    }

    /// Optimizer statistics accumulated so far
    pub fn stats(&self) -> OptimizerStats {
        self.vm.stats()
    }

    /// Collect `print` output instead of writing to stdout
    pub fn capture_output(&mut self) -> Rc<RefCell<Vec<String>>> {
        self.vm.capture_output()
    }

    pub fn vm(&self) -> &VM {
        &self.vm
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_runtime_eval() {
        let mut runtime = Runtime::new();
        let result = runtime.eval("1 + 2").unwrap();
        assert_eq!(result, Value::Number(3.0));
    }

    #[test]
    fn test_runtime_variables() {
        let mut runtime = Runtime::new();
        let result = runtime.eval("let x = 10; x * 2").unwrap();
        assert_eq!(result, Value::Number(20.0));
    }

    #[test]
    fn test_runtime_functions() {
        let mut runtime = Runtime::new();
        let result = runtime
            .eval("function add(a, b) { return a + b; } add(3, 4)")
            .unwrap();
        assert_eq!(result, Value::Number(7.0));
    }

    #[test]
    fn test_globals_persist_across_evals() {
        let mut runtime = Runtime::new();
        runtime.eval("var counter = 1;").unwrap();
        runtime.eval("counter += 41;").unwrap();
        assert_eq!(runtime.get_global("counter"), Some(Value::Number(42.0)));
    }

    #[test]
    fn test_site_ids_continue_across_evals() {
        let mut runtime = Runtime::new();
        runtime.eval("function f() {} f(...[1]);").unwrap();
        runtime.eval("f(...[2]); f(...[3]);").unwrap();
        let ids: Vec<u16> = runtime.stats().sites.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_register_function() {
        let mut runtime = Runtime::new();
        runtime
            .register_function("double", |args| {
                let n = args.first().cloned().unwrap_or(Value::Undefined).to_number()?;
                Ok(Value::Number(n * 2.0))
            })
            .unwrap();
        assert_eq!(runtime.eval("double(21)").unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_set_global() {
        let mut runtime = Runtime::new();
        runtime.set_global("limit", Value::Number(3.0)).unwrap();
        assert_eq!(runtime.eval("limit + 1").unwrap(), Value::Number(4.0));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "optimizer": { "enabled": false }, "max_call_depth": 64 }"#)
                .unwrap();
        assert!(!config.optimizer.enabled);
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.optimizer.warmup_threshold, crate::jit::DEFAULT_WARMUP_THRESHOLD);
    }
}

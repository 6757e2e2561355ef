//! VM type definitions
//!
//! This module contains types used by the VM.

use super::super::scope::ScopeRef;
use super::super::value::{ObjectRef, Value};
use crate::bytecode::FunctionTemplate;
use std::rc::Rc;

/// Default maximum number of nested calls
pub const MAX_CALL_DEPTH: usize = 1024;

/// A call frame on the call stack
#[derive(Clone)]
pub struct CallFrame {
    /// Code being executed
    pub template: Rc<FunctionTemplate>,
    /// Instruction pointer
    pub ip: usize,
    /// Stack height at entry; the return value lands here
    pub stack_base: usize,
    /// Innermost scope (changes on `with`)
    pub scope: ScopeRef,
    /// The `this` value
    pub this: Value,
    /// Function object being run, `None` for scripts
    pub callee: Option<ObjectRef>,
}

impl CallFrame {
    /// Create a frame for top-level script code
    pub fn for_script(
        template: Rc<FunctionTemplate>,
        scope: ScopeRef,
        this: Value,
        stack_base: usize,
    ) -> Self {
        Self {
            template,
            ip: 0,
            stack_base,
            scope,
            this,
            callee: None,
        }
    }

    /// Create a frame for a closure call
    pub fn for_closure(
        callee: ObjectRef,
        template: Rc<FunctionTemplate>,
        scope: ScopeRef,
        this: Value,
        stack_base: usize,
    ) -> Self {
        Self {
            template,
            ip: 0,
            stack_base,
            scope,
            this,
            callee: Some(callee),
        }
    }

    /// Name shown in stack traces
    pub fn function_name(&self) -> &str {
        if self.callee.is_none() {
            "<script>"
        } else {
            self.template.display_name()
        }
    }

    /// Source line of the instruction being executed
    pub fn current_line(&self) -> u32 {
        self.template.chunk.get_line(self.ip.saturating_sub(1))
    }
}

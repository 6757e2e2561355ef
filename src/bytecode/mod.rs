//! Bytecode representation and instruction set
//!
//! This module defines the bytecode format used by the spreadcall VM.
//! The bytecode is stack-based; names are resolved at run time through the
//! scope chain so that `with` scopes behave dynamically.

mod compiler;
mod opcode;

pub use compiler::{compile, compile_program, Compiler};
pub use opcode::Opcode;

use crate::runtime::Value;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Program-wide identifier of a spread call site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CallSiteId(pub u16);

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site#{}", self.0)
    }
}

/// Static description of a spread call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteInfo {
    pub id: CallSiteId,
    /// Source line of the call
    pub line: u32,
    /// Source-like rendering, e.g. `add(...rest)`
    pub label: String,
}

/// A compiled bytecode chunk
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Bytecode instructions
    pub code: Vec<u8>,
    /// Constant pool
    pub constants: Vec<Value>,
    /// Line number information for debugging
    pub lines: Vec<u32>,
    /// Nested function templates referenced by `CreateClosure`
    pub functions: Vec<Rc<FunctionTemplate>>,
}

impl Chunk {
    /// Create a new empty chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a byte to the chunk with line information
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write an opcode to the chunk
    pub fn write_opcode(&mut self, opcode: Opcode, line: u32) {
        self.write(opcode as u8, line);
    }

    /// Write a little-endian u16 operand
    pub fn write_u16(&mut self, value: u16, line: u32) {
        let [lo, hi] = value.to_le_bytes();
        self.write(lo, line);
        self.write(hi, line);
    }

    /// Get the line number for a bytecode offset
    pub fn get_line(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(1)
    }

    /// Add a constant to the pool and return its index
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        // Reuse strings and numbers already in the pool
        if let Some(i) = self.constants.iter().position(|existing| existing.same_value(&value)) {
            return Some(i as u16);
        }

        let index = u16::try_from(self.constants.len()).ok()?;
        self.constants.push(value);
        Some(index)
    }

    /// Get a constant from the pool
    pub fn get_constant(&self, index: u16) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    fn read_u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = self.code.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Disassemble the chunk for debugging
    pub fn disassemble(&self, name: &str) -> String {
        let mut output = format!("== {} ==\n", name);
        let mut offset = 0;

        while offset < self.code.len() {
            let (instruction, new_offset) = self.disassemble_instruction(offset);
            output.push_str(&instruction);
            output.push('\n');
            offset = new_offset;
        }

        output
    }

    /// Disassemble a single instruction
    pub fn disassemble_instruction(&self, offset: usize) -> (String, usize) {
        let line = self.lines.get(offset).copied().unwrap_or(0);
        let line_str = if offset > 0 && self.lines.get(offset - 1) == Some(&line) {
            "   |".to_string()
        } else {
            format!("{:4}", line)
        };

        match Opcode::from_u8(self.code[offset]) {
            Some(op) => {
                let operands = self.format_operands(op, offset + 1);
                let instruction = format!(
                    "{:04} {} {:16} {}",
                    offset,
                    line_str,
                    format!("{:?}", op),
                    operands
                );
                (instruction.trim_end().to_string(), offset + op.instruction_size())
            }
            None => {
                let instruction =
                    format!("{:04} {} UNKNOWN({})", offset, line_str, self.code[offset]);
                (instruction, offset + 1)
            }
        }
    }

    fn format_operands(&self, opcode: Opcode, offset: usize) -> String {
        let constant = |index: u16| match self.constants.get(index as usize) {
            Some(value) => format!("{} ({})", index, value.inspect()),
            None => format!("{}", index),
        };

        match opcode {
            Opcode::Call => match self.code.get(offset) {
                Some(argc) => format!("args={}", argc),
                None => "???".to_string(),
            },

            Opcode::Constant
            | Opcode::GetName
            | Opcode::SetName
            | Opcode::DeclareFunction
            | Opcode::TypeofName
            | Opcode::DeleteName
            | Opcode::ResolveCallee
            | Opcode::GetProperty
            | Opcode::SetProperty
            | Opcode::ArrayExtend => match self.read_u16_at(offset) {
                Some(index) => constant(index),
                None => "???".to_string(),
            },

            Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                match self.read_u16_at(offset) {
                    Some(raw) => {
                        let jump = raw as i16;
                        let target = offset as i64 + 2 + jump as i64;
                        format!("{} -> {}", jump, target)
                    }
                    None => "???".to_string(),
                }
            }

            Opcode::CreateClosure => match self.read_u16_at(offset) {
                Some(index) => match self.functions.get(index as usize) {
                    Some(func) => format!("{} <fn {}>", index, func.display_name()),
                    None => format!("{}", index),
                },
                None => "???".to_string(),
            },

            Opcode::CallSpread => {
                match (self.read_u16_at(offset), self.read_u16_at(offset + 2)) {
                    (Some(site), Some(desc)) => {
                        format!("{} {}", CallSiteId(site), constant(desc))
                    }
                    _ => "???".to_string(),
                }
            }

            _ => String::new(),
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.disassemble("chunk"))
    }
}

/// A compiled function body plus the layout its scope needs on entry
#[derive(Debug, Clone, Default)]
pub struct FunctionTemplate {
    /// Function name; empty for anonymous functions and the script
    pub name: String,
    /// Positional parameter names
    pub params: Vec<String>,
    /// Rest parameter name
    pub rest: Option<String>,
    /// Hoisted `var`/`let`/`const` names
    pub var_names: Vec<String>,
    /// Bytecode
    pub chunk: Chunk,
    /// Line of the declaration
    pub line: u32,
    /// Named function expressions see their own name
    pub self_binding: bool,
}

impl FunctionTemplate {
    /// Name used in stack traces
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }

    /// Disassemble this function and every nested one
    pub fn disassemble(&self) -> String {
        let title = if self.line == 0 {
            "<script>".to_string()
        } else {
            format!("{} (line {})", self.display_name(), self.line)
        };
        let mut output = self.chunk.disassemble(&title);
        for nested in &self.chunk.functions {
            output.push('\n');
            output.push_str(&nested.disassemble());
        }
        output
    }
}

/// A compiled script: the top-level template plus its spread call sites
#[derive(Debug, Clone)]
pub struct Script {
    pub main: Rc<FunctionTemplate>,
    pub call_sites: Vec<CallSiteInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_creation() {
        let mut chunk = Chunk::new();
        chunk.write_opcode(Opcode::Constant, 1);
        let idx = chunk.add_constant(Value::Number(42.0)).unwrap();
        chunk.write_u16(idx, 1);

        assert_eq!(chunk.code.len(), 3);
        assert_eq!(chunk.constants.len(), 1);
        assert_eq!(chunk.add_constant(Value::Number(42.0)), Some(0));
    }

    #[test]
    fn test_constants_distinguish_signed_zero() {
        let mut chunk = Chunk::new();
        let pos = chunk.add_constant(Value::Number(0.0)).unwrap();
        let neg = chunk.add_constant(Value::Number(-0.0)).unwrap();
        assert_ne!(pos, neg);
    }

    #[test]
    fn test_disassemble() {
        let mut chunk = Chunk::new();
        chunk.write_opcode(Opcode::Constant, 1);
        let idx = chunk.add_constant(Value::Number(42.0)).unwrap();
        chunk.write_u16(idx, 1);
        chunk.write_opcode(Opcode::CallSpread, 2);
        chunk.write_u16(3, 2);
        let desc = chunk.add_constant(Value::string("rest")).unwrap();
        chunk.write_u16(desc, 2);
        chunk.write_opcode(Opcode::Return, 2);

        let output = chunk.disassemble("test");
        assert!(output.contains("Constant"));
        assert!(output.contains("42"));
        assert!(output.contains("CallSpread"));
        assert!(output.contains("site#3"));
        assert!(output.contains("Return"));
    }
}

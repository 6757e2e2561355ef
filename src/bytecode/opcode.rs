//! Bytecode opcodes for the spreadcall VM
//!
//! This module defines the instruction set used by the interpreter.
//! Operands are little-endian and follow the opcode byte directly.

/// Bytecode opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    // ========== Stack Operations ==========
    /// No operation
    Nop = 0x00,
    /// Pop the top value from the stack
    Pop = 0x01,
    /// Duplicate the top value on the stack
    Dup = 0x02,
    /// Duplicate the top two values: [a, b] -> [a, b, a, b]
    Dup2 = 0x03,
    /// Move the top value under the next three: [a, b, c, d] -> [d, a, b, c]
    Rot4 = 0x05,

    // ========== Constants ==========
    /// Load a constant from the constant pool
    /// Operands: constant_index (u16)
    Constant = 0x10,
    /// Push undefined
    Undefined = 0x11,
    /// Push null
    Null = 0x12,
    /// Push true
    True = 0x13,
    /// Push false
    False = 0x14,

    // ========== Names ==========
    /// Resolve a name through the scope chain and push its value
    /// Operands: name_index (u16)
    GetName = 0x20,
    /// Store the top value into a name (value stays on the stack)
    /// Operands: name_index (u16)
    SetName = 0x21,
    /// Bind the popped function in the current variable scope
    /// Operands: name_index (u16)
    DeclareFunction = 0x22,
    /// typeof applied to a name; unresolvable names give "undefined"
    /// Operands: name_index (u16)
    TypeofName = 0x23,
    /// delete applied to a name
    /// Operands: name_index (u16)
    DeleteName = 0x24,
    /// Resolve a callee name, pushing `this` then the function
    /// Operands: name_index (u16)
    ResolveCallee = 0x25,

    // ========== Properties ==========
    /// [object] -> [value]
    /// Operands: name_index (u16)
    GetProperty = 0x30,
    /// [object, value] -> [value]
    /// Operands: name_index (u16)
    SetProperty = 0x31,
    /// [object, key] -> [value]
    GetElement = 0x32,
    /// [object, key, value] -> [value]
    SetElement = 0x33,
    /// [object, key] -> [boolean]
    DeleteElement = 0x34,
    /// Object literal field: [object, key, value] -> [object]
    DefineField = 0x35,

    // ========== Arithmetic ==========
    /// Add two values
    Add = 0x40,
    /// Subtract two values
    Sub = 0x41,
    /// Multiply two values
    Mul = 0x42,
    /// Divide two values
    Div = 0x43,
    /// Modulo two values
    Mod = 0x44,
    /// Negate a value
    Neg = 0x45,
    /// Unary plus (ToNumber)
    ToNumber = 0x46,
    /// Increment
    Increment = 0x47,
    /// Decrement
    Decrement = 0x48,

    // ========== Comparison ==========
    /// Equal (==)
    Eq = 0x50,
    /// Not equal (!=)
    Ne = 0x51,
    /// Strict equal (===)
    StrictEq = 0x52,
    /// Strict not equal (!==)
    StrictNe = 0x53,
    /// Less than (<)
    Lt = 0x54,
    /// Less than or equal (<=)
    Le = 0x55,
    /// Greater than (>)
    Gt = 0x56,
    /// Greater than or equal (>=)
    Ge = 0x57,

    // ========== Unary ==========
    /// Logical NOT
    Not = 0x60,
    /// typeof
    Typeof = 0x61,

    // ========== Control Flow ==========
    /// Unconditional jump
    /// Operands: offset (i16)
    Jump = 0x70,
    /// Pop and jump if falsy
    /// Operands: offset (i16)
    JumpIfFalse = 0x71,
    /// Pop and jump if truthy
    /// Operands: offset (i16)
    JumpIfTrue = 0x72,

    // ========== Functions ==========
    /// Call: [this, callee, args...] -> [result]
    /// Operands: arg_count (u8)
    Call = 0x80,
    /// Sole-spread call `f(...x)`: [this, callee, iterable] -> [result]
    /// Operands: site_id (u16), description_index (u16)
    CallSpread = 0x81,
    /// Call with a prebuilt argument array: [this, callee, array] -> [result]
    CallArray = 0x82,
    /// Create a closure over the current scope
    /// Operands: function_index (u16)
    CreateClosure = 0x83,
    /// Return the top value
    Return = 0x84,
    /// Return undefined
    ReturnUndefined = 0x85,
    /// Push the current `this`
    This = 0x86,

    // ========== Arrays and Objects ==========
    /// Push a new empty array
    NewArray = 0x90,
    /// [array, value] -> [array]
    ArrayPush = 0x91,
    /// Append a hole: [array] -> [array]
    ArrayHole = 0x92,
    /// Append every value the iterable yields: [array, iterable] -> [array]
    /// Operands: description_index (u16)
    ArrayExtend = 0x93,
    /// Push a new empty object
    NewObject = 0x94,

    // ========== Scopes ==========
    /// Pop an object and push a `with` scope over it
    PushWith = 0xA0,
    /// Leave the innermost `with` scope
    PopWith = 0xA1,

    // ========== Completion ==========
    /// Pop into the script completion value
    SetCompletion = 0xB0,
    /// Push the script completion value
    Completion = 0xB1,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        let op = match byte {
            0x00 => Opcode::Nop,
            0x01 => Opcode::Pop,
            0x02 => Opcode::Dup,
            0x03 => Opcode::Dup2,
            0x05 => Opcode::Rot4,

            0x10 => Opcode::Constant,
            0x11 => Opcode::Undefined,
            0x12 => Opcode::Null,
            0x13 => Opcode::True,
            0x14 => Opcode::False,

            0x20 => Opcode::GetName,
            0x21 => Opcode::SetName,
            0x22 => Opcode::DeclareFunction,
            0x23 => Opcode::TypeofName,
            0x24 => Opcode::DeleteName,
            0x25 => Opcode::ResolveCallee,

            0x30 => Opcode::GetProperty,
            0x31 => Opcode::SetProperty,
            0x32 => Opcode::GetElement,
            0x33 => Opcode::SetElement,
            0x34 => Opcode::DeleteElement,
            0x35 => Opcode::DefineField,

            0x40 => Opcode::Add,
            0x41 => Opcode::Sub,
            0x42 => Opcode::Mul,
            0x43 => Opcode::Div,
            0x44 => Opcode::Mod,
            0x45 => Opcode::Neg,
            0x46 => Opcode::ToNumber,
            0x47 => Opcode::Increment,
            0x48 => Opcode::Decrement,

            0x50 => Opcode::Eq,
            0x51 => Opcode::Ne,
            0x52 => Opcode::StrictEq,
            0x53 => Opcode::StrictNe,
            0x54 => Opcode::Lt,
            0x55 => Opcode::Le,
            0x56 => Opcode::Gt,
            0x57 => Opcode::Ge,

            0x60 => Opcode::Not,
            0x61 => Opcode::Typeof,

            0x70 => Opcode::Jump,
            0x71 => Opcode::JumpIfFalse,
            0x72 => Opcode::JumpIfTrue,

            0x80 => Opcode::Call,
            0x81 => Opcode::CallSpread,
            0x82 => Opcode::CallArray,
            0x83 => Opcode::CreateClosure,
            0x84 => Opcode::Return,
            0x85 => Opcode::ReturnUndefined,
            0x86 => Opcode::This,

            0x90 => Opcode::NewArray,
            0x91 => Opcode::ArrayPush,
            0x92 => Opcode::ArrayHole,
            0x93 => Opcode::ArrayExtend,
            0x94 => Opcode::NewObject,

            0xA0 => Opcode::PushWith,
            0xA1 => Opcode::PopWith,

            0xB0 => Opcode::SetCompletion,
            0xB1 => Opcode::Completion,

            _ => return None,
        };
        Some(op)
    }

    /// Get the size of the instruction including operands
    pub fn instruction_size(&self) -> usize {
        match self {
            // 1-byte operand
            Opcode::Call => 2,

            // 2-byte operand
            Opcode::Constant
            | Opcode::GetName
            | Opcode::SetName
            | Opcode::DeclareFunction
            | Opcode::TypeofName
            | Opcode::DeleteName
            | Opcode::ResolveCallee
            | Opcode::GetProperty
            | Opcode::SetProperty
            | Opcode::Jump
            | Opcode::JumpIfFalse
            | Opcode::JumpIfTrue
            | Opcode::CreateClosure
            | Opcode::ArrayExtend => 3,

            // Two u16 operands
            Opcode::CallSpread => 5,

            // No operands
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip_for_every_byte() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op as u8, byte);
            }
        }
    }

    #[test]
    fn test_instruction_sizes() {
        assert_eq!(Opcode::Pop.instruction_size(), 1);
        assert_eq!(Opcode::Call.instruction_size(), 2);
        assert_eq!(Opcode::GetName.instruction_size(), 3);
        assert_eq!(Opcode::CallSpread.instruction_size(), 5);
    }
}

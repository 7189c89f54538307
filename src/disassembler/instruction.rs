use std::fmt;

use serde::Serialize;

use crate::metadata::token::Token;

/// Encoding of an instruction's inline operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit value
    Int8,
    /// Unsigned 8-bit value
    UInt8,
    /// Signed 16-bit value
    Int16,
    /// Unsigned 16-bit value
    UInt16,
    /// Signed 32-bit value
    Int32,
    /// Unsigned 32-bit value
    UInt32,
    /// Signed 64-bit value
    Int64,
    /// Unsigned 64-bit value
    UInt64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Metadata token
    Token,
    /// Jump table of the `switch` instruction
    Switch,
}

/// How an instruction affects control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Multi-way branch
    Switch,
    /// Calls another method and continues
    Call,
    /// Leaves the method
    Return,
    /// Raises an exception
    Throw,
    /// Leaves a protected region
    Leave,
    /// Ends a finally or fault handler
    EndFinally,
}

/// Coarse grouping of opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstructionCategory {
    /// Arithmetic operations
    Arithmetic,
    /// Bitwise and logical operations
    BitwiseLogical,
    /// Comparisons
    Comparison,
    /// Branches, calls and returns
    ControlFlow,
    /// Numeric conversions
    Conversion,
    /// Loads and stores of arguments, locals, constants and memory
    LoadStore,
    /// Object model: fields, objects, arrays, type tests, strings
    ObjectModel,
    /// Prefixes modifying the next instruction
    Prefix,
    /// Everything else
    Misc,
}

/// An inline immediate value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit
    Int8(i8),
    /// Unsigned 8-bit
    UInt8(u8),
    /// Signed 16-bit
    Int16(i16),
    /// Unsigned 16-bit
    UInt16(u16),
    /// Signed 32-bit
    Int32(i32),
    /// Unsigned 32-bit
    UInt32(u32),
    /// Signed 64-bit
    Int64(i64),
    /// Unsigned 64-bit
    UInt64(u64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
}

impl Immediate {
    /// The value as a signed branch displacement, for the integer encodings
    #[must_use]
    pub fn displacement(&self) -> Option<i64> {
        match *self {
            Immediate::Int8(value) => Some(i64::from(value)),
            Immediate::UInt8(value) => Some(i64::from(value)),
            Immediate::Int16(value) => Some(i64::from(value)),
            Immediate::UInt16(value) => Some(i64::from(value)),
            Immediate::Int32(value) => Some(i64::from(value)),
            Immediate::UInt32(value) => Some(i64::from(value)),
            Immediate::Int64(value) => Some(value),
            Immediate::UInt64(_) | Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::Int16(value) => write!(f, "{value}"),
            Immediate::UInt16(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::UInt32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::UInt64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value:?}"),
            Immediate::Float64(value) => write!(f, "{value:?}"),
        }
    }
}

/// A decoded instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Inline immediate
    Immediate(Immediate),
    /// Metadata token (or `#US` offset for `ldstr`)
    Token(Token),
    /// Relative displacements of a `switch` table
    Switch(Vec<i32>),
}

/// One row of the opcode tables
#[derive(Debug, Clone, Copy)]
pub struct CilInstruction {
    /// Mnemonic; empty for reserved opcodes
    pub instr: &'static str,
    /// Operand encoding
    pub op_type: OperandType,
    /// Control flow behavior
    pub flow: FlowType,
    /// Category
    pub category: InstructionCategory,
}

/// A decoded CIL instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset of the first byte, relative to the start of the method's code
    pub offset: u32,
    /// Encoded size in bytes, including prefix and operand
    pub size: u32,
    /// Opcode byte (the second byte for `0xFE` prefixed opcodes)
    pub opcode: u8,
    /// `0xFE` for two-byte opcodes, 0 otherwise
    pub prefix: u8,
    /// Mnemonic
    pub mnemonic: &'static str,
    /// Category
    pub category: InstructionCategory,
    /// Control flow behavior
    pub flow_type: FlowType,
    /// Operand
    pub operand: Operand,
    /// Absolute offsets of branch targets
    pub branch_targets: Vec<u32>,
}

impl Instruction {
    /// The token operand, if any
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// Offset of the following instruction
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }
}

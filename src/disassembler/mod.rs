//! CIL instruction decoding, encoding and IL text rendering.
//!
//! # Key Types
//! - [`Instruction`] - A decoded CIL instruction
//! - [`Operand`] - Instruction operands (immediates, tokens, switch tables)
//! - [`FlowType`] - How instructions affect control flow
//! - [`InstructionEncoder`] - Assembles instructions into code bytes
//!
//! # Example
//! ```rust
//! use dotlens::{disassembler::decode_instruction, file::parser::Parser};
//!
//! let bytecode = &[0x00, 0x2A]; // nop, ret
//! let mut parser = Parser::new(bytecode);
//! let instruction = decode_instruction(&mut parser)?;
//! assert_eq!(instruction.mnemonic, "nop");
//! # Ok::<(), dotlens::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
pub mod opcodes;
mod render;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::InstructionEncoder;
pub use instruction::{
    CilInstruction, FlowType, Immediate, Instruction, InstructionCategory, Operand, OperandType,
};
pub use opcodes::{INSTRUCTIONS, INSTRUCTIONS_FE};
pub use render::{label, render_instruction, render_token};

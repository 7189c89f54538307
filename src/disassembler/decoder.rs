//! CIL instruction decoding.
//!
//! # Example
//!
//! ```rust
//! use dotlens::{disassembler::decode_stream, file::parser::Parser};
//!
//! let code = [0x00, 0x2A]; // nop, ret
//! let instructions = decode_stream(&mut Parser::new(&code))?;
//! assert_eq!(instructions.len(), 2);
//! assert_eq!(instructions[1].mnemonic, "ret");
//! # Ok::<(), dotlens::Error>(())
//! ```

use crate::{
    disassembler::{
        opcodes::PREFIX_FE, FlowType, Immediate, Instruction, Operand, OperandType, INSTRUCTIONS,
        INSTRUCTIONS_FE,
    },
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Decodes one instruction at the parser's position.
///
/// # Errors
/// Returns an error for truncated input, unknown or reserved opcodes.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let start = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let (cil_instruction, prefix, opcode) = match first_byte {
        PREFIX_FE => {
            let second_byte = parser.read_le::<u8>()?;

            match INSTRUCTIONS_FE.get(second_byte as usize) {
                Some(instr) => (instr, PREFIX_FE, second_byte),
                None => return Err(malformed_error!("Invalid opcode: FE {:02X}", second_byte)),
            }
        }
        _ => match INSTRUCTIONS.get(first_byte as usize) {
            Some(instr) => (instr, 0, first_byte),
            None => return Err(malformed_error!("Invalid opcode: {:X}", first_byte)),
        },
    };

    if cil_instruction.instr.is_empty() {
        return Err(malformed_error!("Reserved opcode: {:02X}{:02X}", prefix, opcode));
    }

    let operand = match cil_instruction.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::Int16 => Operand::Immediate(Immediate::Int16(parser.read_le::<i16>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::UInt32 => Operand::Immediate(Immediate::UInt32(parser.read_le::<u32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::UInt64 => Operand::Immediate(Immediate::UInt64(parser.read_le::<u64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count.saturating_mul(4) > parser.remaining() {
                return Err(malformed_error!("Switch table too large - {}", case_count));
            }

            let mut targets = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                targets.push(parser.read_le::<i32>()?);
            }

            Operand::Switch(targets)
        }
    };

    #[allow(clippy::cast_possible_truncation)]
    let (offset, size) = (start as u32, (parser.pos() - start) as u32);

    let mut instruction = Instruction {
        offset,
        size,
        opcode,
        prefix,
        mnemonic: cil_instruction.instr,
        category: cil_instruction.category,
        flow_type: cil_instruction.flow,
        operand,
        branch_targets: Vec::new(),
    };

    let next = i64::from(instruction.next_offset());
    match (&instruction.flow_type, &instruction.operand) {
        (
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave,
            Operand::Immediate(value),
        ) => {
            if let Some(target) = value.displacement().and_then(|delta| u32::try_from(next + delta).ok()) {
                instruction.branch_targets.push(target);
            }
        }
        (FlowType::Switch, Operand::Switch(targets)) => {
            let targets: Vec<u32> = targets
                .iter()
                .filter_map(|delta| u32::try_from(next + i64::from(*delta)).ok())
                .collect();
            instruction.branch_targets = targets;
        }
        _ => {}
    }

    Ok(instruction)
}

/// Decodes instructions until the parser is exhausted.
///
/// # Errors
/// Returns the first decoding error.
pub fn decode_stream(parser: &mut Parser) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(parser)?);
    }

    Ok(instructions)
}

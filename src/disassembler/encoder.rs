use crate::{
    disassembler::{opcodes, Immediate, Operand, OperandType},
    Error::InvalidArgument,
    Result,
};

/// Assembles CIL instructions into a method body's code bytes.
///
/// ```rust
/// use dotlens::disassembler::{Immediate, InstructionEncoder, Operand};
///
/// let mut encoder = InstructionEncoder::new();
/// encoder.emit_instruction("ldc.i4.s", Some(Operand::Immediate(Immediate::Int8(42))))?;
/// encoder.emit_instruction("ret", None)?;
/// assert_eq!(encoder.finalize(), vec![0x1F, 0x2A, 0x2A]);
/// # Ok::<(), dotlens::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
}

fn width(op_type: OperandType) -> usize {
    match op_type {
        OperandType::None | OperandType::Switch => 0,
        OperandType::Int8 | OperandType::UInt8 => 1,
        OperandType::Int16 | OperandType::UInt16 => 2,
        OperandType::Int32 | OperandType::UInt32 | OperandType::Float32 | OperandType::Token => 4,
        OperandType::Int64 | OperandType::UInt64 | OperandType::Float64 => 8,
    }
}

fn immediate_bytes(value: Immediate) -> Vec<u8> {
    match value {
        Immediate::Int8(value) => value.to_le_bytes().to_vec(),
        Immediate::UInt8(value) => value.to_le_bytes().to_vec(),
        Immediate::Int16(value) => value.to_le_bytes().to_vec(),
        Immediate::UInt16(value) => value.to_le_bytes().to_vec(),
        Immediate::Int32(value) => value.to_le_bytes().to_vec(),
        Immediate::UInt32(value) => value.to_le_bytes().to_vec(),
        Immediate::Int64(value) => value.to_le_bytes().to_vec(),
        Immediate::UInt64(value) => value.to_le_bytes().to_vec(),
        Immediate::Float32(value) => value.to_le_bytes().to_vec(),
        Immediate::Float64(value) => value.to_le_bytes().to_vec(),
    }
}

impl InstructionEncoder {
    /// Creates an empty encoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one instruction.
    ///
    /// Immediates are accepted when their encoded width matches the opcode's operand width, so
    /// `ldarg` takes either `Int16` or `UInt16`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for unknown mnemonics and operands that do not
    /// fit the opcode.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let Some((prefix, opcode, entry)) = opcodes::lookup(mnemonic) else {
            return Err(InvalidArgument(format!("unknown mnemonic '{mnemonic}'")));
        };

        let operand_bytes = match (entry.op_type, operand.unwrap_or(Operand::None)) {
            (OperandType::None, Operand::None) => Vec::new(),
            (OperandType::Token, Operand::Token(token)) => token.value().to_le_bytes().to_vec(),
            (OperandType::Switch, Operand::Switch(targets)) => {
                let count = u32::try_from(targets.len())
                    .map_err(|_| InvalidArgument("switch table too large".to_string()))?;
                let mut bytes = count.to_le_bytes().to_vec();
                for target in targets {
                    bytes.extend_from_slice(&target.to_le_bytes());
                }
                bytes
            }
            (op_type, Operand::Immediate(value)) if width(op_type) > 0 && op_type != OperandType::Token => {
                let bytes = immediate_bytes(value);
                if bytes.len() != width(op_type) {
                    return Err(InvalidArgument(format!(
                        "operand {value:?} does not fit '{mnemonic}'"
                    )));
                }
                bytes
            }
            (_, operand) => {
                return Err(InvalidArgument(format!(
                    "operand {operand:?} does not fit '{mnemonic}'"
                )))
            }
        };

        if prefix != 0 {
            self.bytecode.push(prefix);
        }
        self.bytecode.push(opcode);
        self.bytecode.extend_from_slice(&operand_bytes);
        Ok(())
    }

    /// Current code size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytecode.len()
    }

    /// Returns `true` if nothing has been emitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }

    /// Returns the encoded code bytes
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        self.bytecode
    }
}

//! CIL opcode tables (ECMA-335 III).
//!
//! Both tables are indexed by opcode byte. Reserved slots carry an empty mnemonic and are
//! rejected by the decoder.

use crate::disassembler::{
    CilInstruction, FlowType as F, InstructionCategory as C, OperandType as O,
};

const fn op(instr: &'static str, op_type: O, flow: F, category: C) -> CilInstruction {
    CilInstruction {
        instr,
        op_type,
        flow,
        category,
    }
}

const RESERVED: CilInstruction = op("", O::None, F::Sequential, C::Misc);

/// Prefix byte of two-byte opcodes
pub const PREFIX_FE: u8 = 0xFE;

/// Single-byte opcodes `0x00..=0xE0`
pub static INSTRUCTIONS: [CilInstruction; 0xE1] = [
    op("nop", O::None, F::Sequential, C::Misc), // 0x00
    op("break", O::None, F::Sequential, C::Misc), // 0x01
    op("ldarg.0", O::None, F::Sequential, C::LoadStore), // 0x02
    op("ldarg.1", O::None, F::Sequential, C::LoadStore), // 0x03
    op("ldarg.2", O::None, F::Sequential, C::LoadStore), // 0x04
    op("ldarg.3", O::None, F::Sequential, C::LoadStore), // 0x05
    op("ldloc.0", O::None, F::Sequential, C::LoadStore), // 0x06
    op("ldloc.1", O::None, F::Sequential, C::LoadStore), // 0x07
    op("ldloc.2", O::None, F::Sequential, C::LoadStore), // 0x08
    op("ldloc.3", O::None, F::Sequential, C::LoadStore), // 0x09
    op("stloc.0", O::None, F::Sequential, C::LoadStore), // 0x0A
    op("stloc.1", O::None, F::Sequential, C::LoadStore), // 0x0B
    op("stloc.2", O::None, F::Sequential, C::LoadStore), // 0x0C
    op("stloc.3", O::None, F::Sequential, C::LoadStore), // 0x0D
    op("ldarg.s", O::UInt8, F::Sequential, C::LoadStore), // 0x0E
    op("ldarga.s", O::UInt8, F::Sequential, C::LoadStore), // 0x0F
    op("starg.s", O::UInt8, F::Sequential, C::LoadStore), // 0x10
    op("ldloc.s", O::UInt8, F::Sequential, C::LoadStore), // 0x11
    op("ldloca.s", O::UInt8, F::Sequential, C::LoadStore), // 0x12
    op("stloc.s", O::UInt8, F::Sequential, C::LoadStore), // 0x13
    op("ldnull", O::None, F::Sequential, C::LoadStore), // 0x14
    op("ldc.i4.m1", O::None, F::Sequential, C::LoadStore), // 0x15
    op("ldc.i4.0", O::None, F::Sequential, C::LoadStore), // 0x16
    op("ldc.i4.1", O::None, F::Sequential, C::LoadStore), // 0x17
    op("ldc.i4.2", O::None, F::Sequential, C::LoadStore), // 0x18
    op("ldc.i4.3", O::None, F::Sequential, C::LoadStore), // 0x19
    op("ldc.i4.4", O::None, F::Sequential, C::LoadStore), // 0x1A
    op("ldc.i4.5", O::None, F::Sequential, C::LoadStore), // 0x1B
    op("ldc.i4.6", O::None, F::Sequential, C::LoadStore), // 0x1C
    op("ldc.i4.7", O::None, F::Sequential, C::LoadStore), // 0x1D
    op("ldc.i4.8", O::None, F::Sequential, C::LoadStore), // 0x1E
    op("ldc.i4.s", O::Int8, F::Sequential, C::LoadStore), // 0x1F
    op("ldc.i4", O::Int32, F::Sequential, C::LoadStore), // 0x20
    op("ldc.i8", O::Int64, F::Sequential, C::LoadStore), // 0x21
    op("ldc.r4", O::Float32, F::Sequential, C::LoadStore), // 0x22
    op("ldc.r8", O::Float64, F::Sequential, C::LoadStore), // 0x23
    RESERVED, // 0x24
    op("dup", O::None, F::Sequential, C::Misc), // 0x25
    op("pop", O::None, F::Sequential, C::Misc), // 0x26
    op("jmp", O::Token, F::UnconditionalBranch, C::ControlFlow), // 0x27
    op("call", O::Token, F::Call, C::ControlFlow), // 0x28
    op("calli", O::Token, F::Call, C::ControlFlow), // 0x29
    op("ret", O::None, F::Return, C::ControlFlow), // 0x2A
    op("br.s", O::Int8, F::UnconditionalBranch, C::ControlFlow), // 0x2B
    op("brfalse.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x2C
    op("brtrue.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x2D
    op("beq.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x2E
    op("bge.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x2F
    op("bgt.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x30
    op("ble.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x31
    op("blt.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x32
    op("bne.un.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x33
    op("bge.un.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x34
    op("bgt.un.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x35
    op("ble.un.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x36
    op("blt.un.s", O::Int8, F::ConditionalBranch, C::ControlFlow), // 0x37
    op("br", O::Int32, F::UnconditionalBranch, C::ControlFlow), // 0x38
    op("brfalse", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x39
    op("brtrue", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x3A
    op("beq", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x3B
    op("bge", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x3C
    op("bgt", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x3D
    op("ble", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x3E
    op("blt", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x3F
    op("bne.un", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x40
    op("bge.un", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x41
    op("bgt.un", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x42
    op("ble.un", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x43
    op("blt.un", O::Int32, F::ConditionalBranch, C::ControlFlow), // 0x44
    op("switch", O::Switch, F::Switch, C::ControlFlow), // 0x45
    op("ldind.i1", O::None, F::Sequential, C::LoadStore), // 0x46
    op("ldind.u1", O::None, F::Sequential, C::LoadStore), // 0x47
    op("ldind.i2", O::None, F::Sequential, C::LoadStore), // 0x48
    op("ldind.u2", O::None, F::Sequential, C::LoadStore), // 0x49
    op("ldind.i4", O::None, F::Sequential, C::LoadStore), // 0x4A
    op("ldind.u4", O::None, F::Sequential, C::LoadStore), // 0x4B
    op("ldind.i8", O::None, F::Sequential, C::LoadStore), // 0x4C
    op("ldind.i", O::None, F::Sequential, C::LoadStore), // 0x4D
    op("ldind.r4", O::None, F::Sequential, C::LoadStore), // 0x4E
    op("ldind.r8", O::None, F::Sequential, C::LoadStore), // 0x4F
    op("ldind.ref", O::None, F::Sequential, C::LoadStore), // 0x50
    op("stind.ref", O::None, F::Sequential, C::LoadStore), // 0x51
    op("stind.i1", O::None, F::Sequential, C::LoadStore), // 0x52
    op("stind.i2", O::None, F::Sequential, C::LoadStore), // 0x53
    op("stind.i4", O::None, F::Sequential, C::LoadStore), // 0x54
    op("stind.i8", O::None, F::Sequential, C::LoadStore), // 0x55
    op("stind.r4", O::None, F::Sequential, C::LoadStore), // 0x56
    op("stind.r8", O::None, F::Sequential, C::LoadStore), // 0x57
    op("add", O::None, F::Sequential, C::Arithmetic), // 0x58
    op("sub", O::None, F::Sequential, C::Arithmetic), // 0x59
    op("mul", O::None, F::Sequential, C::Arithmetic), // 0x5A
    op("div", O::None, F::Sequential, C::Arithmetic), // 0x5B
    op("div.un", O::None, F::Sequential, C::Arithmetic), // 0x5C
    op("rem", O::None, F::Sequential, C::Arithmetic), // 0x5D
    op("rem.un", O::None, F::Sequential, C::Arithmetic), // 0x5E
    op("and", O::None, F::Sequential, C::BitwiseLogical), // 0x5F
    op("or", O::None, F::Sequential, C::BitwiseLogical), // 0x60
    op("xor", O::None, F::Sequential, C::BitwiseLogical), // 0x61
    op("shl", O::None, F::Sequential, C::BitwiseLogical), // 0x62
    op("shr", O::None, F::Sequential, C::BitwiseLogical), // 0x63
    op("shr.un", O::None, F::Sequential, C::BitwiseLogical), // 0x64
    op("neg", O::None, F::Sequential, C::Arithmetic), // 0x65
    op("not", O::None, F::Sequential, C::BitwiseLogical), // 0x66
    op("conv.i1", O::None, F::Sequential, C::Conversion), // 0x67
    op("conv.i2", O::None, F::Sequential, C::Conversion), // 0x68
    op("conv.i4", O::None, F::Sequential, C::Conversion), // 0x69
    op("conv.i8", O::None, F::Sequential, C::Conversion), // 0x6A
    op("conv.r4", O::None, F::Sequential, C::Conversion), // 0x6B
    op("conv.r8", O::None, F::Sequential, C::Conversion), // 0x6C
    op("conv.u4", O::None, F::Sequential, C::Conversion), // 0x6D
    op("conv.u8", O::None, F::Sequential, C::Conversion), // 0x6E
    op("callvirt", O::Token, F::Call, C::ControlFlow), // 0x6F
    op("cpobj", O::Token, F::Sequential, C::ObjectModel), // 0x70
    op("ldobj", O::Token, F::Sequential, C::ObjectModel), // 0x71
    op("ldstr", O::Token, F::Sequential, C::ObjectModel), // 0x72
    op("newobj", O::Token, F::Call, C::ObjectModel), // 0x73
    op("castclass", O::Token, F::Sequential, C::ObjectModel), // 0x74
    op("isinst", O::Token, F::Sequential, C::ObjectModel), // 0x75
    op("conv.r.un", O::None, F::Sequential, C::Conversion), // 0x76
    RESERVED, // 0x77
    RESERVED, // 0x78
    op("unbox", O::Token, F::Sequential, C::ObjectModel), // 0x79
    op("throw", O::None, F::Throw, C::ControlFlow), // 0x7A
    op("ldfld", O::Token, F::Sequential, C::ObjectModel), // 0x7B
    op("ldflda", O::Token, F::Sequential, C::ObjectModel), // 0x7C
    op("stfld", O::Token, F::Sequential, C::ObjectModel), // 0x7D
    op("ldsfld", O::Token, F::Sequential, C::ObjectModel), // 0x7E
    op("ldsflda", O::Token, F::Sequential, C::ObjectModel), // 0x7F
    op("stsfld", O::Token, F::Sequential, C::ObjectModel), // 0x80
    op("stobj", O::Token, F::Sequential, C::ObjectModel), // 0x81
    op("conv.ovf.i1.un", O::None, F::Sequential, C::Conversion), // 0x82
    op("conv.ovf.i2.un", O::None, F::Sequential, C::Conversion), // 0x83
    op("conv.ovf.i4.un", O::None, F::Sequential, C::Conversion), // 0x84
    op("conv.ovf.i8.un", O::None, F::Sequential, C::Conversion), // 0x85
    op("conv.ovf.u1.un", O::None, F::Sequential, C::Conversion), // 0x86
    op("conv.ovf.u2.un", O::None, F::Sequential, C::Conversion), // 0x87
    op("conv.ovf.u4.un", O::None, F::Sequential, C::Conversion), // 0x88
    op("conv.ovf.u8.un", O::None, F::Sequential, C::Conversion), // 0x89
    op("conv.ovf.i.un", O::None, F::Sequential, C::Conversion), // 0x8A
    op("conv.ovf.u.un", O::None, F::Sequential, C::Conversion), // 0x8B
    op("box", O::Token, F::Sequential, C::ObjectModel), // 0x8C
    op("newarr", O::Token, F::Sequential, C::ObjectModel), // 0x8D
    op("ldlen", O::None, F::Sequential, C::ObjectModel), // 0x8E
    op("ldelema", O::Token, F::Sequential, C::ObjectModel), // 0x8F
    op("ldelem.i1", O::None, F::Sequential, C::ObjectModel), // 0x90
    op("ldelem.u1", O::None, F::Sequential, C::ObjectModel), // 0x91
    op("ldelem.i2", O::None, F::Sequential, C::ObjectModel), // 0x92
    op("ldelem.u2", O::None, F::Sequential, C::ObjectModel), // 0x93
    op("ldelem.i4", O::None, F::Sequential, C::ObjectModel), // 0x94
    op("ldelem.u4", O::None, F::Sequential, C::ObjectModel), // 0x95
    op("ldelem.i8", O::None, F::Sequential, C::ObjectModel), // 0x96
    op("ldelem.i", O::None, F::Sequential, C::ObjectModel), // 0x97
    op("ldelem.r4", O::None, F::Sequential, C::ObjectModel), // 0x98
    op("ldelem.r8", O::None, F::Sequential, C::ObjectModel), // 0x99
    op("ldelem.ref", O::None, F::Sequential, C::ObjectModel), // 0x9A
    op("stelem.i", O::None, F::Sequential, C::ObjectModel), // 0x9B
    op("stelem.i1", O::None, F::Sequential, C::ObjectModel), // 0x9C
    op("stelem.i2", O::None, F::Sequential, C::ObjectModel), // 0x9D
    op("stelem.i4", O::None, F::Sequential, C::ObjectModel), // 0x9E
    op("stelem.i8", O::None, F::Sequential, C::ObjectModel), // 0x9F
    op("stelem.r4", O::None, F::Sequential, C::ObjectModel), // 0xA0
    op("stelem.r8", O::None, F::Sequential, C::ObjectModel), // 0xA1
    op("stelem.ref", O::None, F::Sequential, C::ObjectModel), // 0xA2
    op("ldelem", O::Token, F::Sequential, C::ObjectModel), // 0xA3
    op("stelem", O::Token, F::Sequential, C::ObjectModel), // 0xA4
    op("unbox.any", O::Token, F::Sequential, C::ObjectModel), // 0xA5
    RESERVED, // 0xA6
    RESERVED, // 0xA7
    RESERVED, // 0xA8
    RESERVED, // 0xA9
    RESERVED, // 0xAA
    RESERVED, // 0xAB
    RESERVED, // 0xAC
    RESERVED, // 0xAD
    RESERVED, // 0xAE
    RESERVED, // 0xAF
    RESERVED, // 0xB0
    RESERVED, // 0xB1
    RESERVED, // 0xB2
    op("conv.ovf.i1", O::None, F::Sequential, C::Conversion), // 0xB3
    op("conv.ovf.u1", O::None, F::Sequential, C::Conversion), // 0xB4
    op("conv.ovf.i2", O::None, F::Sequential, C::Conversion), // 0xB5
    op("conv.ovf.u2", O::None, F::Sequential, C::Conversion), // 0xB6
    op("conv.ovf.i4", O::None, F::Sequential, C::Conversion), // 0xB7
    op("conv.ovf.u4", O::None, F::Sequential, C::Conversion), // 0xB8
    op("conv.ovf.i8", O::None, F::Sequential, C::Conversion), // 0xB9
    op("conv.ovf.u8", O::None, F::Sequential, C::Conversion), // 0xBA
    RESERVED, // 0xBB
    RESERVED, // 0xBC
    RESERVED, // 0xBD
    RESERVED, // 0xBE
    RESERVED, // 0xBF
    RESERVED, // 0xC0
    RESERVED, // 0xC1
    op("refanyval", O::Token, F::Sequential, C::ObjectModel), // 0xC2
    op("ckfinite", O::None, F::Sequential, C::Arithmetic), // 0xC3
    RESERVED, // 0xC4
    RESERVED, // 0xC5
    op("mkrefany", O::Token, F::Sequential, C::ObjectModel), // 0xC6
    RESERVED, // 0xC7
    RESERVED, // 0xC8
    RESERVED, // 0xC9
    RESERVED, // 0xCA
    RESERVED, // 0xCB
    RESERVED, // 0xCC
    RESERVED, // 0xCD
    RESERVED, // 0xCE
    RESERVED, // 0xCF
    op("ldtoken", O::Token, F::Sequential, C::ObjectModel), // 0xD0
    op("conv.u2", O::None, F::Sequential, C::Conversion), // 0xD1
    op("conv.u1", O::None, F::Sequential, C::Conversion), // 0xD2
    op("conv.i", O::None, F::Sequential, C::Conversion), // 0xD3
    op("conv.ovf.i", O::None, F::Sequential, C::Conversion), // 0xD4
    op("conv.ovf.u", O::None, F::Sequential, C::Conversion), // 0xD5
    op("add.ovf", O::None, F::Sequential, C::Arithmetic), // 0xD6
    op("add.ovf.un", O::None, F::Sequential, C::Arithmetic), // 0xD7
    op("mul.ovf", O::None, F::Sequential, C::Arithmetic), // 0xD8
    op("mul.ovf.un", O::None, F::Sequential, C::Arithmetic), // 0xD9
    op("sub.ovf", O::None, F::Sequential, C::Arithmetic), // 0xDA
    op("sub.ovf.un", O::None, F::Sequential, C::Arithmetic), // 0xDB
    op("endfinally", O::None, F::EndFinally, C::ControlFlow), // 0xDC
    op("leave", O::Int32, F::Leave, C::ControlFlow), // 0xDD
    op("leave.s", O::Int8, F::Leave, C::ControlFlow), // 0xDE
    op("stind.i", O::None, F::Sequential, C::LoadStore), // 0xDF
    op("conv.u", O::None, F::Sequential, C::Conversion), // 0xE0
];

/// Two-byte opcodes `0xFE 0x00..=0xFE 0x1E`
pub static INSTRUCTIONS_FE: [CilInstruction; 0x1F] = [
    op("arglist", O::None, F::Sequential, C::Misc), // 0x00
    op("ceq", O::None, F::Sequential, C::Comparison), // 0x01
    op("cgt", O::None, F::Sequential, C::Comparison), // 0x02
    op("cgt.un", O::None, F::Sequential, C::Comparison), // 0x03
    op("clt", O::None, F::Sequential, C::Comparison), // 0x04
    op("clt.un", O::None, F::Sequential, C::Comparison), // 0x05
    op("ldftn", O::Token, F::Sequential, C::ObjectModel), // 0x06
    op("ldvirtftn", O::Token, F::Sequential, C::ObjectModel), // 0x07
    RESERVED, // 0x08
    op("ldarg", O::UInt16, F::Sequential, C::LoadStore), // 0x09
    op("ldarga", O::UInt16, F::Sequential, C::LoadStore), // 0x0A
    op("starg", O::UInt16, F::Sequential, C::LoadStore), // 0x0B
    op("ldloc", O::UInt16, F::Sequential, C::LoadStore), // 0x0C
    op("ldloca", O::UInt16, F::Sequential, C::LoadStore), // 0x0D
    op("stloc", O::UInt16, F::Sequential, C::LoadStore), // 0x0E
    op("localloc", O::None, F::Sequential, C::Misc), // 0x0F
    RESERVED, // 0x10
    op("endfilter", O::None, F::EndFinally, C::ControlFlow), // 0x11
    op("unaligned.", O::UInt8, F::Sequential, C::Prefix), // 0x12
    op("volatile.", O::None, F::Sequential, C::Prefix), // 0x13
    op("tail.", O::None, F::Sequential, C::Prefix), // 0x14
    op("initobj", O::Token, F::Sequential, C::ObjectModel), // 0x15
    op("constrained.", O::Token, F::Sequential, C::Prefix), // 0x16
    op("cpblk", O::None, F::Sequential, C::Misc), // 0x17
    op("initblk", O::None, F::Sequential, C::Misc), // 0x18
    op("no.", O::UInt8, F::Sequential, C::Prefix), // 0x19
    op("rethrow", O::None, F::Throw, C::ControlFlow), // 0x1A
    RESERVED, // 0x1B
    op("sizeof", O::Token, F::Sequential, C::ObjectModel), // 0x1C
    op("refanytype", O::None, F::Sequential, C::ObjectModel), // 0x1D
    op("readonly.", O::None, F::Sequential, C::Prefix), // 0x1E
];

/// Looks up the encoding of `mnemonic` as (prefix, opcode, entry)
#[must_use]
pub fn lookup(mnemonic: &str) -> Option<(u8, u8, &'static CilInstruction)> {
    let single = INSTRUCTIONS
        .iter()
        .enumerate()
        .map(|(code, entry)| (0, code, entry));
    let double = INSTRUCTIONS_FE
        .iter()
        .enumerate()
        .map(|(code, entry)| (PREFIX_FE, code, entry));

    #[allow(clippy::cast_possible_truncation)]
    single
        .chain(double)
        .find(|(_, _, entry)| !entry.instr.is_empty() && entry.instr == mnemonic)
        .map(|(prefix, code, entry)| (prefix, code as u8, entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_positions() {
        assert_eq!(INSTRUCTIONS[0x28].instr, "call");
        assert_eq!(INSTRUCTIONS[0x72].instr, "ldstr");
        assert_eq!(INSTRUCTIONS[0xE0].instr, "conv.u");
        assert!(INSTRUCTIONS[0x24].instr.is_empty());
        assert_eq!(INSTRUCTIONS_FE[0x01].instr, "ceq");
        assert_eq!(INSTRUCTIONS_FE[0x1E].instr, "readonly.");
    }

    #[test]
    fn mnemonic_lookup() {
        let (prefix, code, entry) = lookup("stfld").unwrap();
        assert_eq!((prefix, code), (0, 0x7D));
        assert_eq!(entry.op_type, O::Token);

        let (prefix, code, _) = lookup("ldloc").unwrap();
        assert_eq!((prefix, code), (PREFIX_FE, 0x0C));

        assert!(lookup("").is_none());
        assert!(lookup("mov").is_none());
    }
}

//! IL assembly text for decoded instructions.

use crate::{
    disassembler::{Instruction, Operand},
    metadata::{
        symbols::{Assembly, MemberRefSignature},
        tables::TableId,
        token::Token,
    },
};

/// Formats an IL offset label, `IL_002a`
#[must_use]
pub fn label(offset: u32) -> String {
    format!("IL_{offset:04x}")
}

/// Renders the operand of a token-carrying instruction with names from `assembly`.
///
/// Methods render as `ReturnType Declaring::Name(ParamTypes)`, fields as
/// `FieldType Declaring::Name`, types as their full name and `ldstr` operands as a quoted
/// literal. Tokens that cannot be resolved render as hex.
#[must_use]
pub fn render_token(assembly: &Assembly, token: Token) -> String {
    const USER_STRING: u8 = 0x70;

    match token.table() {
        USER_STRING => assembly
            .user_string(token)
            .and_then(|literal| serde_json::to_string(&literal).ok())
            .unwrap_or_else(|| token.to_string()),
        t if t == TableId::MethodDef as u8 => match assembly.method(token) {
            Some(method) => format!(
                "{} {}({})",
                method
                    .signature
                    .return_type
                    .render(&|token| assembly.type_name(token)),
                assembly.method_display_name(token),
                assembly.parameter_type_names(&method.signature).join(", ")
            ),
            None => token.to_string(),
        },
        t if t == TableId::Field as u8 => match assembly.field(token) {
            Some(field) => format!(
                "{} {}::{}",
                assembly.render_type(&field.signature),
                assembly.type_name(field.declaring_type),
                field.name
            ),
            None => token.to_string(),
        },
        t if t == TableId::MemberRef as u8 => match assembly.member_ref(token) {
            Some(member_ref) => match &member_ref.signature {
                MemberRefSignature::Method(signature) => format!(
                    "{} {}({})",
                    signature
                        .return_type
                        .render(&|token| assembly.type_name(token)),
                    assembly.method_display_name(token),
                    assembly.parameter_type_names(signature).join(", ")
                ),
                MemberRefSignature::Field(signature) => format!(
                    "{} {}::{}",
                    assembly.render_type(signature),
                    assembly.type_name(member_ref.parent),
                    member_ref.name
                ),
            },
            None => token.to_string(),
        },
        t if t == TableId::MethodSpec as u8 => match assembly.method_spec(token) {
            Some(method_spec) => {
                let arguments: Vec<String> = method_spec
                    .instantiation
                    .generic_args
                    .iter()
                    .map(|argument| assembly.render_type(argument))
                    .collect();
                format!(
                    "{}<{}>",
                    render_token(assembly, method_spec.method),
                    arguments.join(", ")
                )
            }
            None => token.to_string(),
        },
        _ => assembly.type_name(token),
    }
}

/// Renders one instruction as `IL_0000: mnemonic operand`
#[must_use]
pub fn render_instruction(assembly: &Assembly, instruction: &Instruction) -> String {
    let operand = match &instruction.operand {
        Operand::None => None,
        Operand::Token(token) => Some(render_token(assembly, *token)),
        Operand::Immediate(_) if !instruction.branch_targets.is_empty() => {
            Some(label(instruction.branch_targets[0]))
        }
        Operand::Immediate(value) => Some(value.to_string()),
        Operand::Switch(_) => {
            let targets: Vec<String> =
                instruction.branch_targets.iter().map(|target| label(*target)).collect();
            Some(format!("({})", targets.join(", ")))
        }
    };

    match operand {
        Some(operand) => format!(
            "{}: {} {}",
            label(instruction.offset),
            instruction.mnemonic,
            operand
        ),
        None => format!("{}: {}", label(instruction.offset), instruction.mnemonic),
    }
}

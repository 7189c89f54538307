//! Shared fixture for the integration tests: a small "Shop" assembly assembled through the
//! public builder API.

#![allow(dead_code)]

pub mod image;

use dotlens::{
    disassembler::{Immediate, InstructionEncoder, Operand},
    metadata::{
        signatures::{SignatureMethod, SignatureProperty, TypeSignature},
        symbols::{
            Assembly, AssemblyBuilder, AssemblyVersion, FieldAttributes, MemberRefSignature,
            MethodSemanticsAttributes, TypeAttributes,
        },
        token::Token,
    },
    Analyzer,
};

/// public hidebysig
pub const PUBLIC_METHOD: u16 = 0x0086;
/// public static hidebysig
pub const PUBLIC_STATIC: u16 = 0x0096;
/// public hidebysig newslot virtual
pub const PUBLIC_NEW_VIRTUAL: u16 = 0x01C6;
/// public hidebysig virtual
pub const PUBLIC_OVERRIDE: u16 = 0x00C6;
/// public hidebysig specialname rtspecialname
pub const CONSTRUCTOR: u16 = 0x1886;
/// public hidebysig specialname
pub const ACCESSOR: u16 = 0x0886;

fn il(instructions: &[(&str, Option<Operand>)]) -> Vec<u8> {
    let mut encoder = InstructionEncoder::new();
    for (mnemonic, operand) in instructions {
        encoder
            .emit_instruction(mnemonic, operand.clone())
            .expect("fixture instructions are valid");
    }
    encoder.finalize()
}

fn tok(token: Token) -> Option<Operand> {
    Some(Operand::Token(token))
}

fn signature(has_this: bool, returns: TypeSignature, params: Vec<TypeSignature>) -> SignatureMethod {
    SignatureMethod::new(has_this, returns, params)
}

/// The fixture assembly and the tokens the tests refer to
pub struct Shop {
    pub assembly: Assembly,
    pub entity: Token,
    pub entity_describe: Token,
    pub order: Token,
    pub order_ctor: Token,
    pub order_total: Token,
    pub get_total: Token,
    pub set_total: Token,
    pub order_describe: Token,
    pub customer: Token,
    pub customer_describe: Token,
    pub priority_order: Token,
    pub priority_describe: Token,
    pub simple: Token,
    pub run: Token,
    pub process: Token,
    pub write_line: Token,
}

/// Builds the fixture assembly
pub fn shop() -> Shop {
    let mut builder = AssemblyBuilder::new("Shop");
    builder.set_version(AssemblyVersion::new(2, 0, 0, 0));

    let corlib = builder.add_assembly_ref("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
    let object = builder.add_type_ref(corlib, "System", "Object");
    let console = builder.add_type_ref(corlib, "System", "Console");
    let write_line = builder.add_member_ref(
        console,
        "WriteLine",
        MemberRefSignature::Method(signature(
            false,
            TypeSignature::Void,
            vec![TypeSignature::String],
        )),
    );

    builder.add_type("", "<Module>", TypeAttributes::NOT_PUBLIC, None);

    // Shop.Entity
    let entity = builder.add_type(
        "Shop",
        "Entity",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
        Some(object),
    );
    builder.add_field(entity, "id", FieldAttributes::PRIVATE, TypeSignature::I4);
    let entity_ctor = builder.add_method(
        entity,
        ".ctor",
        CONSTRUCTOR,
        signature(true, TypeSignature::Void, vec![]),
    );
    let entity_describe = builder.add_method(
        entity,
        "Describe",
        PUBLIC_NEW_VIRTUAL,
        signature(true, TypeSignature::String, vec![]),
    );

    // Shop.Order
    let order = builder.add_type("Shop", "Order", TypeAttributes::PUBLIC, Some(entity));
    let order_total = builder.add_field(order, "total", FieldAttributes::PRIVATE, TypeSignature::I4);
    let order_ctor = builder.add_method(
        order,
        ".ctor",
        CONSTRUCTOR,
        signature(true, TypeSignature::Void, vec![]),
    );
    let get_total = builder.add_method(
        order,
        "GetTotal",
        PUBLIC_METHOD,
        signature(true, TypeSignature::I4, vec![]),
    );
    let set_total = builder.add_method(
        order,
        "SetTotal",
        PUBLIC_METHOD,
        signature(true, TypeSignature::Void, vec![TypeSignature::I4]),
    );
    builder.set_param_names(set_total, vec!["value".to_string()]);
    let order_describe = builder.add_method(
        order,
        "Describe",
        PUBLIC_OVERRIDE,
        signature(true, TypeSignature::String, vec![]),
    );

    // Shop.Customer
    let customer = builder.add_type("Shop", "Customer", TypeAttributes::PUBLIC, Some(entity));
    let customer_name =
        builder.add_field(customer, "name", FieldAttributes::PRIVATE, TypeSignature::String);
    let customer_ctor = builder.add_method(
        customer,
        ".ctor",
        CONSTRUCTOR,
        signature(true, TypeSignature::Void, vec![]),
    );
    let customer_describe = builder.add_method(
        customer,
        "Describe",
        PUBLIC_OVERRIDE,
        signature(true, TypeSignature::String, vec![]),
    );
    let get_name = builder.add_method(
        customer,
        "get_Name",
        ACCESSOR,
        signature(true, TypeSignature::String, vec![]),
    );
    let name_property = builder.add_property(
        customer,
        "Name",
        0,
        SignatureProperty {
            has_this: true,
            base: TypeSignature::String,
            params: Vec::new(),
        },
    );
    builder.set_semantics(name_property, get_name, MethodSemanticsAttributes::GETTER);

    // Shop.PriorityOrder
    let priority_order =
        builder.add_type("Shop", "PriorityOrder", TypeAttributes::PUBLIC, Some(order));
    builder.add_field(priority_order, "level", FieldAttributes::PRIVATE, TypeSignature::I4);
    let priority_ctor = builder.add_method(
        priority_order,
        ".ctor",
        CONSTRUCTOR,
        signature(true, TypeSignature::Void, vec![]),
    );
    let priority_describe = builder.add_method(
        priority_order,
        "Describe",
        PUBLIC_OVERRIDE,
        signature(true, TypeSignature::String, vec![]),
    );

    // Shop.SimpleClass
    let simple = builder.add_type("Shop", "SimpleClass", TypeAttributes::PUBLIC, Some(object));
    let simple_ctor = builder.add_method(
        simple,
        ".ctor",
        CONSTRUCTOR,
        signature(true, TypeSignature::Void, vec![]),
    );
    let run = builder.add_method(
        simple,
        "Run",
        PUBLIC_STATIC,
        signature(false, TypeSignature::Void, vec![]),
    );

    // Shop.Services.Checkout
    let checkout = builder.add_type(
        "Shop.Services",
        "Checkout",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object),
    );
    let process = builder.add_method(
        checkout,
        "Process",
        PUBLIC_STATIC,
        signature(false, TypeSignature::Void, vec![TypeSignature::Class(order)]),
    );
    builder.set_param_names(process, vec!["order".to_string()]);

    let order_text = builder.add_user_string("order");
    let customer_text = builder.add_user_string("customer");
    let priority_text = builder.add_user_string("priority order");
    let done_text = builder.add_user_string("done");

    let ret = il(&[("ret", None)]);
    for ctor in [entity_ctor, simple_ctor] {
        builder.set_body(ctor, ret.clone());
    }
    for ctor in [order_ctor, customer_ctor] {
        builder.set_body(
            ctor,
            il(&[("ldarg.0", None), ("call", tok(entity_ctor)), ("ret", None)]),
        );
    }
    builder.set_body(
        priority_ctor,
        il(&[("ldarg.0", None), ("call", tok(order_ctor)), ("ret", None)]),
    );
    builder.set_body(
        get_total,
        il(&[("ldarg.0", None), ("ldfld", tok(order_total)), ("ret", None)]),
    );
    builder.set_body(
        set_total,
        il(&[
            ("ldarg.0", None),
            ("ldarg.1", None),
            ("stfld", tok(order_total)),
            ("ret", None),
        ]),
    );
    builder.set_body(entity_describe, il(&[("ldnull", None), ("ret", None)]));
    builder.set_body(order_describe, il(&[("ldstr", tok(order_text)), ("ret", None)]));
    builder.set_body(
        customer_describe,
        il(&[("ldstr", tok(customer_text)), ("ret", None)]),
    );
    builder.set_body(
        priority_describe,
        il(&[("ldstr", tok(priority_text)), ("ret", None)]),
    );
    builder.set_body(
        get_name,
        il(&[("ldarg.0", None), ("ldfld", tok(customer_name)), ("ret", None)]),
    );
    builder.set_body(
        process,
        il(&[
            ("ldarg.0", None),
            ("callvirt", tok(get_total)),
            ("pop", None),
            ("ldarg.0", None),
            ("callvirt", tok(order_describe)),
            ("call", tok(write_line)),
            ("ret", None),
        ]),
    );
    builder.set_body(
        run,
        il(&[
            ("newobj", tok(order_ctor)),
            ("dup", None),
            ("ldc.i4.s", Some(Operand::Immediate(Immediate::Int8(42)))),
            ("callvirt", tok(set_total)),
            ("call", tok(process)),
            ("ldstr", tok(done_text)),
            ("call", tok(write_line)),
            ("ret", None),
        ]),
    );
    builder.set_entry_point(run);

    Shop {
        assembly: builder.build(),
        entity,
        entity_describe,
        order,
        order_ctor,
        order_total,
        get_total,
        set_total,
        order_describe,
        customer,
        customer_describe,
        priority_order,
        priority_describe,
        simple,
        run,
        process,
        write_line,
    }
}

/// An analyzer with the fixture loaded
pub fn loaded() -> (Shop, Analyzer) {
    let shop = shop();
    let analyzer = Analyzer::new();
    analyzer
        .load_assembly(shop.assembly.clone())
        .expect("installing a built assembly succeeds");
    (shop, analyzer)
}

/// Hexadecimal token input, `0x06000001`
pub fn hex(token: Token) -> String {
    format!("0x{:08x}", token.value())
}

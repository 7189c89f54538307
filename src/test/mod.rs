//! Shared fixture for unit tests.
//!
//! [`sample`] builds a small but complete assembly through [`AssemblyBuilder`], with IL bodies
//! produced by the instruction encoder, so analysis tests run without any file on disk:
//!
//! ```text
//! Sample.Animals
//!     IDescribable            interface, Describe()
//!     Animal : Object         abstract, implements IDescribable, Name { get; }, abstract Speak()
//!     Dog : Animal            overrides Speak()
//!     Dog+Puppy : Dog         overrides Speak()
//!     Cat : Animal            sealed, overrides Speak()
//!     Helper                  internal
//! Sample
//!     SimpleClass             counter field, Count { get; }, Reset(), Add(int), Add(string)
//!     Program                 static Main(), Changed event
//! Sample.Util
//!     Helper                  static Format(string), static Identity<T>(T)
//! ```

use crate::{
    disassembler::{Immediate, InstructionEncoder, Operand},
    metadata::{
        signatures::{SignatureMethod, SignatureMethodSpec, SignatureProperty, TypeSignature},
        symbols::{
            Assembly, AssemblyBuilder, AssemblyVersion, FieldAttributes, MemberRefSignature,
            MethodSemanticsAttributes, TypeAttributes,
        },
        token::Token,
    },
};

/// public hidebysig
pub const PUBLIC_METHOD: u16 = 0x0086;
/// public hidebysig static
pub const PUBLIC_STATIC: u16 = 0x0096;
/// public hidebysig newslot virtual
pub const PUBLIC_NEW_VIRTUAL: u16 = 0x01C6;
/// public hidebysig newslot abstract virtual
pub const PUBLIC_ABSTRACT: u16 = 0x05C6;
/// public hidebysig virtual, overriding the inherited slot
pub const PUBLIC_OVERRIDE: u16 = 0x00C6;
/// public final hidebysig newslot virtual, an interface implementation
pub const PUBLIC_FINAL_VIRTUAL: u16 = 0x01E6;
/// public hidebysig specialname rtspecialname
pub const CONSTRUCTOR: u16 = 0x1886;
/// public hidebysig specialname
pub const ACCESSOR: u16 = 0x0886;

/// Encodes a list of instructions
pub fn il(instructions: &[(&str, Option<Operand>)]) -> Vec<u8> {
    let mut encoder = InstructionEncoder::new();
    for (mnemonic, operand) in instructions {
        encoder.emit_instruction(mnemonic, operand.clone()).unwrap();
    }
    encoder.finalize()
}

/// Shorthand for a token operand
pub fn tok(token: Token) -> Option<Operand> {
    Some(Operand::Token(token))
}

fn string_method(has_this: bool) -> SignatureMethod {
    SignatureMethod::new(has_this, TypeSignature::String, vec![])
}

fn void_method(has_this: bool, params: Vec<TypeSignature>) -> SignatureMethod {
    SignatureMethod::new(has_this, TypeSignature::Void, params)
}

/// The fixture assembly and the tokens tests refer to
#[allow(missing_docs)]
pub struct Sample {
    pub assembly: Assembly,
    pub object_ref: Token,
    pub describable: Token,
    pub describe_iface: Token,
    pub animal: Token,
    pub animal_name_field: Token,
    pub animal_ctor: Token,
    pub animal_speak: Token,
    pub animal_get_name: Token,
    pub animal_name_property: Token,
    pub animal_describe: Token,
    pub dog: Token,
    pub dog_ctor: Token,
    pub dog_speak: Token,
    pub puppy: Token,
    pub puppy_speak: Token,
    pub cat: Token,
    pub cat_speak: Token,
    pub animals_helper: Token,
    pub simple: Token,
    pub counter_field: Token,
    pub simple_ctor: Token,
    pub get_count: Token,
    pub count_property: Token,
    pub reset: Token,
    pub add_int: Token,
    pub add_string: Token,
    pub program: Token,
    pub main: Token,
    pub changed_event: Token,
    pub add_changed: Token,
    pub remove_changed: Token,
    pub util_helper: Token,
    pub format: Token,
    pub identity: Token,
    pub identity_int: Token,
    pub speak_member_ref: Token,
    pub write_line_ref: Token,
    pub greeting: Token,
}

/// Builds the fixture assembly
pub fn sample() -> Sample {
    let mut builder = AssemblyBuilder::new("Sample");
    builder.set_version(AssemblyVersion::new(1, 2, 3, 4));

    let corlib = builder.add_assembly_ref("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
    let object_ref = builder.add_type_ref(corlib, "System", "Object");
    let console = builder.add_type_ref(corlib, "System", "Console");
    let event_handler = builder.add_type_ref(corlib, "System", "EventHandler");

    builder.add_type("", "<Module>", TypeAttributes::NOT_PUBLIC, None);

    // Sample.Animals
    let describable = builder.add_type(
        "Sample.Animals",
        "IDescribable",
        TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
        None,
    );
    let describe_iface =
        builder.add_method(describable, "Describe", PUBLIC_ABSTRACT, string_method(true));

    let animal = builder.add_type(
        "Sample.Animals",
        "Animal",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
        Some(object_ref),
    );
    builder.add_interface(animal, describable);
    let animal_name_field = builder.add_field(
        animal,
        "name",
        FieldAttributes::PRIVATE,
        TypeSignature::String,
    );
    let animal_ctor = builder.add_method(animal, ".ctor", CONSTRUCTOR, void_method(true, vec![]));
    let animal_speak =
        builder.add_method(animal, "Speak", PUBLIC_ABSTRACT, string_method(true));
    let animal_get_name = builder.add_method(animal, "get_Name", ACCESSOR, string_method(true));
    let animal_describe = builder.add_method(
        animal,
        "Describe",
        PUBLIC_FINAL_VIRTUAL,
        string_method(true),
    );
    let animal_name_property = builder.add_property(
        animal,
        "Name",
        0,
        SignatureProperty {
            has_this: true,
            base: TypeSignature::String,
            params: vec![],
        },
    );
    builder.set_semantics(
        animal_name_property,
        animal_get_name,
        MethodSemanticsAttributes::GETTER,
    );

    let dog = builder.add_type(
        "Sample.Animals",
        "Dog",
        TypeAttributes::PUBLIC,
        Some(animal),
    );
    let dog_ctor = builder.add_method(dog, ".ctor", CONSTRUCTOR, void_method(true, vec![]));
    let dog_speak = builder.add_method(dog, "Speak", PUBLIC_OVERRIDE, string_method(true));

    let puppy = builder.add_type("", "Puppy", TypeAttributes::NESTED_PUBLIC, Some(dog));
    builder.nest(puppy, dog);
    let puppy_speak = builder.add_method(puppy, "Speak", PUBLIC_OVERRIDE, string_method(true));

    let cat = builder.add_type(
        "Sample.Animals",
        "Cat",
        TypeAttributes::PUBLIC | TypeAttributes::SEALED,
        Some(animal),
    );
    let cat_speak = builder.add_method(cat, "Speak", PUBLIC_OVERRIDE, string_method(true));

    let animals_helper = builder.add_type(
        "Sample.Animals",
        "Helper",
        TypeAttributes::NOT_PUBLIC,
        Some(object_ref),
    );

    // Sample
    let simple = builder.add_type("Sample", "SimpleClass", TypeAttributes::PUBLIC, Some(object_ref));
    let counter_field =
        builder.add_field(simple, "counter", FieldAttributes::PRIVATE, TypeSignature::I4);
    let simple_ctor = builder.add_method(simple, ".ctor", CONSTRUCTOR, void_method(true, vec![]));
    let get_count = builder.add_method(
        simple,
        "get_Count",
        ACCESSOR,
        SignatureMethod::new(true, TypeSignature::I4, vec![]),
    );
    let reset = builder.add_method(simple, "Reset", PUBLIC_METHOD, void_method(true, vec![]));
    let add_int = builder.add_method(
        simple,
        "Add",
        PUBLIC_METHOD,
        void_method(true, vec![TypeSignature::I4]),
    );
    let add_string = builder.add_method(
        simple,
        "Add",
        PUBLIC_METHOD,
        void_method(true, vec![TypeSignature::String]),
    );
    builder.set_param_names(add_int, vec!["value".to_string()]);
    builder.set_param_names(add_string, vec!["text".to_string()]);
    let count_property = builder.add_property(
        simple,
        "Count",
        0,
        SignatureProperty {
            has_this: true,
            base: TypeSignature::I4,
            params: vec![],
        },
    );
    builder.set_semantics(count_property, get_count, MethodSemanticsAttributes::GETTER);

    let program = builder.add_type(
        "Sample",
        "Program",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object_ref),
    );
    let main = builder.add_method(program, "Main", PUBLIC_STATIC, void_method(false, vec![]));
    let handler = TypeSignature::Class(event_handler);
    let add_changed = builder.add_method(
        program,
        "add_Changed",
        ACCESSOR | 0x0010,
        void_method(false, vec![handler.clone()]),
    );
    let remove_changed = builder.add_method(
        program,
        "remove_Changed",
        ACCESSOR | 0x0010,
        void_method(false, vec![handler]),
    );
    let changed_event = builder.add_event(program, "Changed", 0, Some(event_handler));
    builder.set_semantics(changed_event, add_changed, MethodSemanticsAttributes::ADD_ON);
    builder.set_semantics(changed_event, remove_changed, MethodSemanticsAttributes::REMOVE_ON);

    // Sample.Util
    let util_helper = builder.add_type(
        "Sample.Util",
        "Helper",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object_ref),
    );
    let format = builder.add_method(
        util_helper,
        "Format",
        PUBLIC_STATIC,
        SignatureMethod::new(false, TypeSignature::String, vec![TypeSignature::String]),
    );
    let mut identity_signature = SignatureMethod::new(
        false,
        TypeSignature::GenericParamMethod(0),
        vec![TypeSignature::GenericParamMethod(0)],
    );
    identity_signature.param_count_generic = 1;
    let identity = builder.add_method(util_helper, "Identity", PUBLIC_STATIC, identity_signature);
    builder.add_generic_param(identity, "T");

    // references
    let speak_member_ref = builder.add_member_ref(
        animal,
        "Speak",
        MemberRefSignature::Method(string_method(true)),
    );
    let write_line_ref = builder.add_member_ref(
        console,
        "WriteLine",
        MemberRefSignature::Method(void_method(false, vec![TypeSignature::String])),
    );
    let identity_int = builder.add_method_spec(
        identity,
        SignatureMethodSpec {
            generic_args: vec![TypeSignature::I4],
        },
    );

    // bodies
    let woof = builder.add_user_string("Woof");
    let yip = builder.add_user_string("Yip");
    let meow = builder.add_user_string("Meow");
    let greeting = builder.add_user_string("Hello, \"world\"");

    builder.set_body(animal_ctor, il(&[("ret", None)]));
    builder.set_body(
        animal_get_name,
        il(&[("ldarg.0", None), ("ldfld", tok(animal_name_field)), ("ret", None)]),
    );
    builder.set_body(
        animal_describe,
        il(&[("ldarg.0", None), ("callvirt", tok(animal_speak)), ("ret", None)]),
    );
    builder.set_body(
        dog_ctor,
        il(&[("ldarg.0", None), ("call", tok(animal_ctor)), ("ret", None)]),
    );
    builder.set_body(dog_speak, il(&[("ldstr", tok(woof)), ("ret", None)]));
    builder.set_body(puppy_speak, il(&[("ldstr", tok(yip)), ("ret", None)]));
    builder.set_body(cat_speak, il(&[("ldstr", tok(meow)), ("ret", None)]));
    builder.set_body(simple_ctor, il(&[("ret", None)]));
    builder.set_body(
        get_count,
        il(&[("ldarg.0", None), ("ldfld", tok(counter_field)), ("ret", None)]),
    );
    builder.set_body(
        reset,
        il(&[
            ("ldarg.0", None),
            ("ldc.i4.0", None),
            ("stfld", tok(counter_field)),
            ("ret", None),
        ]),
    );
    builder.set_body(add_int, il(&[("ret", None)]));
    builder.set_body(add_string, il(&[("ret", None)]));
    builder.set_body(format, il(&[("ldarg.0", None), ("ret", None)]));
    builder.set_body(identity, il(&[("ldarg.0", None), ("ret", None)]));
    builder.set_body(add_changed, il(&[("ret", None)]));
    builder.set_body(remove_changed, il(&[("ret", None)]));
    builder.set_body(
        main,
        il(&[
            ("newobj", tok(dog_ctor)),
            ("callvirt", tok(speak_member_ref)),
            ("call", tok(write_line_ref)),
            ("ldstr", tok(greeting)),
            ("call", tok(format)),
            ("call", tok(write_line_ref)),
            ("newobj", tok(simple_ctor)),
            ("callvirt", tok(get_count)),
            ("call", tok(identity_int)),
            ("pop", None),
            ("ldc.i4.s", Some(Operand::Immediate(Immediate::Int8(3)))),
            ("brtrue.s", Some(Operand::Immediate(Immediate::Int8(0)))),
            ("ret", None),
        ]),
    );
    builder.set_entry_point(main);

    Sample {
        assembly: builder.build(),
        object_ref,
        describable,
        describe_iface,
        animal,
        animal_name_field,
        animal_ctor,
        animal_speak,
        animal_get_name,
        animal_name_property,
        animal_describe,
        dog,
        dog_ctor,
        dog_speak,
        puppy,
        puppy_speak,
        cat,
        cat_speak,
        animals_helper,
        simple,
        counter_field,
        simple_ctor,
        get_count,
        count_property,
        reset,
        add_int,
        add_string,
        program,
        main,
        changed_event,
        add_changed,
        remove_changed,
        util_helper,
        format,
        identity,
        identity_int,
        speak_member_ref,
        write_line_ref,
        greeting,
    }
}

//! The in-memory symbol model of one loaded assembly.
//!
//! [`Assembly`] holds every definition the analysis layer needs, in metadata row order, so the
//! row number of a definition is also the low part of its token. Definitions are shared through
//! [`Arc`] so that symbols, index entries and query results can point at them without copying.
//! The model is immutable once built; it is produced either by [`crate::metadata::loader`] from
//! a PE image or programmatically through [`AssemblyBuilder`].
//!
//! # Examples
//!
//! ```rust
//! use dotlens::metadata::symbols::{AssemblyBuilder, TypeAttributes};
//!
//! let mut builder = AssemblyBuilder::new("Sample");
//! let animal = builder.add_type("Zoo", "Animal", TypeAttributes::PUBLIC, None);
//! let assembly = builder.build();
//!
//! assert_eq!(assembly.type_def(animal).unwrap().full_name, "Zoo.Animal");
//! ```

mod builder;
mod flags;

pub use builder::AssemblyBuilder;
pub use flags::*;

use std::{fmt, sync::Arc};

use serde::Serialize;

use crate::metadata::{
    signatures::{
        SignatureMethod, SignatureMethodSpec, SignatureProperty, TypeSignature,
    },
    streams::UserStrings,
    tables::TableId,
    token::Token,
};

/// Four part assembly version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyVersion {
    /// Creates a version from its four parts
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// A type defined in this assembly (`TypeDef` row)
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// Namespace; nested types carry the namespace of their outermost enclosing type
    pub namespace: String,
    /// Simple name, including a generic arity suffix such as `` `1 ``
    pub name: String,
    /// Namespace-qualified name, nested types joined with `+`
    pub full_name: String,
    /// Raw [`TypeAttributes`]
    pub flags: u32,
    /// Base type token (`TypeDef`, `TypeRef` or `TypeSpec`)
    pub base: Option<Token>,
    /// Directly implemented interfaces, in `InterfaceImpl` order
    pub interfaces: Vec<Token>,
    /// Enclosing type of a nested type
    pub enclosing: Option<Token>,
    /// Types nested directly in this one
    pub nested_types: Vec<Token>,
    /// Generic parameter names
    pub generic_params: Vec<String>,
    /// `MethodDef` tokens
    pub methods: Vec<Token>,
    /// `Field` tokens
    pub fields: Vec<Token>,
    /// `Property` tokens
    pub properties: Vec<Token>,
    /// `Event` tokens
    pub events: Vec<Token>,
}

impl TypeDef {
    /// Interface type
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::INTERFACE != 0
    }

    /// Abstract class or interface
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags & TypeAttributes::ABSTRACT != 0
    }

    /// Sealed class
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags & TypeAttributes::SEALED != 0
    }

    /// Nested in another type
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }

    /// Static class (`abstract sealed`)
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_abstract() && self.is_sealed()
    }

    /// Declared accessibility
    #[must_use]
    pub fn accessibility(&self) -> Accessibility {
        Accessibility::from_type_flags(self.flags)
    }
}

/// A method defined in this assembly (`MethodDef` row)
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// `MethodDef` token
    pub token: Token,
    /// Method name, `.ctor` / `.cctor` for constructors
    pub name: String,
    /// Raw method attributes
    pub flags: u16,
    /// Raw method implementation attributes
    pub impl_flags: u16,
    /// Parsed signature
    pub signature: SignatureMethod,
    /// Parameter names in declaration order (missing names are empty)
    pub param_names: Vec<String>,
    /// Generic parameter names
    pub generic_params: Vec<String>,
    /// Declaring type
    pub declaring_type: Token,
    /// IL code without the body header
    pub body: Option<Arc<[u8]>>,
}

impl MethodDef {
    /// Attribute modifiers
    #[must_use]
    pub fn modifiers(&self) -> MethodModifiers {
        MethodModifiers::from_method_flags(self.flags)
    }

    /// Static method
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers().contains(MethodModifiers::STATIC)
    }

    /// Virtual method
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.modifiers().contains(MethodModifiers::VIRTUAL)
    }

    /// Abstract method
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.modifiers().contains(MethodModifiers::ABSTRACT)
    }

    /// Introduces a new vtable slot instead of reusing the base one
    #[must_use]
    pub fn is_new_slot(&self) -> bool {
        self.modifiers().contains(MethodModifiers::NEW_SLOT)
    }

    /// Instance or static constructor
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// Declared accessibility
    #[must_use]
    pub fn accessibility(&self) -> Accessibility {
        Accessibility::from_member_access(self.flags)
    }
}

/// A field defined in this assembly (`Field` row)
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Raw [`FieldAttributes`]
    pub flags: u16,
    /// Field type
    pub signature: TypeSignature,
    /// Declaring type
    pub declaring_type: Token,
}

impl FieldDef {
    /// Static field
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// Compile time constant
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags & FieldAttributes::LITERAL != 0
    }

    /// Declared accessibility
    #[must_use]
    pub fn accessibility(&self) -> Accessibility {
        Accessibility::from_member_access(self.flags)
    }
}

/// A property defined in this assembly (`Property` row plus its accessors)
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// `Property` token
    pub token: Token,
    /// Property name
    pub name: String,
    /// Raw property attributes
    pub flags: u16,
    /// Parsed signature
    pub signature: SignatureProperty,
    /// Getter method
    pub getter: Option<Token>,
    /// Setter method
    pub setter: Option<Token>,
    /// Declaring type
    pub declaring_type: Token,
}

impl PropertyDef {
    /// Accessor methods
    pub fn accessors(&self) -> impl Iterator<Item = Token> {
        self.getter.into_iter().chain(self.setter)
    }
}

/// An event defined in this assembly (`Event` row plus its accessors)
#[derive(Debug, Clone)]
pub struct EventDef {
    /// `Event` token
    pub token: Token,
    /// Event name
    pub name: String,
    /// Raw event attributes
    pub flags: u16,
    /// Delegate type
    pub event_type: Option<Token>,
    /// `add_` accessor
    pub add: Option<Token>,
    /// `remove_` accessor
    pub remove: Option<Token>,
    /// `raise_` accessor
    pub raise: Option<Token>,
    /// Declaring type
    pub declaring_type: Token,
}

impl EventDef {
    /// Accessor methods
    pub fn accessors(&self) -> impl Iterator<Item = Token> {
        self.add.into_iter().chain(self.remove).chain(self.raise)
    }
}

/// A reference to a type in another module or assembly (`TypeRef` row)
#[derive(Debug, Clone)]
pub struct TypeRefDef {
    /// `TypeRef` token
    pub token: Token,
    /// Namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Namespace-qualified name, nested references joined with `+`
    pub full_name: String,
    /// Resolution scope: `AssemblyRef`, `ModuleRef`, `Module` or enclosing `TypeRef`
    pub scope: Token,
}

/// Signature of a member reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRefSignature {
    /// Reference to a method
    Method(SignatureMethod),
    /// Reference to a field
    Field(TypeSignature),
}

/// A reference to a field or method through its parent type (`MemberRef` row)
#[derive(Debug, Clone)]
pub struct MemberRefDef {
    /// `MemberRef` token
    pub token: Token,
    /// Parent (`TypeDef`, `TypeRef`, `TypeSpec`, `ModuleRef` or `MethodDef`)
    pub parent: Token,
    /// Member name
    pub name: String,
    /// Member signature
    pub signature: MemberRefSignature,
}

/// A constructed type (`TypeSpec` row)
#[derive(Debug, Clone)]
pub struct TypeSpecDef {
    /// `TypeSpec` token
    pub token: Token,
    /// The type
    pub signature: TypeSignature,
}

/// A generic method instantiation (`MethodSpec` row)
#[derive(Debug, Clone)]
pub struct MethodSpecDef {
    /// `MethodSpec` token
    pub token: Token,
    /// The generic method (`MethodDef` or `MemberRef`)
    pub method: Token,
    /// The type arguments
    pub instantiation: SignatureMethodSpec,
}

/// A referenced assembly (`AssemblyRef` row)
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyRefDef {
    /// `AssemblyRef` token
    pub token: Token,
    /// Simple assembly name
    pub name: String,
    /// Referenced version
    pub version: AssemblyVersion,
    /// Culture, empty for neutral
    pub culture: String,
}

/// The complete symbol model of one assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Assembly name (the module name without extension if there is no `Assembly` row)
    pub name: String,
    /// Assembly version
    pub version: AssemblyVersion,
    /// Module name
    pub module_name: String,
    /// Module version identifier
    pub mvid: uguid::Guid,
    /// Entry point method, if any
    pub entry_point: Option<Token>,
    /// Type definitions in row order
    pub types: Vec<Arc<TypeDef>>,
    /// Method definitions in row order
    pub methods: Vec<Arc<MethodDef>>,
    /// Field definitions in row order
    pub fields: Vec<Arc<FieldDef>>,
    /// Property definitions in row order
    pub properties: Vec<Arc<PropertyDef>>,
    /// Event definitions in row order
    pub events: Vec<Arc<EventDef>>,
    /// Type references in row order
    pub type_refs: Vec<TypeRefDef>,
    /// Member references in row order
    pub member_refs: Vec<MemberRefDef>,
    /// Type specifications in row order
    pub type_specs: Vec<TypeSpecDef>,
    /// Method specifications in row order
    pub method_specs: Vec<MethodSpecDef>,
    /// Referenced assemblies in row order
    pub assembly_refs: Vec<AssemblyRefDef>,
    /// The `#US` heap
    pub user_strings: UserStrings,
}

fn by_token<T>(rows: &[T], token: Token, table: TableId) -> Option<&T> {
    if token.table() != table as u8 || token.is_null() {
        return None;
    }

    rows.get(token.row() as usize - 1)
}

impl Assembly {
    /// Looks up a type definition
    #[must_use]
    pub fn type_def(&self, token: Token) -> Option<&Arc<TypeDef>> {
        by_token(&self.types, token, TableId::TypeDef)
    }

    /// Looks up a method definition
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&Arc<MethodDef>> {
        by_token(&self.methods, token, TableId::MethodDef)
    }

    /// Looks up a field definition
    #[must_use]
    pub fn field(&self, token: Token) -> Option<&Arc<FieldDef>> {
        by_token(&self.fields, token, TableId::Field)
    }

    /// Looks up a property definition
    #[must_use]
    pub fn property(&self, token: Token) -> Option<&Arc<PropertyDef>> {
        by_token(&self.properties, token, TableId::Property)
    }

    /// Looks up an event definition
    #[must_use]
    pub fn event(&self, token: Token) -> Option<&Arc<EventDef>> {
        by_token(&self.events, token, TableId::Event)
    }

    /// Looks up a type reference
    #[must_use]
    pub fn type_ref(&self, token: Token) -> Option<&TypeRefDef> {
        by_token(&self.type_refs, token, TableId::TypeRef)
    }

    /// Looks up a member reference
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRefDef> {
        by_token(&self.member_refs, token, TableId::MemberRef)
    }

    /// Looks up a type specification
    #[must_use]
    pub fn type_spec(&self, token: Token) -> Option<&TypeSpecDef> {
        by_token(&self.type_specs, token, TableId::TypeSpec)
    }

    /// Looks up a method specification
    #[must_use]
    pub fn method_spec(&self, token: Token) -> Option<&MethodSpecDef> {
        by_token(&self.method_specs, token, TableId::MethodSpec)
    }

    /// Decodes an `ldstr` operand
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<String> {
        if token.table() != 0x70 {
            return None;
        }

        self.user_strings.get(token.row() as usize).ok()
    }

    /// Full name of a `TypeDef`, `TypeRef` or `TypeSpec` token.
    ///
    /// Unknown tokens render as their hex value.
    #[must_use]
    pub fn type_name(&self, token: Token) -> String {
        if let Some(type_def) = self.type_def(token) {
            return type_def.full_name.clone();
        }
        if let Some(type_ref) = self.type_ref(token) {
            return type_ref.full_name.clone();
        }
        if let Some(type_spec) = self.type_spec(token) {
            return self.render_type(&type_spec.signature);
        }

        token.to_string()
    }

    /// Renders a signature type with full names
    #[must_use]
    pub fn render_type(&self, signature: &TypeSignature) -> String {
        signature.render(&|token| self.type_name(token))
    }

    /// Renders a method signature as `ReturnType Name(ParamType, ...)`
    #[must_use]
    pub fn method_signature_text(&self, method: &MethodDef) -> String {
        let params: Vec<String> = method
            .signature
            .params
            .iter()
            .map(|param| param.render(&|token| self.type_name(token)))
            .collect();

        format!(
            "{} {}({})",
            method
                .signature
                .return_type
                .render(&|token| self.type_name(token)),
            method.name,
            params.join(", ")
        )
    }

    /// Parameter type names of a method, fully qualified
    #[must_use]
    pub fn parameter_type_names(&self, signature: &SignatureMethod) -> Vec<String> {
        signature
            .params
            .iter()
            .map(|param| param.render(&|token| self.type_name(token)))
            .collect()
    }

    /// The `TypeDef` a type token denotes inside this assembly.
    ///
    /// `TypeDef` tokens map to themselves; a `TypeSpec` of a generic instantiation maps to its
    /// generic type definition. `TypeRef`s point outside the module and yield `None`.
    #[must_use]
    pub fn resolve_type_token(&self, token: Token) -> Option<Token> {
        if self.type_def(token).is_some() {
            return Some(token);
        }

        let type_spec = self.type_spec(token)?;
        match &type_spec.signature {
            TypeSignature::GenericInst(base, _) => match base.as_ref() {
                TypeSignature::Class(inner) | TypeSignature::ValueType(inner) => {
                    self.type_def(*inner).map(|type_def| type_def.token)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// The in-assembly definition a `MemberRef` points at, if its parent is defined here.
    ///
    /// Methods match on name, generic arity and parameter type names; fields on name.
    #[must_use]
    pub fn resolve_member_ref(&self, token: Token) -> Option<Token> {
        let member_ref = self.member_ref(token)?;
        if let Some(method) = self.method(member_ref.parent) {
            // vararg call site referencing a MethodDef
            return Some(method.token);
        }

        let parent = self.type_def(self.resolve_type_token(member_ref.parent)?)?;
        match &member_ref.signature {
            MemberRefSignature::Field(_) => parent
                .fields
                .iter()
                .filter_map(|field| self.field(*field))
                .find(|field| field.name == member_ref.name)
                .map(|field| field.token),
            MemberRefSignature::Method(signature) => {
                let wanted = self.parameter_type_names(signature);
                parent
                    .methods
                    .iter()
                    .filter_map(|method| self.method(*method))
                    .find(|method| {
                        method.name == member_ref.name
                            && method.signature.param_count_generic
                                == signature.param_count_generic
                            && method.signature.has_this == signature.has_this
                            && self.parameter_type_names(&method.signature) == wanted
                    })
                    .map(|method| method.token)
            }
        }
    }

    /// Resolves any member-denoting token to its definition in this assembly.
    ///
    /// Definition tokens map to themselves, `MemberRef`s through [`Assembly::resolve_member_ref`]
    /// and `MethodSpec`s through their generic method.
    #[must_use]
    pub fn resolve_definition(&self, token: Token) -> Option<Token> {
        match token.table() {
            t if t == TableId::MemberRef as u8 => self.resolve_member_ref(token),
            t if t == TableId::MethodSpec as u8 => {
                let method_spec = self.method_spec(token)?;
                self.resolve_definition(method_spec.method)
            }
            t if t == TableId::TypeSpec as u8 => self.resolve_type_token(token),
            _ => self.contains(token).then_some(token),
        }
    }

    /// Whether `token` names a definition row that exists in this assembly
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        match token.table() {
            t if t == TableId::TypeDef as u8 => self.type_def(token).is_some(),
            t if t == TableId::MethodDef as u8 => self.method(token).is_some(),
            t if t == TableId::Field as u8 => self.field(token).is_some(),
            t if t == TableId::Property as u8 => self.property(token).is_some(),
            t if t == TableId::Event as u8 => self.event(token).is_some(),
            _ => false,
        }
    }

    /// Human readable name of any method-denoting token, including external references.
    #[must_use]
    pub fn method_display_name(&self, token: Token) -> String {
        if let Some(method) = self.method(token) {
            return format!("{}::{}", self.type_name(method.declaring_type), method.name);
        }
        if let Some(member_ref) = self.member_ref(token) {
            return format!("{}::{}", self.type_name(member_ref.parent), member_ref.name);
        }
        if let Some(method_spec) = self.method_spec(token) {
            return self.method_display_name(method_spec.method);
        }

        token.to_string()
    }

    /// The property or event a method is an accessor of
    #[must_use]
    pub fn accessor_owner(&self, method: Token) -> Option<Token> {
        let declaring = self.type_def(self.method(method)?.declaring_type)?;
        declaring
            .properties
            .iter()
            .filter_map(|property| self.property(*property))
            .find(|property| property.accessors().any(|accessor| accessor == method))
            .map(|property| property.token)
            .or_else(|| {
                declaring
                    .events
                    .iter()
                    .filter_map(|event| self.event(*event))
                    .find(|event| event.accessors().any(|accessor| accessor == method))
                    .map(|event| event.token)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::SignatureParameter;

    fn sample() -> (Assembly, Token, Token, Token, Token) {
        let mut builder = AssemblyBuilder::new("Sample");
        let corlib = builder.add_assembly_ref("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
        let object = builder.add_type_ref(corlib, "System", "Object");
        let outer = builder.add_type("Sample", "Outer", TypeAttributes::PUBLIC, Some(object));
        let inner = builder.add_type("", "Inner", TypeAttributes::NESTED_PUBLIC, Some(object));
        builder.nest(inner, outer);

        let run_int = builder.add_method(
            outer,
            "Run",
            0x0006,
            SignatureMethod::new(true, TypeSignature::Void, vec![TypeSignature::I4]),
        );
        let run_string = builder.add_method(
            outer,
            "Run",
            0x0006,
            SignatureMethod::new(true, TypeSignature::Void, vec![TypeSignature::String]),
        );

        (builder.build(), outer, inner, run_int, run_string)
    }

    #[test]
    fn lookups_and_names() {
        let (assembly, outer, inner, run_int, _) = sample();

        assert_eq!(assembly.type_def(outer).unwrap().full_name, "Sample.Outer");
        assert_eq!(assembly.type_def(inner).unwrap().full_name, "Sample.Outer+Inner");
        assert_eq!(assembly.type_def(inner).unwrap().namespace, "Sample");
        assert_eq!(assembly.type_def(outer).unwrap().nested_types, vec![inner]);
        assert_eq!(assembly.type_name(Token::new(0x0100_0001)), "System.Object");
        assert_eq!(assembly.type_name(Token::new(0x0100_0099)), "0x01000099");

        let method = assembly.method(run_int).unwrap();
        assert_eq!(
            assembly.method_signature_text(method),
            "System.Void Run(System.Int32)"
        );
        assert_eq!(assembly.method_display_name(run_int), "Sample.Outer::Run");

        assert!(assembly.type_def(Token::new(0x0200_0000)).is_none());
        assert!(assembly.type_def(run_int).is_none());
        assert!(assembly.contains(run_int));
        assert!(!assembly.contains(Token::new(0x0600_0010)));
    }

    #[test]
    fn member_ref_resolution() {
        let (assembly, outer, _, run_int, run_string) = sample();
        let mut builder = AssemblyBuilder::from_assembly(&assembly);

        let by_string = builder.add_member_ref(
            outer,
            "Run",
            MemberRefSignature::Method(SignatureMethod::new(
                true,
                TypeSignature::Void,
                vec![TypeSignature::String],
            )),
        );
        let mut signature = SignatureMethod::new(true, TypeSignature::Void, vec![]);
        signature.params.push(SignatureParameter::new(TypeSignature::I4));
        let by_int = builder.add_member_ref(outer, "Run", MemberRefSignature::Method(signature));
        let missing = builder.add_member_ref(
            outer,
            "Walk",
            MemberRefSignature::Method(SignatureMethod::new(true, TypeSignature::Void, vec![])),
        );
        let assembly = builder.build();

        assert_eq!(assembly.resolve_member_ref(by_string), Some(run_string));
        assert_eq!(assembly.resolve_member_ref(by_int), Some(run_int));
        assert_eq!(assembly.resolve_member_ref(missing), None);
        assert_eq!(assembly.resolve_definition(by_int), Some(run_int));
        assert_eq!(assembly.resolve_definition(run_int), Some(run_int));
    }
}

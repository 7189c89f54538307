use std::sync::Arc;

use crate::metadata::{
    signatures::{
        SignatureMethod, SignatureMethodSpec, SignatureProperty, TypeSignature,
    },
    streams::UserStrings,
    symbols::{
        Assembly, AssemblyRefDef, AssemblyVersion, EventDef, FieldDef, MemberRefDef,
        MemberRefSignature, MethodDef, MethodSemanticsAttributes, MethodSpecDef, PropertyDef,
        TypeDef, TypeRefDef, TypeSpecDef,
    },
    tables::TableId,
    token::Token,
};

/// Assembles an [`Assembly`] row by row.
///
/// Every `add_*` call appends a row to the matching table and returns its token, so tokens are
/// assigned in call order exactly like the metadata loader assigns them in row order. Derived
/// data (full names, nested type lists, the effective namespace of nested types) is computed
/// once in [`AssemblyBuilder::build`].
///
/// Mutating calls that name a token of the wrong table, or a row that does not exist, are
/// ignored.
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    name: String,
    version: AssemblyVersion,
    module_name: String,
    mvid: uguid::Guid,
    entry_point: Option<Token>,
    types: Vec<TypeDef>,
    methods: Vec<MethodDef>,
    fields: Vec<FieldDef>,
    properties: Vec<PropertyDef>,
    events: Vec<EventDef>,
    type_refs: Vec<TypeRefDef>,
    member_refs: Vec<MemberRefDef>,
    type_specs: Vec<TypeSpecDef>,
    method_specs: Vec<MethodSpecDef>,
    assembly_refs: Vec<AssemblyRefDef>,
    user_strings: UserStrings,
}

/// Derives a stable placeholder MVID from the assembly name
fn name_mvid(name: &str) -> uguid::Guid {
    let mut bytes = [0u8; 16];
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for (index, chunk) in bytes.chunks_mut(8).enumerate() {
        for byte in name.bytes().chain(std::iter::once(index as u8)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        chunk.copy_from_slice(&hash.to_le_bytes());
    }

    uguid::Guid::from_bytes(bytes)
}

fn row_mut<T>(rows: &mut [T], token: Token, table: TableId) -> Option<&mut T> {
    if token.table() != table as u8 || token.is_null() {
        return None;
    }

    rows.get_mut(token.row() as usize - 1)
}

#[allow(clippy::cast_possible_truncation)]
fn next_token(table: TableId, len: usize) -> Token {
    table.token(len as u32 + 1)
}

impl AssemblyBuilder {
    /// Starts an empty assembly named `name`, with module `<name>.dll`
    #[must_use]
    pub fn new(name: &str) -> Self {
        AssemblyBuilder {
            name: name.to_string(),
            version: AssemblyVersion::default(),
            module_name: format!("{name}.dll"),
            mvid: name_mvid(name),
            entry_point: None,
            types: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            type_refs: Vec::new(),
            member_refs: Vec::new(),
            type_specs: Vec::new(),
            method_specs: Vec::new(),
            assembly_refs: Vec::new(),
            user_strings: UserStrings::default(),
        }
    }

    /// Continues building on top of an existing model
    #[must_use]
    pub fn from_assembly(assembly: &Assembly) -> Self {
        AssemblyBuilder {
            name: assembly.name.clone(),
            version: assembly.version,
            module_name: assembly.module_name.clone(),
            mvid: assembly.mvid,
            entry_point: assembly.entry_point,
            types: assembly.types.iter().map(|row| (**row).clone()).collect(),
            methods: assembly.methods.iter().map(|row| (**row).clone()).collect(),
            fields: assembly.fields.iter().map(|row| (**row).clone()).collect(),
            properties: assembly.properties.iter().map(|row| (**row).clone()).collect(),
            events: assembly.events.iter().map(|row| (**row).clone()).collect(),
            type_refs: assembly.type_refs.clone(),
            member_refs: assembly.member_refs.clone(),
            type_specs: assembly.type_specs.clone(),
            method_specs: assembly.method_specs.clone(),
            assembly_refs: assembly.assembly_refs.clone(),
            user_strings: assembly.user_strings.clone(),
        }
    }

    /// Sets the module version identifier
    pub fn set_mvid(&mut self, mvid: uguid::Guid) -> &mut Self {
        self.mvid = mvid;
        self
    }

    /// Sets the assembly version
    pub fn set_version(&mut self, version: AssemblyVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// Sets the module name
    pub fn set_module_name(&mut self, name: &str) -> &mut Self {
        self.module_name = name.to_string();
        self
    }

    /// Sets the entry point method
    pub fn set_entry_point(&mut self, method: Token) -> &mut Self {
        self.entry_point = Some(method);
        self
    }

    /// Replaces the `#US` heap
    pub fn set_user_strings(&mut self, user_strings: UserStrings) -> &mut Self {
        self.user_strings = user_strings;
        self
    }

    /// Adds an `AssemblyRef` row
    pub fn add_assembly_ref(&mut self, name: &str, version: AssemblyVersion) -> Token {
        let token = next_token(TableId::AssemblyRef, self.assembly_refs.len());
        self.assembly_refs.push(AssemblyRefDef {
            token,
            name: name.to_string(),
            version,
            culture: String::new(),
        });
        token
    }

    /// Adds a `TypeRef` row resolved through `scope`
    pub fn add_type_ref(&mut self, scope: Token, namespace: &str, name: &str) -> Token {
        let token = next_token(TableId::TypeRef, self.type_refs.len());
        self.type_refs.push(TypeRefDef {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            full_name: String::new(),
            scope,
        });
        token
    }

    /// Adds a `TypeDef` row with the given raw [`super::TypeAttributes`]
    pub fn add_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: u32,
        base: Option<Token>,
    ) -> Token {
        let token = next_token(TableId::TypeDef, self.types.len());
        self.types.push(TypeDef {
            token,
            namespace: namespace.to_string(),
            name: name.to_string(),
            full_name: String::new(),
            flags,
            base: base.filter(|base| !base.is_null()),
            interfaces: Vec::new(),
            enclosing: None,
            nested_types: Vec::new(),
            generic_params: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
        });
        token
    }

    /// Declares `inner` as nested inside `outer`
    pub fn nest(&mut self, inner: Token, outer: Token) -> &mut Self {
        if let Some(type_def) = row_mut(&mut self.types, inner, TableId::TypeDef) {
            type_def.enclosing = Some(outer);
        }
        self
    }

    /// Adds an `InterfaceImpl` row
    pub fn add_interface(&mut self, type_def: Token, interface: Token) -> &mut Self {
        if let Some(type_def) = row_mut(&mut self.types, type_def, TableId::TypeDef) {
            type_def.interfaces.push(interface);
        }
        self
    }

    /// Adds a generic parameter to a type or method
    pub fn add_generic_param(&mut self, owner: Token, name: &str) -> &mut Self {
        if let Some(type_def) = row_mut(&mut self.types, owner, TableId::TypeDef) {
            type_def.generic_params.push(name.to_string());
        } else if let Some(method) = row_mut(&mut self.methods, owner, TableId::MethodDef) {
            method.generic_params.push(name.to_string());
        }
        self
    }

    /// Adds a `MethodDef` row to `type_def`
    pub fn add_method(
        &mut self,
        type_def: Token,
        name: &str,
        flags: u16,
        signature: SignatureMethod,
    ) -> Token {
        let token = next_token(TableId::MethodDef, self.methods.len());
        self.methods.push(MethodDef {
            token,
            name: name.to_string(),
            flags,
            impl_flags: 0,
            signature,
            param_names: Vec::new(),
            generic_params: Vec::new(),
            declaring_type: type_def,
            body: None,
        });
        if let Some(owner) = row_mut(&mut self.types, type_def, TableId::TypeDef) {
            owner.methods.push(token);
        }
        token
    }

    /// Sets the implementation attributes of a method
    pub fn set_impl_flags(&mut self, method: Token, impl_flags: u16) -> &mut Self {
        if let Some(method) = row_mut(&mut self.methods, method, TableId::MethodDef) {
            method.impl_flags = impl_flags;
        }
        self
    }

    /// Sets the IL code of a method
    pub fn set_body(&mut self, method: Token, code: Vec<u8>) -> &mut Self {
        if let Some(method) = row_mut(&mut self.methods, method, TableId::MethodDef) {
            method.body = Some(Arc::from(code));
        }
        self
    }

    /// Sets the parameter names of a method
    pub fn set_param_names(&mut self, method: Token, names: Vec<String>) -> &mut Self {
        if let Some(method) = row_mut(&mut self.methods, method, TableId::MethodDef) {
            method.param_names = names;
        }
        self
    }

    /// Adds a `Field` row to `type_def` with the given raw [`super::FieldAttributes`]
    pub fn add_field(
        &mut self,
        type_def: Token,
        name: &str,
        flags: u16,
        signature: TypeSignature,
    ) -> Token {
        let token = next_token(TableId::Field, self.fields.len());
        self.fields.push(FieldDef {
            token,
            name: name.to_string(),
            flags,
            signature,
            declaring_type: type_def,
        });
        if let Some(owner) = row_mut(&mut self.types, type_def, TableId::TypeDef) {
            owner.fields.push(token);
        }
        token
    }

    /// Adds a `Property` row to `type_def`; accessors are attached with
    /// [`AssemblyBuilder::set_semantics`]
    pub fn add_property(
        &mut self,
        type_def: Token,
        name: &str,
        flags: u16,
        signature: SignatureProperty,
    ) -> Token {
        let token = next_token(TableId::Property, self.properties.len());
        self.properties.push(PropertyDef {
            token,
            name: name.to_string(),
            flags,
            signature,
            getter: None,
            setter: None,
            declaring_type: type_def,
        });
        if let Some(owner) = row_mut(&mut self.types, type_def, TableId::TypeDef) {
            owner.properties.push(token);
        }
        token
    }

    /// Adds an `Event` row to `type_def`; accessors are attached with
    /// [`AssemblyBuilder::set_semantics`]
    pub fn add_event(
        &mut self,
        type_def: Token,
        name: &str,
        flags: u16,
        event_type: Option<Token>,
    ) -> Token {
        let token = next_token(TableId::Event, self.events.len());
        self.events.push(EventDef {
            token,
            name: name.to_string(),
            flags,
            event_type: event_type.filter(|event_type| !event_type.is_null()),
            add: None,
            remove: None,
            raise: None,
            declaring_type: type_def,
        });
        if let Some(owner) = row_mut(&mut self.types, type_def, TableId::TypeDef) {
            owner.events.push(token);
        }
        token
    }

    /// Attaches an accessor to a property or event (`MethodSemantics` row)
    pub fn set_semantics(&mut self, association: Token, method: Token, semantics: u16) -> &mut Self {
        if let Some(property) = row_mut(&mut self.properties, association, TableId::Property) {
            if semantics & MethodSemanticsAttributes::GETTER != 0 {
                property.getter = Some(method);
            } else if semantics & MethodSemanticsAttributes::SETTER != 0 {
                property.setter = Some(method);
            }
        } else if let Some(event) = row_mut(&mut self.events, association, TableId::Event) {
            if semantics & MethodSemanticsAttributes::ADD_ON != 0 {
                event.add = Some(method);
            } else if semantics & MethodSemanticsAttributes::REMOVE_ON != 0 {
                event.remove = Some(method);
            } else if semantics & MethodSemanticsAttributes::FIRE != 0 {
                event.raise = Some(method);
            }
        }
        self
    }

    /// Adds a `MemberRef` row
    pub fn add_member_ref(
        &mut self,
        parent: Token,
        name: &str,
        signature: MemberRefSignature,
    ) -> Token {
        let token = next_token(TableId::MemberRef, self.member_refs.len());
        self.member_refs.push(MemberRefDef {
            token,
            parent,
            name: name.to_string(),
            signature,
        });
        token
    }

    /// Adds a `TypeSpec` row
    pub fn add_type_spec(&mut self, signature: TypeSignature) -> Token {
        let token = next_token(TableId::TypeSpec, self.type_specs.len());
        self.type_specs.push(TypeSpecDef { token, signature });
        token
    }

    /// Adds a `MethodSpec` row
    pub fn add_method_spec(&mut self, method: Token, instantiation: SignatureMethodSpec) -> Token {
        let token = next_token(TableId::MethodSpec, self.method_specs.len());
        self.method_specs.push(MethodSpecDef {
            token,
            method,
            instantiation,
        });
        token
    }

    /// Appends a literal to the `#US` heap and returns the `ldstr` operand token
    pub fn add_user_string(&mut self, value: &str) -> Token {
        Token::from_parts(0x70, self.user_strings.push(value))
    }

    fn type_ref_full_name(&self, index: usize, depth: usize) -> String {
        let type_ref = &self.type_refs[index];
        let scope = type_ref.scope;
        if depth < 64 && scope.table() == TableId::TypeRef as u8 && !scope.is_null() {
            let outer = scope.row() as usize - 1;
            if outer < self.type_refs.len() {
                return format!(
                    "{}+{}",
                    self.type_ref_full_name(outer, depth + 1),
                    type_ref.name
                );
            }
        }

        if type_ref.namespace.is_empty() {
            type_ref.name.clone()
        } else {
            format!("{}.{}", type_ref.namespace, type_ref.name)
        }
    }

    /// Returns (full name, effective namespace) of a type definition
    fn type_names(&self, index: usize) -> (String, String) {
        let mut chain = vec![index];
        let mut current = index;
        while let Some(outer) = self.types[current].enclosing {
            let outer = outer.row() as usize;
            // guard against cycles and dangling enclosing tokens
            if outer == 0 || outer > self.types.len() || chain.len() > self.types.len() {
                break;
            }
            current = outer - 1;
            chain.push(current);
        }

        let outermost = &self.types[current];
        let namespace = outermost.namespace.clone();
        let mut full_name = if namespace.is_empty() {
            outermost.name.clone()
        } else {
            format!("{}.{}", namespace, outermost.name)
        };
        for nested in chain.iter().rev().skip(1) {
            full_name.push('+');
            full_name.push_str(&self.types[*nested].name);
        }

        (full_name, namespace)
    }

    /// Computes derived data and freezes the model
    #[must_use]
    pub fn build(mut self) -> Assembly {
        for index in 0..self.type_refs.len() {
            self.type_refs[index].full_name = self.type_ref_full_name(index, 0);
        }

        let names: Vec<(String, String)> =
            (0..self.types.len()).map(|index| self.type_names(index)).collect();
        for (type_def, (full_name, namespace)) in self.types.iter_mut().zip(names) {
            type_def.full_name = full_name;
            type_def.namespace = namespace;
            type_def.nested_types.clear();
        }

        for index in 0..self.types.len() {
            let token = self.types[index].token;
            if let Some(outer) = self.types[index].enclosing {
                if let Some(outer) = row_mut(&mut self.types, outer, TableId::TypeDef) {
                    outer.nested_types.push(token);
                }
            }
        }

        Assembly {
            name: self.name,
            version: self.version,
            module_name: self.module_name,
            mvid: self.mvid,
            entry_point: self.entry_point,
            types: self.types.into_iter().map(Arc::new).collect(),
            methods: self.methods.into_iter().map(Arc::new).collect(),
            fields: self.fields.into_iter().map(Arc::new).collect(),
            properties: self.properties.into_iter().map(Arc::new).collect(),
            events: self.events.into_iter().map(Arc::new).collect(),
            type_refs: self.type_refs,
            member_refs: self.member_refs,
            type_specs: self.type_specs,
            method_specs: self.method_specs,
            assembly_refs: self.assembly_refs,
            user_strings: self.user_strings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::symbols::{FieldAttributes, TypeAttributes};

    #[test]
    fn tokens_follow_call_order() {
        let mut builder = AssemblyBuilder::new("Tokens");
        let first = builder.add_type("A", "First", TypeAttributes::PUBLIC, None);
        let second = builder.add_type("A", "Second", TypeAttributes::PUBLIC, None);
        let field = builder.add_field(second, "value", FieldAttributes::PRIVATE, TypeSignature::I4);
        let literal = builder.add_user_string("hi");

        assert_eq!(first, Token::new(0x0200_0001));
        assert_eq!(second, Token::new(0x0200_0002));
        assert_eq!(field, Token::new(0x0400_0001));
        assert_eq!(literal, Token::new(0x7000_0001));

        let assembly = builder.build();
        assert_eq!(assembly.type_def(second).unwrap().fields, vec![field]);
        assert_eq!(assembly.user_string(literal).unwrap(), "hi");
        assert_eq!(assembly.module_name, "Tokens.dll");
    }

    #[test]
    fn semantics_and_names() {
        let mut builder = AssemblyBuilder::new("Props");
        let corlib = builder.add_assembly_ref("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
        let dictionary = builder.add_type_ref(corlib, "System.Collections", "Dictionary");
        let entry = builder.add_type_ref(dictionary, "", "Entry");
        let owner = builder.add_type("P", "Owner", TypeAttributes::PUBLIC, None);
        let getter = builder.add_method(
            owner,
            "get_Name",
            0x0006,
            SignatureMethod::new(true, TypeSignature::String, vec![]),
        );
        let property = builder.add_property(
            owner,
            "Name",
            0,
            SignatureProperty {
                has_this: true,
                base: TypeSignature::String,
                params: Vec::new(),
            },
        );
        builder.set_semantics(property, getter, MethodSemanticsAttributes::GETTER);

        let assembly = builder.build();
        assert_eq!(assembly.property(property).unwrap().getter, Some(getter));
        assert_eq!(assembly.accessor_owner(getter), Some(property));
        assert_eq!(
            assembly.type_ref(entry).unwrap().full_name,
            "System.Collections.Dictionary+Entry"
        );
    }

    #[test]
    fn mvid_is_stable_per_name() {
        assert_eq!(name_mvid("A"), name_mvid("A"));
        assert_ne!(name_mvid("A"), name_mvid("B"));
    }
}

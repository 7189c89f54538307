//! The [`Symbol`] variant over every addressable entity and its serializable projection.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    identity::{MemberId, MemberKind},
    metadata::{
        symbols::{Accessibility, Assembly, EventDef, FieldDef, MethodDef, PropertyDef, TypeDef},
        token::Token,
    },
};

/// A type or member of the loaded assembly
#[derive(Debug, Clone)]
pub enum Symbol {
    /// Type definition
    Type(Arc<TypeDef>),
    /// Method or constructor
    Method(Arc<MethodDef>),
    /// Field
    Field(Arc<FieldDef>),
    /// Property
    Property(Arc<PropertyDef>),
    /// Event
    Event(Arc<EventDef>),
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.token() == other.token()
    }
}

impl Eq for Symbol {}

/// Flattened, serializable view of a [`Symbol`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolSummary {
    /// Canonical identifier
    pub id: MemberId,
    /// Kind
    pub kind: MemberKind,
    /// Simple name
    pub name: String,
    /// Full name; members are qualified with their declaring type (`Ns.Type.Member`)
    pub full_name: String,
    /// Full name of the declaring type, for members and nested types
    pub declaring_type: Option<String>,
    /// Namespace (of the outermost declaring type)
    pub namespace: String,
    /// Rendered signature or member type
    pub signature: Option<String>,
    /// Effective accessibility
    pub accessibility: Accessibility,
    /// Static member, or static class
    pub is_static: bool,
    /// Abstract member or type
    pub is_abstract: bool,
    /// Virtual member
    pub is_virtual: bool,
}

impl Symbol {
    /// Looks up the definition a token names
    #[must_use]
    pub fn from_token(assembly: &Assembly, token: Token) -> Option<Symbol> {
        match MemberKind::of_token(token)? {
            MemberKind::Type => assembly.type_def(token).cloned().map(Symbol::Type),
            MemberKind::Method => assembly.method(token).cloned().map(Symbol::Method),
            MemberKind::Field => assembly.field(token).cloned().map(Symbol::Field),
            MemberKind::Property => assembly.property(token).cloned().map(Symbol::Property),
            MemberKind::Event => assembly.event(token).cloned().map(Symbol::Event),
        }
    }

    /// Metadata token
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            Symbol::Type(type_def) => type_def.token,
            Symbol::Method(method) => method.token,
            Symbol::Field(field) => field.token,
            Symbol::Property(property) => property.token,
            Symbol::Event(event) => event.token,
        }
    }

    /// Kind
    #[must_use]
    pub fn kind(&self) -> MemberKind {
        match self {
            Symbol::Type(_) => MemberKind::Type,
            Symbol::Method(_) => MemberKind::Method,
            Symbol::Field(_) => MemberKind::Field,
            Symbol::Property(_) => MemberKind::Property,
            Symbol::Event(_) => MemberKind::Event,
        }
    }

    /// Simple name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Symbol::Type(type_def) => &type_def.name,
            Symbol::Method(method) => &method.name,
            Symbol::Field(field) => &field.name,
            Symbol::Property(property) => &property.name,
            Symbol::Event(event) => &event.name,
        }
    }

    /// Declaring type of a member, or enclosing type of a nested type
    #[must_use]
    pub fn declaring_type(&self) -> Option<Token> {
        match self {
            Symbol::Type(type_def) => type_def.enclosing,
            Symbol::Method(method) => Some(method.declaring_type),
            Symbol::Field(field) => Some(field.declaring_type),
            Symbol::Property(property) => Some(property.declaring_type),
            Symbol::Event(event) => Some(event.declaring_type),
        }
    }

    /// Canonical identifier within the module `mvid`
    #[must_use]
    pub fn id(&self, mvid: uguid::Guid) -> MemberId {
        MemberId::new(mvid, self.token(), self.kind())
    }

    /// Full name, `Ns.Outer+Inner` for types and `Ns.Type.Member` for members
    #[must_use]
    pub fn full_name(&self, assembly: &Assembly) -> String {
        match self {
            Symbol::Type(type_def) => type_def.full_name.clone(),
            _ => match self.declaring_type() {
                Some(owner) => format!("{}.{}", assembly.type_name(owner), self.name()),
                None => self.name().to_string(),
            },
        }
    }

    /// Namespace of the symbol's outermost type
    #[must_use]
    pub fn namespace(&self, assembly: &Assembly) -> String {
        match self {
            Symbol::Type(type_def) => type_def.namespace.clone(),
            _ => self
                .declaring_type()
                .and_then(|owner| assembly.type_def(owner))
                .map(|owner| owner.namespace.clone())
                .unwrap_or_default(),
        }
    }

    fn accessors<'a>(
        &self,
        assembly: &'a Assembly,
    ) -> impl Iterator<Item = &'a Arc<MethodDef>> + 'a {
        let tokens: Vec<Token> = match self {
            Symbol::Property(property) => property.accessors().collect(),
            Symbol::Event(event) => event.accessors().collect(),
            _ => Vec::new(),
        };

        tokens.into_iter().filter_map(|token| assembly.method(token))
    }

    /// Effective accessibility; properties and events take their most visible accessor's
    #[must_use]
    pub fn accessibility(&self, assembly: &Assembly) -> Accessibility {
        match self {
            Symbol::Type(type_def) => type_def.accessibility(),
            Symbol::Method(method) => method.accessibility(),
            Symbol::Field(field) => field.accessibility(),
            Symbol::Property(_) | Symbol::Event(_) => self
                .accessors(assembly)
                .map(|method| method.accessibility())
                .max_by_key(|accessibility| accessibility.rank())
                .unwrap_or(Accessibility::Private),
        }
    }

    /// Static member, or static (abstract sealed) class
    #[must_use]
    pub fn is_static(&self, assembly: &Assembly) -> bool {
        match self {
            Symbol::Type(type_def) => type_def.is_static(),
            Symbol::Method(method) => method.is_static(),
            Symbol::Field(field) => field.is_static(),
            Symbol::Property(_) | Symbol::Event(_) => {
                self.accessors(assembly).any(|method| method.is_static())
            }
        }
    }

    /// Abstract type or member
    #[must_use]
    pub fn is_abstract(&self, assembly: &Assembly) -> bool {
        match self {
            Symbol::Type(type_def) => type_def.is_abstract(),
            Symbol::Method(method) => method.is_abstract(),
            Symbol::Field(_) => false,
            Symbol::Property(_) | Symbol::Event(_) => {
                self.accessors(assembly).any(|method| method.is_abstract())
            }
        }
    }

    /// Virtual member
    #[must_use]
    pub fn is_virtual(&self, assembly: &Assembly) -> bool {
        match self {
            Symbol::Type(_) | Symbol::Field(_) => false,
            Symbol::Method(method) => method.is_virtual(),
            Symbol::Property(_) | Symbol::Event(_) => {
                self.accessors(assembly).any(|method| method.is_virtual())
            }
        }
    }

    /// Rendered signature: method signatures, `Type name` for fields and properties, the
    /// handler type for events
    #[must_use]
    pub fn signature(&self, assembly: &Assembly) -> Option<String> {
        match self {
            Symbol::Type(_) => None,
            Symbol::Method(method) => Some(assembly.method_signature_text(method)),
            Symbol::Field(field) => Some(format!(
                "{} {}",
                assembly.render_type(&field.signature),
                field.name
            )),
            Symbol::Property(property) => Some(format!(
                "{} {}",
                assembly.render_type(&property.signature.base),
                property.name
            )),
            Symbol::Event(event) => event
                .event_type
                .map(|event_type| format!("{} {}", assembly.type_name(event_type), event.name)),
        }
    }

    /// Projects the symbol into its serializable summary
    #[must_use]
    pub fn summary(&self, assembly: &Assembly) -> SymbolSummary {
        SymbolSummary {
            id: self.id(assembly.mvid),
            kind: self.kind(),
            name: self.name().to_string(),
            full_name: self.full_name(assembly),
            declaring_type: self.declaring_type().map(|owner| assembly.type_name(owner)),
            namespace: self.namespace(assembly),
            signature: self.signature(assembly),
            accessibility: self.accessibility(assembly),
            is_static: self.is_static(assembly),
            is_abstract: self.is_abstract(assembly),
            is_virtual: self.is_virtual(assembly),
        }
    }
}

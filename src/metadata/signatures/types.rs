use crate::metadata::token::Token;

/// A parsed type inside a signature blob (II.23.2.12).
///
/// Custom modifiers are consumed by the parser and not represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// System.Object
    Object,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// System.TypedReference
    TypedByRef,
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Managed reference
    ByRef(Box<TypeSignature>),
    /// Value type, `TypeDef`/`TypeRef`/`TypeSpec` token
    ValueType(Token),
    /// Reference type, `TypeDef`/`TypeRef`/`TypeSpec` token
    Class(Token),
    /// Generic parameter of the enclosing type
    GenericParamType(u32),
    /// Generic parameter of the enclosing method
    GenericParamMethod(u32),
    /// Multi-dimensional array
    Array(SignatureArray),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// Pinned local
    Pinned(Box<TypeSignature>),
}

/// A general array with a rank
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureArray {
    /// The element type
    pub base: Box<TypeSignature>,
    /// The number of dimensions
    pub rank: u32,
}

/// A parameter or return type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureParameter {
    /// Parameter is passed by reference
    pub by_ref: bool,
    /// The type of the parameter
    pub base: TypeSignature,
}

impl SignatureParameter {
    /// A by-value parameter of type `base`
    #[must_use]
    pub fn new(base: TypeSignature) -> Self {
        SignatureParameter {
            by_ref: false,
            base,
        }
    }
}

/// Method signature (II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureMethod {
    /// Instance method, `this` is passed implicitly
    pub has_this: bool,
    /// `this` is passed explicitly as the first parameter
    pub explicit_this: bool,
    /// vararg calling convention
    pub vararg: bool,
    /// Number of generic parameters
    pub param_count_generic: u32,
    /// The return type
    pub return_type: SignatureParameter,
    /// The declared parameters
    pub params: Vec<SignatureParameter>,
}

impl SignatureMethod {
    /// A non-generic signature with the given return and parameter types
    #[must_use]
    pub fn new(has_this: bool, return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this,
            explicit_this: false,
            vararg: false,
            param_count_generic: 0,
            return_type: SignatureParameter::new(return_type),
            params: params.into_iter().map(SignatureParameter::new).collect(),
        }
    }
}

/// Field signature (II.23.2.4)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureField {
    /// The field type
    pub base: TypeSignature,
}

/// Property signature (II.23.2.5)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// The property type
    pub base: TypeSignature,
    /// Indexer parameters
    pub params: Vec<SignatureParameter>,
}

/// Generic method instantiation (II.23.2.15)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureMethodSpec {
    /// The generic arguments
    pub generic_args: Vec<TypeSignature>,
}

impl TypeSignature {
    /// Full CLR name of primitive types, e.g. `System.Int32`
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            TypeSignature::Void => "System.Void",
            TypeSignature::Boolean => "System.Boolean",
            TypeSignature::Char => "System.Char",
            TypeSignature::I1 => "System.SByte",
            TypeSignature::U1 => "System.Byte",
            TypeSignature::I2 => "System.Int16",
            TypeSignature::U2 => "System.UInt16",
            TypeSignature::I4 => "System.Int32",
            TypeSignature::U4 => "System.UInt32",
            TypeSignature::I8 => "System.Int64",
            TypeSignature::U8 => "System.UInt64",
            TypeSignature::R4 => "System.Single",
            TypeSignature::R8 => "System.Double",
            TypeSignature::String => "System.String",
            TypeSignature::Object => "System.Object",
            TypeSignature::I => "System.IntPtr",
            TypeSignature::U => "System.UIntPtr",
            TypeSignature::TypedByRef => "System.TypedReference",
            _ => return None,
        })
    }

    /// C# keyword for primitive types, e.g. `int`
    #[must_use]
    pub fn keyword(&self) -> Option<&'static str> {
        Some(match self {
            TypeSignature::Void => "void",
            TypeSignature::Boolean => "bool",
            TypeSignature::Char => "char",
            TypeSignature::I1 => "sbyte",
            TypeSignature::U1 => "byte",
            TypeSignature::I2 => "short",
            TypeSignature::U2 => "ushort",
            TypeSignature::I4 => "int",
            TypeSignature::U4 => "uint",
            TypeSignature::I8 => "long",
            TypeSignature::U8 => "ulong",
            TypeSignature::R4 => "float",
            TypeSignature::R8 => "double",
            TypeSignature::String => "string",
            TypeSignature::Object => "object",
            TypeSignature::I => "nint",
            TypeSignature::U => "nuint",
            _ => return None,
        })
    }

    /// Renders the type with full names, resolving type tokens through `names`.
    ///
    /// Generic type arity suffixes (`` `1 ``) are dropped in instantiations.
    pub fn render(&self, names: &dyn Fn(Token) -> String) -> String {
        if let Some(name) = self.primitive_name() {
            return name.to_string();
        }

        match self {
            TypeSignature::Ptr(base) => format!("{}*", base.render(names)),
            TypeSignature::ByRef(base) => format!("{}&", base.render(names)),
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => names(*token),
            TypeSignature::GenericParamType(index) => format!("!{index}"),
            TypeSignature::GenericParamMethod(index) => format!("!!{index}"),
            TypeSignature::Array(array) => format!(
                "{}[{}]",
                array.base.render(names),
                ",".repeat(array.rank.saturating_sub(1) as usize)
            ),
            TypeSignature::SzArray(base) => format!("{}[]", base.render(names)),
            TypeSignature::GenericInst(base, args) => {
                let base = base.render(names);
                let base = base.split('`').next().unwrap_or_default().to_string();
                let args: Vec<String> = args.iter().map(|arg| arg.render(names)).collect();
                format!("{}<{}>", base, args.join(","))
            }
            TypeSignature::FnPtr(method) => {
                let params: Vec<String> = method
                    .params
                    .iter()
                    .map(|param| param.render(names))
                    .collect();
                format!(
                    "method {} *({})",
                    method.return_type.render(names),
                    params.join(",")
                )
            }
            TypeSignature::Pinned(base) => base.render(names),
            _ => String::new(),
        }
    }
}

impl SignatureParameter {
    /// Renders the parameter type, with a trailing `&` for by-ref parameters.
    pub fn render(&self, names: &dyn Fn(Token) -> String) -> String {
        let base = self.base.render(names);
        if self.by_ref {
            format!("{base}&")
        } else {
            base
        }
    }
}

//! Attribute flags of types, methods, fields and method semantics, plus the [`Accessibility`]
//! classification shared by every member kind.

#![allow(non_snake_case)]

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// `TypeDef.Flags` constants (II.23.1.15)
pub mod TypeAttributes {
    /// Use this mask to retrieve visibility information
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Class has no public scope
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Class has public scope
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Class is nested with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Class is nested with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Class is nested with family visibility
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    /// Class is nested with assembly visibility
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Class is nested with family and assembly visibility
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    /// Class is nested with family or assembly visibility
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;
    /// Type is a class
    pub const CLASS: u32 = 0x0000_0000;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Class is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Class cannot be extended
    pub const SEALED: u32 = 0x0000_0100;
    /// Class name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Initialize the class before first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

/// `Field.Flags` constants (II.23.1.5)
pub mod FieldAttributes {
    /// Use this mask to retrieve accessibility information
    pub const FIELD_ACCESS_MASK: u16 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u16 = 0x0001;
    /// Accessible by sub-types only in this assembly
    pub const FAM_AND_ASSEM: u16 = 0x0002;
    /// Accessible by anyone in the assembly
    pub const ASSEMBLY: u16 = 0x0003;
    /// Accessible only by type and sub-types
    pub const FAMILY: u16 = 0x0004;
    /// Accessible by sub-types anywhere, plus anyone in the assembly
    pub const FAM_OR_ASSEM: u16 = 0x0005;
    /// Accessible by anyone who has visibility to this scope
    pub const PUBLIC: u16 = 0x0006;
    /// Defined on type, else per instance
    pub const STATIC: u16 = 0x0010;
    /// Field can only be initialized, not written to after init
    pub const INIT_ONLY: u16 = 0x0020;
    /// Value is a compile time constant
    pub const LITERAL: u16 = 0x0040;
    /// Field is special
    pub const SPECIAL_NAME: u16 = 0x0200;
}

/// `MethodSemantics.Semantics` constants (II.23.1.12)
pub mod MethodSemanticsAttributes {
    /// Setter for property
    pub const SETTER: u16 = 0x0001;
    /// Getter for property
    pub const GETTER: u16 = 0x0002;
    /// Other method for property or event
    pub const OTHER: u16 = 0x0004;
    /// `AddOn` method for event
    pub const ADD_ON: u16 = 0x0008;
    /// `RemoveOn` method for event
    pub const REMOVE_ON: u16 = 0x0010;
    /// Fire method for event
    pub const FIRE: u16 = 0x0020;
}

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u16 = 0x0007;
/// Bitmask for `VTABLE_LAYOUT` information extraction
pub const METHOD_VTABLE_LAYOUT_MASK: u16 = 0x0100;

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// Method access flags
    pub struct MethodAccessFlags: u16 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this Assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract access flags from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u16) -> Self {
        Self::from_bits_truncate(flags & METHOD_ACCESS_MASK)
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u16 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
    }
}

impl MethodModifiers {
    /// Extract method modifiers from raw method attributes
    #[must_use]
    pub fn from_method_flags(flags: u16) -> Self {
        Self::from_bits_truncate(flags & !METHOD_ACCESS_MASK)
    }
}

/// Declared accessibility of a type or member, in C# terms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Accessibility {
    /// `public`
    Public,
    /// `private`, also compiler-controlled members
    Private,
    /// `protected`
    Protected,
    /// `internal`
    Internal,
    /// `protected internal`
    ProtectedInternal,
    /// `private protected`
    PrivateProtected,
}

impl Accessibility {
    /// Maps the 3-bit member access field shared by methods and fields.
    #[must_use]
    pub fn from_member_access(access: u16) -> Self {
        match access & METHOD_ACCESS_MASK {
            0x0002 => Accessibility::PrivateProtected,
            0x0003 => Accessibility::Internal,
            0x0004 => Accessibility::Protected,
            0x0005 => Accessibility::ProtectedInternal,
            0x0006 => Accessibility::Public,
            _ => Accessibility::Private,
        }
    }

    /// Maps the visibility bits of `TypeDef.Flags`.
    #[must_use]
    pub fn from_type_flags(flags: u32) -> Self {
        match flags & TypeAttributes::VISIBILITY_MASK {
            TypeAttributes::PUBLIC | TypeAttributes::NESTED_PUBLIC => Accessibility::Public,
            TypeAttributes::NESTED_PRIVATE => Accessibility::Private,
            TypeAttributes::NESTED_FAMILY => Accessibility::Protected,
            TypeAttributes::NESTED_FAM_AND_ASSEM => Accessibility::PrivateProtected,
            TypeAttributes::NESTED_FAM_OR_ASSEM => Accessibility::ProtectedInternal,
            _ => Accessibility::Internal,
        }
    }

    /// Ordering from least to most visible, used to pick the widest accessor of a property
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Accessibility::Private => 0,
            Accessibility::PrivateProtected => 1,
            Accessibility::Internal => 2,
            Accessibility::Protected => 3,
            Accessibility::ProtectedInternal => 4,
            Accessibility::Public => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn method_flags() {
        // public hidebysig newslot virtual
        let flags = 0x01C6;
        assert_eq!(
            MethodAccessFlags::from_method_flags(flags),
            MethodAccessFlags::PUBLIC
        );
        let modifiers = MethodModifiers::from_method_flags(flags);
        assert!(modifiers.contains(MethodModifiers::VIRTUAL | MethodModifiers::NEW_SLOT));
        assert!(!modifiers.contains(MethodModifiers::STATIC));
    }

    #[test]
    fn accessibility() {
        assert_eq!(Accessibility::from_member_access(0x0006), Accessibility::Public);
        assert_eq!(Accessibility::from_member_access(0x0000), Accessibility::Private);
        assert_eq!(
            Accessibility::from_member_access(0x0005),
            Accessibility::ProtectedInternal
        );
        assert_eq!(
            Accessibility::from_type_flags(TypeAttributes::PUBLIC | TypeAttributes::SEALED),
            Accessibility::Public
        );
        assert_eq!(
            Accessibility::from_type_flags(TypeAttributes::NOT_PUBLIC),
            Accessibility::Internal
        );
        assert_eq!(
            Accessibility::from_str("Protected_Internal").unwrap(),
            Accessibility::ProtectedInternal
        );
        assert_eq!(Accessibility::PrivateProtected.to_string(), "private_protected");
        assert!(Accessibility::Public.rank() > Accessibility::Internal.rank());
    }
}

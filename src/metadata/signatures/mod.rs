//! Signature blob decoding (ECMA-335 II.23.2).
//!
//! Method, field, property, type-spec and method-spec signatures are parsed into the types in
//! this module. The analysis layer uses them for parameter counts and type names when matching
//! overloads and overrides, and for rendering member signatures in summaries.

mod parser;
mod types;

pub use parser::SignatureParser;
pub use types::*;

use crate::Result;

/// Parse a method signature blob
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a field signature blob
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a property signature blob
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Parse a type specification blob
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_type_spec_signature(data: &[u8]) -> Result<TypeSignature> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Parse a method specification blob
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}

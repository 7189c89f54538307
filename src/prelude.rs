//! # dotlens Prelude
//!
//! This module provides a convenient prelude for the most commonly used types of the dotlens
//! library. Import it to get the analyzer, its configuration and every request and result type
//! in one go.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotlens operations
pub use crate::Error;

/// The result type used throughout dotlens
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The analysis facade
pub use crate::Analyzer;

/// Analyzer tunables
pub use crate::config::{AnalyzerConfig, OverrideMatching};

/// The loaded assembly snapshot and its summary
pub use crate::context::{BinaryContext, LoadInfo, ReferenceInfo};

// ================================================================================================
// Identity and Symbols
// ================================================================================================

/// Canonical identifiers
pub use crate::identity::{MemberId, MemberKind};

/// Symbols and their serializable projection
pub use crate::summary::{Symbol, SymbolSummary};

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

// ================================================================================================
// Requests and Results
// ================================================================================================

/// Paging
pub use crate::search::{Page, PageRequest};

/// Search requests
pub use crate::search::{MemberSearch, TypeSearch};

/// Cross references
pub use crate::usage::{StringLiteral, UsageEdge, UsageKind};

/// Type graph results
pub use crate::inheritance::{Overrides, TypeEndpoint};

/// Decompilation
pub use crate::source::{DecompileFormat, DecompiledSource, Decompiler, IlDisassembler};

/// Housekeeping
pub use crate::{cache::CacheKind, diagnostics::Diagnostics};

// ================================================================================================
// Assembly Model
// ================================================================================================

/// The in-memory assembly model
pub use crate::metadata::symbols::{
    Accessibility, Assembly, AssemblyBuilder, AssemblyVersion, EventDef, FieldDef, MethodDef,
    PropertyDef, TypeDef,
};

/// Signatures
pub use crate::metadata::signatures::{SignatureMethod, TypeSignature};

/// Instruction decoding and encoding
pub use crate::disassembler::{decode_stream, Instruction, InstructionEncoder, Operand};

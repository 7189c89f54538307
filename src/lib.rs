// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'userstrings.rs' reinterprets the UTF-16 payload of a heap entry
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotlens
//!
//! Identity, indexing, resolution and graph analysis over loaded .NET assemblies.
//!
//! `dotlens` loads one ECMA-335 assembly at a time and answers the questions tooling asks about
//! it: what is this identifier, which types match this name, who calls this method, who writes
//! this field, what derives from this type, what does this method look like in IL. Every answer
//! is `serde::Serialize`, so a transport layer can hand results over as they are.
//!
//! ## Features
//!
//! - **🆔 Stable identifiers** - `<mvid>:<token>:<kind>` member identifiers, plus documentation
//!   style ids (`M:Ns.Type.Method(System.Int32)`) and raw tokens as input
//! - **⚡ Lazy indexes** - four independent indexes, each built once on first use
//! - **🔍 Cursor pagination** - deterministic ordering, decimal cursors and cached pages
//! - **🔗 Cross references** - usages, callers, callees and string literals from IL scans that
//!   resume where the previous page stopped
//! - **🌳 Type graph** - base chains, derived types, implementors, overrides and overloads
//! - **📦 Self contained** - a compact metadata reader over memory-mapped PE images
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotlens::{search::TypeSearch, Analyzer, PageRequest};
//!
//! let analyzer = Analyzer::new();
//! analyzer.load("tests/samples/Sample.dll".as_ref(), &[])?;
//!
//! let page = analyzer.search_types(&TypeSearch::matching("Simple"))?;
//! for summary in &page.items {
//!     println!("{} {}", summary.id, summary.full_name);
//! }
//!
//! if let Some(dog) = analyzer.resolve("T:Sample.Animals.Dog")? {
//!     let derived = analyzer.find_derived_types(&dog.id.to_string(), &PageRequest::first(10))?;
//!     println!("{} derived types", derived.items.len());
//! }
//! # Ok::<(), dotlens::Error>(())
//! ```
//!
//! ### Using the Prelude
//!
//! ```rust,no_run
//! use dotlens::prelude::*;
//!
//! let analyzer = Analyzer::with_config(AnalyzerConfig::default().with_default_page_size(20))?;
//! analyzer.load("tests/samples/Sample.dll".as_ref(), &[])?;
//! let usages = analyzer.find_usages("F:Sample.SimpleClass.counter", &PageRequest::default())?;
//! for edge in &usages.items {
//!     println!("{} {} at IL_{:04x}", edge.source_name, edge.kind, edge.il_offset);
//! }
//! # Ok::<(), dotlens::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`context::BinaryContext`] holds the loaded assembly as an immutable snapshot, swapped
//!   atomically on load and reload
//! - [`index::Indexes`] live inside the snapshot and are discarded with it
//! - [`resolver::MemberResolver`], [`search::SearchEngine`], [`usage::UsageAnalyzer`],
//!   [`inheritance::InheritanceAnalyzer`] and [`source::SourceCache`] share the context
//! - [`Analyzer`] wires them together
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]; installing a subscriber is up to the embedding process.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dotlens::prelude::*;
///
/// let analyzer = Analyzer::new();
/// let info = analyzer.load("tests/samples/Sample.dll".as_ref(), &[])?;
/// println!("{} types", info.types);
/// # Ok::<(), dotlens::Error>(())
/// ```
pub mod prelude;

/// PE image access, memory-mapped or in-memory, and the bounds-checked [`Parser`]
pub mod file;

/// Definitions, parsing and loading of CIL metadata based on ECMA-335
///
/// The reader covers what the analysis needs: the CLI header, the metadata root and heaps, the
/// type and member tables with their coded indexes, signatures and method bodies. Its output is
/// the immutable [`metadata::symbols::Assembly`] model, which can also be assembled by hand
/// through [`metadata::symbols::AssemblyBuilder`].
pub mod metadata;

/// CIL instruction decoding, encoding and IL text rendering
///
/// # Examples
///
/// ```rust,no_run
/// use dotlens::{disassembler::decode_instruction, Parser};
///
/// let bytecode = &[0x00, 0x2A]; // nop, ret
/// let mut parser = Parser::new(bytecode);
/// let instruction = decode_instruction(&mut parser)?;
///
/// println!("Mnemonic: {}", instruction.mnemonic);
/// println!("Flow type: {:?}", instruction.flow_type);
/// # Ok::<(), dotlens::Error>(())
/// ```
pub mod disassembler;

/// Canonical member identifiers
pub mod identity;

/// The loaded assembly snapshot and its lifecycle
pub mod context;

/// Lazily built lookup indexes
pub mod index;

/// Generation-tagged caches
pub mod cache;

/// The symbol variant and its serializable summary
pub mod summary;

/// Input string to symbol resolution
pub mod resolver;

/// Filtered, paginated type and member search
pub mod search;

/// Cross references from IL scans
pub mod usage;

/// Type graph queries
pub mod inheritance;

/// Decompiled text and its cache
pub mod source;

/// Analyzer tunables
pub mod config;

/// Index and cache counters
pub mod diagnostics;

/// The analysis facade
pub mod analyzer;

/// `dotlens` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use dotlens::{metadata::symbols::Assembly, Result};
///
/// fn load_assembly(path: &str) -> Result<Assembly> {
///     dotlens::metadata::loader::load_file(std::path::Path::new(path))
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotlens` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use dotlens::{Analyzer, Error};
///
/// let analyzer = Analyzer::new();
/// match analyzer.load(std::path::Path::new("tests/samples/crafted.exe"), &[]) {
///     Ok(info) => println!("Loaded {}", info.name),
///     Err(Error::InvalidArgument(message)) => println!("Bad path: {message}"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {message}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;

/// Main entry point, see [`analyzer::Analyzer`]
pub use analyzer::Analyzer;

/// Paging types shared by every paginated operation
pub use search::{Page, PageRequest};

/// Low-level file access
pub use file::{parser::Parser, File};

//! ECMA-335 metadata reader and the in-memory assembly model.
//!
//! Reading proceeds from the outside in: the CLI header ([`cor20header`]) points at the metadata
//! root ([`root`]), whose stream headers locate the heaps ([`streams`]) and the compressed table
//! stream ([`tables`]). The [`loader`] walks the tables and produces an immutable
//! [`symbols::Assembly`], decoding [`signatures`] and method bodies ([`body`]) on the way.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotlens::metadata::loader;
//! use std::path::Path;
//!
//! let assembly = loader::load_file(Path::new("Sample.dll"))?;
//! println!("{} {} ({} types)", assembly.name, assembly.version, assembly.types.len());
//! # Ok::<(), dotlens::Error>(())
//! ```

/// Method body headers
pub mod body;
/// The CLI (COR20) header
pub mod cor20header;
/// Builds an [`symbols::Assembly`] from a PE image
pub mod loader;
/// The metadata root and stream headers
pub mod root;
/// Signature blob decoding
pub mod signatures;
/// The metadata heaps
pub mod streams;
/// The assembly model and its builder
pub mod symbols;
/// The `#~` table stream
pub mod tables;
/// Metadata tokens
pub mod token;

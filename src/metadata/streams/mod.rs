//! Metadata heaps (ECMA-335 II.24.2.3 - II.24.2.5).
//!
//! - **`#Strings`** - NUL-terminated UTF-8 identifiers, see [`Strings`]
//! - **`#US`** - length-prefixed UTF-16 literals used by `ldstr`, see [`UserStrings`]
//! - **`#Blob`** - length-prefixed binary values such as signatures, see [`Blob`]
//! - **`#GUID`** - a 1-based array of 16 byte GUIDs, see [`Guid`]
//!
//! The `#~` table stream lives in [`crate::metadata::tables`].

mod blob;
mod guid;
mod strings;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use strings::Strings;
pub use userstrings::UserStrings;

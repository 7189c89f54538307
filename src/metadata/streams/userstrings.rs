//! The `#US` heap: length-prefixed UTF-16 string literals referenced by `ldstr`.
//!
//! Unlike the other heaps this one is copied into the assembly model, because literal values are
//! decoded lazily during usage scans long after the image has been released. The owned form also
//! lets [`crate::metadata::symbols::AssemblyBuilder`] append literals when assembling a model
//! programmatically.

use widestring::U16Str;

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// An owned copy of the `#US` heap.
#[derive(Debug, Clone)]
pub struct UserStrings {
    data: Vec<u8>,
}

impl Default for UserStrings {
    fn default() -> Self {
        UserStrings { data: vec![0] }
    }
}

impl UserStrings {
    /// Copies the heap bytes.
    ///
    /// # Errors
    /// Returns an error if the heap does not start with the empty entry.
    pub fn from(data: &[u8]) -> Result<UserStrings> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #US heap is empty"));
        }

        Ok(UserStrings {
            data: data.to_vec(),
        })
    }

    /// Decodes the literal at byte offset `index`.
    ///
    /// # Errors
    /// Returns an error if the offset or length is outside the heap.
    pub fn get(&self, index: usize) -> Result<String> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let bytes = parser.read_bytes(len)?;

        // the final byte is a flag for non-ASCII content, not part of the string
        let chars: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(U16Str::from_slice(&chars).to_string_lossy())
    }

    /// Appends a literal and returns its heap offset.
    pub fn push(&mut self, value: &str) -> u32 {
        let offset = self.data.len() as u32;
        let units: Vec<u16> = value.encode_utf16().collect();
        let len = units.len() * 2 + 1;

        // compressed length prefix
        #[allow(clippy::cast_possible_truncation)]
        if len < 0x80 {
            self.data.push(len as u8);
        } else if len < 0x4000 {
            self.data.push(0x80 | (len >> 8) as u8);
            self.data.push(len as u8);
        } else {
            self.data.push(0xC0 | (len >> 24) as u8);
            self.data.push((len >> 16) as u8);
            self.data.push((len >> 8) as u8);
            self.data.push(len as u8);
        }

        let mut special = 0u8;
        for unit in units {
            if unit > 0x7E || (unit < 0x20 && unit != 0x09 && unit != 0x0A && unit != 0x0D) {
                special = 1;
            }
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        self.data.push(special);

        offset
    }

    /// Raw heap size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if only the mandatory empty entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }
}

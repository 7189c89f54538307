//! The `#Blob` heap: length-prefixed binary values (signatures, constants).

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// A view over the `#Blob` heap.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wraps the heap bytes. The heap must start with the empty blob.
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with a zero length.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Blob heap is empty"));
        }

        Ok(Blob { data })
    }

    /// Returns the blob starting at byte offset `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns an error if the offset or the encoded length points outside the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }
}

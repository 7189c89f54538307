//! PE image access for .NET assemblies.
//!
//! [`File`] owns the raw bytes of an image (memory-mapped from disk through [`physical`], or an
//! owned buffer through [`memory`]) together with the goblin PE view parsed from those bytes.
//! The metadata reader only needs three things from it: the location of the CLI header, RVA to
//! file offset translation, and bounds-checked slices.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotlens::file::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("Sample.dll"))?;
//! let (clr_rva, clr_size) = file.clr()?;
//! let offset = file.rva_to_offset(clr_rva)?;
//! println!("CLI header at 0x{offset:x} ({clr_size} bytes)");
//! # Ok::<(), dotlens::Error>(())
//! ```

pub mod io;
pub mod memory;
pub mod parser;
pub mod physical;

use std::path::Path;

use goblin::pe::PE;
use ouroboros::self_referencing;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
use memory::Memory;
use physical::Physical;

/// Source of the raw image bytes.
pub trait Backend: Send + Sync {
    /// Returns a bounds-checked slice of the data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the whole buffer.
    fn data(&self) -> &[u8];

    /// Returns the buffer length.
    fn len(&self) -> usize;
}

/// A parsed PE image.
///
/// The goblin [`PE`] view borrows from the backend buffer, so both live in one self-referencing
/// struct.
#[self_referencing]
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Maps and parses the image at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not a PE image, or has no CLI header.
    pub fn from_file(path: &Path) -> Result<File> {
        Self::load(Physical::new(path)?)
    }

    /// Parses an image held in memory.
    ///
    /// # Errors
    /// Returns an error if the buffer is empty, not a PE image, or has no CLI header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        File::try_new(Box::new(data), |data| {
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;
            let Some(optional_header) = pe.header.optional_header.as_ref() else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };

            if optional_header
                .data_directories
                .get_clr_runtime_header()
                .is_none()
            {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ));
            }

            Ok(pe)
        })
    }

    /// Total size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.borrow_data().len()
    }

    /// Returns `true` if the image is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.borrow_data().data()
    }

    /// A bounds-checked slice of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.borrow_data().data_slice(offset, len)
    }

    /// RVA and size of the CLI (COR20) header.
    ///
    /// # Errors
    /// Returns an error if the directory is missing, which [`File::from_file`] already rejects.
    pub fn clr(&self) -> Result<(usize, usize)> {
        self.with_pe(|pe| {
            let directory = pe
                .header
                .optional_header
                .as_ref()
                .and_then(|header| {
                    header
                        .data_directories
                        .get_clr_runtime_header()
                        .as_ref()
                        .map(|dir| (dir.virtual_address, dir.size))
                });

            match directory {
                Some((rva, size)) => Ok((rva as usize, size as usize)),
                None => Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                )),
            }
        })
    }

    /// Translates a relative virtual address into a file offset.
    ///
    /// # Errors
    /// Returns an error if no section contains `rva`.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva = u32::try_from(rva).map_err(|_| malformed_error!("RVA too large - {}", rva))?;

        self.with_pe(|pe| {
            for section in &pe.sections {
                let extent = section.virtual_size.max(section.size_of_raw_data);
                let Some(section_end) = section.virtual_address.checked_add(extent) else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        extent
                    ));
                };

                if section.virtual_address <= rva && rva < section_end {
                    return Ok(
                        (rva - section.virtual_address) as usize + section.pointer_to_raw_data as usize
                    );
                }
            }

            Err(malformed_error!("RVA could not be converted to offset - {}", rva))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn not_a_pe() {
        assert!(File::from_mem(vec![0x00; 128]).is_err());
    }
}

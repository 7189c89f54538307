//! The CLI header (ECMA-335 II.25.3.3), the entry point into the metadata of a PE image.

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// The fields of the CLI header the metadata reader needs.
///
/// The remaining directories (resources, strong name signature, vtable fixups, ...) are skipped;
/// nothing in the analysis layer looks at them.
pub struct Cor20Header {
    /// Size of the header, always 72
    pub cb: u32,
    /// Major runtime version the image targets
    pub major_runtime_version: u16,
    /// Minor runtime version the image targets
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata block
    pub meta_data_size: u32,
    /// Runtime flags (`COMIMAGE_FLAGS_*`)
    pub flags: u32,
    /// Entry point token (MethodDef or File), or 0
    pub entry_point_token: u32,
}

impl Cor20Header {
    /// Parses the header from the start of `data`.
    ///
    /// # Errors
    /// Returns an error if `data` is shorter than 72 bytes or the metadata directory is empty.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < 72 {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb != 72 {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("CLR header has an empty metadata directory"));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
        })
    }
}

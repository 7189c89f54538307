//! Metadata root header and stream directory (ECMA-335 II.24.2.1 / II.24.2.2).

use crate::{
    file::io::{read_le, read_le_at},
    Error::OutOfBounds,
    Result,
};

/// Magic signature 'BSJB' at the start of every metadata root
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// One entry of the stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream, e.g. `#~` or `#Strings`
    pub name: String,
}

impl StreamHeader {
    /// Parses a stream header and returns it together with its encoded length.
    ///
    /// # Errors
    /// Returns an error if the header is truncated or its name is not terminated within 32 bytes.
    pub fn read(data: &[u8]) -> Result<(StreamHeader, usize)> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(name_len) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Stream header name is not terminated"));
        };

        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();
        // name plus terminator, padded to the next 4 byte boundary
        let encoded_len = 8 + ((name_len + 1 + 3) & !3);

        Ok((
            StreamHeader {
                offset: read_le::<u32>(data)?,
                size: read_le::<u32>(&data[4..])?,
                name,
            },
            encoded_len,
        ))
    }
}

/// The metadata root: version string and stream directory.
pub struct Root {
    /// Always [`CIL_HEADER_MAGIC`]
    pub signature: u32,
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Runtime version string, e.g. `v4.0.30319`
    pub version: String,
    /// The stream directory
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parses the root from the start of the metadata block.
    ///
    /// # Errors
    /// Returns an error on a bad signature, truncated data, or streams pointing outside `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        let version_length = read_le_at::<u32>(data, &mut 12)? as usize;
        let Some(version_end) = version_length.checked_add(16) else {
            return Err(malformed_error!("Version string length overflow - {}", version_length));
        };
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version = String::from_utf8_lossy(&data[16..version_end])
            .trim_end_matches('\0')
            .to_string();

        // flags (u16) follow the version string, then the stream count
        let stream_count = read_le_at::<u16>(data, &mut (version_end + 2))?;
        if stream_count == 0 {
            return Err(malformed_error!("Metadata root declares no streams"));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        let mut stream_offset = version_end + 4;
        for _ in 0..stream_count {
            if stream_offset >= data.len() {
                return Err(OutOfBounds);
            }

            let (header, encoded_len) = StreamHeader::read(&data[stream_offset..])?;
            match header.offset.checked_add(header.size) {
                Some(end) if (end as usize) <= data.len() => {}
                _ => {
                    return Err(malformed_error!(
                        "Stream {} exceeds the metadata block - {} + {}",
                        header.name,
                        header.offset,
                        header.size
                    ))
                }
            }

            stream_offset += encoded_len;
            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            version,
            stream_headers,
        })
    }

    /// Looks up a stream by name.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }
}

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{read_le, read_le_at},
    metadata::tables::types::{CodedIndexType, TableId},
    Error::OutOfBounds,
    Result,
};

/// Row count of one table and the number of bits needed to index it
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// The count of rows in this table
    pub rows: u32,
    /// Number of bits required to represent any valid row index
    pub bits: u8,
}

impl TableRowInfo {
    /// Creates a new `TableRowInfo` for a table with `rows` rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self { rows, bits }
    }
}

/// Row counts of all tables plus the resulting index widths.
///
/// Every reference column in the table stream is either 2 or 4 bytes wide, depending on the size
/// of the heap or table(s) it refers to. `TableInfo` answers those width questions.
#[derive(Clone, Default, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
    header_len: usize,
}

impl TableInfo {
    /// Parses the table stream header.
    ///
    /// Row counts of tables this reader does not know (bits above `GenericParamConstraint`) are
    /// skipped; their data follows all known tables and does not affect the layout.
    ///
    /// # Errors
    /// Returns an error if the header is truncated.
    pub fn new(data: &[u8]) -> Result<Self> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let heap_size_flags = read_le::<u8>(&data[6..])?;
        let valid_bitvec = read_le::<u64>(&data[8..])?;

        let mut rows = vec![TableRowInfo::default(); TableId::COUNT];
        let mut next_row_offset = 24;
        for bit in 0..64 {
            if valid_bitvec & (1u64 << bit) == 0 {
                continue;
            }

            let row_count = read_le_at::<u32>(data, &mut next_row_offset)?;
            if bit < TableId::COUNT {
                rows[bit] = TableRowInfo::new(row_count);
            }
        }

        // an extra data dword follows the row counts when this flag is set
        if heap_size_flags & 0x40 != 0 {
            next_row_offset += 4;
        }

        let mut table_info = TableInfo {
            rows,
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: heap_size_flags & 1 == 1,
            is_large_index_guid: heap_size_flags & 2 == 2,
            is_large_index_blob: heap_size_flags & 4 == 4,
            header_len: next_row_offset,
        };

        table_info.calculate_coded_index_bits();
        Ok(table_info)
    }

    /// Size of the header including the row count array; table data starts here
    #[must_use]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Decodes a coded index value into the token it references.
    ///
    /// # Errors
    /// Returns an error if the tag is out of range for `coded_index_type`.
    pub fn decode_coded_index(
        &self,
        value: u32,
        coded_index_type: CodedIndexType,
    ) -> Result<(TableId, u32)> {
        let tables = coded_index_type.tables();
        let tag_bits = coded_index_type.tag_bits();
        let tag = value & ((1 << tag_bits) - 1);

        match tables.get(tag as usize) {
            Some(table) => Ok((*table, value >> tag_bits)),
            None => Err(malformed_error!(
                "Invalid tag {} for coded index {:?}",
                tag,
                coded_index_type
            )),
        }
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// Width of indexes into the `#Strings` heap
    #[must_use]
    pub fn str_bytes(&self) -> usize {
        if self.is_large_index_str {
            4
        } else {
            2
        }
    }

    /// Width of indexes into the `#GUID` heap
    #[must_use]
    pub fn guid_bytes(&self) -> usize {
        if self.is_large_index_guid {
            4
        } else {
            2
        }
    }

    /// Width of indexes into the `#Blob` heap
    #[must_use]
    pub fn blob_bytes(&self) -> usize {
        if self.is_large_index_blob {
            4
        } else {
            2
        }
    }

    /// Width of a simple index into `table`
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> usize {
        if self.rows[table as usize].bits > 16 {
            4
        } else {
            2
        }
    }

    /// Width of a coded index of the given kind
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> usize {
        if self.coded_indexes[coded_index_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);

            self.coded_indexes[coded_index as usize] = max_bits + coded_index.tag_bits();
        }
    }
}

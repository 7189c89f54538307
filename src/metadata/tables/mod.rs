//! The `#~` metadata table stream.
//!
//! [`Tables`] locates every table inside the stream from the row counts in its header and reads
//! individual rows on demand through the column layouts in [`schema`]. Heap columns are returned
//! as raw heap offsets; coded index columns are decoded into full [`Token`] values so that callers
//! never deal with tag bits.
//!
//! # Examples
//!
//! ```rust,ignore
//! let tables = Tables::from(stream)?;
//! for rid in 1..=tables.rows(TableId::TypeDef) {
//!     let row = tables.row(TableId::TypeDef, rid)?;
//!     let name_index = row.get(1);
//!     let extends = row.token(3);
//! }
//! ```

pub mod schema;
mod tableinfo;
mod types;

pub use tableinfo::{TableInfo, TableRowInfo};
pub use types::{CodedIndexType, TableId};

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le_at_dyn,
    metadata::token::Token,
    Error::OutOfBounds,
    Result,
};
use schema::Column;

#[derive(Clone, Copy, Default, Debug)]
struct TableLayout {
    offset: usize,
    row_size: usize,
    rows: u32,
}

/// One decoded table row.
///
/// Values appear in column order. Coded indexes are stored as token values, everything else as
/// the raw number read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<u32>,
}

impl Row {
    /// Raw value of column `column`, 0 if the column does not exist
    #[must_use]
    pub fn get(&self, column: usize) -> u32 {
        self.values.get(column).copied().unwrap_or(0)
    }

    /// Column `column` interpreted as a token (coded index columns)
    #[must_use]
    pub fn token(&self, column: usize) -> Token {
        Token::new(self.get(column))
    }
}

/// A view over the `#~` stream.
pub struct Tables<'a> {
    data: &'a [u8],
    info: TableInfo,
    layouts: Vec<TableLayout>,
    /// Major schema version
    pub major_version: u8,
    /// Minor schema version
    pub minor_version: u8,
}

impl<'a> Tables<'a> {
    /// Parses the stream header and computes the table layout.
    ///
    /// # Errors
    /// Returns an error if the header is truncated or the tables extend past the stream.
    pub fn from(data: &'a [u8]) -> Result<Tables<'a>> {
        let info = TableInfo::new(data)?;

        let mut layouts = vec![TableLayout::default(); TableId::COUNT];
        let mut offset = info.header_len();
        for table in TableId::iter() {
            let rows = info.rows(table);
            let row_size = schema::row_size(table, &info);
            layouts[table as usize] = TableLayout {
                offset,
                row_size,
                rows,
            };

            let Some(next) = (rows as usize)
                .checked_mul(row_size)
                .and_then(|size| offset.checked_add(size))
            else {
                return Err(malformed_error!("Table {:?} size overflows", table));
            };
            offset = next;
        }

        if offset > data.len() {
            return Err(malformed_error!(
                "Tables extend past the stream - {} > {}",
                offset,
                data.len()
            ));
        }

        Ok(Tables {
            data,
            info,
            layouts,
            major_version: data[4],
            minor_version: data[5],
        })
    }

    /// Index width information
    #[must_use]
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.layouts[table as usize].rows
    }

    /// Reads row `rid` (1-based) of `table`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for row 0 or a row past the table, and an error for a
    /// coded index with an invalid tag.
    pub fn row(&self, table: TableId, rid: u32) -> Result<Row> {
        let layout = &self.layouts[table as usize];
        if rid == 0 || rid > layout.rows {
            return Err(OutOfBounds);
        }

        let mut offset = layout.offset + (rid as usize - 1) * layout.row_size;
        let columns = schema::columns(table);
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            let value = read_le_at_dyn(self.data, &mut offset, column.size(&self.info) == 4)?;
            let value = match column {
                Column::Coded(coded) => {
                    let (target, row) = self.info.decode_coded_index(value, *coded)?;
                    target.token(row).value()
                }
                _ => value,
            };
            values.push(value);
        }

        Ok(Row { values })
    }

    /// End of the half-open row range `[start, end)` owned by row `rid` through a list column.
    ///
    /// List columns (e.g. `TypeDef.MethodList`) hold the first row of a run; the run ends where
    /// the next row's list starts, or after the last row of the target table.
    ///
    /// # Errors
    /// Returns an error if the next row cannot be read.
    pub fn list_end(&self, table: TableId, rid: u32, column: usize, target: TableId) -> Result<u32> {
        if rid < self.rows(table) {
            Ok(self.row(table, rid + 1)?.get(column))
        } else {
            Ok(self.rows(target) + 1)
        }
    }
}

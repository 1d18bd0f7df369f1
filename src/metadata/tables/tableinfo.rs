use strum::IntoEnumIterator;

use crate::metadata::tables::{
    schema::{columns, ColumnKind},
    CodedIndexType, TableId,
};

/// Flag in `HeapSizes` selecting 4-byte `#Strings` indices.
pub const HEAP_STRINGS_LARGE: u8 = 0x01;
/// Flag in `HeapSizes` selecting 4-byte `#GUID` indices.
pub const HEAP_GUID_LARGE: u8 = 0x02;
/// Flag in `HeapSizes` selecting 4-byte `#Blob` indices.
pub const HEAP_BLOB_LARGE: u8 = 0x04;
/// Flag in `HeapSizes` announcing an extra 4 bytes after the row counts.
pub const HEAP_EXTRA_DATA: u8 = 0x40;

/// Column width information derived from row counts and heap sizes.
///
/// Row counts cover both the tables present in the stream itself and, for Portable PDBs,
/// the type-system tables of the described module which are announced by the `#Pdb` stream.
#[derive(Debug, Clone)]
pub struct TableInfo {
    rows: [u32; 64],
    heap_sizes: u8,
}

impl TableInfo {
    /// Creates the width information for the given row counts (indexed by table number)
    /// and heap size flags.
    #[must_use]
    pub fn new(rows: [u32; 64], heap_sizes: u8) -> Self {
        TableInfo { rows, heap_sizes }
    }

    /// Row count of `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// `true` if indices into `table` need 4 bytes.
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows(table) >= 0x1_0000
    }

    /// `true` if indices of `kind` need 4 bytes.
    #[must_use]
    pub fn is_large_coded(&self, kind: CodedIndexType) -> bool {
        let max_rows = kind
            .tables()
            .iter()
            .flatten()
            .map(|table| self.rows(*table))
            .max()
            .unwrap_or(0);

        u64::from(max_rows) >= 1_u64 << (16 - kind.tag_bits())
    }

    /// `true` if `#Strings` indices need 4 bytes.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.heap_sizes & HEAP_STRINGS_LARGE != 0
    }

    /// `true` if `#GUID` indices need 4 bytes.
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.heap_sizes & HEAP_GUID_LARGE != 0
    }

    /// `true` if `#Blob` indices need 4 bytes.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.heap_sizes & HEAP_BLOB_LARGE != 0
    }

    /// `true` if a column of `kind` is 4 bytes wide.
    #[must_use]
    pub fn is_large_column(&self, kind: ColumnKind) -> bool {
        match kind {
            ColumnKind::U16 => false,
            ColumnKind::U32 => true,
            ColumnKind::Strings => self.is_large_str(),
            ColumnKind::Guid => self.is_large_guid(),
            ColumnKind::Blob => self.is_large_blob(),
            ColumnKind::Table(table) => self.is_large(table),
            ColumnKind::Coded(coded) => self.is_large_coded(coded),
        }
    }

    /// Size in bytes of one row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        columns(table)
            .iter()
            .map(|column| if self.is_large_column(column.kind) { 4 } else { 2 })
            .sum()
    }

    /// Total size in bytes of all rows of the tables marked present in `valid`.
    #[must_use]
    pub fn tables_size(&self, valid: u64) -> usize {
        TableId::iter()
            .filter(|table| valid & (1 << *table as u8) != 0)
            .map(|table| self.row_size(table) * self.rows(table) as usize)
            .sum()
    }
}

//! The compressed `#~` tables stream (ECMA-335 II.24.2.6).
//!
//! The stream header lists which tables are present (`Valid`), which are sorted, and how many
//! rows each has. Column widths follow from those counts and the heap size flags, so rows can
//! only be decoded after the header is known. [`TablesStream`] keeps every row as a vector of
//! `u32` cells and re-derives all widths on write, which is what makes appending rows to a
//! table (and growing heaps past 64 KiB) safe.

use strum::IntoEnumIterator;

use crate::{
    file::{
        io::{push_le, push_le_dyn, read_le_at, read_le_at_dyn},
        parser::Parser,
    },
    metadata::tables::{
        schema::columns, RawRow, TableId, TableInfo, HEAP_BLOB_LARGE, HEAP_EXTRA_DATA,
        HEAP_GUID_LARGE, HEAP_STRINGS_LARGE,
    },
    Error::NotSupported,
    Result,
};

/// One table's rows, each row holding one value per column.
type Rows = Vec<Vec<u32>>;

/// A decoded, mutable tables stream.
#[derive(Debug, Clone)]
pub struct TablesStream {
    /// Schema major version, 2 for current metadata
    pub major_version: u8,
    /// Schema minor version
    pub minor_version: u8,
    heap_sizes: u8,
    sorted: u64,
    extra_data: Option<u32>,
    tables: Vec<Rows>,
    external_rows: [u32; 64],
}

impl TablesStream {
    /// Creates an empty stream, as used for freshly built metadata.
    #[must_use]
    pub fn new() -> Self {
        TablesStream {
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            sorted: 0x0000_1600_3301_FA00,
            extra_data: None,
            tables: vec![Vec::new(); 64],
            external_rows: [0; 64],
        }
    }

    /// Decodes a tables stream.
    ///
    /// `external_rows` carries the row counts of tables that live in another image. Portable
    /// PDBs reference `MethodDef` and friends of the module they describe, and those counts
    /// take part in index width computation.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data and
    /// [`crate::Error::NotSupported`] for tables this library has no schema for.
    pub fn read(data: &[u8], external_rows: [u32; 64]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let _reserved = parser.read_le::<u32>()?;
        let major_version = parser.read_le::<u8>()?;
        let minor_version = parser.read_le::<u8>()?;
        let heap_sizes = parser.read_le::<u8>()?;
        let _reserved = parser.read_le::<u8>()?;
        let valid = parser.read_le::<u64>()?;
        let sorted = parser.read_le::<u64>()?;

        let mut rows = [0_u32; 64];
        for (index, count) in rows.iter_mut().enumerate() {
            if valid & (1 << index) == 0 {
                continue;
            }
            if TableId::from_repr(index as u8).is_none() {
                return Err(NotSupported);
            }
            *count = parser.read_le::<u32>()?;
        }

        let extra_data = if heap_sizes & HEAP_EXTRA_DATA != 0 {
            Some(parser.read_le::<u32>()?)
        } else {
            None
        };

        let mut merged = external_rows;
        for (index, count) in rows.iter().enumerate() {
            if *count != 0 {
                merged[index] = *count;
            }
        }
        let info = TableInfo::new(merged, heap_sizes);

        let expected = info.tables_size(valid);
        if parser.remaining() < expected {
            return Err(malformed_error!(
                "Tables stream holds {} bytes of rows, header announces {}",
                parser.remaining(),
                expected
            ));
        }

        let mut offset = parser.pos();
        let mut tables = vec![Vec::new(); 64];
        for table in TableId::iter() {
            let count = rows[table as usize];
            if count == 0 {
                continue;
            }

            let schema = columns(table);
            let mut table_rows = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let mut row = Vec::with_capacity(schema.len());
                for column in schema {
                    let value = if info.is_large_column(column.kind) {
                        read_le_at::<u32>(data, &mut offset)?
                    } else {
                        read_le_at_dyn(data, &mut offset, false)?
                    };
                    row.push(value);
                }
                table_rows.push(row);
            }
            tables[table as usize] = table_rows;
        }

        Ok(TablesStream {
            major_version,
            minor_version,
            heap_sizes,
            sorted,
            extra_data,
            tables,
            external_rows,
        })
    }

    /// Encodes the stream using the given heap sizes in bytes.
    ///
    /// Index widths are recomputed from the current row counts; heaps that were flagged
    /// large before stay large.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if a value does not fit its column.
    pub fn write(&self, strings_len: usize, guid_len: usize, blob_len: usize) -> Result<Vec<u8>> {
        let heap_sizes = self.heap_sizes_for(strings_len, guid_len, blob_len);
        let info = self.table_info_with(heap_sizes);

        let mut valid = 0_u64;
        for table in TableId::iter() {
            if !self.tables[table as usize].is_empty() {
                valid |= 1 << table as u8;
            }
        }

        let mut out = Vec::with_capacity(24 + info.tables_size(valid));
        push_le(&mut out, 0_u32);
        push_le(&mut out, self.major_version);
        push_le(&mut out, self.minor_version);
        push_le(&mut out, heap_sizes);
        push_le(&mut out, 1_u8);
        push_le(&mut out, valid);
        push_le(&mut out, self.sorted);
        for table in TableId::iter() {
            let count = self.tables[table as usize].len();
            if count != 0 {
                push_le(&mut out, count as u32);
            }
        }
        if let Some(extra) = self.extra_data {
            push_le(&mut out, extra);
        }

        for table in TableId::iter() {
            let schema = columns(table);
            for row in &self.tables[table as usize] {
                for (column, value) in schema.iter().zip(row) {
                    push_le_dyn(&mut out, *value, info.is_large_column(column.kind))?;
                }
            }
        }

        Ok(out)
    }

    fn heap_sizes_for(&self, strings_len: usize, guid_len: usize, blob_len: usize) -> u8 {
        let mut heap_sizes = self.heap_sizes;
        if strings_len >= 0x1_0000 {
            heap_sizes |= HEAP_STRINGS_LARGE;
        }
        // #GUID indices count 16-byte entries
        if guid_len / 16 >= 0x1_0000 {
            heap_sizes |= HEAP_GUID_LARGE;
        }
        if blob_len >= 0x1_0000 {
            heap_sizes |= HEAP_BLOB_LARGE;
        }
        if self.extra_data.is_none() {
            heap_sizes &= !HEAP_EXTRA_DATA;
        }
        heap_sizes
    }

    fn table_info_with(&self, heap_sizes: u8) -> TableInfo {
        let mut rows = self.external_rows;
        for table in TableId::iter() {
            let count = self.tables[table as usize].len() as u32;
            if count != 0 {
                rows[table as usize] = count;
            }
        }
        TableInfo::new(rows, heap_sizes)
    }

    /// Width information for the stream as it currently stands.
    #[must_use]
    pub fn table_info(&self) -> TableInfo {
        self.table_info_with(self.heap_sizes)
    }

    /// The heap size flags the stream was read with.
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        self.heap_sizes
    }

    /// Replaces the externally provided row counts.
    pub fn set_external_rows(&mut self, rows: [u32; 64]) {
        self.external_rows = rows;
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.tables[table as usize].len() as u32
    }

    /// Row counts of all tables, indexed by table number.
    #[must_use]
    pub fn row_counts(&self) -> [u32; 64] {
        let mut rows = [0_u32; 64];
        for table in TableId::iter() {
            rows[table as usize] = self.row_count(table);
        }
        rows
    }

    /// The raw cells of row `rid` of `table`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn row(&self, table: TableId, rid: u32) -> Result<&[u32]> {
        rid.checked_sub(1)
            .and_then(|index| self.tables[table as usize].get(index as usize))
            .map(Vec::as_slice)
            .ok_or_else(|| malformed_error!("{:?} has no row {}", table, rid))
    }

    /// Reads row `rid` as the typed view `R`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn get<R: RawRow>(&self, rid: u32) -> Result<R> {
        R::from_row(rid, self.row(R::TABLE, rid)?)
    }

    /// Iterates all rows of `R`'s table in row order.
    pub fn iter<R: RawRow>(&self) -> impl Iterator<Item = Result<R>> + '_ {
        self.tables[R::TABLE as usize]
            .iter()
            .enumerate()
            .map(|(index, row)| R::from_row(index as u32 + 1, row))
    }

    /// Appends `row` and returns its new row id. The `rid` of `row` is ignored.
    pub fn push<R: RawRow>(&mut self, row: &R) -> u32 {
        let rows = &mut self.tables[R::TABLE as usize];
        rows.push(row.to_row());
        rows.len() as u32
    }

    /// Overwrites the row identified by `row.rid()`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist.
    pub fn update<R: RawRow>(&mut self, row: &R) -> Result<()> {
        let rid = row.rid();
        let Some(slot) = rid
            .checked_sub(1)
            .and_then(|index| self.tables[R::TABLE as usize].get_mut(index as usize))
        else {
            return Err(malformed_error!("{:?} has no row {}", R::TABLE, rid));
        };

        *slot = row.to_row();
        Ok(())
    }

    /// Removes every row of `R`'s table for which `keep` returns `false` and returns the
    /// number of removed rows. Remaining rows keep their relative order.
    ///
    /// Only safe for tables that are not referenced by row id from other tables.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a row cannot be viewed as `R`.
    pub fn retain<R: RawRow>(&mut self, mut keep: impl FnMut(&R) -> bool) -> Result<usize> {
        let rows = std::mem::take(&mut self.tables[R::TABLE as usize]);
        let before = rows.len();

        let mut kept = Vec::with_capacity(before);
        for (index, row) in rows.into_iter().enumerate() {
            let view = R::from_row(index as u32 + 1, &row)?;
            if keep(&view) {
                kept.push(row);
            }
        }

        let removed = before - kept.len();
        self.tables[R::TABLE as usize] = kept;
        Ok(removed)
    }
}

impl Default for TablesStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{MemberRefRaw, TypeRefRaw};

    fn sample() -> TablesStream {
        let mut stream = TablesStream::new();
        stream.push(&TypeRefRaw {
            rid: 0,
            resolution_scope: 6,
            type_name: 1,
            type_namespace: 8,
        });
        stream.push(&MemberRefRaw {
            rid: 0,
            class: 9,
            name: 20,
            signature: 1,
        });
        stream
    }

    #[test]
    fn write_then_read() {
        let stream = sample();
        let bytes = stream.write(32, 16, 16).unwrap();

        // header (24) + 2 row counts (8) + TypeRef (6) + MemberRef (6)
        assert_eq!(bytes.len(), 24 + 8 + 6 + 6);

        let read = TablesStream::read(&bytes, [0; 64]).unwrap();
        assert_eq!(read.row_count(TableId::TypeRef), 1);
        let member: MemberRefRaw = read.get(1).unwrap();
        assert_eq!(member.class, 9);
        assert_eq!(member.name, 20);
        assert!(read.get::<MemberRefRaw>(2).is_err());
    }

    #[test]
    fn large_heaps_widen_columns() {
        let stream = sample();
        let bytes = stream.write(0x1_0000, 16, 16).unwrap();
        assert_eq!(bytes[6] & HEAP_STRINGS_LARGE, HEAP_STRINGS_LARGE);
        // TypeName, TypeNamespace and MemberRef.Name grow by two bytes each
        assert_eq!(bytes.len(), 24 + 8 + 10 + 8);

        let read = TablesStream::read(&bytes, [0; 64]).unwrap();
        let type_ref: TypeRefRaw = read.get(1).unwrap();
        assert_eq!(type_ref.type_namespace, 8);
    }

    #[test]
    fn retain_and_update() {
        let mut stream = sample();
        stream.push(&TypeRefRaw {
            rid: 0,
            resolution_scope: 6,
            type_name: 30,
            type_namespace: 8,
        });

        let removed = stream
            .retain::<TypeRefRaw>(|row| row.type_name != 1)
            .unwrap();
        assert_eq!(removed, 1);

        let mut first: TypeRefRaw = stream.get(1).unwrap();
        assert_eq!(first.type_name, 30);
        first.type_name = 31;
        stream.update(&first).unwrap();
        assert_eq!(stream.get::<TypeRefRaw>(1).unwrap().type_name, 31);
    }

    #[test]
    fn truncated_rows_are_rejected() {
        let bytes = sample().write(32, 16, 16).unwrap();
        assert!(TablesStream::read(&bytes[..bytes.len() - 1], [0; 64]).is_err());
    }
}

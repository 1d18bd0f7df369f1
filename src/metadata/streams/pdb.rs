use strum::IntoEnumIterator;

use crate::{
    file::{io::push_le, parser::Parser},
    metadata::tables::TableId,
    Result,
};

/// The `#Pdb` stream of a Portable PDB.
///
/// Besides the PDB id that ties the symbols to their image, it records the row counts of
/// the type-system tables of the described module. Those counts decide the width of every
/// `MethodDef` or coded index column in the PDB's own tables, so they must follow the
/// module whenever rows are added to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbStream {
    /// 20-byte id: a GUID followed by a 4-byte stamp, mirrored in the image's debug directory
    pub id: [u8; 20],
    /// `MethodDef` token of the entry point, zero for libraries
    pub entry_point: u32,
    /// Row counts of the referenced type-system tables, indexed by table number
    pub type_system_rows: [u32; 64],
}

impl PdbStream {
    /// Parses the stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data and
    /// [`crate::Error::Malformed`] if non type-system tables are referenced.
    pub fn from(data: &[u8]) -> Result<PdbStream> {
        let mut parser = Parser::new(data);

        let mut id = [0_u8; 20];
        id.copy_from_slice(parser.read_bytes(20)?);
        let entry_point = parser.read_le::<u32>()?;
        let referenced = parser.read_le::<u64>()?;

        let mut type_system_rows = [0_u32; 64];
        for (index, rows) in type_system_rows.iter_mut().enumerate() {
            if referenced & (1 << index) == 0 {
                continue;
            }
            match TableId::from_repr(index as u8) {
                Some(table) if table.is_type_system() => *rows = parser.read_le::<u32>()?,
                _ => {
                    return Err(malformed_error!(
                        "#Pdb references invalid table - {:#04x}",
                        index
                    ))
                }
            }
        }

        Ok(PdbStream {
            id,
            entry_point,
            type_system_rows,
        })
    }

    /// Encodes the stream. Tables with zero rows are not referenced.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut referenced = 0_u64;
        for table in TableId::iter().filter(|table| table.is_type_system()) {
            if self.type_system_rows[table as usize] != 0 {
                referenced |= 1 << table as u8;
            }
        }

        let mut out = Vec::with_capacity(32 + 4 * referenced.count_ones() as usize);
        out.extend_from_slice(&self.id);
        push_le(&mut out, self.entry_point);
        push_le(&mut out, referenced);
        for table in TableId::iter() {
            if referenced & (1 << table as u8) != 0 {
                push_le(&mut out, self.type_system_rows[table as usize]);
            }
        }
        out
    }

    /// The GUID part of the PDB id.
    #[must_use]
    pub fn guid(&self) -> uguid::Guid {
        let mut raw = [0_u8; 16];
        raw.copy_from_slice(&self.id[..16]);
        uguid::Guid::from_bytes(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_parse() {
        let mut rows = [0_u32; 64];
        rows[TableId::TypeDef as usize] = 3;
        rows[TableId::MethodDef as usize] = 7;
        let stream = PdbStream {
            id: [0xAB; 20],
            entry_point: 0,
            type_system_rows: rows,
        };

        let bytes = stream.to_bytes();
        assert_eq!(bytes.len(), 20 + 4 + 8 + 8);
        assert_eq!(PdbStream::from(&bytes).unwrap(), stream);
        assert_eq!(stream.guid().to_bytes(), [0xAB; 16]);
    }

    #[test]
    fn rejects_debug_tables() {
        let mut bytes = vec![0_u8; 24];
        bytes.extend_from_slice(&(1_u64 << 0x30).to_le_bytes());
        bytes.extend_from_slice(&1_u32.to_le_bytes());
        assert!(PdbStream::from(&bytes).is_err());
    }
}

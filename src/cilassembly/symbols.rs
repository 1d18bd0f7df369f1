//! Portable PDB symbols of a module and their regeneration after bodies were replaced.
//!
//! A rewritten method invalidates every IL offset its debug information mentions. Rather
//! than copying stale data, the affected rows are rebuilt:
//!
//! - `MethodDebugInformation`: the sequence point blob is replaced by a single point at offset
//!   zero that keeps the first visible source span of the old body (the property's setter
//!   line) and names the new local signature;
//! - `LocalScope`: every scope of the method covers the new body;
//! - `CustomDebugInformation`: rows attached to the method (state machine slots, EnC maps)
//!   are dropped;
//! - `#Pdb`: the row counts of the module's type-system tables are refreshed, since they
//!   decide index widths in the PDB's own tables.

use strum::IntoEnumIterator;

use crate::{
    metadata::{
        image::MetadataImage,
        sequencepoints::{SequencePoint, SequencePoints},
        streams::PdbStream,
        tables::{
            CodedIndexType, CustomDebugInformationRaw, LocalScopeRaw, MethodDebugInformationRaw,
            TableId,
        },
        token::Token,
    },
    Error::NotSupported,
    Result,
};

/// Magic of Windows (MSF) program databases.
const MSF_MAGIC: &[u8] = b"Microsoft C/C++ MSF 7.00\r\n";

/// What the symbol writer needs to know about a replaced method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyChange {
    /// `MethodDef` row of the method
    pub method: u32,
    /// Size of the new IL code, without header
    pub code_size: u32,
    /// `StandAloneSig` row of the new local signature, zero if none
    pub local_signature: u32,
}

/// A Portable PDB.
#[derive(Debug, Clone)]
pub struct PortablePdb {
    original: Vec<u8>,
    image: MetadataImage,
}

impl PortablePdb {
    /// Parses a Portable PDB.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for Windows PDBs and format errors for damaged
    /// files, including metadata without a `#Pdb` stream.
    pub fn read(data: Vec<u8>) -> Result<PortablePdb> {
        if data.starts_with(MSF_MAGIC) {
            return Err(NotSupported);
        }

        let image = MetadataImage::read(&data)?;
        if image.pdb.is_none() {
            return Err(malformed_error!("Symbol file has no #Pdb stream"));
        }

        Ok(PortablePdb {
            original: data,
            image,
        })
    }

    /// The bytes the symbols were read from.
    #[must_use]
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// The decoded symbol metadata.
    #[must_use]
    pub fn metadata(&self) -> &MetadataImage {
        &self.image
    }

    /// The `#Pdb` stream.
    ///
    /// # Errors
    /// Never fails for symbols created through [`PortablePdb::read`].
    pub fn pdb_stream(&self) -> Result<&PdbStream> {
        self.image
            .pdb
            .as_ref()
            .ok_or_else(|| malformed_error!("Symbol file has no #Pdb stream"))
    }

    /// The 20-byte PDB id that the image's CodeView entry refers to.
    ///
    /// # Errors
    /// See [`PortablePdb::pdb_stream`].
    pub fn id(&self) -> Result<[u8; 20]> {
        Ok(self.pdb_stream()?.id)
    }

    /// Decodes the sequence points of `method`, `None` if it has none.
    ///
    /// # Errors
    /// Returns format errors for damaged rows or blobs.
    pub fn sequence_points(&self, method: u32) -> Result<Option<SequencePoints>> {
        if method == 0 || method > self.image.tables.row_count(TableId::MethodDebugInformation) {
            return Ok(None);
        }

        let row: MethodDebugInformationRaw = self.image.tables.get(method)?;
        if row.sequence_points == 0 {
            return Ok(None);
        }

        let blob = self.image.blobs.get(row.sequence_points)?;
        SequencePoints::parse(blob, row.document).map(Some)
    }

    /// Rebuilds the debug information of every changed method.
    ///
    /// `type_system_rows` are the row counts of the module as it will be written.
    ///
    /// # Errors
    /// Returns format errors for damaged rows or blobs.
    pub fn regenerate(&mut self, type_system_rows: [u32; 64], changes: &[BodyChange]) -> Result<()> {
        for change in changes {
            self.rewrite_sequence_points(change)?;
            self.rewrite_scopes(change)?;
        }

        let mut stale = Vec::with_capacity(changes.len());
        for change in changes {
            stale.push(
                CodedIndexType::HasCustomDebugInformation
                    .encode(Token::from_parts(TableId::MethodDef, change.method))?,
            );
        }
        let removed = self
            .image
            .tables
            .retain::<CustomDebugInformationRaw>(|row| !stale.contains(&row.parent))?;
        if removed > 0 {
            log::debug!("Dropped {removed} custom debug information rows of rewritten methods");
        }

        let mut rows = [0_u32; 64];
        for table in TableId::iter().filter(|table| table.is_type_system()) {
            rows[table as usize] = type_system_rows[table as usize];
        }
        if let Some(pdb) = self.image.pdb.as_mut() {
            pdb.type_system_rows = rows;
        }
        self.image.tables.set_external_rows(rows);

        Ok(())
    }

    fn rewrite_sequence_points(&mut self, change: &BodyChange) -> Result<()> {
        if change.method > self.image.tables.row_count(TableId::MethodDebugInformation) {
            return Ok(());
        }

        let mut row: MethodDebugInformationRaw = self.image.tables.get(change.method)?;
        let first_visible = match self.sequence_points(change.method)? {
            Some(points) => points.first_visible().cloned(),
            None => None,
        };

        let Some(span) = first_visible else {
            row.sequence_points = 0;
            return self.image.tables.update(&row);
        };

        let points = SequencePoints {
            local_signature: change.local_signature,
            initial_document: (row.document == 0).then_some(span.document),
            points: vec![SequencePoint::new(
                0,
                span.document,
                (span.start_line, span.start_col),
                (span.end_line, span.end_col),
            )],
        };

        row.sequence_points = self.image.blobs.add(&points.encode()?)?;
        self.image.tables.update(&row)
    }

    fn rewrite_scopes(&mut self, change: &BodyChange) -> Result<()> {
        let scopes: Vec<LocalScopeRaw> = self
            .image
            .tables
            .iter::<LocalScopeRaw>()
            .filter(|row| row.as_ref().map_or(true, |row| row.method == change.method))
            .collect::<Result<_>>()?;

        for mut scope in scopes {
            scope.start_offset = 0;
            scope.length = change.code_size;
            self.image.tables.update(&scope)?;
        }
        Ok(())
    }

    /// Encodes the symbols.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if a value no longer fits its column.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.image.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::PdbFactory;

    #[test]
    fn windows_pdb_is_rejected() {
        let mut data = MSF_MAGIC.to_vec();
        data.extend_from_slice(&[0x1A, b'D', b'S', 0, 0, 0]);
        assert!(matches!(PortablePdb::read(data), Err(NotSupported)));
    }

    #[test]
    fn module_metadata_is_not_a_pdb() {
        let image = MetadataImage::new("v4.0.30319").write().unwrap();
        assert!(PortablePdb::read(image).is_err());
    }

    #[test]
    fn regenerate_rewrites_method_rows() {
        let pdb = PdbFactory::new()
            .method(1, Some((10, 5, 10, 30)))
            .method(2, Some((12, 9, 12, 40)))
            .scope(2, 0, 14)
            .custom_debug_information(2)
            .custom_debug_information(1)
            .build();
        let mut symbols = PortablePdb::read(pdb).unwrap();

        let mut rows = [0_u32; 64];
        rows[TableId::MethodDef as usize] = 2;
        rows[TableId::StandAloneSig as usize] = 1;
        symbols
            .regenerate(
                rows,
                &[BodyChange {
                    method: 2,
                    code_size: 41,
                    local_signature: 1,
                }],
            )
            .unwrap();

        let reread = PortablePdb::read(symbols.to_bytes().unwrap()).unwrap();
        let points = reread.sequence_points(2).unwrap().unwrap();
        assert_eq!(points.local_signature, 1);
        assert_eq!(points.points.len(), 1);
        let point = &points.points[0];
        assert_eq!((point.il_offset, point.start_line, point.start_col), (0, 12, 9));
        assert_eq!((point.end_line, point.end_col), (12, 40));

        let untouched = reread.sequence_points(1).unwrap().unwrap();
        assert_eq!(untouched.local_signature, 0);

        let scope: LocalScopeRaw = reread.metadata().tables.get(1).unwrap();
        assert_eq!((scope.start_offset, scope.length), (0, 41));

        let tables = &reread.metadata().tables;
        assert_eq!(tables.row_count(TableId::CustomDebugInformation), 1);
        let pdb = reread.pdb_stream().unwrap();
        assert_eq!(pdb.type_system_rows[TableId::StandAloneSig as usize], 1);
    }

    #[test]
    fn methods_without_visible_points_lose_their_blob() {
        let pdb = PdbFactory::new().method(1, None).build();
        let mut symbols = PortablePdb::read(pdb).unwrap();

        let mut rows = [0_u32; 64];
        rows[TableId::MethodDef as usize] = 1;
        symbols
            .regenerate(
                rows,
                &[BodyChange {
                    method: 1,
                    code_size: 10,
                    local_signature: 0,
                }],
            )
            .unwrap();
        assert!(symbols.sequence_points(1).unwrap().is_none());
    }
}

//! A complete, mutable metadata image.
//!
//! [`MetadataImage`] is what both halves of a woven module are made of: the CLI metadata
//! embedded in the PE image and the Portable PDB next to it share the same physical layout
//! (metadata root, heaps, tables stream) and differ only in the tables they populate and the
//! extra `#Pdb` stream.
//!
//! Reading decodes every stream eagerly. Writing lays the streams out again in their original
//! order, appending streams that were created during modification (typically `#US` when a
//! module had no string literals before).

use crate::{
    file::io::pad_to,
    metadata::{
        root::Root,
        streams::{Blob, Guid, PdbStream, StreamHeader, Strings, UserStrings},
        tables::TablesStream,
    },
    Error::NotSupported,
    Result,
};

/// Identifies a stream inside a metadata image.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamKind {
    Tables,
    Strings,
    UserStrings,
    Guid,
    Blob,
    Pdb,
    Other(usize),
}

/// Decoded metadata: root, heaps and tables.
#[derive(Debug, Clone)]
pub struct MetadataImage {
    /// The metadata root; its stream headers reflect the image as read
    pub root: Root,
    /// `#Strings`
    pub strings: Strings,
    /// `#US`
    pub user_strings: UserStrings,
    /// `#GUID`
    pub guids: Guid,
    /// `#Blob`
    pub blobs: Blob,
    /// `#~`
    pub tables: TablesStream,
    /// `#Pdb`, present for Portable PDB files only
    pub pdb: Option<PdbStream>,
    order: Vec<StreamKind>,
    others: Vec<(String, Vec<u8>)>,
}

impl MetadataImage {
    /// Creates empty module metadata with the given runtime version string.
    #[must_use]
    pub fn new(version: &str) -> Self {
        MetadataImage {
            root: Root::new(version),
            strings: Strings::default(),
            user_strings: UserStrings::default(),
            guids: Guid::default(),
            blobs: Blob::default(),
            tables: TablesStream::new(),
            pdb: None,
            order: vec![
                StreamKind::Tables,
                StreamKind::Strings,
                StreamKind::UserStrings,
                StreamKind::Guid,
                StreamKind::Blob,
            ],
            others: Vec::new(),
        }
    }

    /// Creates empty Portable PDB metadata.
    #[must_use]
    pub fn new_pdb(pdb: PdbStream) -> Self {
        let mut image = Self::new("PDB v1.0");
        image.tables.set_external_rows(pdb.type_system_rows);
        image.pdb = Some(pdb);
        image.order.insert(0, StreamKind::Pdb);
        image
    }

    /// Decodes metadata starting at its root.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for uncompressed (`#-`) metadata and format
    /// errors for damaged streams.
    pub fn read(data: &[u8]) -> Result<Self> {
        let root = Root::read(data)?;

        let mut image = MetadataImage {
            root: root.clone(),
            strings: Strings::default(),
            user_strings: UserStrings::default(),
            guids: Guid::default(),
            blobs: Blob::default(),
            tables: TablesStream::new(),
            pdb: None,
            order: Vec::with_capacity(root.stream_headers.len()),
            others: Vec::new(),
        };

        let mut tables_data = None;
        for header in &root.stream_headers {
            let start = header.offset as usize;
            let stream = &data[start..start + header.size as usize];
            match header.name.as_str() {
                "#~" => {
                    tables_data = Some(stream);
                    image.order.push(StreamKind::Tables);
                }
                "#-" => return Err(NotSupported),
                "#Strings" => {
                    image.strings = Strings::from(stream)?;
                    image.order.push(StreamKind::Strings);
                }
                "#US" => {
                    image.user_strings = UserStrings::from(stream)?;
                    image.order.push(StreamKind::UserStrings);
                }
                "#GUID" => {
                    image.guids = Guid::from(stream)?;
                    image.order.push(StreamKind::Guid);
                }
                "#Blob" => {
                    image.blobs = Blob::from(stream)?;
                    image.order.push(StreamKind::Blob);
                }
                "#Pdb" => {
                    image.pdb = Some(PdbStream::from(stream)?);
                    image.order.push(StreamKind::Pdb);
                }
                other => {
                    image.order.push(StreamKind::Other(image.others.len()));
                    image.others.push((other.to_string(), stream.to_vec()));
                }
            }
        }

        let Some(tables_data) = tables_data else {
            return Err(malformed_error!("Metadata has no #~ stream"));
        };
        let external_rows = image
            .pdb
            .as_ref()
            .map_or([0; 64], |pdb| pdb.type_system_rows);
        image.tables = TablesStream::read(tables_data, external_rows)?;

        Ok(image)
    }

    /// Encodes the image, laying out the streams after a fresh root header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if a table value does not fit its column.
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut order = self.order.clone();
        let mut ensure = |kind: StreamKind, needed: bool| {
            if needed && !order.contains(&kind) {
                order.push(kind);
            }
        };
        ensure(StreamKind::Strings, !self.strings.is_empty());
        ensure(StreamKind::UserStrings, !self.user_strings.is_empty());
        ensure(StreamKind::Guid, !self.guids.is_empty());
        ensure(StreamKind::Blob, !self.blobs.is_empty());

        let mut streams: Vec<(String, Vec<u8>)> = Vec::with_capacity(order.len());
        for kind in &order {
            let (name, mut bytes) = match kind {
                StreamKind::Tables => (
                    "#~".to_string(),
                    self.tables
                        .write(self.strings.len(), self.guids.len(), self.blobs.len())?,
                ),
                StreamKind::Strings => ("#Strings".to_string(), self.strings.data().to_vec()),
                StreamKind::UserStrings => ("#US".to_string(), self.user_strings.data().to_vec()),
                StreamKind::Guid => ("#GUID".to_string(), self.guids.data().to_vec()),
                StreamKind::Blob => ("#Blob".to_string(), self.blobs.data().to_vec()),
                StreamKind::Pdb => match &self.pdb {
                    Some(pdb) => ("#Pdb".to_string(), pdb.to_bytes()),
                    None => continue,
                },
                StreamKind::Other(index) => match self.others.get(*index) {
                    Some((name, data)) => (name.clone(), data.clone()),
                    None => continue,
                },
            };
            pad_to(&mut bytes, 4);
            streams.push((name, bytes));
        }

        let mut root = self.root.clone();
        root.stream_headers = streams
            .iter()
            .map(|(name, bytes)| StreamHeader {
                offset: 0,
                size: bytes.len() as u32,
                name: name.clone(),
            })
            .collect();

        let mut offset = root.encoded_size();
        for header in &mut root.stream_headers {
            header.offset = offset as u32;
            offset += header.size as usize;
        }

        let mut out = root.to_bytes();
        out.reserve(offset - out.len());
        for (_, bytes) in &streams {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{TableId, TypeRefRaw};

    #[test]
    fn write_then_read() {
        let mut image = MetadataImage::new("v4.0.30319");
        let name = image.strings.add("Object");
        let namespace = image.strings.add("System");
        image.tables.push(&TypeRefRaw {
            rid: 0,
            resolution_scope: 6,
            type_name: name,
            type_namespace: namespace,
        });
        let literal = image.user_strings.add("X").unwrap();

        let bytes = image.write().unwrap();
        let read = MetadataImage::read(&bytes).unwrap();

        assert_eq!(read.root.version, "v4.0.30319");
        assert_eq!(read.tables.row_count(TableId::TypeRef), 1);
        let type_ref: TypeRefRaw = read.tables.get(1).unwrap();
        assert_eq!(read.strings.get(type_ref.type_name).unwrap(), "Object");
        assert_eq!(read.user_strings.get(literal).unwrap(), "X");
        assert!(read.pdb.is_none());

        let names: Vec<_> = read
            .root
            .stream_headers
            .iter()
            .map(|header| header.name.as_str())
            .collect();
        assert_eq!(names, ["#~", "#Strings", "#US", "#GUID", "#Blob"]);
    }

    #[test]
    fn pdb_stream_comes_first() {
        let mut rows = [0_u32; 64];
        rows[TableId::MethodDef as usize] = 2;
        let image = MetadataImage::new_pdb(PdbStream {
            id: [1; 20],
            entry_point: 0,
            type_system_rows: rows,
        });

        let bytes = image.write().unwrap();
        let read = MetadataImage::read(&bytes).unwrap();
        assert_eq!(read.root.version, "PDB v1.0");
        assert_eq!(read.root.stream_headers[0].name, "#Pdb");
        assert_eq!(read.pdb.unwrap().type_system_rows[TableId::MethodDef as usize], 2);
    }

    #[test]
    fn uncompressed_tables_are_rejected() {
        let mut image = MetadataImage::new("v4.0.30319");
        image.strings.add("a");
        let mut bytes = image.write().unwrap();
        // rename "#~" to "#-"
        let position = bytes.windows(3).position(|w| w == b"#~\0").unwrap();
        bytes[position + 1] = b'-';
        assert!(matches!(MetadataImage::read(&bytes), Err(NotSupported)));
    }
}

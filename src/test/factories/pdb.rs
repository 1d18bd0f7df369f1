//! Portable PDB test data.

use std::collections::BTreeMap;

use crate::metadata::{
    image::MetadataImage,
    sequencepoints::{SequencePoint, SequencePoints},
    streams::PdbStream,
    tables::{
        CodedIndexType, CustomDebugInformationRaw, DocumentRaw, LocalScopeRaw,
        MethodDebugInformationRaw, TableId,
    },
    token::Token,
};

/// A source span: start line, start column, end line, end column.
pub type Span = (u32, u16, u32, u16);

/// Builds Portable PDBs with one source document.
#[derive(Debug, Clone, Default)]
pub struct PdbFactory {
    methods: BTreeMap<u32, Option<Span>>,
    scopes: Vec<(u32, u32, u32)>,
    custom_debug_information: Vec<u32>,
    type_system_rows: Option<[u32; 64]>,
    id: [u8; 20],
}

impl PdbFactory {
    /// Creates a factory for symbols without methods.
    pub fn new() -> Self {
        PdbFactory {
            id: [
                0x3D, 0x8B, 0x5C, 0x21, 0x0E, 0x47, 0x4A, 0x91, 0xB2, 0x6F, 0x10, 0x9A, 0xC4,
                0x55, 0x7E, 0x02, 0x4C, 0x1F, 0x8A, 0x9E,
            ],
            ..PdbFactory::default()
        }
    }

    /// Adds debug information for `MethodDef` row `method`: one visible sequence point at
    /// offset zero for `Some(span)`, a single hidden point for `None`.
    pub fn method(mut self, method: u32, span: Option<Span>) -> Self {
        self.methods.insert(method, span);
        self
    }

    /// Adds a local scope of `method`.
    pub fn scope(mut self, method: u32, start: u32, length: u32) -> Self {
        self.scopes.push((method, start, length));
        self
    }

    /// Attaches an opaque custom debug information record to `method`.
    pub fn custom_debug_information(mut self, method: u32) -> Self {
        self.custom_debug_information.push(method);
        self
    }

    /// Sets the row counts of the described module. Without them, only `MethodDef` is
    /// counted, as many rows as the highest method mentioned. Every `MethodDef` row gets a
    /// `MethodDebugInformation` row.
    pub fn type_system_rows(mut self, rows: [u32; 64]) -> Self {
        self.type_system_rows = Some(rows);
        self
    }

    /// Sets the 20-byte PDB id.
    pub fn id(mut self, id: [u8; 20]) -> Self {
        self.id = id;
        self
    }

    /// Encodes the symbols.
    pub fn build(self) -> Vec<u8> {
        let last_method = self
            .methods
            .keys()
            .copied()
            .chain(self.scopes.iter().map(|(method, _, _)| *method))
            .chain(self.custom_debug_information.iter().copied())
            .max()
            .unwrap_or(0);

        let rows = self.type_system_rows.unwrap_or_else(|| {
            let mut rows = [0_u32; 64];
            rows[TableId::MethodDef as usize] = last_method;
            rows
        });
        let method_rows = last_method.max(rows[TableId::MethodDef as usize]);
        let mut image = MetadataImage::new_pdb(PdbStream {
            id: self.id,
            entry_point: 0,
            type_system_rows: rows,
        });

        let src = image.blobs.add(b"src").unwrap();
        let file = image.blobs.add(b"Model.cs").unwrap();
        let mut name = vec![b'/'];
        for part in [src, file] {
            crate::file::io::push_compressed_uint(&mut name, part).unwrap();
        }
        let document = DocumentRaw {
            rid: 1,
            name: image.blobs.add(&name).unwrap(),
            hash_algorithm: image
                .guids
                .add(uguid::guid!("8829d00f-11b8-4213-878b-770e8597ac16")),
            hash: image.blobs.add(&[0x5A; 32]).unwrap(),
            language: image
                .guids
                .add(uguid::guid!("3f5162f8-07c6-11d3-9053-00c04fa302a1")),
        };
        image.tables.push(&document);

        for rid in 1..=method_rows {
            let mut row = MethodDebugInformationRaw {
                rid,
                ..MethodDebugInformationRaw::default()
            };
            if let Some(span) = self.methods.get(&rid) {
                let point = match span {
                    Some((start_line, start_col, end_line, end_col)) => SequencePoint::new(
                        0,
                        document.rid,
                        (*start_line, *start_col),
                        (*end_line, *end_col),
                    ),
                    None => SequencePoint::hidden(0, document.rid),
                };
                let points = SequencePoints {
                    local_signature: 0,
                    initial_document: None,
                    points: vec![point],
                };
                row.document = document.rid;
                row.sequence_points = image.blobs.add(&points.encode().unwrap()).unwrap();
            }
            image.tables.push(&row);
        }

        let mut scopes = self.scopes;
        scopes.sort_by_key(|(method, _, _)| *method);
        for (index, (method, start_offset, length)) in scopes.into_iter().enumerate() {
            image.tables.push(&LocalScopeRaw {
                rid: index as u32 + 1,
                method,
                import_scope: 0,
                variable_list: 1,
                constant_list: 1,
                start_offset,
                length,
            });
        }

        // state machine hoisted local scopes
        let kind = image
            .guids
            .add(uguid::guid!("6da9a61e-f8c7-4874-be62-68bc5630df71"));
        let value = image.blobs.add(&[0x00, 0x00, 0x00, 0x00]).unwrap();
        let mut parents: Vec<u32> = self
            .custom_debug_information
            .iter()
            .map(|method| {
                CodedIndexType::HasCustomDebugInformation
                    .encode(Token::from_parts(TableId::MethodDef, *method))
                    .unwrap()
            })
            .collect();
        parents.sort_unstable();
        for (index, parent) in parents.into_iter().enumerate() {
            image.tables.push(&CustomDebugInformationRaw {
                rid: index as u32 + 1,
                parent,
                kind,
                value,
            });
        }

        image.write().unwrap()
    }
}

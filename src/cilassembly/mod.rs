//! The mutable module model the weaver works on.
//!
//! [`CilAssembly`] keeps the original image bytes untouched and layers every change on top
//! of them:
//!
//! - the CLI metadata is decoded once into a [`MetadataImage`] that is edited in place;
//! - replaced method bodies are collected per `MethodDef` row;
//! - the sidecar Portable PDB is decoded into [`PortablePdb`] and regenerated on save.
//!
//! Nothing is written until [`CilAssembly::save`] (or [`CilAssembly::to_bytes`]) is called.
//! The writer then appends a single section holding the new bodies and the rebuilt
//! metadata, and points the CLI header and the `MethodDef` RVAs at it. The original bodies
//! and metadata stay in the image as unreferenced bytes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotweave::CilAssembly;
//! use std::path::Path;
//!
//! let assembly = CilAssembly::load(Path::new("Sample.dll"))?;
//! println!("{} methods", assembly.metadata().tables.row_count(
//!     dotweave::metadata::tables::TableId::MethodDef));
//! assembly.save(Path::new("Sample.dll"))?;
//! # Ok::<(), dotweave::Error>(())
//! ```

mod references;
mod symbols;
mod write;

use std::{collections::BTreeMap, path::Path};

use crate::{
    file::File,
    metadata::{
        cor20header::{Cor20Header, CLI_HEADER_SIZE},
        image::MetadataImage,
        method::MethodBody,
        tables::{MethodDefRaw, TableId},
        token::Token,
    },
    Error::{Empty, FileError, Load},
    Result,
};

pub use symbols::{BodyChange, PortablePdb};

/// A method body that replaces the one in the original image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReplacedBody {
    /// Header and code, ready to be placed at a 4-byte aligned position
    pub(crate) encoded: Vec<u8>,
    /// Length of the header in `encoded`
    pub(crate) header_size: usize,
    /// Declared maximum evaluation stack depth
    pub(crate) max_stack: u16,
    /// `StandAloneSig` token of the locals, null if there are none
    pub(crate) local_signature: Token,
}

impl ReplacedBody {
    fn code(&self) -> &[u8] {
        &self.encoded[self.header_size..]
    }
}

/// The code of a method body, original or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodCode<'a> {
    /// The IL bytes without header
    pub code: &'a [u8],
    /// Declared maximum evaluation stack depth
    pub max_stack: u16,
    /// `StandAloneSig` token of the locals, null if there are none
    pub local_signature: Token,
}

/// A loaded .NET module with its symbols, open for modification.
pub struct CilAssembly {
    file: File,
    header: Cor20Header,
    metadata: MetadataImage,
    bodies: BTreeMap<u32, ReplacedBody>,
    symbols: Option<PortablePdb>,
    modified: bool,
}

impl CilAssembly {
    /// Loads the image at `path` and, if present, the Portable PDB next to it
    /// (same stem, `.pdb` extension).
    ///
    /// # Errors
    /// Every failure is reported as [`crate::Error::Load`]: an empty path, an unreadable
    /// or malformed image, a malformed symbol file or a Windows PDB.
    pub fn load(path: &Path) -> Result<CilAssembly> {
        let display = path.display().to_string();
        if path.as_os_str().is_empty() {
            return Err(Load {
                path: display,
                source: Box::new(Empty),
            });
        }

        let file = File::from_file(path).map_err(|error| error.into_load(&display))?;

        let pdb_path = path.with_extension("pdb");
        let symbols = match std::fs::read(&pdb_path) {
            Ok(data) => {
                let pdb_display = pdb_path.display().to_string();
                let symbols = PortablePdb::read(data).map_err(|error| error.into_load(&pdb_display))?;
                log::debug!("Loaded symbols from {pdb_display}");
                Some(symbols)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => return Err(FileError(error).into_load(&pdb_path.display().to_string())),
        };

        Self::from_file(file, symbols).map_err(|error| error.into_load(&display))
    }

    /// Loads a module from memory, with optional Portable PDB bytes.
    ///
    /// # Errors
    /// Returns format errors for a malformed image or symbol file, and
    /// [`crate::Error::NotSupported`] for a Windows PDB.
    pub fn from_mem(image: Vec<u8>, symbols: Option<Vec<u8>>) -> Result<CilAssembly> {
        let file = File::from_mem(image)?;
        let symbols = match symbols {
            Some(data) => Some(PortablePdb::read(data)?),
            None => None,
        };
        Self::from_file(file, symbols)
    }

    fn from_file(file: File, symbols: Option<PortablePdb>) -> Result<CilAssembly> {
        let (clr_rva, clr_size) = file.clr();
        if clr_size < CLI_HEADER_SIZE {
            return Err(malformed_error!("CLR runtime header is too small - {}", clr_size));
        }

        let clr_offset = file.rva_to_offset(clr_rva)?;
        let header = Cor20Header::read(file.data_slice(clr_offset, CLI_HEADER_SIZE)?)?;

        let metadata_offset = file.rva_to_offset(header.meta_data_rva as usize)?;
        let metadata =
            MetadataImage::read(file.data_slice(metadata_offset, header.meta_data_size as usize)?)?;

        Ok(CilAssembly {
            file,
            header,
            metadata,
            bodies: BTreeMap::new(),
            symbols,
            modified: false,
        })
    }

    /// The CLI header of the original image.
    #[must_use]
    pub fn header(&self) -> &Cor20Header {
        &self.header
    }

    /// The module's metadata, including pending modifications.
    #[must_use]
    pub fn metadata(&self) -> &MetadataImage {
        &self.metadata
    }

    /// Mutable access to the metadata. Marks the module as modified.
    pub fn metadata_mut(&mut self) -> &mut MetadataImage {
        self.modified = true;
        &mut self.metadata
    }

    /// The symbols loaded with the module.
    #[must_use]
    pub fn symbols(&self) -> Option<&PortablePdb> {
        self.symbols.as_ref()
    }

    /// Detaches the symbols. The module is then saved without a PDB.
    pub fn take_symbols(&mut self) -> Option<PortablePdb> {
        self.symbols.take()
    }

    /// `true` once metadata or a body was changed.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The current code of method `rid`, `None` for methods without a body.
    ///
    /// # Errors
    /// Returns format errors if the row or the original body cannot be read.
    pub fn method_body(&self, rid: u32) -> Result<Option<MethodCode<'_>>> {
        if let Some(body) = self.bodies.get(&rid) {
            return Ok(Some(MethodCode {
                code: body.code(),
                max_stack: body.max_stack,
                local_signature: body.local_signature,
            }));
        }

        let method: MethodDefRaw = self.metadata.tables.get(rid)?;
        if method.rva == 0 {
            return Ok(None);
        }

        let offset = self.file.rva_to_offset(method.rva as usize)?;
        let data = self
            .file
            .data()
            .get(offset..)
            .ok_or(crate::Error::OutOfBounds)?;
        let body = MethodBody::from(data)?;
        if body.has_sections {
            log::debug!("Method {rid} has extra data sections");
        }

        Ok(Some(MethodCode {
            code: body.code(data)?,
            max_stack: body.max_stack,
            local_signature: body.local_var_sig_token,
        }))
    }

    /// Replaces the body of method `rid`. Locals are zero-initialized.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the method does not exist or
    /// `local_signature` is not a `StandAloneSig` token.
    pub fn set_method_body(
        &mut self,
        rid: u32,
        code: &[u8],
        max_stack: u16,
        local_signature: Token,
    ) -> Result<()> {
        if rid == 0 || rid > self.metadata.tables.row_count(TableId::MethodDef) {
            return Err(malformed_error!("MethodDef {} does not exist", rid));
        }
        if !local_signature.is_null() && !local_signature.is_table(TableId::StandAloneSig) {
            return Err(malformed_error!(
                "Local signature {:#010x} is not a StandAloneSig",
                local_signature.value()
            ));
        }

        let encoded = MethodBody::encode(code, max_stack, local_signature, true)?;
        let header_size = encoded.len() - code.len();
        self.bodies.insert(
            rid,
            ReplacedBody {
                encoded,
                header_size,
                max_stack,
                local_signature,
            },
        );
        self.modified = true;
        Ok(())
    }

    /// Serializes the image and, if symbols are attached, the regenerated Portable PDB.
    ///
    /// An unmodified module yields its original bytes.
    ///
    /// # Errors
    /// Returns format errors if the new layout cannot be produced.
    pub fn to_bytes(&self) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        if !self.modified {
            return Ok((
                self.file.data().to_vec(),
                self.symbols
                    .as_ref()
                    .map(|symbols| symbols.original_bytes().to_vec()),
            ));
        }

        let symbols = match &self.symbols {
            Some(symbols) => {
                let changes: Vec<BodyChange> = self
                    .bodies
                    .iter()
                    .map(|(rid, body)| BodyChange {
                        method: *rid,
                        code_size: (body.encoded.len() - body.header_size) as u32,
                        local_signature: body.local_signature.row(),
                    })
                    .collect();

                let mut symbols = symbols.clone();
                symbols.regenerate(self.metadata.tables.row_counts(), &changes)?;
                Some(symbols.to_bytes()?)
            }
            None => None,
        };

        let image = write::write_image(
            &self.file,
            &self.header,
            &self.metadata,
            &self.bodies,
            symbols.as_deref(),
        )?;
        Ok((image, symbols))
    }

    /// Writes the module to `path` and its symbols next to it.
    ///
    /// There is no atomic replacement: a failure while writing can leave the destination
    /// partially written.
    ///
    /// # Errors
    /// Every failure is reported as [`crate::Error::Write`].
    pub fn save(&self, path: &Path) -> Result<()> {
        let display = path.display().to_string();
        let (image, symbols) = self.to_bytes().map_err(|error| error.into_write(&display))?;

        write::persist(path, &image).map_err(|error| error.into_write(&display))?;
        if let Some(symbols) = symbols {
            let pdb_path = path.with_extension("pdb");
            write::persist(&pdb_path, &symbols)
                .map_err(|error| error.into_write(&pdb_path.display().to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::AssemblyFactory;

    #[test]
    fn load_reads_header_and_metadata() {
        let fixture = AssemblyFactory::new().build();
        let assembly = CilAssembly::from_mem(fixture.image, None).unwrap();

        assert!(!assembly.is_modified());
        assert!(assembly.symbols().is_none());
        assert!(assembly.metadata().tables.row_count(TableId::TypeDef) >= 2);
    }

    #[test]
    fn unmodified_module_is_returned_unchanged() {
        let fixture = AssemblyFactory::new().build();
        let assembly =
            CilAssembly::from_mem(fixture.image.clone(), fixture.pdb.clone()).unwrap();

        let (image, pdb) = assembly.to_bytes().unwrap();
        assert_eq!(image, fixture.image);
        assert_eq!(pdb, fixture.pdb);
    }

    #[test]
    fn replaced_body_is_read_back() {
        let fixture = AssemblyFactory::new().build();
        let setter = fixture.setter("X");
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();

        let original = assembly.method_body(setter).unwrap().unwrap().code.to_vec();
        assert_eq!(original.last(), Some(&0x2A));

        assembly.set_method_body(setter, &[0x00, 0x2A], 1, Token::default()).unwrap();
        assert!(assembly.is_modified());
        assert_eq!(assembly.method_body(setter).unwrap().unwrap().code, &[0x00, 0x2A]);

        let (image, _) = assembly.to_bytes().unwrap();
        let reloaded = CilAssembly::from_mem(image, None).unwrap();
        assert_eq!(reloaded.method_body(setter).unwrap().unwrap().code, &[0x00, 0x2A]);
    }

    #[test]
    fn set_method_body_checks_arguments() {
        let fixture = AssemblyFactory::new().build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();

        assert!(assembly.set_method_body(0, &[0x2A], 1, Token::default()).is_err());
        assert!(assembly.set_method_body(9999, &[0x2A], 1, Token::default()).is_err());
        assert!(assembly
            .set_method_body(1, &[0x2A], 1, Token::new(0x0400_0001))
            .is_err());
    }

    #[test]
    fn load_rejects_empty_path() {
        let error = CilAssembly::load(Path::new("")).err().unwrap();
        assert_eq!(error.kind(), crate::ErrorKind::Load);
    }
}

//! The CLI header (ECMA-335 II.25.3.3), found through data directory 14 of the PE image.
//!
//! Only the fields the weaver reads or patches are decoded; the rest of the 72 bytes are
//! carried over untouched when the image is written.

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// Size in bytes of the CLI header.
pub const CLI_HEADER_SIZE: usize = 72;
/// Offset of the `MetaData` RVA inside the header.
pub const CLI_HEADER_METADATA_OFFSET: usize = 8;

/// `COMIMAGE_FLAGS_STRONGNAMESIGNED`
pub const FLAG_STRONG_NAME_SIGNED: u32 = 0x0000_0008;

/// Decoded CLI header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cor20Header {
    /// Size of the header, always 72
    pub cb: u32,
    /// Runtime major version
    pub major_runtime_version: u16,
    /// Runtime minor version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// `COMIMAGE_FLAGS_*`
    pub flags: u32,
    /// Entry point `MethodDef` or `File` token
    pub entry_point_token: u32,
    /// RVA of the managed resources
    pub resource_rva: u32,
    /// Size of the managed resources
    pub resource_size: u32,
    /// RVA of the strong name signature
    pub strong_name_signature_rva: u32,
    /// Size of the strong name signature
    pub strong_name_signature_size: u32,
}

impl Cor20Header {
    /// Decodes the header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for short input and [`crate::Error::Malformed`]
    /// for an unexpected header size or missing metadata.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < CLI_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);
        let cb = parser.read_le::<u32>()?;
        if cb as usize != CLI_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("CLR header has no metadata"));
        }

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags: parser.read_le::<u32>()?,
            entry_point_token: parser.read_le::<u32>()?,
            resource_rva: parser.read_le::<u32>()?,
            resource_size: parser.read_le::<u32>()?,
            strong_name_signature_rva: parser.read_le::<u32>()?,
            strong_name_signature_size: parser.read_le::<u32>()?,
        })
    }

    /// `true` if the image claims a strong name signature.
    #[must_use]
    pub fn is_strong_name_signed(&self) -> bool {
        self.flags & FLAG_STRONG_NAME_SIGNED != 0 && self.strong_name_signature_size != 0
    }
}

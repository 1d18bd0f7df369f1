//! PE container access for .NET images.
//!
//! [`File`] owns the raw image bytes behind a [`Backend`] and keeps the parsed goblin
//! [`PE`] alongside them, tied together with `ouroboros` so the parsed headers can borrow
//! from the data they were parsed from. Loading fails early for anything that is not a PE
//! image with a CLR runtime header, which is all the weaver needs to reject non-.NET input.
//!
//! On top of goblin the type offers the few address translations the reader and writer
//! rely on: RVA to file offset, the CLR header location, section alignment values and the
//! raw position of the PE headers inside the file.

pub mod io;
pub mod parser;

mod memory;

use std::path::Path;

use crate::{
    Error::{Empty, GoblinErr, InvalidOffset},
    Result,
};
use goblin::pe::{section_table::SectionTable, PE};
use memory::Memory;
use ouroboros::self_referencing;

/// Size of a COFF section header.
pub const SECTION_HEADER_SIZE: usize = 40;
/// Size of the COFF file header that follows the `PE\0\0` signature.
pub const COFF_HEADER_SIZE: usize = 20;
/// Index of the certificate table in the optional header data directories.
pub const DIRECTORY_SECURITY: usize = 4;
/// Index of the debug directory in the optional header data directories.
pub const DIRECTORY_DEBUG: usize = 6;
/// Index of the CLR runtime header in the optional header data directories.
pub const DIRECTORY_CLR: usize = 14;

/// Provides raw access to the bytes of an image.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the complete data.
    fn data(&self) -> &[u8];

    /// Returns the length of the data.
    fn len(&self) -> usize;
}

/// A loaded PE image carrying CLI metadata.
#[self_referencing]
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Reads the image at `file` completely into memory and parses it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, and the errors of
    /// [`File::from_mem`] otherwise.
    pub fn from_file(file: &Path) -> Result<File> {
        let data = std::fs::read(file)?;
        Self::from_mem(data)
    }

    /// Parses an image from an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::GoblinErr`] if the
    /// buffer is not a PE image and [`crate::Error::Malformed`] if it lacks a CLR header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data = Box::new(data);
        File::try_new(data, |data| {
            let data = data.as_ref();
            match PE::parse(data.data()) {
                Ok(pe) => match pe.header.optional_header {
                    Some(optional_header) => {
                        match optional_header.data_directories.get_clr_runtime_header() {
                            Some(clr) if clr.virtual_address != 0 && clr.size >= 72 => Ok(pe),
                            _ => Err(malformed_error!(
                                "File does not have a CLR runtime header directory"
                            )),
                        }
                    }
                    None => Err(malformed_error!("File does not have an OptionalHeader")),
                },
                Err(error) => Err(GoblinErr(error)),
            }
        })
    }

    /// Length of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// Returns `true` if the image is empty. Never the case for a loaded file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Returns `len` bytes at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// File offset of the `PE\0\0` signature.
    #[must_use]
    pub fn pe_header_offset(&self) -> usize {
        self.with_pe(|pe| pe.header.dos_header.pe_pointer as usize)
    }

    /// File offset of the optional header.
    #[must_use]
    pub fn optional_header_offset(&self) -> usize {
        self.pe_header_offset() + 4 + COFF_HEADER_SIZE
    }

    /// Size of the optional header as declared by the COFF header.
    #[must_use]
    pub fn optional_header_size(&self) -> usize {
        self.with_pe(|pe| pe.header.coff_header.size_of_optional_header as usize)
    }

    /// File offset of the first section header.
    #[must_use]
    pub fn section_table_offset(&self) -> usize {
        self.optional_header_offset() + self.optional_header_size()
    }

    /// `true` for PE32+ images.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.with_pe(|pe| pe.is_64)
    }

    /// File offset of the first data directory entry.
    #[must_use]
    pub fn data_directories_offset(&self) -> usize {
        self.optional_header_offset() + if self.is_pe32_plus() { 112 } else { 96 }
    }

    /// The section alignment declared by the optional header.
    #[must_use]
    pub fn section_alignment(&self) -> u32 {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .map_or(0x2000, |header| header.windows_fields.section_alignment)
        })
    }

    /// The file alignment declared by the optional header.
    #[must_use]
    pub fn file_alignment(&self) -> u32 {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .map_or(0x200, |header| header.windows_fields.file_alignment)
        })
    }

    /// Location and size of the CLR runtime header.
    #[must_use]
    pub fn clr(&self) -> (usize, usize) {
        self.with_pe(|pe| {
            let Some(optional_header) = pe.header.optional_header else {
                return (0, 0);
            };
            match optional_header.data_directories.get_clr_runtime_header() {
                Some(clr_dir) => (clr_dir.virtual_address as usize, clr_dir.size as usize),
                None => (0, 0),
            }
        })
    }

    /// The section headers of the image.
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// Reads data directory `index` straight from the optional header.
    ///
    /// Returns `None` for directories beyond `NumberOfRvaAndSizes` and for empty entries.
    #[must_use]
    pub fn data_directory(&self, index: usize) -> Option<(u32, u32)> {
        let count_offset = self.data_directories_offset() - 4;
        let mut cursor = count_offset;
        let count = io::read_le_at::<u32>(self.data(), &mut cursor).ok()? as usize;
        if index >= count {
            return None;
        }

        let mut cursor = self.data_directories_offset() + index * 8;
        let rva = io::read_le_at::<u32>(self.data(), &mut cursor).ok()?;
        let size = io::read_le_at::<u32>(self.data(), &mut cursor).ok()?;
        if rva == 0 || size == 0 {
            None
        } else {
            Some((rva, size))
        }
    }

    /// Converts a relative virtual address into a file offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if the RVA is not backed by raw section data.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        rva_to_offset(self.sections(), rva)
    }
}

/// Converts `rva` to a file offset using the given section headers.
///
/// # Errors
/// Returns [`crate::Error::InvalidOffset`] if no section maps the RVA to file data.
pub fn rva_to_offset<'a>(
    sections: impl IntoIterator<Item = &'a SectionTable>,
    rva: usize,
) -> Result<usize> {
    for section in sections {
        let start = section.virtual_address as usize;
        let extent = if section.virtual_size == 0 {
            section.size_of_raw_data
        } else {
            section.virtual_size
        } as usize;

        if rva >= start && rva < start + extent {
            let delta = rva - start;
            if delta >= section.size_of_raw_data as usize {
                return Err(InvalidOffset);
            }
            return Ok(section.pointer_to_raw_data as usize + delta);
        }
    }

    Err(InvalidOffset)
}

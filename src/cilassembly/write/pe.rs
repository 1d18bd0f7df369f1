//! Image layout for modified modules.
//!
//! The original sections are kept byte for byte. A new section is appended that holds the
//! replaced method bodies followed by the complete rebuilt metadata; the CLI header and the
//! `MethodDef` RVAs are then redirected to it. Everything else that depends on the image
//! content or layout is patched in place:
//!
//! - section count, `SizeOfImage`, `SizeOfInitializedData` and, when the section table has no
//!   free slot, `SizeOfHeaders` (raw data of all sections moves back by one file alignment);
//! - the Authenticode certificate, which no longer matches, is removed;
//! - `PdbChecksum` debug entries are recomputed for the regenerated symbols;
//! - a non-zero `CheckSum` is recomputed.

use std::collections::BTreeMap;

use goblin::pe::section_table::SectionTable;
use sha2::{Digest, Sha256};

use crate::{
    cilassembly::ReplacedBody,
    file::{
        io::{align_up, pad_to, push_le, read_le, write_le_to},
        rva_to_offset, File, DIRECTORY_DEBUG, DIRECTORY_SECURITY, SECTION_HEADER_SIZE,
    },
    metadata::{
        cor20header::{Cor20Header, CLI_HEADER_METADATA_OFFSET},
        image::MetadataImage,
        root::Root,
        tables::MethodDefRaw,
    },
    Error::OutOfBounds,
    Result,
};

/// Name of the appended section.
pub const WEAVE_SECTION_NAME: [u8; 8] = *b".weave\0\0";
/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
const WEAVE_SECTION_CHARACTERISTICS: u32 = 0x4000_0040;

const OPTIONAL_SIZE_OF_INITIALIZED_DATA: usize = 8;
const OPTIONAL_SIZE_OF_IMAGE: usize = 56;
const OPTIONAL_SIZE_OF_HEADERS: usize = 60;
const OPTIONAL_CHECKSUM: usize = 64;

const DEBUG_ENTRY_SIZE: usize = 28;
const DEBUG_TYPE_PDB_CHECKSUM: u32 = 19;
const PDB_ID_SIZE: usize = 20;

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    read_le::<u32>(data.get(offset..).ok_or(OutOfBounds)?)
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| OutOfBounds)
}

/// Produces the image of a modified module.
///
/// `symbols` are the already regenerated Portable PDB bytes, used to refresh `PdbChecksum`
/// entries.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the headers leave no room for another section,
/// and [`crate::Error::OutOfBounds`] if the new layout does not fit 32-bit fields.
pub(crate) fn write_image(
    file: &File,
    header: &Cor20Header,
    metadata: &MetadataImage,
    bodies: &BTreeMap<u32, ReplacedBody>,
    symbols: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let file_alignment = file.file_alignment() as usize;
    let section_alignment = file.section_alignment() as usize;
    if file_alignment == 0 || section_alignment == 0 {
        return Err(malformed_error!("Image declares a zero alignment"));
    }

    if header.is_strong_name_signed() {
        log::warn!("The strong name signature is invalidated, the module must be re-signed");
    }

    let mut sections: Vec<SectionTable> = file.sections().cloned().collect();
    let virtual_end = sections
        .iter()
        .map(|section| {
            section.virtual_address as usize
                + section.virtual_size.max(section.size_of_raw_data) as usize
        })
        .max()
        .unwrap_or(0);
    let section_rva = align_up(virtual_end, section_alignment);

    // new bodies first, 4-byte aligned, then the metadata pointing at them
    let mut metadata = metadata.clone();
    let mut content = Vec::new();
    for (rid, body) in bodies {
        pad_to(&mut content, 4);
        let mut method: MethodDefRaw = metadata.tables.get(*rid)?;
        method.rva = to_u32(section_rva + content.len())?;
        metadata.tables.update(&method)?;
        content.extend_from_slice(&body.encoded);
    }
    pad_to(&mut content, 4);
    let metadata_rva = to_u32(section_rva + content.len())?;
    let metadata_bytes = metadata.write()?;
    let metadata_size = to_u32(metadata_bytes.len())?;
    content.extend_from_slice(&metadata_bytes);

    let mut image = file.data().to_vec();
    strip_certificate(file, &mut image)?;

    let optional_header = file.optional_header_offset();
    let section_table = file.section_table_offset();
    let size_of_headers = read_u32(&image, optional_header + OPTIONAL_SIZE_OF_HEADERS)? as usize;

    let slot = section_table + sections.len() * SECTION_HEADER_SIZE;
    let required = slot + SECTION_HEADER_SIZE;
    let new_size_of_headers = if required > size_of_headers {
        align_up(required, file_alignment)
    } else {
        size_of_headers
    };

    let first_section_rva = sections
        .iter()
        .map(|section| section.virtual_address as usize)
        .min()
        .unwrap_or(section_rva);
    if new_size_of_headers > first_section_rva {
        return Err(malformed_error!(
            "Headers of {} bytes would overlap the first section at {:#x}",
            new_size_of_headers,
            first_section_rva
        ));
    }

    let slot_end = size_of_headers.min(required);
    if image
        .get(slot.min(slot_end)..slot_end)
        .is_some_and(|bytes| bytes.iter().any(|byte| *byte != 0))
    {
        return Err(malformed_error!(
            "Section table slot at {:#x} is occupied by other header data",
            slot
        ));
    }

    let delta = new_size_of_headers - size_of_headers;
    if delta > 0 {
        log::debug!("Growing headers from {size_of_headers:#x} to {new_size_of_headers:#x}");
        let tail = image.split_off(size_of_headers);
        image.resize(new_size_of_headers, 0);
        image.extend_from_slice(&tail);
        for (index, section) in sections.iter_mut().enumerate() {
            if section.pointer_to_raw_data != 0 {
                section.pointer_to_raw_data += to_u32(delta)?;
                write_le_to(
                    &mut image,
                    section_table + index * SECTION_HEADER_SIZE + 20,
                    section.pointer_to_raw_data,
                )?;
            }
        }
    }

    let raw_pointer = align_up(image.len(), file_alignment);
    let raw_size = align_up(content.len(), file_alignment);
    image.resize(raw_pointer, 0);
    image.extend_from_slice(&content);
    image.resize(raw_pointer + raw_size, 0);

    let weave_section = SectionTable {
        name: WEAVE_SECTION_NAME,
        virtual_size: to_u32(content.len())?,
        virtual_address: to_u32(section_rva)?,
        size_of_raw_data: to_u32(raw_size)?,
        pointer_to_raw_data: to_u32(raw_pointer)?,
        characteristics: WEAVE_SECTION_CHARACTERISTICS,
        ..SectionTable::default()
    };
    let mut section_header = Vec::with_capacity(SECTION_HEADER_SIZE);
    section_header.extend_from_slice(&weave_section.name);
    push_le(&mut section_header, weave_section.virtual_size);
    push_le(&mut section_header, weave_section.virtual_address);
    push_le(&mut section_header, weave_section.size_of_raw_data);
    push_le(&mut section_header, weave_section.pointer_to_raw_data);
    push_le(&mut section_header, 0_u32);
    push_le(&mut section_header, 0_u32);
    push_le(&mut section_header, 0_u16);
    push_le(&mut section_header, 0_u16);
    push_le(&mut section_header, weave_section.characteristics);
    image[slot..required].copy_from_slice(&section_header);
    sections.push(weave_section);

    let section_count = u16::try_from(sections.len()).map_err(|_| OutOfBounds)?;
    write_le_to(&mut image, file.pe_header_offset() + 4 + 2, section_count)?;

    let initialized_data = read_u32(&image, optional_header + OPTIONAL_SIZE_OF_INITIALIZED_DATA)?;
    write_le_to(
        &mut image,
        optional_header + OPTIONAL_SIZE_OF_INITIALIZED_DATA,
        initialized_data.saturating_add(to_u32(raw_size)?),
    )?;
    write_le_to(
        &mut image,
        optional_header + OPTIONAL_SIZE_OF_IMAGE,
        to_u32(align_up(section_rva + content.len(), section_alignment))?,
    )?;
    write_le_to(
        &mut image,
        optional_header + OPTIONAL_SIZE_OF_HEADERS,
        to_u32(new_size_of_headers)?,
    )?;

    let (clr_rva, _) = file.clr();
    let clr_offset = rva_to_offset(&sections, clr_rva)?;
    write_le_to(&mut image, clr_offset + CLI_HEADER_METADATA_OFFSET, metadata_rva)?;
    write_le_to(&mut image, clr_offset + CLI_HEADER_METADATA_OFFSET + 4, metadata_size)?;

    patch_debug_directory(file, &sections, &mut image, delta, symbols)?;

    let checksum_offset = optional_header + OPTIONAL_CHECKSUM;
    if read_u32(&image, checksum_offset)? != 0 {
        write_le_to(&mut image, checksum_offset, 0_u32)?;
        let checksum = pe_checksum(&image);
        write_le_to(&mut image, checksum_offset, checksum)?;
    }

    log::debug!(
        "Placed {} bodies and {} bytes of metadata at {:#x}",
        bodies.len(),
        metadata_size,
        section_rva
    );
    Ok(image)
}

fn strip_certificate(file: &File, image: &mut Vec<u8>) -> Result<()> {
    let Some((offset, size)) = file.data_directory(DIRECTORY_SECURITY) else {
        return Ok(());
    };

    log::warn!("Removing the Authenticode signature, it does not cover the woven image");
    let offset = offset as usize;
    if align_up(offset + size as usize, 8) >= image.len() && offset <= image.len() {
        image.truncate(offset);
    }
    write_le_to(
        image,
        file.data_directories_offset() + DIRECTORY_SECURITY * 8,
        0_u64,
    )
}

fn patch_debug_directory(
    file: &File,
    sections: &[SectionTable],
    image: &mut [u8],
    delta: usize,
    symbols: Option<&[u8]>,
) -> Result<()> {
    let Some((rva, size)) = file.data_directory(DIRECTORY_DEBUG) else {
        return Ok(());
    };

    let directory = rva_to_offset(sections, rva as usize)?;
    for index in 0..size as usize / DEBUG_ENTRY_SIZE {
        let entry = directory + index * DEBUG_ENTRY_SIZE;
        let kind = read_u32(image, entry + 12)?;
        let data_size = read_u32(image, entry + 16)? as usize;
        let mut pointer = read_u32(image, entry + 24)? as usize;

        if pointer != 0 && delta > 0 {
            pointer += delta;
            write_le_to(image, entry + 24, to_u32(pointer)?)?;
        }

        if kind != DEBUG_TYPE_PDB_CHECKSUM || pointer == 0 {
            continue;
        }
        let Some(symbols) = symbols else {
            continue;
        };

        let data = image
            .get_mut(pointer..pointer + data_size)
            .ok_or(OutOfBounds)?;
        let Some(terminator) = data.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("PdbChecksum entry has no algorithm name"));
        };
        if &data[..terminator] != b"SHA256" {
            log::warn!(
                "Leaving PdbChecksum with unsupported algorithm {}",
                String::from_utf8_lossy(&data[..terminator])
            );
            continue;
        }

        let checksum = pdb_checksum(symbols)?;
        let target = data
            .get_mut(terminator + 1..terminator + 1 + checksum.len())
            .ok_or(OutOfBounds)?;
        target.copy_from_slice(&checksum);
    }
    Ok(())
}

/// SHA-256 over the Portable PDB with its 20-byte id zeroed.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the symbols have no `#Pdb` stream.
pub fn pdb_checksum(symbols: &[u8]) -> Result<[u8; 32]> {
    let root = Root::read(symbols)?;
    let Some(stream) = root.stream_headers.iter().find(|header| header.name == "#Pdb") else {
        return Err(malformed_error!("Symbol file has no #Pdb stream"));
    };

    let start = stream.offset as usize;
    let mut data = symbols.to_vec();
    data.get_mut(start..start + PDB_ID_SIZE)
        .ok_or(OutOfBounds)?
        .fill(0);

    Ok(Sha256::digest(&data).into())
}

/// The PE image checksum: a folded 16-bit sum of the image plus its length. The checksum
/// field itself must be zero.
#[must_use]
pub fn pe_checksum(image: &[u8]) -> u32 {
    let mut sum: u64 = 0;
    for chunk in image.chunks(2) {
        let word = match chunk {
            [low, high] => u16::from_le_bytes([*low, *high]),
            [low] => u16::from(*low),
            _ => 0,
        };
        sum += u64::from(word);
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum = (sum & 0xFFFF) + (sum >> 16);
    (sum as u32).wrapping_add(image.len() as u32)
}

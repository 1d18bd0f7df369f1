//! The metadata root (ECMA-335 II.24.2.1).
//!
//! Every metadata blob, both inside a PE image and as a Portable PDB file, starts with the
//! `BSJB` signature, a version string and the list of stream headers. [`Root`] reads that
//! header and writes it back for a new set of streams.

use crate::{
    file::io::{pad_to, push_le, read_le, read_le_at},
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// The magic signature of a metadata root, `BSJB`.
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The decoded metadata root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Reserved, 0
    pub reserved: u32,
    /// Runtime version string, e.g. `v4.0.30319` or `PDB v1.0`
    pub version: String,
    /// Reserved flags, 0
    pub flags: u16,
    /// The stream headers in on-disk order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Creates a root for freshly built metadata.
    #[must_use]
    pub fn new(version: &str) -> Self {
        Root {
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            version: version.to_string(),
            flags: 0,
            stream_headers: Vec::new(),
        }
    }

    /// Parses the root and validates that every stream lies within `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short or a stream points past
    /// its end, and [`crate::Error::Malformed`] for a bad signature or stream table.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {:#010x}",
                signature
            ));
        }

        let mut offset = 4;
        let major_version = read_le_at::<u16>(data, &mut offset)?;
        let minor_version = read_le_at::<u16>(data, &mut offset)?;
        let reserved = read_le_at::<u32>(data, &mut offset)?;
        let version_length = read_le_at::<u32>(data, &mut offset)? as usize;
        if version_length > 255 || offset + version_length > data.len() {
            return Err(malformed_error!(
                "Invalid version string length - {}",
                version_length
            ));
        }

        let version_bytes = &data[offset..offset + version_length];
        let version_end = version_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(version_length);
        let version = String::from_utf8_lossy(&version_bytes[..version_end]).into_owned();
        offset += version_length;

        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 || stream_count as usize * 9 > data.len() {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let Some(header_data) = data.get(offset..) else {
                return Err(OutOfBounds);
            };
            let header = StreamHeader::from(header_data)?;
            let Some(end) = header.offset.checked_add(header.size) else {
                return Err(malformed_error!(
                    "Stream offset and size cause integer overflow - {} + {}",
                    header.offset,
                    header.size
                ));
            };
            if end as usize > data.len() {
                return Err(OutOfBounds);
            }
            if stream_headers
                .iter()
                .any(|existing: &StreamHeader| existing.name == header.name)
            {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            offset += header.encoded_size();
            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            reserved,
            version,
            flags,
            stream_headers,
        })
    }

    /// Size of the encoded version string, null terminated and padded to four bytes.
    #[must_use]
    pub fn version_length(&self) -> usize {
        (self.version.len() + 1 + 3) & !3
    }

    /// Size of the root header including all stream headers.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        20 + self.version_length()
            + self
                .stream_headers
                .iter()
                .map(StreamHeader::encoded_size)
                .sum::<usize>()
    }

    /// Encodes the root header including the stream headers.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        push_le(&mut out, CIL_HEADER_MAGIC);
        push_le(&mut out, self.major_version);
        push_le(&mut out, self.minor_version);
        push_le(&mut out, self.reserved);
        push_le(&mut out, self.version_length() as u32);
        out.extend_from_slice(self.version.as_bytes());
        out.push(0);
        pad_to(&mut out, 4);
        push_le(&mut out, self.flags);
        push_le(&mut out, self.stream_headers.len() as u16);
        for header in &self.stream_headers {
            header.write(&mut out);
        }
        out
    }
}

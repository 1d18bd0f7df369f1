use crate::{
    file::io::{pad_to, push_le, read_le},
    Error::OutOfBounds,
    Result,
};

/// Stream names this library knows how to decode. Any other name is carried through
/// unchanged when rewriting metadata.
pub const KNOWN_STREAMS: [&str; 6] = ["#~", "#Strings", "#US", "#GUID", "#Blob", "#Pdb"];

/// A stream header of the metadata root (ECMA-335 II.24.2.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes, a multiple of four
    pub size: u32,
    /// Name of the stream, at most 32 characters including the terminator
    pub name: String,
}

impl StreamHeader {
    /// Parses a stream header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data and
    /// [`crate::Error::Malformed`] for unterminated or non-ASCII names.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(end) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Stream header name is not terminated"));
        };
        if !name_bytes[..end].is_ascii() {
            return Err(malformed_error!("Stream header name is not ASCII"));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name: String::from_utf8_lossy(&name_bytes[..end]).into_owned(),
        })
    }

    /// Size of this header on disk, including the padded name.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        8 + ((self.name.len() + 1 + 3) & !3)
    }

    /// Appends the encoded header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        push_le(out, self.offset);
        push_le(out, self.size);
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        pad_to(out, 4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x50, 0x64, 0x62, 0x00, 0x00, 0x00, 0x00,
        ];

        let parsed_header = StreamHeader::from(&header_bytes).unwrap();
        assert_eq!(parsed_header.offset, 0x6C);
        assert_eq!(parsed_header.size, 0x45A4);
        assert_eq!(parsed_header.name, "#Pdb");
        assert_eq!(parsed_header.encoded_size(), 16);

        let mut out = Vec::new();
        parsed_header.write(&mut out);
        assert_eq!(out, header_bytes);
    }

    #[test]
    fn unterminated() {
        let header_bytes = [0x6C, 0, 0, 0, 0xA4, 0x45, 0, 0, 0x23, 0x7E];
        assert!(StreamHeader::from(&header_bytes).is_err());
    }
}

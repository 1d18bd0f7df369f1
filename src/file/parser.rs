//! Cursor-based binary parser for metadata heaps, signatures and instruction streams.
//!
//! [`Parser`] wraps a byte slice and a position. All reads are bounds checked and advance
//! the cursor; a failed read leaves the position untouched. Besides fixed-width values it
//! understands the ECMA-335 encodings that show up everywhere in CLI metadata: compressed
//! unsigned and signed integers (II.23.2), `TypeDefOrRefOrSpecEncoded` tokens (II.23.2.8),
//! null-terminated UTF-8 identifiers and the length-prefixed `SerString` used in custom
//! attribute blobs (II.23.3).

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::token::Token,
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked reader over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Moves the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies beyond the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Skips `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let target = self.position.checked_add(step).ok_or(OutOfBounds)?;
        self.seek(target)
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The complete underlying data, independent of the cursor.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Reads a little-endian value of type `T`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Reads `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(length).ok_or(OutOfBounds)?;
        let Some(bytes) = self.data.get(self.position..end) else {
            return Err(OutOfBounds);
        };

        self.position = end;
        Ok(bytes)
    }

    /// Reads an ECMA-335 compressed unsigned integer (1, 2 or 4 bytes).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated and
    /// [`crate::Error::Malformed`] for the reserved `111xxxxx` lead byte.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let start = self.position;
        let first = self.read_le::<u8>()?;

        let result = if first & 0x80 == 0 {
            Ok(u32::from(first))
        } else if first & 0xC0 == 0x80 {
            self.read_le::<u8>()
                .map(|second| (u32::from(first & 0x3F) << 8) | u32::from(second))
        } else if first & 0xE0 == 0xC0 {
            self.read_bytes(3).map(|rest| {
                (u32::from(first & 0x1F) << 24)
                    | (u32::from(rest[0]) << 16)
                    | (u32::from(rest[1]) << 8)
                    | u32::from(rest[2])
            })
        } else {
            Err(malformed_error!(
                "Invalid compressed integer lead byte - {:#04x}",
                first
            ))
        };

        if result.is_err() {
            self.position = start;
        }
        result
    }

    /// Reads an ECMA-335 compressed signed integer.
    ///
    /// The sign bit is stored in the least significant bit and the payload is sign-extended
    /// from 6, 13 or 28 bits depending on the encoded width.
    ///
    /// # Errors
    /// Same as [`Parser::read_compressed_uint`].
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_uint()?;
        let payload_bits = match self.position - start {
            1 => 6,
            2 => 13,
            _ => 28,
        };

        let magnitude = (unsigned >> 1) as i32;
        if unsigned & 1 == 0 {
            Ok(magnitude)
        } else {
            Ok(magnitude - (1 << payload_bits))
        }
    }

    /// Reads a `TypeDefOrRefOrSpecEncoded` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag `3`.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let value = self.read_compressed_uint()?;
        let table = match value & 0x3 {
            0x0 => 0x0200_0000,
            0x1 => 0x0100_0000,
            0x2 => 0x1B00_0000,
            _ => return Err(malformed_error!("Invalid TypeDefOrRefOrSpec tag - {:#x}", value)),
        };

        Ok(Token::new(table | (value >> 2)))
    }

    /// Reads a null-terminated UTF-8 string. Invalid sequences are replaced.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if no terminator is found.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let rest = &self.data[self.position..];
        let Some(end) = rest.iter().position(|byte| *byte == 0) else {
            return Err(OutOfBounds);
        };

        let string = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.position += end + 1;
        Ok(string)
    }

    /// Reads a custom attribute `SerString`: `0xFF` for null, otherwise a compressed
    /// length followed by UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the string is truncated and
    /// [`crate::Error::Malformed`] if it is not valid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.position += 1;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let bytes = self.read_bytes(length)?;
        match std::str::from_utf8(bytes) {
            Ok(string) => Ok(Some(string.to_string())),
            Err(_) => Err(malformed_error!("SerString is not valid UTF-8")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_uint() {
        let data = [0x03, 0xAE, 0x57, 0xC0, 0x00, 0x40, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x03);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x2E57);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x4000);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn compressed_uint_truncated_keeps_position() {
        let data = [0xC0, 0x00];
        let mut parser = Parser::new(&data);
        assert!(parser.read_compressed_uint().is_err());
        assert_eq!(parser.pos(), 0);

        let mut parser = Parser::new(&[0xE0]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn compressed_int() {
        // ECMA-335 II.23.2 examples
        let cases: [(&[u8], i32); 8] = [
            (&[0x06], 3),
            (&[0x7B], -3),
            (&[0x80, 0x80], 64),
            (&[0x01], -64),
            (&[0xC0, 0x00, 0x40, 0x00], 8192),
            (&[0xDF, 0xFF, 0xBF, 0xFF], -8193),
            (&[0xDF, 0xFF, 0xFF, 0xFE], 268_435_455),
            (&[0xC0, 0x00, 0x00, 0x01], -268_435_456),
        ];
        for (bytes, expected) in cases {
            assert_eq!(Parser::new(bytes).read_compressed_int().unwrap(), expected);
        }
    }

    #[test]
    fn compressed_token() {
        let mut parser = Parser::new(&[0x49, 0x0A, 0x07]);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0100_0012);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x1B00_0002);
        assert!(parser.read_compressed_token().is_err());
    }

    #[test]
    fn strings() {
        let mut parser = Parser::new(b"abc\0\x03xyz\xFF");
        assert_eq!(parser.read_string_utf8().unwrap(), "abc");
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some("xyz"));
        assert_eq!(parser.read_ser_string().unwrap(), None);
        assert!(parser.read_string_utf8().is_err());
    }
}

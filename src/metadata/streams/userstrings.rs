use widestring::{U16Str, U16String};

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// Largest `#US` offset an `ldstr` token can address.
const MAX_USER_STRING_OFFSET: usize = 0x00FF_FFFF;

/// The `#US` heap: string literals referenced by `ldstr` (ECMA-335 II.24.2.4).
///
/// Each entry is a compressed byte length, the UTF-16LE code units and a trailing flag byte
/// telling the runtime whether the string needs more than trivial handling.
#[derive(Debug, Clone)]
pub struct UserStrings {
    data: Vec<u8>,
}

impl UserStrings {
    /// Wraps heap bytes. The first byte must be the empty entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is empty or does not start with `0`.
    pub fn from(data: &[u8]) -> Result<UserStrings> {
        if data.first() != Some(&0) {
            return Err(OutOfBounds);
        }

        Ok(UserStrings {
            data: data.to_vec(),
        })
    }

    /// Returns the string at `index`, with unpaired surrogates replaced.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry exceeds the heap.
    pub fn get(&self, index: u32) -> Result<String> {
        let Some(tail) = self.data.get(index as usize..) else {
            return Err(OutOfBounds);
        };

        let mut parser = Parser::new(tail);
        let length = parser.read_compressed_uint()? as usize;
        let bytes = parser.read_bytes(length)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(U16Str::from_slice(&units).to_string_lossy())
    }

    /// Returns the offset of `value`, appending a new entry if it is not yet present.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the heap grows past what `ldstr` tokens can
    /// address.
    pub fn add(&mut self, value: &str) -> Result<u32> {
        let encoded = Self::encode(value)?;
        if let Some(index) = self.find_encoded(&encoded) {
            return Ok(index);
        }

        let index = self.data.len();
        if index + encoded.len() > MAX_USER_STRING_OFFSET {
            return Err(OutOfBounds);
        }

        self.data.extend_from_slice(&encoded);
        Ok(index as u32)
    }

    fn encode(value: &str) -> Result<Vec<u8>> {
        let units = U16String::from_str(value);
        let units = units.as_slice();

        let mut entry = Vec::with_capacity(units.len() * 2 + 5);
        push_compressed_uint(&mut entry, (units.len() * 2 + 1) as u32)?;
        for unit in units {
            entry.extend_from_slice(&unit.to_le_bytes());
        }
        entry.push(u8::from(units.iter().any(|unit| Self::needs_special_handling(*unit))));
        Ok(entry)
    }

    /// ECMA-335 II.24.2.4 terminal byte rule.
    fn needs_special_handling(unit: u16) -> bool {
        if unit > 0xFF {
            return true;
        }
        matches!(unit as u8, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D | 0x7F)
    }

    fn find_encoded(&self, encoded: &[u8]) -> Option<u32> {
        let mut parser = Parser::new(&self.data);
        while parser.has_more_data() {
            let start = parser.pos();
            let length = parser.read_compressed_uint().ok()? as usize;
            parser.read_bytes(length).ok()?;
            if self.data[start..parser.pos()] == *encoded {
                return Some(start as u32);
            }
        }
        None
    }

    /// Heap size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the heap only holds the empty entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// The raw heap bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Default for UserStrings {
    fn default() -> Self {
        UserStrings { data: vec![0] }
    }
}

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    Error::OutOfBounds,
    Result,
};

/// The `#Blob` heap: length-prefixed binary values (ECMA-335 II.24.2.4).
///
/// Signatures, custom attribute arguments and Portable PDB sequence points all live here.
/// Existing offsets never move, new blobs are appended and identical blobs are shared.
#[derive(Debug, Clone)]
pub struct Blob {
    data: Vec<u8>,
}

impl Blob {
    /// Wraps heap bytes. The first byte must be the empty blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is empty or does not start with `0`.
    pub fn from(data: &[u8]) -> Result<Blob> {
        if data.first() != Some(&0) {
            return Err(OutOfBounds);
        }

        Ok(Blob {
            data: data.to_vec(),
        })
    }

    /// Returns the blob at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the index or the announced length exceeds
    /// the heap.
    pub fn get(&self, index: u32) -> Result<&[u8]> {
        let index = index as usize;
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        parser.read_bytes(length)
    }

    /// Finds an existing blob with the given content by walking the heap entries.
    #[must_use]
    pub fn find(&self, value: &[u8]) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }

        let mut parser = Parser::new(&self.data);
        while parser.has_more_data() {
            let start = parser.pos();
            let Ok(length) = parser.read_compressed_uint() else {
                return None;
            };
            let Ok(content) = parser.read_bytes(length as usize) else {
                return None;
            };
            if content == value {
                return Some(start as u32);
            }
        }
        None
    }

    /// Returns the index of `value`, appending it if it is not yet present.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for blobs larger than the compressed length
    /// encoding allows.
    pub fn add(&mut self, value: &[u8]) -> Result<u32> {
        if let Some(index) = self.find(value) {
            return Ok(index);
        }

        let index = self.data.len() as u32;
        push_compressed_uint(&mut self.data, value.len() as u32)?;
        self.data.extend_from_slice(value);
        Ok(index)
    }

    /// Heap size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the heap only holds the empty blob.
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

impl Default for Blob {
    fn default() -> Self {
        Blob { data: vec![0] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let heap = Blob::from(&[0x00, 0x03, 0x20, 0x00, 0x01, 0x02, 0x06, 0x08]).unwrap();
        assert_eq!(heap.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(heap.get(5).unwrap(), &[0x06, 0x08]);
        assert_eq!(heap.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(heap.find(&[0x06, 0x08]), Some(5));
        assert!(heap.get(8).is_err());
    }

    #[test]
    fn add_shares_identical_blobs() {
        let mut heap = Blob::default();
        let index = heap.add(&[0x06, 0x08]).unwrap();
        assert_eq!(index, 1);
        assert_eq!(heap.add(&[0x06, 0x08]).unwrap(), 1);
        assert_eq!(heap.add(&[]).unwrap(), 0);
        assert_eq!(heap.add(&[0x07, 0x00]).unwrap(), 4);
    }

    #[test]
    fn truncated_length() {
        let heap = Blob::from(&[0x00, 0x05, 0x01]).unwrap();
        assert!(heap.get(1).is_err());
    }
}

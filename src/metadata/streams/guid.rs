use uguid::Guid as Uuid;

use crate::{Error::OutOfBounds, Result};

/// The `#GUID` heap: a sequence of 16-byte GUIDs addressed by 1-based index
/// (ECMA-335 II.24.2.5).
#[derive(Debug, Clone, Default)]
pub struct Guid {
    data: Vec<u8>,
}

impl Guid {
    /// Wraps heap bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the size is not a multiple of 16.
    pub fn from(data: &[u8]) -> Result<Guid> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap size {} is not a multiple of 16",
                data.len()
            ));
        }

        Ok(Guid {
            data: data.to_vec(),
        })
    }

    /// Returns the GUID at the 1-based `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for index 0 and indices past the heap.
    pub fn get(&self, index: u32) -> Result<Uuid> {
        let Some(start) = (index as usize).checked_sub(1).map(|slot| slot * 16) else {
            return Err(OutOfBounds);
        };
        let Some(bytes) = self.data.get(start..start + 16) else {
            return Err(OutOfBounds);
        };

        let mut raw = [0_u8; 16];
        raw.copy_from_slice(bytes);
        Ok(Uuid::from_bytes(raw))
    }

    /// Returns the 1-based index of `value`, appending it if it is not yet present.
    pub fn add(&mut self, value: Uuid) -> u32 {
        let raw = value.to_bytes();
        if let Some(slot) = self
            .data
            .chunks_exact(16)
            .position(|chunk| chunk == raw.as_slice())
        {
            return slot as u32 + 1;
        }

        self.data.extend_from_slice(&raw);
        (self.data.len() / 16) as u32
    }

    /// Heap size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the heap holds no GUID.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw heap bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

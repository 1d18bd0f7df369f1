use std::ffi::CStr;

use crate::{Error::OutOfBounds, Result};

/// The `#Strings` heap: null-terminated UTF-8 identifiers (ECMA-335 II.24.2.3).
///
/// The heap is kept as the original bytes, new strings are appended at the end so every
/// existing index stays valid.
#[derive(Debug, Clone)]
pub struct Strings {
    data: Vec<u8>,
}

impl Strings {
    /// Wraps heap bytes. The first byte must be the empty string.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is empty or does not start with `0`.
    pub fn from(data: &[u8]) -> Result<Strings> {
        if data.first() != Some(&0) {
            return Err(OutOfBounds);
        }

        Ok(Strings {
            data: data.to_vec(),
        })
    }

    /// Returns the string at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for indices past the heap and
    /// [`crate::Error::Malformed`] for unterminated or invalid UTF-8 data.
    pub fn get(&self, index: u32) -> Result<&str> {
        let Some(tail) = self.data.get(index as usize..) else {
            return Err(OutOfBounds);
        };

        match CStr::from_bytes_until_nul(tail) {
            Ok(c_str) => match c_str.to_str() {
                Ok(string) => Ok(string),
                Err(_) => Err(malformed_error!("Invalid UTF-8 in #Strings at - {}", index)),
            },
            Err(_) => Err(malformed_error!("Unterminated string in #Strings at - {}", index)),
        }
    }

    /// Finds an index whose string equals `value`. Suffixes of longer strings count.
    #[must_use]
    pub fn find(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }

        let needle = value.as_bytes();
        self.data
            .windows(needle.len() + 1)
            .position(|window| window[..needle.len()] == *needle && window[needle.len()] == 0)
            .map(|position| position as u32)
    }

    /// Returns the index of `value`, appending it if it is not yet present.
    pub fn add(&mut self, value: &str) -> u32 {
        if let Some(index) = self.find(value) {
            return index;
        }

        let index = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        index
    }

    /// Heap size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the heap only holds the empty string.
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

impl Default for Strings {
    fn default() -> Self {
        Strings { data: vec![0] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_find() {
        let heap = Strings::from(b"\0<Module>\0set_Count\0Count\0").unwrap();
        assert_eq!(heap.get(1).unwrap(), "<Module>");
        assert_eq!(heap.get(14).unwrap(), "Count");
        assert_eq!(heap.find("Count"), Some(14));
        assert_eq!(heap.find("set_Count"), Some(10));
        assert_eq!(heap.find("Missing"), None);
        assert!(heap.get(100).is_err());
    }

    #[test]
    fn add_appends_once() {
        let mut heap = Strings::default();
        let first = heap.add("PropertyChanged");
        assert_eq!(first, 1);
        assert_eq!(heap.add("PropertyChanged"), first);
        assert_eq!(heap.add("Changed"), 9);
        assert_eq!(heap.len(), 17);
    }

    #[test]
    fn invalid() {
        assert!(Strings::from(&[]).is_err());
        assert!(Strings::from(b"x\0").is_err());
        let heap = Strings::from(b"\0abc").unwrap();
        assert!(heap.get(1).is_err());
    }
}

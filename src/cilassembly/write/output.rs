//! Memory-mapped output files.
//!
//! The destination is created at its final size and filled through a writable mapping.
//! An [`Output`] that is dropped without [`Output::finalize`] removes its file again, so an
//! aborted write does not leave a truncated image behind under the original name.

use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::{Error::OutOfBounds, Result};

/// A file being written through a memory mapping.
pub struct Output {
    mmap: MmapMut,
    target_path: PathBuf,
    finalized: bool,
}

impl Output {
    /// Creates (or truncates) `target_path` with `size` bytes and maps it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be created, sized or mapped.
    pub fn create<P: AsRef<Path>>(target_path: P, size: u64) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target_path)?;
        file.set_len(size)?;

        // The file handle stays private to this type for the lifetime of the mapping.
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            mmap,
            target_path,
            finalized: false,
        })
    }

    /// Copies `data` to `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the file.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len()).ok_or(OutOfBounds)?;
        let target = self.mmap.get_mut(offset..end).ok_or(OutOfBounds)?;
        target.copy_from_slice(data);
        Ok(())
    }

    /// Size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// The path being written.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    /// Flushes the mapping and keeps the file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if flushing fails.
    pub fn finalize(mut self) -> Result<()> {
        self.mmap.flush()?;
        self.finalized = true;
        Ok(())
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.target_path);
        }
    }
}

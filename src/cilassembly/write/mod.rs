//! Serialization of modified modules.

mod output;
mod pe;

use std::path::Path;

use output::Output;
pub(crate) use pe::write_image;

use crate::Result;

/// Writes `data` to `path` through a memory-mapped [`Output`].
///
/// # Errors
/// Returns [`crate::Error::FileError`] if the file cannot be created or written.
pub fn persist(path: &Path, data: &[u8]) -> Result<()> {
    let mut output = Output::create(path, data.len() as u64)?;
    output.write_at(0, data)?;
    output.finalize()
}

//! Metadata streams.
//!
//! The heaps are owned copies of the original stream bytes that only ever grow, so every
//! index handed out before a modification remains valid afterwards:
//!
//! - [`Strings`] for `#Strings`, identifiers
//! - [`UserStrings`] for `#US`, `ldstr` literals
//! - [`Guid`] for `#GUID`
//! - [`Blob`] for `#Blob`, signatures and other binary values
//! - [`PdbStream`] for the `#Pdb` header of Portable PDB files
//!
//! The tables stream lives in [`crate::metadata::tables`].

mod blob;
mod guid;
mod pdb;
mod streamheader;
mod strings;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use pdb::PdbStream;
pub use streamheader::{StreamHeader, KNOWN_STREAMS};
pub use strings::Strings;
pub use userstrings::UserStrings;

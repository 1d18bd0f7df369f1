//! Metadata parsing, representation and encoding for .NET modules and Portable PDBs.
//!
//! Everything here operates on raw, mutable structures: heaps are byte vectors with lookup
//! helpers, tables are rows of `u32` cells with typed views on top. That keeps reading and
//! writing symmetric, which is what a rewriting tool needs more than a rich object model.
//!
//! # Key Components
//!
//! - [`image`] - A complete metadata image: root, heaps and tables
//! - [`tables`] - The compressed tables stream and its schema
//! - [`streams`] - The `#Strings`, `#US`, `#GUID`, `#Blob` and `#Pdb` streams
//! - [`signatures`] - Inspecting and building signature blobs
//! - [`method`] - Method body headers
//! - [`sequencepoints`] - Portable PDB sequence point blobs
//! - [`token`] - Metadata tokens as used by CIL operands

/// The CLI header of a PE image
pub mod cor20header;
/// Custom attribute value blobs
pub mod customattributes;
pub mod image;
/// Method body headers and attribute flags
pub mod method;
/// The metadata root and stream directory
pub mod root;
pub mod sequencepoints;
pub mod signatures;
/// Metadata heaps and the `#Pdb` stream
pub mod streams;
pub mod tables;
pub mod token;

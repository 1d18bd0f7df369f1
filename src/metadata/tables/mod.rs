//! Metadata and Portable PDB tables.
//!
//! - [`TableId`] names the tables, [`schema`] describes their columns
//! - [`CodedIndexType`] packs multi-table references into single columns
//! - [`TableInfo`] derives column widths from row counts and heap sizes
//! - [`TablesStream`] decodes and re-encodes the `#~` stream with generic rows
//! - The `*Raw` types are typed views over the rows the weaver works with

mod codedindex;
mod raw;
pub mod schema;
mod stream;
mod tableid;
mod tableinfo;

pub use codedindex::CodedIndexType;
pub use raw::*;
pub use stream::TablesStream;
pub use tableid::TableId;
pub use tableinfo::{
    TableInfo, HEAP_BLOB_LARGE, HEAP_EXTRA_DATA, HEAP_GUID_LARGE, HEAP_STRINGS_LARGE,
};

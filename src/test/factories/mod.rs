//! Factory methods for in-memory test modules.
//!
//! [`AssemblyFactory`] produces a PE32 library with a `Sample.Model` class whose auto
//! properties carry the notification marker, laid out the way compilers emit them: a
//! single `.text` section holding the CLI header, the method bodies, the metadata and, when
//! symbols are requested, the debug directory. [`PdbFactory`] builds the matching Portable
//! PDB, or stand-alone symbols for tests of the symbol writer.

mod assembly;
mod pdb;

pub use assembly::{AssemblyFactory, Fixture, PropertySpec};
pub use pdb::PdbFactory;

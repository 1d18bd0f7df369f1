//! Shared test support.
//!
//! - [`factories`] builds small but complete .NET images and Portable PDBs in memory, so unit
//!   tests never depend on binaries checked into the repository
//! - [`evaluator`] executes woven setter bodies against a simulated object to check the
//!   notification behavior end to end

pub mod factories;

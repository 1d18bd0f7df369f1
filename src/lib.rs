// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/memory.rs' uses mmap to map a file into memory

//! # dotweave
//!
//! A post-build weaver for .NET modules. `dotweave` opens a compiled PE image together with
//! its Portable PDB, finds auto properties marked with
//! `Engine.Wpf.NotifyPropertyChangedAttribute` and rewrites their setters so that they
//! raise `PropertyChanged` whenever the stored value actually changes. The marker is
//! removed afterwards, the module is written back in place and the symbols are regenerated
//! to match the new method bodies.
//!
//! ## Features
//!
//! - **Pure Rust** - no .NET runtime or SDK is needed to weave a module
//! - **Pluggable equality** - the default `EqualityComparer<T>` or any comparer type named
//!   in the marker
//! - **Symbol aware** - sequence points, local scopes and the PDB checksum stay consistent
//! - **Idempotent** - a woven module no longer carries markers, a second pass is a no-op
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotweave::prelude::*;
//! use std::path::Path;
//!
//! let report = Weaver::default().weave_file(Path::new("bin/Release/ViewModels.dll"))?;
//! println!("Woven {} properties", report.woven.len());
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! ### Working on a loaded module
//!
//! ```rust,no_run
//! use dotweave::{CilAssembly, Weaver, WeaverConfig, FailurePolicy};
//! use std::path::Path;
//!
//! let path = Path::new("ViewModels.dll");
//! let mut assembly = CilAssembly::load(path)?;
//!
//! let config = WeaverConfig {
//!     failure_policy: FailurePolicy::Isolate,
//!     ..WeaverConfig::default()
//! };
//! let report = Weaver::new(config).weave(&mut assembly)?;
//! for failure in &report.failures {
//!     eprintln!("skipped {}: {}", failure.property, failure.error);
//! }
//! if report.has_changes() {
//!     assembly.save(path)?;
//! }
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`](crate::Parser) - PE container access and the binary reader
//! - [`metadata`] - ECMA-335 metadata and Portable PDB structures, read and written
//! - [`assembly`] - CIL instruction decoding and encoding
//! - [`cilassembly`] - The mutable module and its writer
//! - [`weaver`] - Scanning, comparer resolution, setter synthesis and marker removal
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. [`Error::kind`] groups errors by the phase
//! that produced them (load, resolution, synthesis, write).

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dotweave::prelude::*;
///
/// let mut assembly = CilAssembly::load("Sample.dll".as_ref())?;
/// let report = Weaver::default().weave(&mut assembly)?;
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod prelude;

/// CIL instructions based on ECMA-335
///
/// Decoding turns a method body into [`assembly::Instruction`]s with resolved branch
/// targets, the [`assembly::InstructionEncoder`] assembles instructions back into bytes,
/// resolving labels and tracking the maximum stack depth.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{assembly::decode_stream, Parser};
///
/// let bytecode = &[0x00, 0x2A]; // nop, ret
/// let instructions = decode_stream(&mut Parser::new(bytecode))?;
/// assert_eq!(instructions[1].mnemonic, "ret");
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod assembly;

/// Definitions, parsing and writing of CIL metadata based on ECMA-335
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{metadata::tables::TableId, CilAssembly};
/// use std::path::Path;
///
/// let assembly = CilAssembly::load(Path::new("Sample.dll"))?;
/// let tables = &assembly.metadata().tables;
/// println!("{} properties", tables.row_count(TableId::Property));
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod metadata;

/// The mutable module model and its writer
pub mod cilassembly;

/// Property change notification weaving
pub mod weaver;

/// `dotweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotweave` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{CilAssembly, Error, ErrorKind};
///
/// match CilAssembly::load(std::path::Path::new("Sample.dll")) {
///     Ok(_) => println!("Loaded successfully"),
///     Err(error) if error.kind() == ErrorKind::Load => println!("Cannot load: {}", error),
///     Err(error) => println!("Error: {}", error),
/// }
/// ```
pub use error::{Error, ErrorKind};

/// Main entry point for working with a module.
///
/// See [`cilassembly::CilAssembly`] for loading, editing and saving.
pub use cilassembly::CilAssembly;

/// The weaving pass and its configuration.
pub use weaver::{FailurePolicy, WeaveFailure, WeaveReport, Weaver, WeaverConfig};

/// Raw PE access and the binary reader.
///
/// # Example
///
/// ```rust,no_run
/// use dotweave::Parser;
///
/// let mut parser = Parser::new(&[0x01, 0x00, 0x00, 0x00]);
/// assert_eq!(parser.read_le::<u32>()?, 1);
/// # Ok::<(), dotweave::Error>(())
/// ```
pub use file::{parser::Parser, File};

//! # dotweave Prelude
//!
//! Convenient re-exports of the types needed to load, weave and save a module.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotweave operations
pub use crate::{Error, ErrorKind};

/// The result type used throughout dotweave
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The mutable module model
pub use crate::CilAssembly;

/// The weaving pass
pub use crate::{FailurePolicy, WeaveFailure, WeaveReport, Weaver, WeaverConfig};

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Metadata root constants
pub use crate::metadata::root::CIL_HEADER_MAGIC;

/// Table identifiers and the tables stream
pub use crate::metadata::tables::{TableId, TablesStream};

/// Candidates found by the scanner and their comparers
pub use crate::weaver::{
    comparer::{ComparerStrategy, ResolvedComparer},
    scanner::{Candidate, Marker},
};

// ================================================================================================
// Instructions
// ================================================================================================

/// CIL decoding and encoding
pub use crate::assembly::{decode_stream, Instruction, InstructionEncoder, Operand};

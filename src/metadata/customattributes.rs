//! Custom attribute value blobs (ECMA-335 II.23.3).
//!
//! The marker attribute has at most one fixed argument, a `System.Type` that names the
//! comparer to use. Types are serialized as `SerString`s holding the assembly-qualified
//! (or, for types of the same module, plain) reflection name. This module only decodes that
//! shape; attributes with other argument types are reported as malformed.

use crate::{file::parser::Parser, Result};

/// Prolog of every custom attribute value blob.
pub const CUSTOM_ATTRIBUTE_PROLOG: u16 = 0x0001;

/// The decoded value of an attribute whose fixed arguments are all `System.Type`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeArguments {
    /// One entry per constructor parameter, `None` for a `null` type
    pub fixed_args: Vec<Option<String>>,
    /// Number of named arguments that follow the fixed arguments
    pub named_count: u16,
}

impl TypeArguments {
    /// The first fixed argument, if the constructor has one and it is not `null`.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.fixed_args.first().and_then(|arg| arg.as_deref())
    }
}

/// Decodes a custom attribute blob whose constructor takes `param_count` `System.Type`
/// parameters.
///
/// An empty blob is accepted for parameterless constructors, as some compilers omit the
/// value entirely.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a missing prolog or truncated arguments.
pub fn parse_type_arguments(blob: &[u8], param_count: usize) -> Result<TypeArguments> {
    if blob.is_empty() && param_count == 0 {
        return Ok(TypeArguments::default());
    }

    let mut parser = Parser::new(blob);
    let prolog = parser.read_le::<u16>()?;
    if prolog != CUSTOM_ATTRIBUTE_PROLOG {
        return Err(malformed_error!(
            "Invalid custom attribute prolog - expected 0x0001, found {:#06x}",
            prolog
        ));
    }

    let mut fixed_args = Vec::with_capacity(param_count);
    for index in 0..param_count {
        if !parser.has_more_data() {
            return Err(malformed_error!(
                "Custom attribute blob ends before argument {}",
                index
            ));
        }
        fixed_args.push(parser.read_ser_string()?);
    }

    let named_count = if parser.remaining() >= 2 {
        parser.read_le::<u16>()?
    } else {
        0
    };

    Ok(TypeArguments {
        fixed_args,
        named_count,
    })
}

/// Splits an assembly-qualified reflection name into the type part, dropping the assembly
/// part after the first top-level comma. Commas inside generic argument brackets are kept.
#[must_use]
pub fn strip_assembly_qualification(name: &str) -> &str {
    let mut depth = 0_usize;
    for (index, ch) in name.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return name[..index].trim(),
            _ => {}
        }
    }
    name.trim()
}

//! Signature blobs (ECMA-335 II.23.2).
//!
//! The weaver never needs a full type model. It compares types by their encoded bytes,
//! extracts the type of fields and properties, and builds the handful of signatures that
//! the notifying setter references. Everything here therefore works on byte slices: the
//! skipping routine [`skip_type`] finds where one encoded type ends, and the builders
//! produce blobs ready for the `#Blob` heap.

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    metadata::{tables::TableId, token::Token},
    Result,
};

#[allow(non_snake_case)]
/// Element type constants (ECMA-335 II.23.1.16)
pub mod ELEMENT_TYPE {
    /// Marks the end of a list
    pub const END: u8 = 0x00;
    /// `void`
    pub const VOID: u8 = 0x01;
    /// `bool`
    pub const BOOLEAN: u8 = 0x02;
    /// `char`
    pub const CHAR: u8 = 0x03;
    /// `sbyte`
    pub const I1: u8 = 0x04;
    /// `byte`
    pub const U1: u8 = 0x05;
    /// `short`
    pub const I2: u8 = 0x06;
    /// `ushort`
    pub const U2: u8 = 0x07;
    /// `int`
    pub const I4: u8 = 0x08;
    /// `uint`
    pub const U4: u8 = 0x09;
    /// `long`
    pub const I8: u8 = 0x0a;
    /// `ulong`
    pub const U8: u8 = 0x0b;
    /// `float`
    pub const R4: u8 = 0x0c;
    /// `double`
    pub const R8: u8 = 0x0d;
    /// `string`
    pub const STRING: u8 = 0x0e;
    /// Unmanaged pointer, followed by the pointee type
    pub const PTR: u8 = 0x0f;
    /// Managed reference, followed by the referenced type
    pub const BYREF: u8 = 0x10;
    /// Value type, followed by a `TypeDefOrRefEncoded`
    pub const VALUETYPE: u8 = 0x11;
    /// Reference type, followed by a `TypeDefOrRefEncoded`
    pub const CLASS: u8 = 0x12;
    /// Generic parameter of a type, followed by its number
    pub const VAR: u8 = 0x13;
    /// General array
    pub const ARRAY: u8 = 0x14;
    /// Generic instantiation
    pub const GENERICINST: u8 = 0x15;
    /// `TypedReference`
    pub const TYPEDBYREF: u8 = 0x16;
    /// `IntPtr`
    pub const I: u8 = 0x18;
    /// `UIntPtr`
    pub const U: u8 = 0x19;
    /// Function pointer, followed by a method signature
    pub const FNPTR: u8 = 0x1b;
    /// `object`
    pub const OBJECT: u8 = 0x1c;
    /// Single-dimensional zero-based array
    pub const SZARRAY: u8 = 0x1d;
    /// Generic parameter of a method, followed by its number
    pub const MVAR: u8 = 0x1e;
    /// Required modifier
    pub const CMOD_REQD: u8 = 0x1f;
    /// Optional modifier
    pub const CMOD_OPT: u8 = 0x20;
    /// Sentinel for vararg call sites
    pub const SENTINEL: u8 = 0x41;
    /// Pinned local
    pub const PINNED: u8 = 0x45;
}

#[allow(non_snake_case)]
/// Calling convention and signature kind bytes (ECMA-335 II.23.2.1 - II.23.2.6)
pub mod SIGNATURE {
    /// Default managed calling convention
    pub const DEFAULT: u8 = 0x00;
    /// Variable argument calling convention
    pub const VARARG: u8 = 0x05;
    /// Field signature
    pub const FIELD: u8 = 0x06;
    /// Local variable signature
    pub const LOCAL_SIG: u8 = 0x07;
    /// Property signature
    pub const PROPERTY: u8 = 0x08;
    /// Method has generic parameters
    pub const GENERIC: u8 = 0x10;
    /// Instance member
    pub const HASTHIS: u8 = 0x20;
    /// Explicit `this` parameter
    pub const EXPLICITTHIS: u8 = 0x40;
    /// Mask for the calling convention kind
    pub const KIND_MASK: u8 = 0x0F;
}

/// Advances `parser` past one encoded type, including leading custom modifiers.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated data and
/// [`crate::Error::Malformed`] for unknown element types or runaway nesting.
pub fn skip_type(parser: &mut Parser) -> Result<()> {
    skip_type_depth(parser, 0)
}

fn skip_type_depth(parser: &mut Parser, depth: usize) -> Result<()> {
    if depth > 64 {
        return Err(malformed_error!("Signature nesting too deep"));
    }

    let element = parser.read_le::<u8>()?;
    match element {
        ELEMENT_TYPE::VOID..=ELEMENT_TYPE::STRING
        | ELEMENT_TYPE::TYPEDBYREF
        | ELEMENT_TYPE::I
        | ELEMENT_TYPE::U
        | ELEMENT_TYPE::OBJECT => Ok(()),
        ELEMENT_TYPE::PTR
        | ELEMENT_TYPE::BYREF
        | ELEMENT_TYPE::SZARRAY
        | ELEMENT_TYPE::PINNED
        | ELEMENT_TYPE::SENTINEL => skip_type_depth(parser, depth + 1),
        ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => {
            parser.read_compressed_token()?;
            Ok(())
        }
        ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
            parser.read_compressed_token()?;
            skip_type_depth(parser, depth + 1)
        }
        ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => {
            parser.read_compressed_uint()?;
            Ok(())
        }
        ELEMENT_TYPE::ARRAY => {
            skip_type_depth(parser, depth + 1)?;
            let _rank = parser.read_compressed_uint()?;
            for _ in 0..parser.read_compressed_uint()? {
                parser.read_compressed_uint()?;
            }
            for _ in 0..parser.read_compressed_uint()? {
                parser.read_compressed_int()?;
            }
            Ok(())
        }
        ELEMENT_TYPE::GENERICINST => {
            let kind = parser.read_le::<u8>()?;
            if kind != ELEMENT_TYPE::CLASS && kind != ELEMENT_TYPE::VALUETYPE {
                return Err(malformed_error!("Invalid GENERICINST kind - {:#04x}", kind));
            }
            parser.read_compressed_token()?;
            for _ in 0..parser.read_compressed_uint()? {
                skip_type_depth(parser, depth + 1)?;
            }
            Ok(())
        }
        ELEMENT_TYPE::FNPTR => skip_method_signature(parser, depth + 1),
        _ => Err(malformed_error!("Unknown element type - {:#04x}", element)),
    }
}

fn skip_method_signature(parser: &mut Parser, depth: usize) -> Result<()> {
    let convention = parser.read_le::<u8>()?;
    if convention & SIGNATURE::GENERIC != 0 {
        parser.read_compressed_uint()?;
    }
    let params = parser.read_compressed_uint()?;
    skip_type_depth(parser, depth)?;
    for _ in 0..params {
        skip_type_depth(parser, depth)?;
    }
    Ok(())
}

/// Removes leading custom modifiers from an encoded type.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated modifiers.
pub fn strip_custom_mods(encoded: &[u8]) -> Result<&[u8]> {
    let mut parser = Parser::new(encoded);
    while matches!(
        parser.peek_byte()?,
        ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT
    ) {
        parser.read_le::<u8>()?;
        parser.read_compressed_token()?;
    }
    Ok(&encoded[parser.pos()..])
}

/// Returns the encoded type of a field signature, without custom modifiers.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `blob` is not a field signature.
pub fn field_type(blob: &[u8]) -> Result<&[u8]> {
    let mut parser = Parser::new(blob);
    let kind = parser.read_le::<u8>()?;
    if kind & SIGNATURE::KIND_MASK != SIGNATURE::FIELD {
        return Err(malformed_error!("Not a field signature - {:#04x}", kind));
    }

    let start = parser.pos();
    skip_type(&mut parser)?;
    strip_custom_mods(&blob[start..parser.pos()])
}

/// A decoded property signature (ECMA-335 II.23.2.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySignature<'a> {
    /// `true` for instance properties
    pub has_this: bool,
    /// Number of index parameters, zero for plain properties
    pub param_count: u32,
    /// The encoded property type, without custom modifiers
    pub property_type: &'a [u8],
}

/// Parses a property signature.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `blob` is not a property signature.
pub fn property_signature(blob: &[u8]) -> Result<PropertySignature<'_>> {
    let mut parser = Parser::new(blob);
    let kind = parser.read_le::<u8>()?;
    if kind & SIGNATURE::KIND_MASK != SIGNATURE::PROPERTY {
        return Err(malformed_error!("Not a property signature - {:#04x}", kind));
    }

    let param_count = parser.read_compressed_uint()?;
    let start = parser.pos();
    skip_type(&mut parser)?;

    Ok(PropertySignature {
        has_this: kind & SIGNATURE::HASTHIS != 0,
        param_count,
        property_type: strip_custom_mods(&blob[start..parser.pos()])?,
    })
}

/// The shape of a method signature (ECMA-335 II.23.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodShape<'a> {
    /// `true` for instance methods
    pub has_this: bool,
    /// Number of generic parameters
    pub generic_count: u32,
    /// The encoded return type
    pub return_type: &'a [u8],
    /// The encoded parameter types
    pub params: Vec<&'a [u8]>,
}

/// Parses a `MethodDefSig` or `MethodRefSig` into its parts.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for field, property and local signatures.
pub fn method_shape(blob: &[u8]) -> Result<MethodShape<'_>> {
    let mut parser = Parser::new(blob);
    let convention = parser.read_le::<u8>()?;
    if matches!(
        convention & SIGNATURE::KIND_MASK,
        SIGNATURE::FIELD | SIGNATURE::LOCAL_SIG | SIGNATURE::PROPERTY
    ) {
        return Err(malformed_error!("Not a method signature - {:#04x}", convention));
    }

    let generic_count = if convention & SIGNATURE::GENERIC != 0 {
        parser.read_compressed_uint()?
    } else {
        0
    };
    let param_count = parser.read_compressed_uint()?;

    let start = parser.pos();
    skip_type(&mut parser)?;
    let return_type = &blob[start..parser.pos()];

    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        let start = parser.pos();
        skip_type(&mut parser)?;
        params.push(&blob[start..parser.pos()]);
    }

    Ok(MethodShape {
        has_this: convention & SIGNATURE::HASTHIS != 0,
        generic_count,
        return_type,
        params,
    })
}

/// Returns the class token of an encoded `CLASS` or `VALUETYPE` type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for any other type.
pub fn class_token(encoded: &[u8]) -> Result<Token> {
    let mut parser = Parser::new(encoded);
    match parser.read_le::<u8>()? {
        ELEMENT_TYPE::CLASS | ELEMENT_TYPE::VALUETYPE => parser.read_compressed_token(),
        other => Err(malformed_error!(
            "Type is not a class or value type - {:#04x}",
            other
        )),
    }
}

/// Encodes `token` as a `TypeDefOrRefOrSpecEncoded` value (ECMA-335 II.23.2.8).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for tokens of other tables.
pub fn encode_type_def_or_ref(out: &mut Vec<u8>, token: Token) -> Result<()> {
    let tag = match TableId::from_repr(token.table()) {
        Some(TableId::TypeDef) => 0,
        Some(TableId::TypeRef) => 1,
        Some(TableId::TypeSpec) => 2,
        _ => {
            return Err(malformed_error!(
                "Token {} is not a TypeDefOrRef",
                token
            ))
        }
    };
    push_compressed_uint(out, (token.row() << 2) | tag)
}

/// Encodes `CLASS token`.
///
/// # Errors
/// See [`encode_type_def_or_ref`].
pub fn class_type(token: Token) -> Result<Vec<u8>> {
    let mut out = vec![ELEMENT_TYPE::CLASS];
    encode_type_def_or_ref(&mut out, token)?;
    Ok(out)
}

/// Encodes `GENERICINST CLASS|VALUETYPE token <args>`.
///
/// # Errors
/// See [`encode_type_def_or_ref`].
pub fn generic_instance(token: Token, is_value_type: bool, args: &[&[u8]]) -> Result<Vec<u8>> {
    let mut out = vec![
        ELEMENT_TYPE::GENERICINST,
        if is_value_type {
            ELEMENT_TYPE::VALUETYPE
        } else {
            ELEMENT_TYPE::CLASS
        },
    ];
    encode_type_def_or_ref(&mut out, token)?;
    push_compressed_uint(&mut out, args.len() as u32)?;
    for arg in args {
        out.extend_from_slice(arg);
    }
    Ok(out)
}

/// Encodes a generic type parameter reference, `VAR number`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for unencodable numbers.
pub fn generic_var(number: u32) -> Result<Vec<u8>> {
    let mut out = vec![ELEMENT_TYPE::VAR];
    push_compressed_uint(&mut out, number)?;
    Ok(out)
}

/// Encodes a field signature for `field_type`.
#[must_use]
pub fn field_signature(field_type: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field_type.len() + 1);
    out.push(SIGNATURE::FIELD);
    out.extend_from_slice(field_type);
    out
}

/// Encodes a local variable signature.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for more locals than a signature can count.
pub fn local_signature(locals: &[&[u8]]) -> Result<Vec<u8>> {
    let mut out = vec![SIGNATURE::LOCAL_SIG];
    push_compressed_uint(&mut out, locals.len() as u32)?;
    for local in locals {
        out.extend_from_slice(local);
    }
    Ok(out)
}

/// Encodes a non-generic method signature.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for more parameters than a signature can count.
pub fn method_signature(has_this: bool, return_type: &[u8], params: &[&[u8]]) -> Result<Vec<u8>> {
    let mut out = vec![if has_this {
        SIGNATURE::HASTHIS
    } else {
        SIGNATURE::DEFAULT
    }];
    push_compressed_uint(&mut out, params.len() as u32)?;
    out.extend_from_slice(return_type);
    for param in params {
        out.extend_from_slice(param);
    }
    Ok(out)
}

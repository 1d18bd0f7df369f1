//! Metadata tokens (ECMA-335 II.22).
//!
//! A token is a 32-bit value whose high byte names a metadata table (or the `#US` heap,
//! `0x70`) and whose low 24 bits are a 1-based row index or heap offset. Tokens are what CIL
//! operands carry, e.g. the `FieldDef` behind `ldfld` or the `MemberRef` behind `callvirt`.

use std::fmt;

use crate::metadata::tables::TableId;

/// Table byte used by `ldstr` operands, which index the `#US` heap.
pub const USER_STRING_TABLE: u8 = 0x70;

/// A metadata token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Creates a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token for `row` of `table`.
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Creates an `ldstr` token for a `#US` heap offset.
    #[must_use]
    pub fn user_string(offset: u32) -> Self {
        Token((u32::from(USER_STRING_TABLE) << 24) | (offset & 0x00FF_FFFF))
    }

    /// The raw value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The row index or heap offset.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// `true` if this token points into `table`.
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

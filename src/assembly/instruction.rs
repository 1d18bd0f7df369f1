//! Decoded CIL instructions and the vocabulary shared by the decoder and encoder.

use std::fmt;

use crate::metadata::token::Token;

/// Encoding of an instruction's inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer, also short branch displacements
    Int8,
    /// Unsigned 8-bit integer, short argument and local indices
    UInt8,
    /// Unsigned 16-bit integer, long argument and local indices
    UInt16,
    /// Signed 32-bit integer, also long branch displacements
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Size in bytes of a fixed-size operand, `None` for switch tables.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// A constant embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl From<Immediate> for i64 {
    fn from(value: Immediate) -> Self {
        match value {
            Immediate::Int8(value) => i64::from(value),
            Immediate::UInt8(value) => i64::from(value),
            Immediate::UInt16(value) => i64::from(value),
            Immediate::Int32(value) => i64::from(value),
            Immediate::Int64(value) => value,
            Immediate::Float32(value) => i64::from(value.to_bits()),
            Immediate::Float64(value) => value.to_bits() as i64,
        }
    }
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Branch target as an offset from the start of the method body
    Target(u32),
    /// Metadata token reference
    Token(Token),
    /// Switch table with multiple signed branch displacements
    Switch(Vec<i32>),
}

impl Operand {
    /// The token of a token operand.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch
    Switch,
    /// Exception throwing
    Throw,
    /// End of a finally or filter block
    EndFinally,
    /// Leave protected region
    Leave,
}

/// Stack effect of an instruction.
///
/// Calls, `newobj` and `ret` depend on a signature; their table entries carry only the fixed
/// part and set `variable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
    /// `true` if the real effect depends on the operand's signature
    pub variable: bool,
}

/// A decoded CIL instruction.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Offset from the start of the method body
    pub offset: u32,
    /// Size of this instruction in bytes
    pub size: u32,
    /// Primary opcode byte
    pub opcode: u8,
    /// Prefix byte, `0xFE` for two-byte opcodes and zero otherwise
    pub prefix: u8,
    /// Mnemonic such as `ldfld` or `brtrue.s`
    pub mnemonic: &'static str,
    /// How this instruction affects control flow
    pub flow_type: FlowType,
    /// The operand data for this instruction
    pub operand: Operand,
    /// How this instruction affects the evaluation stack
    pub stack_behavior: StackBehavior,
    /// Branch targets as offsets from the start of the method body
    pub branch_targets: Vec<u32>,
}

impl Instruction {
    /// `true` for conditional and unconditional branches, `leave` and `switch`.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// `true` if execution never falls through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {:<12}", self.offset, self.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, " {imm:?}"),
            Operand::Target(target) => write!(f, " IL_{target:04x}"),
            Operand::Token(token) => write!(f, " {token}"),
            Operand::Switch(items) => write!(f, " switch[{}]", items.len()),
        }
    }
}

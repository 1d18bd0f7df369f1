//! CIL instruction decoding and encoding.
//!
//! The opcode table in [`INSTRUCTIONS`] drives both directions. Decoding is used to verify
//! emitted setter bodies; encoding, through [`InstructionEncoder`], is how new bodies are
//! produced.
//!
//! # Key Types
//! - [`Instruction`] - A decoded CIL instruction
//! - [`Operand`] - Instruction operands (immediates, tokens, targets)
//! - [`FlowType`] - How instructions affect control flow
//! - [`InstructionEncoder`] - Label-resolving, stack-tracking encoder

mod decoder;
mod encoder;
mod instruction;
mod instructions;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::InstructionEncoder;
pub use instruction::{FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior};
pub use instructions::{by_mnemonic, by_opcode, CilInstruction, FE_PREFIX, INSTRUCTIONS};

//! CIL instruction encoding.
//!
//! [`InstructionEncoder`] is the inverse of the decoder: it turns mnemonics and operands into
//! bytes using the same opcode table, resolves branch labels once all positions are known,
//! and tracks the evaluation stack so the method header can declare an exact `MaxStack`.
//!
//! ```rust,no_run
//! use dotweave::assembly::InstructionEncoder;
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_ldarg(0)?;
//! encoder.emit_branch("brtrue.s", "end")?;
//! encoder.emit_instruction("nop", None)?;
//! encoder.define_label("end")?;
//! encoder.emit_instruction("ret", None)?;
//!
//! let (bytecode, max_stack) = encoder.finalize()?;
//! # Ok::<(), dotweave::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{FlowType, Immediate, Operand, OperandType},
        instructions::{by_mnemonic, CilInstruction},
    },
    file::io::{push_le, write_le_to},
    Result,
};

/// An unresolved branch displacement.
#[derive(Debug, Clone)]
struct LabelFixup {
    label: String,
    /// Position of the displacement bytes
    fixup_position: usize,
    /// 1 for short branches, 4 for long ones
    offset_size: u8,
}

/// Encoder for a single method body.
#[derive(Debug, Default)]
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
    current_stack_depth: i16,
    max_stack_depth: u16,
    label_stack_depths: HashMap<String, i16>,
    unreachable: bool,
}

impl InstructionEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(mnemonic: &str) -> Result<&'static CilInstruction> {
        by_mnemonic(mnemonic).ok_or_else(|| malformed_error!("Unknown mnemonic '{}'", mnemonic))
    }

    fn emit_opcode(&mut self, instruction: &CilInstruction) {
        if instruction.prefix != 0 {
            self.bytecode.push(instruction.prefix);
        }
        self.bytecode.push(instruction.opcode);
    }

    /// Emits an instruction with a fixed stack effect.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown mnemonics, operands that do not match
    /// the opcode, branches (use [`InstructionEncoder::emit_branch`]), instructions whose stack
    /// effect depends on a signature (use [`InstructionEncoder::emit_call`]), and stack
    /// underflow.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<()> {
        let metadata = Self::lookup(mnemonic)?;
        if matches!(
            metadata.flow,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Leave
                | FlowType::Switch
        ) {
            return Err(malformed_error!(
                "'{}' needs a label, use emit_branch",
                mnemonic
            ));
        }

        let (pops, pushes) = if metadata.stack.variable {
            if metadata.flow != FlowType::Return {
                return Err(malformed_error!(
                    "'{}' has a signature dependent stack effect, use emit_call",
                    mnemonic
                ));
            }
            // `ret` pops the return value, if any; the stack must be empty afterwards
            (u8::try_from(self.current_stack_depth.max(0)).unwrap_or(u8::MAX), 0)
        } else {
            (metadata.stack.pops, metadata.stack.pushes)
        };

        self.emit_opcode(metadata);
        self.emit_operand(operand, metadata.op_type, mnemonic)?;
        self.update_stack_depth(pops, pushes)
            .map_err(|e| malformed_error!("Stack error at instruction '{}': {}", mnemonic, e))?;

        if matches!(
            metadata.flow,
            FlowType::Return | FlowType::Throw | FlowType::EndFinally
        ) {
            self.unreachable = true;
        }
        Ok(())
    }

    /// Emits `call`, `callvirt` or `newobj` with the stack effect of the callee's signature.
    ///
    /// `pops` counts all consumed values including `this`; `newobj` pushes the new object
    /// regardless of `has_result`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for other mnemonics and stack underflow.
    pub fn emit_call(
        &mut self,
        mnemonic: &str,
        operand: Operand,
        pops: u8,
        has_result: bool,
    ) -> Result<()> {
        let metadata = Self::lookup(mnemonic)?;
        if metadata.flow != FlowType::Call || !metadata.stack.variable {
            return Err(malformed_error!("'{}' is not a call instruction", mnemonic));
        }

        self.emit_opcode(metadata);
        self.emit_operand(Some(operand), metadata.op_type, mnemonic)?;

        let pushes = u8::from(has_result || mnemonic == "newobj");
        self.update_stack_depth(pops, pushes)
            .map_err(|e| malformed_error!("Stack error at call '{}': {}", mnemonic, e))
    }

    /// Emits a branch to `label`, which may be defined before or after the branch.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `mnemonic` is not a branch.
    pub fn emit_branch(&mut self, mnemonic: &str, label: &str) -> Result<()> {
        let metadata = Self::lookup(mnemonic)?;
        if !matches!(
            metadata.flow,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
        ) {
            return Err(malformed_error!(
                "Instruction '{}' is not a branch instruction",
                mnemonic
            ));
        }

        let offset_size = match metadata.op_type {
            OperandType::Int8 => 1,
            OperandType::Int32 => 4,
            _ => {
                return Err(malformed_error!(
                    "Branch '{}' has no displacement operand",
                    mnemonic
                ))
            }
        };

        self.emit_opcode(metadata);
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            offset_size,
        });
        self.bytecode
            .extend(std::iter::repeat(0).take(offset_size as usize));

        self.update_stack_depth(metadata.stack.pops, metadata.stack.pushes)
            .map_err(|e| {
                malformed_error!("Stack error at branch '{}' to '{}': {}", mnemonic, label, e)
            })?;

        match self.label_stack_depths.get(label) {
            Some(&expected) if expected != self.current_stack_depth => {
                return Err(malformed_error!(
                    "Stack depth mismatch at branch to '{}': expected {}, got {}",
                    label,
                    expected,
                    self.current_stack_depth
                ));
            }
            Some(_) => {}
            None => {
                self.label_stack_depths
                    .insert(label.to_string(), self.current_stack_depth);
            }
        }

        if metadata.flow != FlowType::ConditionalBranch {
            self.unreachable = true;
        }
        Ok(())
    }

    /// Emits the shortest `ldarg` form for `index`.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldarg(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldarg.0", None),
            1 => self.emit_instruction("ldarg.1", None),
            2 => self.emit_instruction("ldarg.2", None),
            3 => self.emit_instruction("ldarg.3", None),
            4..=255 => self.emit_instruction(
                "ldarg.s",
                Some(Operand::Immediate(Immediate::UInt8(index as u8))),
            ),
            _ => self.emit_instruction("ldarg", Some(Operand::Immediate(Immediate::UInt16(index)))),
        }
    }

    /// Emits the shortest `ldloc` form for `index`.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_ldloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("ldloc.0", None),
            1 => self.emit_instruction("ldloc.1", None),
            2 => self.emit_instruction("ldloc.2", None),
            3 => self.emit_instruction("ldloc.3", None),
            4..=255 => self.emit_instruction(
                "ldloc.s",
                Some(Operand::Immediate(Immediate::UInt8(index as u8))),
            ),
            _ => self.emit_instruction("ldloc", Some(Operand::Immediate(Immediate::UInt16(index)))),
        }
    }

    /// Emits the shortest `stloc` form for `index`.
    ///
    /// # Errors
    /// See [`InstructionEncoder::emit_instruction`].
    pub fn emit_stloc(&mut self, index: u16) -> Result<()> {
        match index {
            0 => self.emit_instruction("stloc.0", None),
            1 => self.emit_instruction("stloc.1", None),
            2 => self.emit_instruction("stloc.2", None),
            3 => self.emit_instruction("stloc.3", None),
            4..=255 => self.emit_instruction(
                "stloc.s",
                Some(Operand::Immediate(Immediate::UInt8(index as u8))),
            ),
            _ => self.emit_instruction("stloc", Some(Operand::Immediate(Immediate::UInt16(index)))),
        }
    }

    /// Defines `name` at the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for duplicate labels and for labels reached with
    /// different stack depths.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(malformed_error!("Label '{}' is defined twice", name));
        }

        match self.label_stack_depths.get(name) {
            Some(&expected) if self.unreachable => self.current_stack_depth = expected,
            Some(&expected) if expected != self.current_stack_depth => {
                return Err(malformed_error!(
                    "Stack depth mismatch at label '{}': expected {} (from branch), got {} (current)",
                    name,
                    expected,
                    self.current_stack_depth
                ));
            }
            Some(_) => {}
            None if self.unreachable => self.current_stack_depth = 0,
            None => {
                self.label_stack_depths
                    .insert(name.to_string(), self.current_stack_depth);
            }
        }

        self.unreachable = false;
        self.labels
            .insert(name.to_string(), self.bytecode.len() as u32);
        Ok(())
    }

    /// Current length of the emitted code.
    #[must_use]
    pub fn current_position(&self) -> u32 {
        self.bytecode.len() as u32
    }

    /// The largest stack depth reached so far.
    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Resolves all labels and returns the code together with its maximum stack depth.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for undefined labels, short branches whose target
    /// is out of range, and code that can fall off its end.
    pub fn finalize(mut self) -> Result<(Vec<u8>, u16)> {
        if !self.unreachable {
            return Err(malformed_error!(
                "Method body falls through its last instruction"
            ));
        }

        for fixup in std::mem::take(&mut self.fixups) {
            let Some(&label_position) = self.labels.get(&fixup.label) else {
                return Err(malformed_error!("Undefined label '{}'", fixup.label));
            };

            let next_instruction = (fixup.fixup_position + fixup.offset_size as usize) as i64;
            let displacement = i64::from(label_position) - next_instruction;
            if fixup.offset_size == 1 {
                let Ok(short) = i8::try_from(displacement) else {
                    return Err(malformed_error!(
                        "Short branch to '{}' is out of range ({})",
                        fixup.label,
                        displacement
                    ));
                };
                write_le_to(&mut self.bytecode, fixup.fixup_position, short)?;
            } else {
                let long = i32::try_from(displacement)
                    .map_err(|_| malformed_error!("Branch to '{}' is out of range", fixup.label))?;
                write_le_to(&mut self.bytecode, fixup.fixup_position, long)?;
            }
        }

        Ok((self.bytecode, self.max_stack_depth))
    }

    fn emit_operand(
        &mut self,
        operand: Option<Operand>,
        expected: OperandType,
        mnemonic: &str,
    ) -> Result<()> {
        match (expected, operand) {
            (OperandType::None, None | Some(Operand::None)) => {}
            (OperandType::Int8, Some(Operand::Immediate(Immediate::Int8(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::UInt8, Some(Operand::Immediate(Immediate::UInt8(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::UInt16, Some(Operand::Immediate(Immediate::UInt16(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::Int32, Some(Operand::Immediate(Immediate::Int32(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::Int64, Some(Operand::Immediate(Immediate::Int64(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::Float32, Some(Operand::Immediate(Immediate::Float32(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::Float64, Some(Operand::Immediate(Immediate::Float64(value)))) => {
                push_le(&mut self.bytecode, value);
            }
            (OperandType::Token, Some(Operand::Token(token))) => {
                push_le(&mut self.bytecode, token.value());
            }
            (expected, operand) => {
                return Err(malformed_error!(
                    "Operand {:?} does not match '{}' ({:?})",
                    operand,
                    mnemonic,
                    expected
                ))
            }
        }
        Ok(())
    }

    fn update_stack_depth(&mut self, pops: u8, pushes: u8) -> Result<()> {
        self.current_stack_depth -= i16::from(pops);
        if self.current_stack_depth < 0 && !self.unreachable {
            return Err(malformed_error!(
                "Stack underflow: depth became {} after popping {}",
                self.current_stack_depth,
                pops
            ));
        }
        self.current_stack_depth = self.current_stack_depth.max(0) + i16::from(pushes);

        let depth = u16::try_from(self.current_stack_depth)
            .map_err(|_| malformed_error!("Stack depth exceeds u16 range"))?;
        self.max_stack_depth = self.max_stack_depth.max(depth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn simple_sequence() {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_ldarg(0).unwrap();
        encoder.emit_ldarg(1).unwrap();
        encoder
            .emit_instruction("stfld", Some(Operand::Token(Token::new(0x0400_0001))))
            .unwrap();
        encoder.emit_instruction("ret", None).unwrap();

        let (code, max_stack) = encoder.finalize().unwrap();
        assert_eq!(code, [0x02, 0x03, 0x7D, 0x01, 0x00, 0x00, 0x04, 0x2A]);
        assert_eq!(max_stack, 2);
    }

    #[test]
    fn forward_branches_share_one_target() {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_ldarg(1).unwrap();
        encoder.emit_branch("brtrue.s", "end").unwrap();
        encoder.emit_ldarg(1).unwrap();
        encoder.emit_branch("brfalse.s", "end").unwrap();
        encoder.define_label("end").unwrap();
        encoder.emit_instruction("ret", None).unwrap();

        let (code, max_stack) = encoder.finalize().unwrap();
        assert_eq!(code, [0x03, 0x2D, 0x03, 0x03, 0x2C, 0x00, 0x2A]);
        assert_eq!(max_stack, 1);
    }

    #[test]
    fn calls_use_signature_effect() {
        let mut encoder = InstructionEncoder::new();
        encoder
            .emit_call("call", Operand::Token(Token::new(0x0A00_0001)), 0, true)
            .unwrap();
        encoder.emit_ldarg(0).unwrap();
        encoder.emit_ldarg(1).unwrap();
        encoder
            .emit_call("callvirt", Operand::Token(Token::new(0x0A00_0002)), 3, true)
            .unwrap();
        assert_eq!(encoder.max_stack_depth(), 3);
        encoder.emit_instruction("pop", None).unwrap();
        encoder.emit_instruction("ret", None).unwrap();
        assert!(encoder.finalize().is_ok());

        let mut encoder = InstructionEncoder::new();
        assert!(encoder
            .emit_instruction("call", Some(Operand::Token(Token::new(0x0A00_0001))))
            .is_err());
        assert!(encoder
            .emit_call("ldfld", Operand::Token(Token::new(0x0400_0001)), 1, true)
            .is_err());
    }

    #[test]
    fn errors() {
        let mut encoder = InstructionEncoder::new();
        assert!(encoder.emit_instruction("pop", None).is_err());

        let mut encoder = InstructionEncoder::new();
        assert!(encoder.emit_instruction("bogus", None).is_err());
        assert!(encoder.emit_instruction("ldarg.0", Some(Operand::Token(Token::new(1)))).is_err());
        assert!(encoder.emit_instruction("br", None).is_err());

        let mut encoder = InstructionEncoder::new();
        encoder.emit_branch("br.s", "missing").unwrap();
        assert!(encoder.finalize().is_err());

        let mut encoder = InstructionEncoder::new();
        encoder.emit_instruction("nop", None).unwrap();
        assert!(encoder.finalize().is_err());

        let mut encoder = InstructionEncoder::new();
        encoder.define_label("a").unwrap();
        assert!(encoder.define_label("a").is_err());
    }

    #[test]
    fn short_branch_out_of_range() {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_branch("br.s", "far").unwrap();
        for _ in 0..200 {
            encoder.emit_instruction("nop", None).unwrap();
        }
        encoder.define_label("far").unwrap();
        encoder.emit_instruction("ret", None).unwrap();
        assert!(encoder.finalize().is_err());
    }
}

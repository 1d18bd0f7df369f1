//! CIL instruction decoding.
//!
//! ```rust,no_run
//! use dotweave::{assembly::decode_stream, Parser};
//! let code = [0x00, 0x2A]; // nop, ret
//! let mut parser = Parser::new(&code);
//! let instrs = decode_stream(&mut parser)?;
//! assert_eq!(instrs.len(), 2);
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    assembly::{
        instruction::{FlowType, Immediate, Instruction, Operand, OperandType},
        instructions::{by_opcode, FE_PREFIX},
    },
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Decodes the instruction at the parser's position. Offsets are relative to the start of
/// the parser's data, which is expected to be the method's code.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for undefined opcodes and
/// [`crate::Error::OutOfBounds`] for truncated operands.
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let offset = parser.pos() as u32;
    let first_byte = parser.read_le::<u8>()?;

    let cil_instruction = if first_byte == FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        by_opcode(FE_PREFIX, second_byte)
            .ok_or_else(|| malformed_error!("Invalid opcode: FE {:02X}", second_byte))?
    } else {
        by_opcode(0, first_byte)
            .ok_or_else(|| malformed_error!("Invalid opcode: {:02X}", first_byte))?
    };

    let operand = match cil_instruction.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()?;
            if case_count as usize > parser.remaining() / 4 {
                return Err(malformed_error!(
                    "Switch at IL_{:04x} announces {} targets",
                    offset,
                    case_count
                ));
            }

            let mut targets = Vec::with_capacity(case_count as usize);
            for _ in 0..case_count {
                targets.push(parser.read_le::<i32>()?);
            }
            Operand::Switch(targets)
        }
    };

    let size = parser.pos() as u32 - offset;
    let next = i64::from(offset + size);
    let resolve = |displacement: i64| -> Result<u32> {
        u32::try_from(next + displacement).map_err(|_| {
            malformed_error!(
                "Branch at IL_{:04x} targets a negative offset",
                offset
            )
        })
    };

    let mut branch_targets = Vec::new();
    let operand = match (cil_instruction.flow, operand) {
        (
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave,
            Operand::Immediate(value),
        ) => {
            let target = resolve(i64::from(value))?;
            branch_targets.push(target);
            Operand::Target(target)
        }
        (FlowType::Switch, Operand::Switch(displacements)) => {
            for displacement in &displacements {
                branch_targets.push(resolve(i64::from(*displacement))?);
            }
            Operand::Switch(displacements)
        }
        (_, operand) => operand,
    };

    Ok(Instruction {
        offset,
        size,
        opcode: cil_instruction.opcode,
        prefix: cil_instruction.prefix,
        mnemonic: cil_instruction.instr,
        flow_type: cil_instruction.flow,
        operand,
        stack_behavior: cil_instruction.stack,
        branch_targets,
    })
}

/// Decodes instructions until the parser is exhausted.
///
/// # Errors
/// See [`decode_instruction`].
pub fn decode_stream(parser: &mut Parser) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(parser)?);
    }
    Ok(instructions)
}

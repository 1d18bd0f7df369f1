//! The CIL opcode table (ECMA-335 Partition III).
//!
//! Every defined opcode is listed once with its operand encoding, control flow and stack
//! effect. The decoder looks entries up by byte, the encoder by mnemonic; both lookups are
//! built lazily from [`INSTRUCTIONS`].

use std::{collections::HashMap, sync::OnceLock};

use crate::assembly::instruction::{FlowType, OperandType, StackBehavior};

/// Prefix byte of two-byte opcodes.
pub const FE_PREFIX: u8 = 0xFE;

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction {
    /// `0xFE` for two-byte opcodes, zero otherwise
    pub prefix: u8,
    /// The (second) opcode byte
    pub opcode: u8,
    /// Mnemonic
    pub instr: &'static str,
    /// Operand encoding
    pub op_type: OperandType,
    /// Control flow
    pub flow: FlowType,
    /// Stack effect
    pub stack: StackBehavior,
}

impl CilInstruction {
    /// Encoded size of the opcode bytes.
    #[must_use]
    pub const fn opcode_size(&self) -> usize {
        if self.prefix == 0 {
            1
        } else {
            2
        }
    }
}

const fn op(
    opcode: u8,
    instr: &'static str,
    op_type: OperandType,
    flow: FlowType,
    pops: u8,
    pushes: u8,
) -> CilInstruction {
    CilInstruction {
        prefix: 0,
        opcode,
        instr,
        op_type,
        flow,
        stack: StackBehavior {
            pops,
            pushes,
            variable: false,
        },
    }
}

const fn fe(
    opcode: u8,
    instr: &'static str,
    op_type: OperandType,
    flow: FlowType,
    pops: u8,
    pushes: u8,
) -> CilInstruction {
    let mut instruction = op(opcode, instr, op_type, flow, pops, pushes);
    instruction.prefix = FE_PREFIX;
    instruction
}

const fn var(opcode: u8, instr: &'static str, op_type: OperandType, flow: FlowType) -> CilInstruction {
    let mut instruction = op(opcode, instr, op_type, flow, 0, 0);
    instruction.stack.variable = true;
    instruction
}

use FlowType::{
    Call as CALL, ConditionalBranch as COND, EndFinally as ENDF, Leave as LEAVE, Return as RET,
    Sequential as SEQ, Switch as SWITCH, Throw as THROW, UnconditionalBranch as BR,
};
use OperandType::{
    Float32 as F32, Float64 as F64, Int32 as I32, Int64 as I64, Int8 as I8, None as N,
    Switch as SW, Token as TOK, UInt16 as U16, UInt8 as U8,
};

/// Every defined CIL opcode.
pub static INSTRUCTIONS: &[CilInstruction] = &[
    op(0x00, "nop", N, SEQ, 0, 0),
    op(0x01, "break", N, SEQ, 0, 0),
    op(0x02, "ldarg.0", N, SEQ, 0, 1),
    op(0x03, "ldarg.1", N, SEQ, 0, 1),
    op(0x04, "ldarg.2", N, SEQ, 0, 1),
    op(0x05, "ldarg.3", N, SEQ, 0, 1),
    op(0x06, "ldloc.0", N, SEQ, 0, 1),
    op(0x07, "ldloc.1", N, SEQ, 0, 1),
    op(0x08, "ldloc.2", N, SEQ, 0, 1),
    op(0x09, "ldloc.3", N, SEQ, 0, 1),
    op(0x0A, "stloc.0", N, SEQ, 1, 0),
    op(0x0B, "stloc.1", N, SEQ, 1, 0),
    op(0x0C, "stloc.2", N, SEQ, 1, 0),
    op(0x0D, "stloc.3", N, SEQ, 1, 0),
    op(0x0E, "ldarg.s", U8, SEQ, 0, 1),
    op(0x0F, "ldarga.s", U8, SEQ, 0, 1),
    op(0x10, "starg.s", U8, SEQ, 1, 0),
    op(0x11, "ldloc.s", U8, SEQ, 0, 1),
    op(0x12, "ldloca.s", U8, SEQ, 0, 1),
    op(0x13, "stloc.s", U8, SEQ, 1, 0),
    op(0x14, "ldnull", N, SEQ, 0, 1),
    op(0x15, "ldc.i4.m1", N, SEQ, 0, 1),
    op(0x16, "ldc.i4.0", N, SEQ, 0, 1),
    op(0x17, "ldc.i4.1", N, SEQ, 0, 1),
    op(0x18, "ldc.i4.2", N, SEQ, 0, 1),
    op(0x19, "ldc.i4.3", N, SEQ, 0, 1),
    op(0x1A, "ldc.i4.4", N, SEQ, 0, 1),
    op(0x1B, "ldc.i4.5", N, SEQ, 0, 1),
    op(0x1C, "ldc.i4.6", N, SEQ, 0, 1),
    op(0x1D, "ldc.i4.7", N, SEQ, 0, 1),
    op(0x1E, "ldc.i4.8", N, SEQ, 0, 1),
    op(0x1F, "ldc.i4.s", I8, SEQ, 0, 1),
    op(0x20, "ldc.i4", I32, SEQ, 0, 1),
    op(0x21, "ldc.i8", I64, SEQ, 0, 1),
    op(0x22, "ldc.r4", F32, SEQ, 0, 1),
    op(0x23, "ldc.r8", F64, SEQ, 0, 1),
    op(0x25, "dup", N, SEQ, 1, 2),
    op(0x26, "pop", N, SEQ, 1, 0),
    op(0x27, "jmp", TOK, CALL, 0, 0),
    var(0x28, "call", TOK, CALL),
    var(0x29, "calli", TOK, CALL),
    var(0x2A, "ret", N, RET),
    op(0x2B, "br.s", I8, BR, 0, 0),
    op(0x2C, "brfalse.s", I8, COND, 1, 0),
    op(0x2D, "brtrue.s", I8, COND, 1, 0),
    op(0x2E, "beq.s", I8, COND, 2, 0),
    op(0x2F, "bge.s", I8, COND, 2, 0),
    op(0x30, "bgt.s", I8, COND, 2, 0),
    op(0x31, "ble.s", I8, COND, 2, 0),
    op(0x32, "blt.s", I8, COND, 2, 0),
    op(0x33, "bne.un.s", I8, COND, 2, 0),
    op(0x34, "bge.un.s", I8, COND, 2, 0),
    op(0x35, "bgt.un.s", I8, COND, 2, 0),
    op(0x36, "ble.un.s", I8, COND, 2, 0),
    op(0x37, "blt.un.s", I8, COND, 2, 0),
    op(0x38, "br", I32, BR, 0, 0),
    op(0x39, "brfalse", I32, COND, 1, 0),
    op(0x3A, "brtrue", I32, COND, 1, 0),
    op(0x3B, "beq", I32, COND, 2, 0),
    op(0x3C, "bge", I32, COND, 2, 0),
    op(0x3D, "bgt", I32, COND, 2, 0),
    op(0x3E, "ble", I32, COND, 2, 0),
    op(0x3F, "blt", I32, COND, 2, 0),
    op(0x40, "bne.un", I32, COND, 2, 0),
    op(0x41, "bge.un", I32, COND, 2, 0),
    op(0x42, "bgt.un", I32, COND, 2, 0),
    op(0x43, "ble.un", I32, COND, 2, 0),
    op(0x44, "blt.un", I32, COND, 2, 0),
    op(0x45, "switch", SW, SWITCH, 1, 0),
    op(0x46, "ldind.i1", N, SEQ, 1, 1),
    op(0x47, "ldind.u1", N, SEQ, 1, 1),
    op(0x48, "ldind.i2", N, SEQ, 1, 1),
    op(0x49, "ldind.u2", N, SEQ, 1, 1),
    op(0x4A, "ldind.i4", N, SEQ, 1, 1),
    op(0x4B, "ldind.u4", N, SEQ, 1, 1),
    op(0x4C, "ldind.i8", N, SEQ, 1, 1),
    op(0x4D, "ldind.i", N, SEQ, 1, 1),
    op(0x4E, "ldind.r4", N, SEQ, 1, 1),
    op(0x4F, "ldind.r8", N, SEQ, 1, 1),
    op(0x50, "ldind.ref", N, SEQ, 1, 1),
    op(0x51, "stind.ref", N, SEQ, 2, 0),
    op(0x52, "stind.i1", N, SEQ, 2, 0),
    op(0x53, "stind.i2", N, SEQ, 2, 0),
    op(0x54, "stind.i4", N, SEQ, 2, 0),
    op(0x55, "stind.i8", N, SEQ, 2, 0),
    op(0x56, "stind.r4", N, SEQ, 2, 0),
    op(0x57, "stind.r8", N, SEQ, 2, 0),
    op(0x58, "add", N, SEQ, 2, 1),
    op(0x59, "sub", N, SEQ, 2, 1),
    op(0x5A, "mul", N, SEQ, 2, 1),
    op(0x5B, "div", N, SEQ, 2, 1),
    op(0x5C, "div.un", N, SEQ, 2, 1),
    op(0x5D, "rem", N, SEQ, 2, 1),
    op(0x5E, "rem.un", N, SEQ, 2, 1),
    op(0x5F, "and", N, SEQ, 2, 1),
    op(0x60, "or", N, SEQ, 2, 1),
    op(0x61, "xor", N, SEQ, 2, 1),
    op(0x62, "shl", N, SEQ, 2, 1),
    op(0x63, "shr", N, SEQ, 2, 1),
    op(0x64, "shr.un", N, SEQ, 2, 1),
    op(0x65, "neg", N, SEQ, 1, 1),
    op(0x66, "not", N, SEQ, 1, 1),
    op(0x67, "conv.i1", N, SEQ, 1, 1),
    op(0x68, "conv.i2", N, SEQ, 1, 1),
    op(0x69, "conv.i4", N, SEQ, 1, 1),
    op(0x6A, "conv.i8", N, SEQ, 1, 1),
    op(0x6B, "conv.r4", N, SEQ, 1, 1),
    op(0x6C, "conv.r8", N, SEQ, 1, 1),
    op(0x6D, "conv.u4", N, SEQ, 1, 1),
    op(0x6E, "conv.u8", N, SEQ, 1, 1),
    var(0x6F, "callvirt", TOK, CALL),
    op(0x70, "cpobj", TOK, SEQ, 2, 0),
    op(0x71, "ldobj", TOK, SEQ, 1, 1),
    op(0x72, "ldstr", TOK, SEQ, 0, 1),
    var(0x73, "newobj", TOK, CALL),
    op(0x74, "castclass", TOK, SEQ, 1, 1),
    op(0x75, "isinst", TOK, SEQ, 1, 1),
    op(0x76, "conv.r.un", N, SEQ, 1, 1),
    op(0x79, "unbox", TOK, SEQ, 1, 1),
    op(0x7A, "throw", N, THROW, 1, 0),
    op(0x7B, "ldfld", TOK, SEQ, 1, 1),
    op(0x7C, "ldflda", TOK, SEQ, 1, 1),
    op(0x7D, "stfld", TOK, SEQ, 2, 0),
    op(0x7E, "ldsfld", TOK, SEQ, 0, 1),
    op(0x7F, "ldsflda", TOK, SEQ, 0, 1),
    op(0x80, "stsfld", TOK, SEQ, 1, 0),
    op(0x81, "stobj", TOK, SEQ, 2, 0),
    op(0x82, "conv.ovf.i1.un", N, SEQ, 1, 1),
    op(0x83, "conv.ovf.i2.un", N, SEQ, 1, 1),
    op(0x84, "conv.ovf.i4.un", N, SEQ, 1, 1),
    op(0x85, "conv.ovf.i8.un", N, SEQ, 1, 1),
    op(0x86, "conv.ovf.u1.un", N, SEQ, 1, 1),
    op(0x87, "conv.ovf.u2.un", N, SEQ, 1, 1),
    op(0x88, "conv.ovf.u4.un", N, SEQ, 1, 1),
    op(0x89, "conv.ovf.u8.un", N, SEQ, 1, 1),
    op(0x8A, "conv.ovf.i.un", N, SEQ, 1, 1),
    op(0x8B, "conv.ovf.u.un", N, SEQ, 1, 1),
    op(0x8C, "box", TOK, SEQ, 1, 1),
    op(0x8D, "newarr", TOK, SEQ, 1, 1),
    op(0x8E, "ldlen", N, SEQ, 1, 1),
    op(0x8F, "ldelema", TOK, SEQ, 2, 1),
    op(0x90, "ldelem.i1", N, SEQ, 2, 1),
    op(0x91, "ldelem.u1", N, SEQ, 2, 1),
    op(0x92, "ldelem.i2", N, SEQ, 2, 1),
    op(0x93, "ldelem.u2", N, SEQ, 2, 1),
    op(0x94, "ldelem.i4", N, SEQ, 2, 1),
    op(0x95, "ldelem.u4", N, SEQ, 2, 1),
    op(0x96, "ldelem.i8", N, SEQ, 2, 1),
    op(0x97, "ldelem.i", N, SEQ, 2, 1),
    op(0x98, "ldelem.r4", N, SEQ, 2, 1),
    op(0x99, "ldelem.r8", N, SEQ, 2, 1),
    op(0x9A, "ldelem.ref", N, SEQ, 2, 1),
    op(0x9B, "stelem.i", N, SEQ, 3, 0),
    op(0x9C, "stelem.i1", N, SEQ, 3, 0),
    op(0x9D, "stelem.i2", N, SEQ, 3, 0),
    op(0x9E, "stelem.i4", N, SEQ, 3, 0),
    op(0x9F, "stelem.i8", N, SEQ, 3, 0),
    op(0xA0, "stelem.r4", N, SEQ, 3, 0),
    op(0xA1, "stelem.r8", N, SEQ, 3, 0),
    op(0xA2, "stelem.ref", N, SEQ, 3, 0),
    op(0xA3, "ldelem", TOK, SEQ, 2, 1),
    op(0xA4, "stelem", TOK, SEQ, 3, 0),
    op(0xA5, "unbox.any", TOK, SEQ, 1, 1),
    op(0xB3, "conv.ovf.i1", N, SEQ, 1, 1),
    op(0xB4, "conv.ovf.u1", N, SEQ, 1, 1),
    op(0xB5, "conv.ovf.i2", N, SEQ, 1, 1),
    op(0xB6, "conv.ovf.u2", N, SEQ, 1, 1),
    op(0xB7, "conv.ovf.i4", N, SEQ, 1, 1),
    op(0xB8, "conv.ovf.u4", N, SEQ, 1, 1),
    op(0xB9, "conv.ovf.i8", N, SEQ, 1, 1),
    op(0xBA, "conv.ovf.u8", N, SEQ, 1, 1),
    op(0xC2, "refanyval", TOK, SEQ, 1, 1),
    op(0xC3, "ckfinite", N, SEQ, 1, 1),
    op(0xC6, "mkrefany", TOK, SEQ, 1, 1),
    op(0xD0, "ldtoken", TOK, SEQ, 0, 1),
    op(0xD1, "conv.u2", N, SEQ, 1, 1),
    op(0xD2, "conv.u1", N, SEQ, 1, 1),
    op(0xD3, "conv.i", N, SEQ, 1, 1),
    op(0xD4, "conv.ovf.i", N, SEQ, 1, 1),
    op(0xD5, "conv.ovf.u", N, SEQ, 1, 1),
    op(0xD6, "add.ovf", N, SEQ, 2, 1),
    op(0xD7, "add.ovf.un", N, SEQ, 2, 1),
    op(0xD8, "mul.ovf", N, SEQ, 2, 1),
    op(0xD9, "mul.ovf.un", N, SEQ, 2, 1),
    op(0xDA, "sub.ovf", N, SEQ, 2, 1),
    op(0xDB, "sub.ovf.un", N, SEQ, 2, 1),
    op(0xDC, "endfinally", N, ENDF, 0, 0),
    op(0xDD, "leave", I32, LEAVE, 0, 0),
    op(0xDE, "leave.s", I8, LEAVE, 0, 0),
    op(0xDF, "stind.i", N, SEQ, 2, 0),
    op(0xE0, "conv.u", N, SEQ, 1, 1),
    fe(0x00, "arglist", N, SEQ, 0, 1),
    fe(0x01, "ceq", N, SEQ, 2, 1),
    fe(0x02, "cgt", N, SEQ, 2, 1),
    fe(0x03, "cgt.un", N, SEQ, 2, 1),
    fe(0x04, "clt", N, SEQ, 2, 1),
    fe(0x05, "clt.un", N, SEQ, 2, 1),
    fe(0x06, "ldftn", TOK, SEQ, 0, 1),
    fe(0x07, "ldvirtftn", TOK, SEQ, 1, 1),
    fe(0x09, "ldarg", U16, SEQ, 0, 1),
    fe(0x0A, "ldarga", U16, SEQ, 0, 1),
    fe(0x0B, "starg", U16, SEQ, 1, 0),
    fe(0x0C, "ldloc", U16, SEQ, 0, 1),
    fe(0x0D, "ldloca", U16, SEQ, 0, 1),
    fe(0x0E, "stloc", U16, SEQ, 1, 0),
    fe(0x0F, "localloc", N, SEQ, 1, 1),
    fe(0x11, "endfilter", N, ENDF, 1, 0),
    fe(0x12, "unaligned.", U8, SEQ, 0, 0),
    fe(0x13, "volatile.", N, SEQ, 0, 0),
    fe(0x14, "tail.", N, SEQ, 0, 0),
    fe(0x15, "initobj", TOK, SEQ, 1, 0),
    fe(0x16, "constrained.", TOK, SEQ, 0, 0),
    fe(0x17, "cpblk", N, SEQ, 3, 0),
    fe(0x18, "initblk", N, SEQ, 3, 0),
    fe(0x19, "no.", U8, SEQ, 0, 0),
    fe(0x1A, "rethrow", N, THROW, 0, 0),
    fe(0x1C, "sizeof", TOK, SEQ, 0, 1),
    fe(0x1D, "refanytype", N, SEQ, 1, 1),
    fe(0x1E, "readonly.", N, SEQ, 0, 0),
];

fn opcode_lookup() -> &'static HashMap<(u8, u8), &'static CilInstruction> {
    static LOOKUP: OnceLock<HashMap<(u8, u8), &'static CilInstruction>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        INSTRUCTIONS
            .iter()
            .map(|instruction| ((instruction.prefix, instruction.opcode), instruction))
            .collect()
    })
}

fn mnemonic_lookup() -> &'static HashMap<&'static str, &'static CilInstruction> {
    static LOOKUP: OnceLock<HashMap<&'static str, &'static CilInstruction>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        INSTRUCTIONS
            .iter()
            .map(|instruction| (instruction.instr, instruction))
            .collect()
    })
}

/// Looks up an opcode; `prefix` is zero for single-byte opcodes.
#[must_use]
pub fn by_opcode(prefix: u8, opcode: u8) -> Option<&'static CilInstruction> {
    opcode_lookup().get(&(prefix, opcode)).copied()
}

/// Looks up an opcode by its mnemonic.
#[must_use]
pub fn by_mnemonic(mnemonic: &str) -> Option<&'static CilInstruction> {
    mnemonic_lookup().get(mnemonic).copied()
}

//! IR opcodes and instructions.

use cc_interner::Name;
use smallvec::SmallVec;

use crate::entity::{Bb, VReg};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Three-address opcode set.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    /// Address of a local frame slot (`BOFS`).
    Bofs,
    /// Address of a global symbol (`IOFS`).
    Iofs,
    /// Address of an anonymous stack slot, e.g. a spill (`SOFS`).
    Sofs,
    Load,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    BitNot,
    /// Compare-and-set: dst = (src1 CMP src2) ? 1 : 0.
    Cond(CmpOp),
    Jump,
    /// Conditional jump: branches to `target` if src1 is zero (false-edge),
    /// matching the lowering note "cond-jmp-false".
    CondJumpFalse,
    TableJump,
    Precall,
    PushArg,
    Call,
    Result,
    SubSp,
    Cast,
    Mov,
    /// Opaque inline-asm fragment, carried as interned text.
    Asm(Name),
    /// Function return, required as a BB terminator for `return` statements
    /// (src1 = value, or none for `void`/fallthrough-undefined).
    Ret,
}

/// A single three-address IR instruction. Not every field is meaningful for
/// every opcode; see each `IrBuilder` emit helper for which fields it sets.
#[derive(Clone, Debug)]
pub struct Inst {
    pub opcode: Opcode,
    pub dst: Option<VReg>,
    pub src1: Option<VReg>,
    pub src2: Option<VReg>,
    /// Literal operand: local frame offset for BOFS, symbol-relative for
    /// IOFS, immediate for arithmetic-with-immediate, arg index for
    /// PUSHARG/PRECALL's stack-area size, case count for TABLEJUMP.
    pub imm: i64,
    pub sym: Option<Name>,
    pub target: Option<Bb>,
    /// Dense jump table, populated only for `TableJump`. Most switches have
    /// only a handful of cases, so the common table fits inline.
    pub table: SmallVec<[Bb; 4]>,
    pub unsigned: bool,
    pub size: u32,
}

impl Inst {
    pub fn new(opcode: Opcode) -> Self {
        Inst {
            opcode,
            dst: None,
            src1: None,
            src2: None,
            imm: 0,
            sym: None,
            target: None,
            table: SmallVec::new(),
            unsigned: false,
            size: 4,
        }
    }

    pub fn is_control_transfer(&self) -> bool {
        matches!(self.opcode, Opcode::Jump | Opcode::CondJumpFalse | Opcode::TableJump | Opcode::Ret)
    }
}

//! Per-target opcode dispatch.
//!
//! One function walks every IR opcode; target divergence is expressed as
//! match arms on `Target` inside each opcode's branch, not as separate
//! per-target source files, since the dispatch table is the same shape for
//! all three targets and only the mnemonic/operand syntax moves.

use std::collections::HashMap;

use cc_assemble::{AsmUnit, Section};
use cc_interner::Interner;
use cc_ir::{bank_for, Bb, CmpOp, Inst, IrFunction, Location, Opcode, RegClass, Target, VReg};
use log::trace;

use crate::regnames::{frame_pointer, reg_name, stack_pointer};

/// Deduplicating table for string-literal `.rodata` blobs: equal string
/// literals share one emitted blob.
pub struct RodataPool {
    seen: HashMap<Vec<u8>, String>,
}

impl RodataPool {
    pub fn new() -> Self {
        RodataPool { seen: HashMap::new() }
    }

    pub fn intern(&mut self, bytes: &[u8], unit: &mut AsmUnit) -> String {
        if let Some(label) = self.seen.get(bytes) {
            return label.clone();
        }
        let label = format!(".Lstr{}", self.seen.len());
        unit.rodata.label(label.clone());
        let mut with_nul = bytes.to_vec();
        with_nul.push(0);
        let text = with_nul.iter().map(u8::to_string).collect::<Vec<_>>().join(", ");
        unit.rodata.directive(format!(".byte {text}"));
        self.seen.insert(bytes.to_vec(), label.clone());
        label
    }
}

impl Default for RodataPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Bb`'s only public numeric view is its `Display` impl (`"bb<N>"`,
/// from `entity_impl!`); parsing it back keeps this crate from needing a
/// direct `cranelift-entity` dependency just to recover an index.
fn bb_index(bb: Bb) -> u32 {
    format!("{bb}")[2..].parse().unwrap_or(0)
}

fn bb_label(fname: &str, bb: Bb) -> String {
    format!(".L{fname}.bb{}", bb_index(bb))
}

fn operand(target: Target, func: &IrFunction, v: VReg, fp: &str) -> String {
    match func.vregs[v].location {
        Location::Reg(r) => reg_name(target, func.vregs[v].class, r),
        Location::Spill(off) => mem_operand(target, fp, off),
        Location::Unassigned => unreachable!("vreg read before allocation"),
    }
}

fn mem_operand(target: Target, fp: &str, off: i64) -> String {
    match target {
        Target::X86_64 => format!("[{fp}{off:+}]"),
        Target::Aarch64 => format!("[{fp}, #{off}]"),
        Target::Riscv64 => format!("{off}({fp})"),
    }
}

fn align_16(n: i64) -> i64 {
    (n + 15) / 16 * 16
}

/// Moves `sp` by `delta` bytes: positive reserves stack space, negative
/// gives it back. A no-op at `delta == 0` so callers don't need to guard.
fn adjust_sp(target: Target, text: &mut Section, sp: &str, delta: i64) {
    if delta == 0 {
        return;
    }
    match target {
        Target::X86_64 if delta > 0 => text.instr(format!("sub {sp}, {delta}")),
        Target::X86_64 => text.instr(format!("add {sp}, {}", -delta)),
        Target::Aarch64 if delta > 0 => text.instr(format!("sub {sp}, {sp}, #{delta}")),
        Target::Aarch64 => text.instr(format!("add {sp}, {sp}, #{}", -delta)),
        Target::Riscv64 => text.instr(format!("addi {sp}, {sp}, {}", -delta)),
    }
}

/// Emits one function's prologue, body, and epilogue into `unit.text`.
pub fn emit_function(func: &IrFunction, target: Target, interner: &Interner, unit: &mut AsmUnit, rodata: &mut RodataPool) {
    trace!("emitting function body for target {}", target.name());
    let name = interner.resolve(func.name).to_string();
    let fp = frame_pointer(target);
    let sp = stack_pointer(target);

    if !func.is_static {
        unit.text.directive(format!(".global {name}"));
    }
    unit.text.label(name.clone());

    let frame_size = align_16(func.frame.locals_size + func.frame.spill_size + func.frame.outgoing_args_size);
    emit_prologue(target, &mut unit.text, fp, sp, frame_size, func);

    let mut pending_outgoing = 0i64;
    for bb in func.rpo() {
        unit.text.label(bb_label(&name, bb));
        for inst in &func.blocks[bb].insts {
            emit_inst(target, func, &name, inst, &mut unit.text, fp, sp, interner, rodata, &mut pending_outgoing);
        }
    }

    emit_epilogue(target, &mut unit.text, fp, sp, frame_size, func);
}

fn emit_prologue(target: Target, text: &mut Section, fp: &str, sp: &str, frame_size: i64, func: &IrFunction) {
    match target {
        Target::X86_64 => {
            text.instr(format!("push {fp}"));
            text.instr(format!("mov {fp}, {sp}"));
            if frame_size > 0 {
                text.instr(format!("sub {sp}, {frame_size}"));
            }
            for &r in &func.callee_saves_used {
                text.instr(format!("push {}", reg_name(target, RegClass::Int, r)));
            }
        }
        Target::Aarch64 => {
            text.instr(format!("stp {fp}, x30, [{sp}, #-16]!"));
            text.instr(format!("mov {fp}, {sp}"));
            if frame_size > 0 {
                text.instr(format!("sub {sp}, {sp}, #{frame_size}"));
            }
            for &r in &func.callee_saves_used {
                text.instr(format!("str {}, [{sp}, #-8]!", reg_name(target, RegClass::Int, r)));
            }
        }
        Target::Riscv64 => {
            text.instr(format!("addi {sp}, {sp}, -{}", frame_size + 16));
            text.instr(format!("sd ra, {}({sp})", frame_size + 8));
            text.instr(format!("sd {fp}, {frame_size}({sp})"));
            text.instr(format!("addi {fp}, {sp}, {}", frame_size + 16));
            for (i, &r) in func.callee_saves_used.iter().enumerate() {
                text.instr(format!("sd {}, {}({sp})", reg_name(target, RegClass::Int, r), i * 8));
            }
        }
    }
}

fn emit_epilogue(target: Target, text: &mut Section, fp: &str, sp: &str, frame_size: i64, func: &IrFunction) {
    match target {
        Target::X86_64 => {
            for &r in func.callee_saves_used.iter().rev() {
                text.instr(format!("pop {}", reg_name(target, RegClass::Int, r)));
            }
            text.instr(format!("mov {sp}, {fp}"));
            text.instr(format!("pop {fp}"));
            text.instr("ret".to_string());
        }
        Target::Aarch64 => {
            for &r in func.callee_saves_used.iter().rev() {
                text.instr(format!("ldr {}, [{sp}], #8", reg_name(target, RegClass::Int, r)));
            }
            text.instr(format!("mov {sp}, {fp}"));
            text.instr(format!("ldp {fp}, x30, [{sp}], #16"));
            text.instr("ret".to_string());
        }
        Target::Riscv64 => {
            for (i, &r) in func.callee_saves_used.iter().enumerate().rev() {
                text.instr(format!("ld {}, {}({sp})", reg_name(target, RegClass::Int, r), i * 8));
            }
            text.instr(format!("ld ra, {}({sp})", frame_size + 8));
            text.instr(format!("ld {fp}, {frame_size}({sp})"));
            text.instr(format!("addi {sp}, {sp}, {}", frame_size + 16));
            text.instr("ret".to_string());
        }
    }
}

fn cmp_suffix(target: Target, op: CmpOp) -> &'static str {
    match (target, op) {
        (Target::X86_64, CmpOp::Lt) => "setl",
        (Target::X86_64, CmpOp::Le) => "setle",
        (Target::X86_64, CmpOp::Gt) => "setg",
        (Target::X86_64, CmpOp::Ge) => "setge",
        (Target::X86_64, CmpOp::Eq) => "sete",
        (Target::X86_64, CmpOp::Ne) => "setne",
        (_, CmpOp::Lt) => "slt",
        (_, CmpOp::Le) => "sle",
        (_, CmpOp::Gt) => "sgt",
        (_, CmpOp::Ge) => "sge",
        (_, CmpOp::Eq) => "seq",
        (_, CmpOp::Ne) => "sne",
    }
}

fn arith_mnemonic(opcode: Opcode, unsigned: bool) -> &'static str {
    match opcode {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Div if unsigned => "divu",
        Opcode::Div => "div",
        Opcode::Mod if unsigned => "remu",
        Opcode::Mod => "rem",
        Opcode::And => "and",
        Opcode::Or => "or",
        Opcode::Xor => "xor",
        Opcode::Shl => "shl",
        Opcode::Shr if unsigned => "shr",
        Opcode::Shr => "sar",
        _ => unreachable!("not an arithmetic opcode"),
    }
}

fn emit_inst(
    target: Target,
    func: &IrFunction,
    fname: &str,
    inst: &Inst,
    text: &mut Section,
    fp: &str,
    sp: &str,
    interner: &Interner,
    rodata: &mut RodataPool,
    pending_outgoing: &mut i64,
) {
    let op = |v: VReg| operand(target, func, v, fp);
    let _ = rodata;
    match inst.opcode {
        Opcode::Mov => {
            let d = inst.dst.map(op).unwrap_or_default();
            let src = inst.src1.map(op).unwrap_or_else(|| inst.imm.to_string());
            text.instr(format!("mov {d}, {src}"));
        }
        Opcode::Bofs | Opcode::Sofs => {
            let d = inst.dst.map(op).unwrap_or_default();
            text.instr(format!("lea {d}, {}", mem_operand(target, fp, inst.imm)));
        }
        Opcode::Iofs => {
            let d = inst.dst.map(op).unwrap_or_default();
            let sym = inst.sym.map(|n| interner.resolve(n).to_string()).unwrap_or_default();
            text.instr(format!("lea {d}, [rip + {sym}]"));
        }
        Opcode::Load => {
            let d = inst.dst.map(op).unwrap_or_default();
            let a = inst.src1.map(op).unwrap_or_default();
            text.instr(format!("load.{} {d}, [{a}]", inst.size));
        }
        Opcode::Store => {
            let a = inst.src1.map(op).unwrap_or_default();
            let v = inst.src2.map(op).unwrap_or_default();
            text.instr(format!("store.{} [{a}], {v}", inst.size));
        }
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::And | Opcode::Or | Opcode::Xor
        | Opcode::Shl | Opcode::Shr => {
            let mnem = arith_mnemonic(inst.opcode, inst.unsigned);
            let d = inst.dst.map(op).unwrap_or_default();
            let a = inst.src1.map(op).unwrap_or_default();
            let b = inst.src2.map(op).unwrap_or_default();
            text.instr(format!("{mnem} {d}, {a}, {b}"));
        }
        Opcode::Neg => {
            let d = inst.dst.map(op).unwrap_or_default();
            let a = inst.src1.map(op).unwrap_or_default();
            text.instr(format!("neg {d}, {a}"));
        }
        Opcode::BitNot => {
            let d = inst.dst.map(op).unwrap_or_default();
            let a = inst.src1.map(op).unwrap_or_default();
            text.instr(format!("not {d}, {a}"));
        }
        Opcode::Cond(cmp) => {
            let d = inst.dst.map(op).unwrap_or_default();
            let a = inst.src1.map(op).unwrap_or_default();
            let b = inst.src2.map(op).unwrap_or_default();
            text.instr(format!("cmp {a}, {b}"));
            text.instr(format!("{} {d}", cmp_suffix(target, cmp)));
        }
        Opcode::Jump => {
            text.instr(format!("jmp {}", inst.target.map(|t| bb_label(fname, t)).unwrap_or_default()));
        }
        Opcode::CondJumpFalse => {
            let c = inst.src1.map(op).unwrap_or_default();
            text.instr(format!("test {c}, {c}"));
            text.instr(format!("jz {}", inst.target.map(|t| bb_label(fname, t)).unwrap_or_default()));
        }
        Opcode::TableJump => {
            let idx = inst.src1.map(op).unwrap_or_default();
            let table_label = format!(".L{fname}.tbl{}", text.fragments.len());
            text.label(table_label.clone());
            for bb in &inst.table {
                text.directive(format!(".quad {}", bb_label(fname, *bb)));
            }
            text.instr(format!("jmp [{idx} * 8 + {table_label}]"));
        }
        Opcode::Precall => {
            *pending_outgoing = inst.imm;
            adjust_sp(target, text, sp, inst.imm);
        }
        Opcode::PushArg => {
            let v = inst.src1.expect("pusharg has no source value");
            let src = op(v);
            let class = func.vregs[v].class;
            let bank = bank_for(target);
            let regs = if class == RegClass::Int { bank.int_param_regs() } else { bank.float_param_regs() };
            let slot = inst.imm as usize;
            if slot < regs.len() {
                let dst = reg_name(target, class, regs[slot]);
                text.instr(format!("mov {dst}, {src}"));
            } else {
                let addr = mem_operand(target, sp, ((slot - regs.len()) * 8) as i64);
                text.instr(format!("store.{} {addr}, {src}", inst.size));
            }
        }
        Opcode::Call => {
            if let Some(sym) = inst.sym {
                text.instr(format!("call {}", interner.resolve(sym)));
            } else {
                let a = inst.src1.map(op).unwrap_or_default();
                text.instr(format!("call {a}"));
            }
            adjust_sp(target, text, sp, -*pending_outgoing);
            *pending_outgoing = 0;
        }
        Opcode::Result => {
            let d = inst.dst.map(op).unwrap_or_default();
            let ret = reg_name(target, func.vregs[inst.dst.unwrap()].class, 0);
            text.instr(format!("mov {d}, {ret}"));
        }
        Opcode::SubSp => {
            adjust_sp(target, text, sp, inst.imm);
        }
        Opcode::Cast => {
            let d = inst.dst.map(op).unwrap_or_default();
            let a = inst.src1.map(op).unwrap_or_default();
            text.instr(format!("mov {d}, {a}"));
        }
        Opcode::Asm(name) => {
            text.instr(interner.resolve(name).to_string());
        }
        Opcode::Ret => {
            if let Some(v) = inst.src1 {
                let ret = reg_name(target, func.vregs[v].class, 0);
                text.instr(format!("mov {ret}, {}", op(v)));
            }
        }
    }
}

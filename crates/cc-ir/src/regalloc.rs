//! Linear-scan register allocation.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::entity::{Location, RegClass, VReg};
use crate::func::IrFunction;
use crate::inst::Opcode;
use crate::target::RegisterBank;

#[derive(Clone, Copy, Debug)]
struct Interval {
    vreg: VReg,
    start: u32,
    end: u32,
}

/// Program points are a flat, per-RPO-visit instruction counter; sufficient
/// for "sort by start point" linear scan without needing real SSA numbering.
fn program_points(func: &IrFunction) -> (Vec<(crate::entity::Bb, usize)>, HashMap<VReg, (u32, u32)>) {
    let order = func.rpo();
    let mut point = 0u32;
    let mut flat: Vec<(crate::entity::Bb, usize)> = Vec::new();
    let mut ranges: HashMap<VReg, (u32, u32)> = HashMap::new();

    for &bb in &order {
        for (i, inst) in func.blocks[bb].insts.iter().enumerate() {
            flat.push((bb, i));
            if let Some(d) = inst.dst {
                let e = ranges.entry(d).or_insert((point, point));
                e.0 = e.0.min(point);
                e.1 = e.1.max(point);
            }
            for src in [inst.src1, inst.src2] {
                if let Some(s) = src {
                    let e = ranges.entry(s).or_insert((point, point));
                    e.1 = e.1.max(point);
                }
            }
            point += 1;
        }
    }
    (flat, ranges)
}

/// Fixed-point backwards liveness across edges, widening any interval that
/// is live-out of a block to cover the whole block: unions liveness across
/// control-flow edges until it stops changing.
fn widen_across_edges(func: &IrFunction, flat: &[(crate::entity::Bb, usize)], ranges: &mut HashMap<VReg, (u32, u32)>) {
    let mut block_span: HashMap<crate::entity::Bb, (u32, u32)> = HashMap::new();
    for (point, (bb, _)) in flat.iter().enumerate() {
        let e = block_span.entry(*bb).or_insert((point as u32, point as u32));
        e.0 = e.0.min(point as u32);
        e.1 = e.1.max(point as u32);
    }

    let mut changed = true;
    let mut live_out: HashMap<crate::entity::Bb, HashSet<VReg>> = HashMap::new();
    while changed {
        changed = false;
        for bb in func.blocks.keys() {
            let mut out: HashSet<VReg> = HashSet::new();
            for &succ in &func.blocks[bb].succs {
                if let Some(s) = live_out.get(&succ) {
                    out.extend(s.iter().copied());
                }
            }
            let entry = live_out.entry(bb).or_default();
            if &out != entry {
                *entry = out;
                changed = true;
            }
        }
    }

    for (bb, vregs) in &live_out {
        if let Some(&(_, bb_end)) = block_span.get(bb) {
            for v in vregs {
                if let Some(r) = ranges.get_mut(v) {
                    r.1 = r.1.max(bb_end);
                }
            }
        }
    }
}

/// Runs register allocation over one function in place, assigning every
/// VReg a `Location::Reg` or `Location::Spill`.
pub fn allocate(func: &mut IrFunction, bank: &dyn RegisterBank) {
    debug!("running linear-scan register allocation");
    let (flat, mut ranges) = program_points(func);
    widen_across_edges(func, &flat, &mut ranges);

    let mut by_class: HashMap<RegClass, Vec<Interval>> = HashMap::new();
    for (&vreg, &(start, end)) in &ranges {
        let class = func.vregs[vreg].class;
        by_class.entry(class).or_default().push(Interval { vreg, start, end });
    }

    let mut spill_cursor = func.frame.locals_size;

    for (class, mut intervals) in by_class {
        intervals.sort_by_key(|iv| iv.start);
        let all_regs: Vec<u8> = bank
            .allocatable(class)
            .iter()
            .copied()
            .filter(|r| !bank.reserved_scratch(class).contains(r))
            .collect();

        let mut free: Vec<u8> = all_regs.clone();
        let mut active: Vec<Interval> = Vec::new();
        let mut assigned: HashMap<VReg, u8> = HashMap::new();

        for iv in intervals {
            active.retain(|a| {
                if a.end < iv.start {
                    if let Some(&r) = assigned.get(&a.vreg) {
                        free.push(r);
                    }
                    false
                } else {
                    true
                }
            });

            if let Some(r) = free.pop() {
                assigned.insert(iv.vreg, r);
                active.push(iv);
                active.sort_by_key(|a| a.end);
            } else {
                // Spill the active interval ending furthest out, or the
                // current one if it ends later.
                let spill_idx = active.len() - 1;
                if active[spill_idx].end > iv.end {
                    let victim = active.remove(spill_idx);
                    let r = assigned.remove(&victim.vreg).unwrap();
                    spill_cursor -= 8;
                    func.vregs[victim.vreg].location = Location::Spill(spill_cursor);
                    assigned.insert(iv.vreg, r);
                    active.push(iv);
                    active.sort_by_key(|a| a.end);
                } else {
                    spill_cursor -= 8;
                    func.vregs[iv.vreg].location = Location::Spill(spill_cursor);
                }
            }
        }

        for (vreg, reg) in &assigned {
            func.vregs[*vreg].location = Location::Reg(*reg);
        }
    }

    func.frame.spill_size = func.frame.locals_size - spill_cursor;

    // Callee-save bookkeeping.
    let mut used = HashSet::new();
    for data in func.vregs.values() {
        if let Location::Reg(r) = data.location {
            if bank.is_callee_saved(data.class, r) {
                used.insert(r);
            }
        }
    }
    func.callee_saves_used = used.into_iter().collect();
    func.callee_saves_used.sort_unstable();

    trace!("allocation complete, {} callee-saves in use", func.callee_saves_used.len());
}

/// Post-allocation peephole tweaks.
pub fn tweak_irs(func: &mut IrFunction) {
    for block in func.blocks.values_mut() {
        for inst in &mut block.insts {
            // sub 0, x -> neg x
            if inst.opcode == Opcode::Sub {
                if let (Some(s1), Some(s2)) = (inst.src1, inst.src2) {
                    if func.vregs[s1].const_value == Some(0) {
                        inst.opcode = Opcode::Neg;
                        inst.src1 = Some(s2);
                        inst.src2 = None;
                    }
                }
            }
            // Swap commutative operands so a constant (if any) sits on the
            // right, matching what most encoders expect for an immediate form.
            if matches!(inst.opcode, Opcode::Add | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor) {
                if let (Some(a), Some(b)) = (inst.src1, inst.src2) {
                    if func.vregs[a].const_value.is_some() && func.vregs[b].const_value.is_none() {
                        inst.src1 = Some(b);
                        inst.src2 = Some(a);
                    }
                }
            }
        }
    }
}

//! `FuncBackend`: per-function aggregate of BBs, allocator state, and
//! frame layout.

use cranelift_entity::{EntityRef, PrimaryMap};

use cc_interner::Name;

use crate::block::BasicBlock;
use crate::entity::{Bb, VReg, VRegData};

#[derive(Clone, Debug, Default)]
pub struct FrameLayout {
    /// Bytes for spilled/materialized locals, growing downward from 0.
    pub locals_size: i64,
    /// Bytes reserved for register-allocator spill slots, appended after
    /// locals.
    pub spill_size: i64,
    /// Bytes for outgoing stack-passed call arguments (the high-water mark
    /// across every call site in the function).
    pub outgoing_args_size: i64,
    /// True once a local's address is taken and the frame-pointer-relative
    /// area must exist.
    pub has_materialized_locals: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FuncFlags {
    pub is_leaf: bool,
    pub uses_variadic: bool,
    pub requires_frame_pointer: bool,
}

pub struct IrFunction {
    pub name: Name,
    pub blocks: PrimaryMap<Bb, BasicBlock>,
    pub vregs: PrimaryMap<VReg, VRegData>,
    pub entry: Bb,
    pub frame: FrameLayout,
    pub flags: FuncFlags,
    /// Callee-save physical registers actually clobbered, filled in by the
    /// allocator.
    pub callee_saves_used: Vec<u8>,
    pub is_static: bool,
    pub is_variadic: bool,
    pub param_count: usize,
}

impl IrFunction {
    pub fn new(name: Name) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlock::default());
        IrFunction {
            name,
            blocks,
            vregs: PrimaryMap::new(),
            entry,
            frame: FrameLayout::default(),
            flags: FuncFlags::default(),
            callee_saves_used: Vec::new(),
            is_static: false,
            is_variadic: false,
            param_count: 0,
        }
    }

    pub fn new_block(&mut self) -> Bb {
        self.blocks.push(BasicBlock::default())
    }

    /// Reverse-post-order block visitation, used by liveness analysis and by
    /// the emitter's default walk order, so every phase visits blocks in one
    /// deterministic order.
    pub fn rpo(&self) -> Vec<Bb> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.blocks.len()];
        fn dfs(f: &IrFunction, bb: Bb, visited: &mut Vec<bool>, post: &mut Vec<Bb>) {
            let idx = bb.index();
            if visited[idx] {
                return;
            }
            visited[idx] = true;
            for &succ in &f.blocks[bb].succs {
                dfs(f, succ, visited, post);
            }
            post.push(bb);
        }
        dfs(self, self.entry, &mut visited, &mut order);
        order.reverse();
        order
    }
}

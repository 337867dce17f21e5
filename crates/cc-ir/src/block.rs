//! Basic blocks and the function-level control-flow graph.

use crate::entity::Bb;
use crate::inst::Inst;

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    pub insts: Vec<Inst>,
    pub preds: Vec<Bb>,
    pub succs: Vec<Bb>,
}

impl BasicBlock {
    /// Invariant: only the last instruction may be a control transfer.
    pub fn check_invariant(&self) -> bool {
        if self.insts.is_empty() {
            return true;
        }
        self.insts[..self.insts.len() - 1]
            .iter()
            .all(|i| !i.is_control_transfer())
    }
}

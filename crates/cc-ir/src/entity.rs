//! IR entity handles: virtual registers and basic blocks.
//!
//! Following `cranelift-entity`'s pattern: opaque `u32` indices into
//! arena-owned `PrimaryMap`s rather than owning references, per the "cyclic
//! data … indices into arena-owned vectors" design note — a BB's successor
//! list and a VReg's uses both need to refer back into structures that
//! outlive any one borrow.

use cranelift_entity::entity_impl;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);
entity_impl!(VReg, "v");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bb(u32);
entity_impl!(Bb, "bb");

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RegClass {
    Int,
    Float,
}

/// A VReg after allocation: either a physical register or a spill slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Location {
    Unassigned,
    Reg(u8),
    Spill(i64),
}

#[derive(Clone, Debug)]
pub struct VRegData {
    pub width: u32,
    pub class: RegClass,
    pub unsigned: bool,
    /// Folded literal value, when the builder can prove one statically.
    pub const_value: Option<i128>,
    pub location: Location,
}

impl VRegData {
    pub fn new(width: u32, class: RegClass, unsigned: bool) -> Self {
        VRegData { width, class, unsigned, const_value: None, location: Location::Unassigned }
    }
}

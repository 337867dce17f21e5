//! Target capability descriptors: a `RegisterBank` plus a parameter-passing
//! mapping stand in for per-target conditional compilation.

use crate::entity::RegClass;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Target {
    X86_64,
    Aarch64,
    Riscv64,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::X86_64 => "x86_64",
            Target::Aarch64 => "aarch64",
            Target::Riscv64 => "riscv64",
        }
    }
}

/// Integer/float register class descriptor for one target: which physical
/// register numbers are allocatable, and which of those are callee-saved.
pub trait RegisterBank {
    fn target(&self) -> Target;
    /// Allocatable physical register numbers for `class`, in allocation
    /// preference order (caller-saved scratch first).
    fn allocatable(&self, class: RegClass) -> &[u8];
    fn is_callee_saved(&self, class: RegClass, reg: u8) -> bool;
    /// Registers reserved for the allocator's own spill-reload scratch use
    /// and not available for general assignment.
    fn reserved_scratch(&self, class: RegClass) -> &[u8];
    /// Integer argument-passing register sequence.
    fn int_param_regs(&self) -> &[u8];
    fn float_param_regs(&self) -> &[u8];
    fn return_reg(&self, class: RegClass) -> u8;
    fn supports_variadic(&self) -> bool;
}

pub struct X86_64Bank;

impl RegisterBank for X86_64Bank {
    fn target(&self) -> Target {
        Target::X86_64
    }
    fn allocatable(&self, class: RegClass) -> &[u8] {
        // rax=0 rcx=1 rdx=2 rbx=3 rsi=6 rdi=7 r8..r15=8..15 (rsp=4,rbp=5 excluded).
        match class {
            RegClass::Int => &[0, 2, 6, 7, 8, 9, 10, 11, 3, 12, 13, 14, 15],
            RegClass::Float => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15], // xmm0-15
        }
    }
    fn is_callee_saved(&self, class: RegClass, reg: u8) -> bool {
        match class {
            RegClass::Int => matches!(reg, 3 | 12 | 13 | 14 | 15), // rbx, r12-r15
            RegClass::Float => false,                              // SysV: all xmm caller-saved
        }
    }
    fn reserved_scratch(&self, class: RegClass) -> &[u8] {
        match class {
            RegClass::Int => &[1],  // rcx reserved as allocator scratch / shift count
            RegClass::Float => &[15],
        }
    }
    fn int_param_regs(&self) -> &[u8] {
        &[7, 6, 2, 1, 8, 9] // rdi, rsi, rdx, rcx, r8, r9
    }
    fn float_param_regs(&self) -> &[u8] {
        &[0, 1, 2, 3, 4, 5, 6, 7] // xmm0-7
    }
    fn return_reg(&self, class: RegClass) -> u8 {
        match class {
            RegClass::Int => 0,   // rax
            RegClass::Float => 0, // xmm0
        }
    }
    fn supports_variadic(&self) -> bool {
        true
    }
}

pub struct Aarch64Bank;

impl RegisterBank for Aarch64Bank {
    fn target(&self) -> Target {
        Target::Aarch64
    }
    fn allocatable(&self, class: RegClass) -> &[u8] {
        match class {
            RegClass::Int => &[9, 10, 11, 12, 13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28],
            RegClass::Float => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
        }
    }
    fn is_callee_saved(&self, class: RegClass, reg: u8) -> bool {
        match class {
            RegClass::Int => (19..=28).contains(&reg),
            RegClass::Float => (8..=15).contains(&reg),
        }
    }
    fn reserved_scratch(&self, class: RegClass) -> &[u8] {
        match class {
            RegClass::Int => &[16, 17], // ip0/ip1
            RegClass::Float => &[],
        }
    }
    fn int_param_regs(&self) -> &[u8] {
        &[0, 1, 2, 3, 4, 5, 6, 7]
    }
    fn float_param_regs(&self) -> &[u8] {
        &[0, 1, 2, 3, 4, 5, 6, 7]
    }
    fn return_reg(&self, class: RegClass) -> u8 {
        0
    }
    fn supports_variadic(&self) -> bool {
        false
    }
}

pub struct Riscv64Bank;

impl RegisterBank for Riscv64Bank {
    fn target(&self) -> Target {
        Target::Riscv64
    }
    fn allocatable(&self, class: RegClass) -> &[u8] {
        match class {
            // t0-t6 (5,6,7,28,29,30,31), a0-a7 (10-17), s1-s11 (9,18-27)
            RegClass::Int => &[5, 6, 7, 28, 29, 30, 31, 10, 11, 12, 13, 14, 15, 16, 17, 9, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27],
            RegClass::Float => &[0, 1, 2, 3, 4, 5, 6, 7, 10, 11, 12, 13, 14, 15, 16, 17],
        }
    }
    fn is_callee_saved(&self, class: RegClass, reg: u8) -> bool {
        match class {
            RegClass::Int => reg == 9 || (18..=27).contains(&reg),
            RegClass::Float => (8..=9).contains(&reg) || (18..=27).contains(&reg),
        }
    }
    fn reserved_scratch(&self, class: RegClass) -> &[u8] {
        match class {
            RegClass::Int => &[30, 31], // t5, t6
            RegClass::Float => &[],
        }
    }
    fn int_param_regs(&self) -> &[u8] {
        &[10, 11, 12, 13, 14, 15, 16, 17] // a0-a7
    }
    fn float_param_regs(&self) -> &[u8] {
        &[10, 11, 12, 13, 14, 15, 16, 17] // fa0-fa7
    }
    fn return_reg(&self, class: RegClass) -> u8 {
        match class {
            RegClass::Int => 10,   // a0
            RegClass::Float => 10, // fa0
        }
    }
    fn supports_variadic(&self) -> bool {
        false
    }
}

pub fn bank_for(target: Target) -> Box<dyn RegisterBank> {
    match target {
        Target::X86_64 => Box::new(X86_64Bank),
        Target::Aarch64 => Box::new(Aarch64Bank),
        Target::Riscv64 => Box::new(Riscv64Bank),
    }
}

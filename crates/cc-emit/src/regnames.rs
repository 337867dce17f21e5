//! Physical register name tables, one per target, matched to the register
//! numbering `cc-ir::target`'s `RegisterBank` implementations use.

use cc_ir::{RegClass, Target};

pub fn int_reg_name(target: Target, num: u8) -> &'static str {
    match target {
        Target::X86_64 => {
            const NAMES: [&str; 16] =
                ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15"];
            NAMES[num as usize]
        }
        Target::Aarch64 => {
            const NAMES: [&str; 32] = [
                "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14", "x15", "x16",
                "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27", "x28", "x29", "x30", "sp",
            ];
            NAMES[num as usize]
        }
        Target::Riscv64 => {
            const NAMES: [&str; 32] = [
                "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7",
                "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
            ];
            NAMES[num as usize]
        }
    }
}

pub fn float_reg_name(target: Target, num: u8) -> String {
    match target {
        Target::X86_64 => format!("xmm{num}"),
        Target::Aarch64 => format!("d{num}"),
        Target::Riscv64 => format!("fa{num}"),
    }
}

pub fn reg_name(target: Target, class: RegClass, num: u8) -> String {
    match class {
        RegClass::Int => int_reg_name(target, num).to_string(),
        RegClass::Float => float_reg_name(target, num),
    }
}

pub fn frame_pointer(target: Target) -> &'static str {
    match target {
        Target::X86_64 => "rbp",
        Target::Aarch64 => "x29",
        Target::Riscv64 => "s0",
    }
}

pub fn stack_pointer(target: Target) -> &'static str {
    match target {
        Target::X86_64 => "rsp",
        Target::Aarch64 => "sp",
        Target::Riscv64 => "sp",
    }
}

//! Mnemonic-to-opcode table and register-name recognition for the AArch64
//! and RISC-V placeholder path.
//!
//! `x86_64::encode_instr` emits genuine REX/ModRM/SIB machine bytes; the
//! other two targets still go through `assembler::encode_instr_fixed_width`,
//! which dispatches every mnemonic to a fixed-width symbolic record here
//! instead: `[opcode][operand_count][reserved x6][imm/reloc-field: i64 LE]`,
//! 16 bytes regardless of what the mnemonic actually does. The
//! mnemonic/symbol/relocation plumbing around it is real; the instruction
//! bytes themselves are this toolchain's own internal form rather than
//! bytes a physical CPU decodes — an accepted scope limit for the two
//! targets this toolchain never runs its own output on.

use cc_elf::Machine;

use crate::error::{Error, Result};

pub const INSTR_LEN: usize = 16;

const MNEMONICS: &[&str] = &[
    "mov", "lea", "load.1", "load.2", "load.4", "load.8", "store.1", "store.2", "store.4", "store.8", "add", "sub",
    "mul", "div", "divu", "mod", "rem", "remu", "and", "or", "xor", "shl", "shr", "sar", "neg", "not", "cmp",
    "setl", "setle", "setg", "setge", "sete", "setne", "slt", "sle", "sgt", "sge", "seq", "sne", "jmp", "jz",
    "test", "call", "push", "pop", "ret", "stp", "ldp", "str", "ldr", "addi", "sd", "ld",
];

pub fn mnemonic_opcode(mnemonic: &str) -> Result<u8> {
    MNEMONICS
        .iter()
        .position(|&m| m == mnemonic)
        .map(|i| i as u8)
        .ok_or_else(|| Error::UnknownMnemonic(mnemonic.to_string()))
}

pub fn opcode_mnemonic(byte: u8) -> Option<&'static str> {
    MNEMONICS.get(byte as usize).copied()
}

/// Recognizes physical register names across all three targets, so the
/// assembler can tell a register operand from a bare symbol reference.
pub fn is_register(machine: Machine, tok: &str) -> bool {
    if let Some(rest) = tok.strip_prefix("xmm") {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    if let Some(rest) = tok.strip_prefix("fa") {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    match machine {
        Machine::X86_64 => {
            matches!(tok, "rax" | "rbx" | "rcx" | "rdx" | "rsp" | "rbp" | "rsi" | "rdi" | "rip")
                || (tok.len() > 1 && tok.starts_with('r') && tok[1..].bytes().all(|b| b.is_ascii_digit()))
        }
        Machine::Aarch64 => {
            tok == "sp" || (tok.len() > 1 && tok.starts_with('x') && tok[1..].bytes().all(|b| b.is_ascii_digit()))
                || (tok.len() > 1 && tok.starts_with('d') && tok[1..].bytes().all(|b| b.is_ascii_digit()))
        }
        Machine::Riscv64 => {
            matches!(tok, "zero" | "ra" | "sp" | "gp" | "tp")
                || (tok.len() > 1 && tok.starts_with('t') && tok[1..].bytes().all(|b| b.is_ascii_digit()))
                || (tok.len() > 1 && tok.starts_with('s') && tok[1..].bytes().all(|b| b.is_ascii_digit()))
                || (tok.len() > 1 && tok.starts_with('a') && tok[1..].bytes().all(|b| b.is_ascii_digit()))
        }
    }
}

/// `true` for mnemonics that transfer control to a label rather than
/// addressing data, governing whether a found symbol gets a pc-relative or
/// absolute relocation.
pub fn is_control_transfer_mnemonic(mnemonic: &str) -> bool {
    matches!(mnemonic, "jmp" | "jz" | "call")
}

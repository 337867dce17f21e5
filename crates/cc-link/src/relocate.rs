//! Relocation application against resolved symbol addresses.
//!
//! The patch width depends on both the target machine and the relocation
//! kind: x86-64's real encoder leaves a 4-byte rel32/plt32 field at the tail
//! of call/jmp instructions (8 bytes only for `Abs64`, e.g. `.quad` data),
//! while AArch64/RISC-V still go through cc-assemble's fixed-width
//! placeholder encoding and always reserve 8 bytes regardless of kind.

use cc_elf::{Machine, Object, RelocKind, SectionKind, SymbolDef};

use crate::error::{Error, Result};

fn symbol_address(def: SymbolDef, addrs: &[u64]) -> u64 {
    match def {
        SymbolDef::Section { section, value } => addrs[section] + value,
        SymbolDef::Absolute(v) => v,
        SymbolDef::Undefined | SymbolDef::Common { .. } => 0,
    }
}

/// Byte width of the relocation's field in the instruction/data stream.
fn patch_width(machine: Machine, kind: RelocKind) -> usize {
    match kind {
        RelocKind::Abs64 => 8,
        _ if machine == Machine::X86_64 => 4,
        _ => 8,
    }
}

pub fn apply_relocations(out: &mut Object, base_addr: u64) -> Result<()> {
    let addrs = out.assign_exec_addresses(base_addr);
    let machine = out.machine;

    for sec_idx in 0..out.sections.len() {
        if out.sections[sec_idx].kind == SectionKind::Bss {
            continue;
        }
        let relocs = out.sections[sec_idx].relocations.clone();
        let site_base = addrs[sec_idx];
        for reloc in &relocs {
            let sym = &out.symbols[reloc.symbol];
            let s = symbol_address(sym.def, &addrs) as i64;
            let sym_name = sym.name.clone();
            let p = (site_base + reloc.offset) as i64;
            let value = match reloc.kind {
                RelocKind::Abs64 => s + reloc.addend,
                RelocKind::AArch64AdrpPage | RelocKind::RiscvPcRelHi20 => (s + reloc.addend - p) & !0xfff,
                RelocKind::AArch64Lo12 | RelocKind::RiscvPcRelLo12 => (s + reloc.addend) & 0xfff,
                _ => s + reloc.addend - p,
            };
            patch(out, sec_idx, reloc.offset as usize, reloc.kind, value, &sym_name, machine)?;
        }
    }
    Ok(())
}

fn patch(
    out: &mut Object,
    sec_idx: usize,
    offset: usize,
    kind: RelocKind,
    value: i64,
    symbol: &str,
    machine: Machine,
) -> Result<()> {
    let width = patch_width(machine, kind);
    if width < 8 && !(i32::MIN as i64..=i32::MAX as i64).contains(&value) {
        return Err(Error::RelocationOverflow { symbol: symbol.to_string(), kind });
    }
    let data = &mut out.sections[sec_idx].data;
    data[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
    Ok(())
}

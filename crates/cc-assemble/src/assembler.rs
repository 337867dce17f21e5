//! Assembles a [`AsmUnit`]'s fragments into a single relocatable
//! [`cc_elf::Object`].

use cc_elf::{Machine, Object, RelocKind, SectionKind, SymbolKind};

use crate::encode::{self, INSTR_LEN};
use crate::error::{Error, Result};
use crate::fragment::{AsmUnit, Fragment, Section};

const SECTION_ALIGN: u64 = 16;

pub fn assemble(unit: &AsmUnit, machine: Machine) -> Result<Object> {
    let mut obj = Object::new(machine);
    // Order matters: the linker's RX/RW segment split assumes .rodata precedes
    // .data, so the RX region (.text+.rodata) and RW region (.data+.bss) are
    // each contiguous in the section list.
    assemble_section(&unit.text, SectionKind::Text, &mut obj, machine)?;
    assemble_section(&unit.rodata, SectionKind::ReadOnlyData, &mut obj, machine)?;
    assemble_section(&unit.data, SectionKind::Data, &mut obj, machine)?;
    assemble_section(&unit.bss, SectionKind::Bss, &mut obj, machine)?;
    Ok(obj)
}

fn assemble_section(section: &Section, kind: SectionKind, obj: &mut Object, machine: Machine) -> Result<()> {
    if section.fragments.is_empty() {
        return Ok(());
    }
    let id = obj.section_id(&section.name, kind, SECTION_ALIGN);
    for frag in &section.fragments {
        match frag {
            Fragment::Directive(text) => process_directive(text, obj, id, kind)?,
            Fragment::Label(name) => {
                let offset = obj.sections[id].size;
                let symkind = if kind == SectionKind::Text { SymbolKind::Func } else { SymbolKind::Object };
                obj.define(name, id, offset, 0, symkind);
            }
            Fragment::Instr(text) => encode_instr(text, obj, id, machine)?,
        }
    }
    Ok(())
}

/// Splits `s` on top-level commas, treating `[...]` and `(...)` as opaque.
pub(crate) fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '[' | '(' => {
                depth += 1;
                cur.push(c);
            }
            ']' | ')' => {
                depth -= 1;
                cur.push(c);
            }
            ',' if depth == 0 => {
                parts.push(cur.trim().to_string());
                cur.clear();
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() {
        parts.push(cur.trim().to_string());
    }
    parts
}

fn candidate_tokens(operand: &str) -> Vec<String> {
    let cleaned: String =
        operand.chars().map(|c| if "[]()!#,".contains(c) { ' ' } else { c }).collect();
    cleaned
        .split(|c: char| c == '+' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Finds the first operand token that is neither a register name nor a
/// numeric literal — i.e. a symbol reference needing a relocation.
fn find_symbol(operands: &[String], machine: Machine) -> Option<String> {
    for operand in operands {
        for tok in candidate_tokens(operand) {
            if encode::is_register(machine, &tok) || tok.parse::<i64>().is_ok() {
                continue;
            }
            return Some(tok);
        }
    }
    None
}

fn find_immediate(operands: &[String]) -> i64 {
    for operand in operands {
        for tok in candidate_tokens(operand) {
            if let Ok(v) = tok.parse::<i64>() {
                return v;
            }
        }
    }
    0
}

fn encode_instr(text: &str, obj: &mut Object, section: usize, machine: Machine) -> Result<()> {
    if machine == Machine::X86_64 {
        return crate::x86_64::encode_instr(text, obj, section);
    }
    encode_instr_fixed_width(text, obj, section, machine)
}

/// The placeholder encoder still used for AArch64 and RISC-V: every
/// instruction becomes a fixed-width symbolic record rather than real
/// machine bytes (see `cc_assemble::encode`'s module doc comment).
fn encode_instr_fixed_width(text: &str, obj: &mut Object, section: usize, machine: Machine) -> Result<()> {
    let mut parts = text.splitn(2, char::is_whitespace);
    let mnemonic = parts.next().unwrap_or("").trim();
    if mnemonic.is_empty() || mnemonic.starts_with('#') {
        return Ok(());
    }
    let opcode = encode::mnemonic_opcode(mnemonic)?;
    let operand_str = parts.next().unwrap_or("").trim();
    let operands = split_top_level(operand_str);

    let base_offset = obj.sections[section].data.len() as u64;
    let symbol = find_symbol(&operands, machine);
    let imm = if symbol.is_some() { 0 } else { find_immediate(&operands) };

    let mut bytes = [0u8; INSTR_LEN];
    bytes[0] = opcode;
    bytes[1] = operands.len() as u8;
    bytes[8..16].copy_from_slice(&imm.to_le_bytes());
    obj.sections[section].append(&bytes, 4);

    if let Some(sym_name) = symbol {
        let sym_id = obj.symbol_id(&sym_name);
        let kind =
            if encode::is_control_transfer_mnemonic(mnemonic) { RelocKind::PcRel32 } else { RelocKind::Abs64 };
        obj.sections[section].relocations.push(cc_elf::Relocation {
            offset: base_offset + 8,
            symbol: sym_id,
            kind,
            addend: 0,
        });
    }
    Ok(())
}

fn directive_elem_size(name: &str) -> Option<u64> {
    match name {
        ".byte" => Some(1),
        ".word" => Some(2),
        ".long" => Some(4),
        ".quad" => Some(8),
        _ => None,
    }
}

fn process_directive(text: &str, obj: &mut Object, section: usize, kind: SectionKind) -> Result<()> {
    let mut parts = text.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();

    match name {
        ".global" => {
            if rest.is_empty() {
                return Err(Error::BadDirective(text.to_string()));
            }
            obj.set_global(rest);
        }
        ".align" => {
            let align: u64 = rest.parse().map_err(|_| Error::BadDirective(text.to_string()))?;
            if kind == SectionKind::Bss {
                obj.sections[section].append_bss(0, align.max(1));
            } else {
                obj.sections[section].append(&[], align.max(1));
            }
        }
        ".zero" => {
            let len: u64 = rest.parse().map_err(|_| Error::BadDirective(text.to_string()))?;
            if kind == SectionKind::Bss {
                obj.sections[section].append_bss(len, 1);
            } else {
                obj.sections[section].append(&vec![0u8; len as usize], 1);
            }
        }
        ".byte" | ".word" | ".long" | ".quad" => {
            let elem_size = directive_elem_size(name).unwrap();
            for item in rest.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if let Ok(v) = item.parse::<i128>() {
                    let bytes = (v as i64).to_le_bytes();
                    obj.sections[section].append(&bytes[..elem_size as usize], elem_size);
                } else {
                    let offset = {
                        let padded_align = elem_size;
                        obj.sections[section].append(&vec![0u8; elem_size as usize], padded_align)
                    };
                    let sym_id = obj.symbol_id(item);
                    obj.sections[section].relocations.push(cc_elf::Relocation {
                        offset,
                        symbol: sym_id,
                        kind: RelocKind::Abs64,
                        addend: 0,
                    });
                }
            }
        }
        other => return Err(Error::BadDirective(other.to_string())),
    }
    Ok(())
}

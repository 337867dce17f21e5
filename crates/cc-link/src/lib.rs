//! Static linker: merges one or more ELF64 REL objects into a single
//! ELF64 EXEC.
//!
//! `cc_elf::Object`'s section/symbol accumulator and `write_exec` already
//! handle EXEC layout (fixed base address, RX/RW segment split, symbol
//! table ordering) and serialization; this crate supplies the merge,
//! resolve, and relocate steps that sit in front of it.

mod error;
mod merge;
mod relocate;

pub use error::{Error, Result};

use cc_elf::{ExecLayout, Machine, Object};

/// Linker configuration. x86-64's conventional `0x400000` base and `_start`
/// entry are the defaults; both are overridable for the other targets.
pub struct LinkOptions {
    pub base_addr: u64,
    pub entry_symbol: String,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions { base_addr: 0x400000, entry_symbol: "_start".to_string() }
    }
}

impl LinkOptions {
    pub fn for_machine(machine: Machine) -> Self {
        let base_addr = match machine {
            Machine::X86_64 => 0x400000,
            Machine::Aarch64 => 0x400000,
            Machine::Riscv64 => 0x10000,
        };
        LinkOptions { base_addr, entry_symbol: "_start".to_string() }
    }
}

/// Links `objects` (all REL, all built for `machine`) into a single EXEC
/// byte buffer: merge sections, resolve symbols, assign addresses, apply
/// relocations, resolve the entry point.
pub fn link(objects: &[Object], machine: Machine, opts: &LinkOptions) -> Result<Vec<u8>> {
    let mut out = Object::new(machine);

    let mut maps = merge::merge_sections(objects, &mut out);
    merge::merge_symbols(objects, &mut maps, &mut out)?;
    merge::merge_relocations(objects, &maps, &mut out);
    merge::materialize_commons(&mut out);
    merge::check_undefined(&out)?;

    if !out.symbol_index.contains_key(&opts.entry_symbol) {
        return Err(Error::UndefinedReference(opts.entry_symbol.clone()));
    }

    relocate::apply_relocations(&mut out, opts.base_addr)?;

    Ok(out.write_exec(&ExecLayout { entry_symbol: opts.entry_symbol.clone(), base_addr: opts.base_addr }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_elf::{FileHeader64, SectionKind, SymbolKind};

    fn obj_with_start(machine: Machine, ret_code: u8) -> Object {
        let mut obj = Object::new(machine);
        let text = obj.section_id(".text", SectionKind::Text, 16);
        // two 16-byte fixed-width records: `mov` loads ret_code, `ret` returns it.
        let mut bytes = vec![0u8; 32];
        bytes[0] = 0; // mov opcode
        bytes[8..16].copy_from_slice(&(ret_code as i64).to_le_bytes());
        bytes[16] = encode_ret_opcode();
        obj.sections[text].append(&bytes, 1);
        obj.define("_start", text, 0, 32, SymbolKind::Func);
        obj.set_global("_start");
        obj
    }

    fn encode_ret_opcode() -> u8 {
        cc_assemble_opcode("ret")
    }

    // Mirrors cc_assemble::encode::mnemonic_opcode without depending on
    // cc-assemble from this crate's tests; "ret" is MNEMONICS[46].
    fn cc_assemble_opcode(name: &str) -> u8 {
        const MNEMONICS: &[&str] = &[
            "mov", "lea", "load.1", "load.2", "load.4", "load.8", "store.1", "store.2", "store.4", "store.8", "add",
            "sub", "mul", "div", "divu", "mod", "rem", "remu", "and", "or", "xor", "shl", "shr", "sar", "neg", "not",
            "cmp", "setl", "setle", "setg", "setge", "sete", "setne", "slt", "sle", "sgt", "sge", "seq", "sne",
            "jmp", "jz", "test", "call", "push", "pop", "ret", "stp", "ldp", "str", "ldr", "addi", "sd", "ld",
        ];
        MNEMONICS.iter().position(|m| *m == name).unwrap() as u8
    }

    #[test]
    fn links_single_object_into_valid_exec_header() {
        let obj = obj_with_start(Machine::X86_64, 47);
        let bytes = link(&[obj], Machine::X86_64, &LinkOptions::default()).unwrap();
        let (hdr, _): (FileHeader64, _) = cc_elf::from_bytes(&bytes).unwrap();
        assert_eq!(hdr.e_type, cc_elf::ET_EXEC);
        assert_eq!(hdr.e_entry, 0x400000 + (cc_elf::EHDR64_SIZE + 2 * cc_elf::PHDR64_SIZE) as u64);
    }

    #[test]
    fn two_definitions_of_the_same_global_is_an_error() {
        let a = obj_with_start(Machine::X86_64, 1);
        let b = obj_with_start(Machine::X86_64, 2);
        let err = link(&[a, b], Machine::X86_64, &LinkOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MultipleDefinition(name) if name == "_start"));
    }

    #[test]
    fn call_to_an_undefined_symbol_is_an_error() {
        let mut obj = Object::new(Machine::X86_64);
        let text = obj.section_id(".text", SectionKind::Text, 16);
        obj.sections[text].append(&[0u8; 16], 1);
        obj.define("_start", text, 0, 16, SymbolKind::Func);
        obj.set_global("_start");
        obj.symbol_id("helper"); // referenced, never defined
        let sym = *obj.symbol_index.get("helper").unwrap();
        obj.symbols[sym].binding = cc_elf::Binding::Global;

        let err = link(&[obj], Machine::X86_64, &LinkOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UndefinedReference(name) if name == "helper"));
    }

    #[test]
    fn common_symbols_take_the_largest_size() {
        let mut a = Object::new(Machine::X86_64);
        let text_a = a.section_id(".text", SectionKind::Text, 16);
        a.sections[text_a].append(&[0u8; 16], 1);
        a.define("_start", text_a, 0, 16, SymbolKind::Func);
        a.set_global("_start");
        let shared = a.symbol_id("shared");
        a.symbols[shared].binding = cc_elf::Binding::Global;
        a.symbols[shared].def = cc_elf::SymbolDef::Common { align: 4 };
        a.symbols[shared].size = 4;

        let mut b = Object::new(Machine::X86_64);
        let shared_b = b.symbol_id("shared");
        b.symbols[shared_b].binding = cc_elf::Binding::Global;
        b.symbols[shared_b].def = cc_elf::SymbolDef::Common { align: 8 };
        b.symbols[shared_b].size = 16;

        let bytes = link(&[a, b], Machine::X86_64, &LinkOptions::default()).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn missing_entry_symbol_is_an_error() {
        let mut obj = Object::new(Machine::X86_64);
        let text = obj.section_id(".text", SectionKind::Text, 16);
        obj.sections[text].append(&[0u8; 16], 1);
        obj.define("main", text, 0, 16, SymbolKind::Func);
        obj.set_global("main");

        let err = link(&[obj], Machine::X86_64, &LinkOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UndefinedReference(name) if name == "_start"));
    }

    #[test]
    fn linking_twice_is_byte_identical() {
        let obj = obj_with_start(Machine::X86_64, 47);
        let once = link(&[obj_with_start(Machine::X86_64, 47)], Machine::X86_64, &LinkOptions::default()).unwrap();
        let twice = link(&[obj], Machine::X86_64, &LinkOptions::default()).unwrap();
        assert_eq!(once, twice);
    }
}

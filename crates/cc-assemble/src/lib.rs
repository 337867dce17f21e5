//! Assembly fragment model and text-to-ELF64-REL assembler (component C5a).
//!
//! [`assemble`] is the component's whole public contract: given one
//! translation unit's emitted [`AsmUnit`] and a target machine, produce a
//! relocatable [`cc_elf::Object`].

mod assembler;
mod encode;
mod error;
mod fragment;
mod text;
mod x86_64;

pub use assembler::assemble;
pub use encode::INSTR_LEN;
pub use error::{Error, Result};
pub use fragment::{AsmUnit, Fragment, Section};
pub use text::{parse_asm_text, render_asm_text};

/// Reads the mnemonic of each fixed-width instruction record in `data`, in
/// order — the assembler side of the round-trip testable property
/// ("assembling then disassembling any emitted instruction reproduces the
/// mnemonic"). Only meaningful for AArch64/RISC-V `.text` sections; x86-64
/// sections hold real variable-length machine code this can't parse.
pub fn disassemble_mnemonics(data: &[u8]) -> Vec<&'static str> {
    data.chunks(INSTR_LEN).filter_map(|c| if c.len() == INSTR_LEN { encode::opcode_mnemonic(c[0]) } else { None }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_elf::Machine;

    /// AArch64 still goes through the fixed-width placeholder encoder, so
    /// this exercises the record-shape properties `INSTR_LEN` and
    /// `disassemble_mnemonics` promise.
    fn sample_unit() -> AsmUnit {
        let mut unit = AsmUnit::new();
        unit.text.directive(".global main");
        unit.text.label("main");
        unit.text.instr("stp x29, x30, [sp, #-16]!");
        unit.text.instr("mov x29, sp");
        unit.text.instr("mov x0, 47");
        unit.text.instr("ldp x29, x30, [sp], #16");
        unit.text.instr("ret");
        unit.data.directive(".align 4");
        unit.data.directive(".global counter");
        unit.data.label("counter");
        unit.data.directive(".long 5");
        unit.bss.directive(".align 8");
        unit.bss.label("buf");
        unit.bss.directive(".zero 16");
        unit
    }

    #[test]
    fn assembles_function_with_global_symbol() {
        let obj = assemble(&sample_unit(), Machine::Aarch64).unwrap();
        let text = obj.section_index[".text"];
        assert_eq!(obj.sections[text].data.len() % INSTR_LEN, 0);
        let sym = *obj.symbol_index.get("main").unwrap();
        assert_eq!(obj.symbols[sym].binding, cc_elf::Binding::Global);
    }

    #[test]
    fn unknown_mnemonic_is_rejected_on_the_placeholder_path() {
        let mut unit = AsmUnit::new();
        unit.text.instr("frobnicate x0");
        let err = assemble(&unit, Machine::Aarch64);
        assert!(matches!(err, Err(Error::UnknownMnemonic(_))));
    }

    #[test]
    fn unknown_mnemonic_is_rejected_on_x86_64() {
        let mut unit = AsmUnit::new();
        unit.text.instr("frobnicate rax");
        let err = assemble(&unit, Machine::X86_64);
        assert!(matches!(err, Err(Error::UnknownMnemonic(_))));
    }

    #[test]
    fn data_global_lands_in_data_section_with_correct_size() {
        let obj = assemble(&sample_unit(), Machine::Aarch64).unwrap();
        let data = obj.section_index[".data"];
        assert_eq!(obj.sections[data].data.len(), 4);
    }

    #[test]
    fn bss_global_reserves_space_without_file_bytes() {
        let obj = assemble(&sample_unit(), Machine::Aarch64).unwrap();
        let bss = obj.section_index[".bss"];
        assert_eq!(obj.sections[bss].size, 16);
        assert!(obj.sections[bss].data.is_empty());
    }

    #[test]
    fn call_to_undefined_symbol_produces_a_relocation_on_aarch64() {
        let mut unit = AsmUnit::new();
        unit.text.instr("call helper");
        let obj = assemble(&unit, Machine::Aarch64).unwrap();
        let text = obj.section_index[".text"];
        assert_eq!(obj.sections[text].relocations.len(), 1);
    }

    #[test]
    fn round_trip_mnemonics_after_disassembly() {
        let obj = assemble(&sample_unit(), Machine::Aarch64).unwrap();
        let text = obj.section_index[".text"];
        let mnemonics = disassemble_mnemonics(&obj.sections[text].data);
        assert_eq!(mnemonics, vec!["stp", "mov", "mov", "ldp", "ret"]);
    }

    #[test]
    fn x86_64_text_section_is_not_a_multiple_of_the_placeholder_record_size() {
        // A real `push reg` is 2 bytes; if this ever divides evenly by
        // INSTR_LEN again, something regressed back to the placeholder path.
        let mut unit = AsmUnit::new();
        unit.text.instr("push rbp");
        unit.text.instr("ret");
        let obj = assemble(&unit, Machine::X86_64).unwrap();
        let text = obj.section_index[".text"];
        assert_eq!(obj.sections[text].data.len(), 3);
    }

    #[test]
    fn call_to_undefined_symbol_produces_a_pcrel32_relocation_on_x86_64() {
        let mut unit = AsmUnit::new();
        unit.text.instr("call helper");
        let obj = assemble(&unit, Machine::X86_64).unwrap();
        let text = obj.section_index[".text"];
        assert_eq!(obj.sections[text].relocations.len(), 1);
        assert_eq!(obj.sections[text].relocations[0].kind, cc_elf::RelocKind::PcRel32);
    }
}

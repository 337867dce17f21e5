//! ELF64 layout constants, POD record types, and an in-memory object
//! container shared by the assembler and the linker (components C5).

mod format;
mod object;
mod pod;
mod strtab;

pub use format::{
    FileHeader64, Machine, R_AARCH64_ABS64, R_AARCH64_ADD_ABS_LO12_NC, R_AARCH64_ADR_PREL_PG_HI21,
    R_AARCH64_CALL26, R_RISCV_64, R_RISCV_BRANCH, R_RISCV_CALL, R_RISCV_PCREL_HI20, R_RISCV_PCREL_LO12_I,
    R_X86_64_32, R_X86_64_32S, R_X86_64_64, R_X86_64_PC32, R_X86_64_PLT32, EHDR64_SIZE, ET_EXEC, ET_REL,
    PHDR64_SIZE, ProgramHeader64, PT_LOAD,
};
pub use object::{
    Binding, ElfError, ExecLayout, Object, RelocKind, Relocation, Result, Section, SectionKind, Symbol,
    SymbolDef, SymbolKind,
};
pub use pod::from_bytes;

//! In-memory ELF object model shared by the assembler (producer) and the
//! linker (consumer+producer), plus ELF64 REL/EXEC (de)serialization.
//!
//! Sections and symbols accumulate into growable tables during assembly
//! and linking; reading walks the header then the section/symbol tables in
//! one pass. Only the single little-endian 64-bit case is modeled.

use std::collections::HashMap;

use crate::format::*;
use crate::pod::{bytes_of, from_bytes};
use crate::strtab::{read_str, StringTable};

#[derive(thiserror::Error, Debug)]
pub enum ElfError {
    #[error("malformed ELF input: {0}")]
    Malformed(&'static str),
    #[error("unsupported ELF machine {0:#x}")]
    UnsupportedMachine(u16),
}

pub type Result<T> = std::result::Result<T, ElfError>;

/// Section kind, independent of which target produced it: implies the
/// section's alloc/write/exec flags.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectionKind {
    Text,
    Data,
    ReadOnlyData,
    Bss,
}

impl SectionKind {
    pub fn sh_type(self) -> u32 {
        match self {
            SectionKind::Bss => SHT_NOBITS,
            _ => SHT_PROGBITS,
        }
    }

    pub fn sh_flags(self) -> u64 {
        match self {
            SectionKind::Text => SHF_ALLOC | SHF_EXECINSTR,
            SectionKind::Data => SHF_ALLOC | SHF_WRITE,
            SectionKind::ReadOnlyData => SHF_ALLOC,
            SectionKind::Bss => SHF_ALLOC | SHF_WRITE,
        }
    }
}

/// An accumulated output section.
#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub align: u64,
    /// File contents; empty (but `size` nonzero) for `.bss`.
    pub data: Vec<u8>,
    /// Logical size; for `.bss` this exceeds `data.len()` (which is 0).
    pub size: u64,
    pub relocations: Vec<Relocation>,
}

impl Section {
    pub fn new(name: impl Into<String>, kind: SectionKind, align: u64) -> Self {
        Section {
            name: name.into(),
            kind,
            align,
            data: Vec::new(),
            size: 0,
            relocations: Vec::new(),
        }
    }

    /// Appends `bytes`, respecting `align`, and returns the offset they land at.
    pub fn append(&mut self, bytes: &[u8], align: u64) -> u64 {
        let align = align.max(1);
        let pad = (align - (self.data.len() as u64 % align)) % align;
        self.data.resize(self.data.len() + pad as usize, 0);
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        self.size = self.data.len() as u64;
        offset
    }

    /// Reserves `len` bytes of uninitialized (bss) space and returns the offset.
    pub fn append_bss(&mut self, len: u64, align: u64) -> u64 {
        let align = align.max(1);
        let offset = (self.size + align - 1) / align * align;
        self.size = offset + len;
        offset
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Binding {
    Local,
    Global,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    NoType,
    Object,
    Func,
    Section,
}

/// Where a symbol is defined, from the linker's point of view.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolDef {
    Undefined,
    /// Defined in section index `section` (an index into `Object::sections`) at `value`.
    Section { section: usize, value: u64 },
    /// A COMMON symbol: allocated by the linker into `.bss`, sized `size`.
    Common { align: u64 },
    Absolute(u64),
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub binding: Binding,
    pub kind: SymbolKind,
    pub def: SymbolDef,
    pub size: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RelocKind {
    Abs64,
    PcRel32,
    Plt32,
    /// AArch64 ADRP (page) half of an ADRP/ADD pair.
    AArch64AdrpPage,
    /// AArch64 ADD/LDR low-12 half of an ADRP/ADD pair.
    AArch64Lo12,
    AArch64Call26,
    /// RISC-V AUIPC-based high-20 (paired with a later lo12 reloc at `hi_offset`).
    RiscvPcRelHi20,
    RiscvPcRelLo12,
    RiscvCall,
    RiscvBranch,
}

impl RelocKind {
    pub fn elf_type(self, machine: Machine) -> u32 {
        match (machine, self) {
            (Machine::X86_64, RelocKind::Abs64) => R_X86_64_64,
            (Machine::X86_64, RelocKind::PcRel32) => R_X86_64_PC32,
            (Machine::X86_64, RelocKind::Plt32) => R_X86_64_PLT32,
            (Machine::Aarch64, RelocKind::Abs64) => R_AARCH64_ABS64,
            (Machine::Aarch64, RelocKind::AArch64Call26) => R_AARCH64_CALL26,
            (Machine::Aarch64, RelocKind::AArch64AdrpPage) => R_AARCH64_ADR_PREL_PG_HI21,
            (Machine::Aarch64, RelocKind::AArch64Lo12) => R_AARCH64_ADD_ABS_LO12_NC,
            (Machine::Riscv64, RelocKind::Abs64) => R_RISCV_64,
            (Machine::Riscv64, RelocKind::RiscvCall) => R_RISCV_CALL,
            (Machine::Riscv64, RelocKind::RiscvPcRelHi20) => R_RISCV_PCREL_HI20,
            (Machine::Riscv64, RelocKind::RiscvPcRelLo12) => R_RISCV_PCREL_LO12_I,
            (Machine::Riscv64, RelocKind::RiscvBranch) => R_RISCV_BRANCH,
            _ => panic!("relocation kind {:?} not valid for {:?}", self, machine),
        }
    }

    pub fn from_elf_type(machine: Machine, ty: u32) -> Option<Self> {
        Some(match (machine, ty) {
            (Machine::X86_64, R_X86_64_64) => RelocKind::Abs64,
            (Machine::X86_64, R_X86_64_PC32) => RelocKind::PcRel32,
            (Machine::X86_64, R_X86_64_PLT32) => RelocKind::Plt32,
            (Machine::Aarch64, R_AARCH64_ABS64) => RelocKind::Abs64,
            (Machine::Aarch64, R_AARCH64_CALL26) => RelocKind::AArch64Call26,
            (Machine::Aarch64, R_AARCH64_ADR_PREL_PG_HI21) => RelocKind::AArch64AdrpPage,
            (Machine::Aarch64, R_AARCH64_ADD_ABS_LO12_NC) => RelocKind::AArch64Lo12,
            (Machine::Riscv64, R_RISCV_64) => RelocKind::Abs64,
            (Machine::Riscv64, R_RISCV_CALL) => RelocKind::RiscvCall,
            (Machine::Riscv64, R_RISCV_PCREL_HI20) => RelocKind::RiscvPcRelHi20,
            (Machine::Riscv64, R_RISCV_PCREL_LO12_I) => RelocKind::RiscvPcRelLo12,
            (Machine::Riscv64, R_RISCV_BRANCH) => RelocKind::RiscvBranch,
            _ => return None,
        })
    }
}

/// A relocation: offset into section, target symbol, kind, addend.
#[derive(Clone, Debug)]
pub struct Relocation {
    pub offset: u64,
    /// Index into the owning `Object::symbols`.
    pub symbol: usize,
    pub kind: RelocKind,
    pub addend: i64,
}

/// The full in-memory object: what the assembler produces and the linker
/// consumes/merges. Both REL and EXEC outputs are serialized from this.
pub struct Object {
    pub machine: Machine,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    /// Maps section name -> index into `sections`, for merge/lookup.
    pub section_index: HashMap<String, usize>,
    /// Maps symbol name -> index into `symbols`.
    pub symbol_index: HashMap<String, usize>,
}

impl Object {
    pub fn new(machine: Machine) -> Self {
        Object {
            machine,
            sections: Vec::new(),
            symbols: Vec::new(),
            section_index: HashMap::new(),
            symbol_index: HashMap::new(),
        }
    }

    pub fn section_id(&mut self, name: &str, kind: SectionKind, align: u64) -> usize {
        if let Some(&id) = self.section_index.get(name) {
            return id;
        }
        let id = self.sections.len();
        self.sections.push(Section::new(name, kind, align));
        self.section_index.insert(name.to_string(), id);
        id
    }

    /// Returns the index of `name`, creating an `Undefined` symbol if unseen.
    pub fn symbol_id(&mut self, name: &str) -> usize {
        if let Some(&id) = self.symbol_index.get(name) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            binding: Binding::Local,
            kind: SymbolKind::NoType,
            def: SymbolDef::Undefined,
            size: 0,
        });
        self.symbol_index.insert(name.to_string(), id);
        id
    }

    pub fn define(&mut self, name: &str, section: usize, value: u64, size: u64, kind: SymbolKind) {
        let id = self.symbol_id(name);
        self.symbols[id].def = SymbolDef::Section { section, value };
        self.symbols[id].size = size;
        self.symbols[id].kind = kind;
    }

    pub fn set_global(&mut self, name: &str) {
        let id = self.symbol_id(name);
        self.symbols[id].binding = Binding::Global;
    }

    /// Writes a relocatable ELF64 object file (`cc -c` output).
    pub fn write_rel(&self) -> Vec<u8> {
        write_elf(self, None)
    }

    /// Writes an executable ELF64 file: two `PT_LOAD` segments (RX, RW) and
    /// `e_entry` resolved from `layout.entry_symbol`.
    pub fn write_exec(&self, layout: &ExecLayout) -> Vec<u8> {
        write_elf(self, Some(layout))
    }

    /// Parses a relocatable ELF64 object file previously produced by `write_rel`
    /// (or compatible input).
    pub fn read_rel(data: &[u8]) -> Result<Object> {
        read_elf(data)
    }
}

/// Optional executable-specific metadata, used only when writing an EXEC file.
pub struct ExecLayout {
    pub entry_symbol: String,
    pub base_addr: u64,
}

impl Object {
    /// Computes the virtual address each section would get in an EXEC
    /// written with `write_exec(&ExecLayout { base_addr, .. })` — the same
    /// file-offset-contiguous layout `write_elf` uses internally. Exposed so
    /// the linker can patch relocations into section bytes before the final
    /// write, since `write_elf` itself never rewrites section contents.
    pub fn assign_exec_addresses(&self, base_addr: u64) -> Vec<u64> {
        let phdr_count = 2u64;
        let mut offset = EHDR64_SIZE as u64 + phdr_count * PHDR64_SIZE as u64;
        let mut addrs = vec![0u64; self.sections.len()];
        for (i, sec) in self.sections.iter().enumerate() {
            if sec.kind == SectionKind::Bss {
                addrs[i] = base_addr + offset;
                continue;
            }
            let align = sec.align.max(1);
            offset = (offset + align - 1) / align * align;
            addrs[i] = base_addr + offset;
            offset += sec.data.len() as u64;
        }
        addrs
    }
}

fn write_elf(obj: &Object, exec: Option<&ExecLayout>) -> Vec<u8> {
    let is_exec = exec.is_some();

    // Ordering: STB_LOCAL symbols precede STB_GLOBAL, index 0 reserved (null symbol).
    let mut locals: Vec<usize> = Vec::new();
    let mut globals: Vec<usize> = Vec::new();
    for (i, sym) in obj.symbols.iter().enumerate() {
        match sym.binding {
            Binding::Local => locals.push(i),
            Binding::Global => globals.push(i),
        }
    }
    let ordered: Vec<usize> = locals.iter().chain(globals.iter()).copied().collect();
    let first_global = 1 + locals.len() as u32;

    let mut shstrtab = StringTable::new();
    let mut strtab = StringTable::new();

    // symtab entry 0 is the null symbol.
    let mut symtab_bytes: Vec<u8> = vec![0u8; SYM64_SIZE];

    // Section virtual addresses (EXEC only); filled in during layout below.
    let mut sec_addr = vec![0u64; obj.sections.len()];
    let mut sec_off = vec![0u64; obj.sections.len()];

    // --- layout: file offsets for section data ---
    // Header first, then section contents, then symtab/strtab/shstrtab, then section headers last.
    let phdr_count = if is_exec { 2 } else { 0 };
    let mut offset = EHDR64_SIZE as u64 + phdr_count as u64 * PHDR64_SIZE as u64;
    let base = exec.map(|e| e.base_addr).unwrap_or(0);

    for (i, sec) in obj.sections.iter().enumerate() {
        if sec.kind == SectionKind::Bss {
            sec_off[i] = offset;
            continue;
        }
        let align = sec.align.max(1);
        offset = (offset + align - 1) / align * align;
        sec_off[i] = offset;
        offset += sec.data.len() as u64;
    }
    if is_exec {
        // Assign virtual addresses contiguous with file offsets (single segment each for RX/RW).
        for (i, sec) in obj.sections.iter().enumerate() {
            sec_addr[i] = base + sec_off[i];
        }
    }

    // obj symbol index -> elf symtab index, needed to remap relocation symbol refs.
    let mut elf_index_of = vec![0u32; obj.symbols.len()];
    for (elf_idx, &obj_idx) in ordered.iter().enumerate() {
        elf_index_of[obj_idx] = 1 + elf_idx as u32;
    }

    for &obj_idx in &ordered {
        let sym = &obj.symbols[obj_idx];
        let name_off = strtab.add(&sym.name);
        let (shndx, value) = match sym.def {
            SymbolDef::Undefined => (SHN_UNDEF, 0),
            SymbolDef::Absolute(v) => (SHN_ABS, v),
            SymbolDef::Common { .. } => (SHN_COMMON, sym.size),
            SymbolDef::Section { section, value } => {
                let addr = if is_exec { sec_addr[section] } else { 0 };
                ((section + 1) as u16, addr + value)
            }
        };
        let kind = match sym.kind {
            SymbolKind::NoType => STT_NOTYPE,
            SymbolKind::Object => STT_OBJECT,
            SymbolKind::Func => STT_FUNC,
            SymbolKind::Section => STT_SECTION,
        };
        let bind = match sym.binding {
            Binding::Local => STB_LOCAL,
            Binding::Global => STB_GLOBAL,
        };
        let rec = Sym64 {
            st_name: name_off,
            st_info: st_info(bind, kind),
            st_other: 0,
            st_shndx: shndx,
            st_value: value,
            st_size: sym.size,
        };
        symtab_bytes.extend_from_slice(bytes_of(&rec));
    }

    // --- relocations (REL only) ---
    let mut rela_bytes: Vec<Vec<u8>> = vec![Vec::new(); obj.sections.len()];
    if !is_exec {
        for (i, sec) in obj.sections.iter().enumerate() {
            for reloc in &sec.relocations {
                let rec = Rela64 {
                    r_offset: reloc.offset,
                    r_info: r_info(elf_index_of[reloc.symbol], reloc.kind.elf_type(obj.machine)),
                    r_addend: reloc.addend,
                };
                rela_bytes[i].extend_from_slice(bytes_of(&rec));
            }
        }
    }

    // --- assemble section header list ---
    struct Out {
        name: u32,
        sh_type: u32,
        flags: u64,
        addr: u64,
        offset: u64,
        size: u64,
        link: u32,
        info: u32,
        align: u64,
        entsize: u64,
    }
    let mut outs = vec![Out {
        name: 0,
        sh_type: SHT_NULL,
        flags: 0,
        addr: 0,
        offset: 0,
        size: 0,
        link: 0,
        info: 0,
        align: 0,
        entsize: 0,
    }];

    for (i, sec) in obj.sections.iter().enumerate() {
        let name = shstrtab.add(&sec.name);
        outs.push(Out {
            name,
            sh_type: sec.kind.sh_type(),
            flags: sec.kind.sh_flags(),
            addr: sec_addr[i],
            offset: sec_off[i],
            size: sec.size,
            link: 0,
            info: 0,
            align: sec.align.max(1),
            entsize: 0,
        });
    }
    let symtab_name = shstrtab.add(".symtab");
    let strtab_name = shstrtab.add(".strtab");
    let shstrtab_name = shstrtab.add(".shstrtab");

    let mut trailer_offset = offset;
    let symtab_shndx = outs.len() as u32;
    let mut rela_shndx = vec![0u32; obj.sections.len()];

    if !is_exec {
        for (i, sec) in obj.sections.iter().enumerate() {
            if rela_bytes[i].is_empty() {
                continue;
            }
            let name = shstrtab.add(&format!(".rela{}", sec.name));
            rela_shndx[i] = outs.len() as u32;
            outs.push(Out {
                name,
                sh_type: SHT_RELA,
                flags: 0,
                addr: 0,
                offset: trailer_offset,
                size: rela_bytes[i].len() as u64,
                link: symtab_shndx + 1, // patched below once symtab index known
                info: (i + 1) as u32,
                align: 8,
                entsize: RELA64_SIZE as u64,
            });
            trailer_offset += rela_bytes[i].len() as u64;
        }
    }

    let symtab_off = trailer_offset;
    trailer_offset += symtab_bytes.len() as u64;
    outs.push(Out {
        name: symtab_name,
        sh_type: SHT_SYMTAB,
        flags: 0,
        addr: 0,
        offset: symtab_off,
        size: symtab_bytes.len() as u64,
        link: (outs.len() + 1) as u32, // -> .strtab, patched below
        info: first_global,
        align: 8,
        entsize: SYM64_SIZE as u64,
    });
    let strtab_shndx = outs.len() as u32;
    let strtab_bytes = strtab.into_bytes();
    let strtab_off = trailer_offset;
    trailer_offset += strtab_bytes.len() as u64;
    outs.push(Out {
        name: strtab_name,
        sh_type: SHT_STRTAB,
        flags: 0,
        addr: 0,
        offset: strtab_off,
        size: strtab_bytes.len() as u64,
        link: 0,
        info: 0,
        align: 1,
        entsize: 0,
    });

    let shstrtab_shndx = outs.len() as u32;
    // fix up .symtab's link now that .strtab's index is known
    let symtab_out_idx = outs.iter().position(|o| o.sh_type == SHT_SYMTAB).unwrap();
    outs[symtab_out_idx].link = strtab_shndx;
    if !is_exec {
        for i in 0..obj.sections.len() {
            if rela_shndx[i] != 0 {
                let idx = rela_shndx[i] as usize;
                outs[idx].link = outs.iter().position(|o| o.sh_type == SHT_SYMTAB).unwrap() as u32;
            }
        }
    }

    let shstrtab_bytes_off = trailer_offset;
    let shstrtab_bytes = shstrtab.into_bytes();
    trailer_offset += shstrtab_bytes.len() as u64;
    outs.push(Out {
        name: shstrtab_name,
        sh_type: SHT_STRTAB,
        flags: 0,
        addr: 0,
        offset: shstrtab_bytes_off,
        size: shstrtab_bytes.len() as u64,
        link: 0,
        info: 0,
        align: 1,
        entsize: 0,
    });

    // shdrs themselves come last, after the section header string table.
    let shoff = (trailer_offset + 7) / 8 * 8;

    let mut hdr = FileHeader64::new(if is_exec { ET_EXEC } else { ET_REL }, obj.machine);
    hdr.e_shoff = shoff;
    hdr.e_shnum = outs.len() as u16;
    hdr.e_shstrndx = shstrtab_shndx as u16;
    if let Some(exec) = exec {
        hdr.e_phoff = EHDR64_SIZE as u64;
        hdr.e_phnum = phdr_count as u16;
        if let Some(&sym_id) = obj.symbol_index.get(&exec.entry_symbol) {
            if let SymbolDef::Section { section, value } = obj.symbols[sym_id].def {
                hdr.e_entry = sec_addr[section] + value;
            }
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(bytes_of(&hdr));

    if let Some(exec) = exec {
        // One RX segment (.text+.rodata), one RW segment (.data+.bss).
        let rx = ProgramHeader64 {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_X,
            p_offset: 0,
            p_vaddr: exec.base_addr,
            p_paddr: exec.base_addr,
            p_filesz: offset,
            p_memsz: offset,
            p_align: 0x1000,
        };
        let rw_start = obj
            .sections
            .iter()
            .position(|s| s.kind == SectionKind::Data)
            .map(|i| sec_off[i])
            .unwrap_or(offset);
        let rw_end = obj.sections.last().map(|_| offset).unwrap_or(offset);
        let rw = ProgramHeader64 {
            p_type: PT_LOAD,
            p_flags: PF_R | PF_W,
            p_offset: rw_start,
            p_vaddr: exec.base_addr + rw_start,
            p_paddr: exec.base_addr + rw_start,
            p_filesz: rw_end.saturating_sub(rw_start),
            p_memsz: rw_end.saturating_sub(rw_start),
            p_align: 0x1000,
        };
        out.extend_from_slice(bytes_of(&rx));
        out.extend_from_slice(bytes_of(&rw));
    }

    for (i, sec) in obj.sections.iter().enumerate() {
        if sec.kind == SectionKind::Bss {
            continue;
        }
        while (out.len() as u64) < sec_off[i] {
            out.push(0);
        }
        out.extend_from_slice(&sec.data);
    }
    if !is_exec {
        for bytes in &rela_bytes {
            out.extend_from_slice(bytes);
        }
    }
    out.extend_from_slice(&symtab_bytes);
    out.extend_from_slice(&strtab_bytes);
    out.extend_from_slice(&shstrtab_bytes);
    while (out.len() as u64) < shoff {
        out.push(0);
    }

    for o in &outs {
        let rec = SectionHeader64 {
            sh_name: o.name,
            sh_type: o.sh_type,
            sh_flags: o.flags,
            sh_addr: o.addr,
            sh_offset: o.offset,
            sh_size: o.size,
            sh_link: o.link,
            sh_info: o.info,
            sh_addralign: o.align,
            sh_entsize: o.entsize,
        };
        out.extend_from_slice(bytes_of(&rec));
    }

    out
}

fn read_elf(data: &[u8]) -> Result<Object> {
    let (hdr, _): (FileHeader64, _) =
        from_bytes(data).ok_or(ElfError::Malformed("truncated ELF header"))?;
    if hdr.e_ident[0..4] != ELFMAG {
        return Err(ElfError::Malformed("bad ELF magic"));
    }
    if hdr.e_ident[4] != ELFCLASS64 || hdr.e_ident[5] != ELFDATA2LSB {
        return Err(ElfError::Malformed("expected ELF64 LSB"));
    }
    let machine = match hdr.e_machine {
        EM_X86_64 => Machine::X86_64,
        EM_AARCH64 => Machine::Aarch64,
        EM_RISCV => Machine::Riscv64,
        other => return Err(ElfError::UnsupportedMachine(other)),
    };

    let shoff = hdr.e_shoff as usize;
    let shnum = hdr.e_shnum as usize;
    let mut shdrs = Vec::with_capacity(shnum);
    for i in 0..shnum {
        let off = shoff + i * SHDR64_SIZE;
        let (sh, _): (SectionHeader64, _) = from_bytes(
            data.get(off..).ok_or(ElfError::Malformed("section header out of range"))?,
        )
        .ok_or(ElfError::Malformed("truncated section header"))?;
        shdrs.push(sh);
    }
    let shstr_idx = hdr.e_shstrndx as usize;
    let shstrtab = section_bytes(data, &shdrs[shstr_idx])?;

    let mut obj = Object::new(machine);
    // section index i in ELF corresponds to obj.sections[i - 1] (index 0 is SHN_UNDEF/null).
    let mut local_to_obj = vec![usize::MAX; shdrs.len()];
    for (i, sh) in shdrs.iter().enumerate().skip(1) {
        let name = read_str(shstrtab, sh.sh_name).to_string();
        if sh.sh_type == SHT_SYMTAB || sh.sh_type == SHT_STRTAB || sh.sh_type == SHT_RELA {
            continue;
        }
        let kind = if sh.sh_type == SHT_NOBITS {
            SectionKind::Bss
        } else if sh.sh_flags & SHF_EXECINSTR != 0 {
            SectionKind::Text
        } else if sh.sh_flags & SHF_WRITE != 0 {
            SectionKind::Data
        } else {
            SectionKind::ReadOnlyData
        };
        let id = obj.sections.len();
        let mut sec = Section::new(name.clone(), kind, sh.sh_addralign.max(1));
        if kind != SectionKind::Bss {
            sec.data = section_bytes(data, sh)?.to_vec();
        }
        sec.size = sh.sh_size;
        obj.sections.push(sec);
        obj.section_index.insert(name, id);
        local_to_obj[i] = id;
    }

    // symtab
    let symtab_idx = shdrs
        .iter()
        .position(|s| s.sh_type == SHT_SYMTAB)
        .ok_or(ElfError::Malformed("missing .symtab"))?;
    let symtab_sh = &shdrs[symtab_idx];
    let strtab_sh = &shdrs[symtab_sh.sh_link as usize];
    let strtab = section_bytes(data, strtab_sh)?;
    let symtab_bytes = section_bytes(data, symtab_sh)?;
    let nsyms = symtab_bytes.len() / SYM64_SIZE;
    let mut elf_to_obj_sym = vec![usize::MAX; nsyms];
    for i in 0..nsyms {
        let (sym, _): (Sym64, _) = from_bytes(&symtab_bytes[i * SYM64_SIZE..])
            .ok_or(ElfError::Malformed("truncated symbol"))?;
        if i == 0 {
            continue;
        }
        let name = read_str(strtab, sym.st_name).to_string();
        let binding = if st_bind(sym.st_info) == STB_GLOBAL {
            Binding::Global
        } else {
            Binding::Local
        };
        let kind = match st_type(sym.st_info) {
            STT_OBJECT => SymbolKind::Object,
            STT_FUNC => SymbolKind::Func,
            STT_SECTION => SymbolKind::Section,
            _ => SymbolKind::NoType,
        };
        let def = match sym.st_shndx {
            SHN_UNDEF => SymbolDef::Undefined,
            SHN_ABS => SymbolDef::Absolute(sym.st_value),
            SHN_COMMON => SymbolDef::Common { align: sym.st_value.max(1) },
            shndx => SymbolDef::Section {
                section: local_to_obj[shndx as usize],
                value: sym.st_value,
            },
        };
        let obj_id = if name.is_empty() {
            let id = obj.symbols.len();
            obj.symbols.push(Symbol { name, binding, kind, def, size: sym.st_size });
            id
        } else {
            let id = obj.symbol_id(&name);
            obj.symbols[id] = Symbol { name: obj.symbols[id].name.clone(), binding, kind, def, size: sym.st_size };
            id
        };
        elf_to_obj_sym[i] = obj_id;
    }

    // relocations
    for (i, sh) in shdrs.iter().enumerate() {
        if sh.sh_type != SHT_RELA {
            continue;
        }
        let target_shndx = sh.sh_info as usize;
        let target = local_to_obj.get(target_shndx).copied().unwrap_or(usize::MAX);
        if target == usize::MAX {
            continue;
        }
        let bytes = section_bytes(data, sh)?;
        let n = bytes.len() / RELA64_SIZE;
        for k in 0..n {
            let (rela, _): (Rela64, _) =
                from_bytes(&bytes[k * RELA64_SIZE..]).ok_or(ElfError::Malformed("truncated rela"))?;
            let sym_idx = r_sym(rela.r_info) as usize;
            let kind = RelocKind::from_elf_type(machine, r_type(rela.r_info))
                .ok_or(ElfError::Malformed("unknown relocation type"))?;
            obj.sections[target].relocations.push(Relocation {
                offset: rela.r_offset,
                symbol: elf_to_obj_sym.get(sym_idx).copied().unwrap_or(0),
                kind,
                addend: rela.r_addend,
            });
        }
        let _ = i;
    }

    Ok(obj)
}

fn section_bytes<'a>(data: &'a [u8], sh: &SectionHeader64) -> Result<&'a [u8]> {
    if sh.sh_type == SHT_NOBITS {
        return Ok(&[]);
    }
    let start = sh.sh_offset as usize;
    let end = start + sh.sh_size as usize;
    data.get(start..end).ok_or(ElfError::Malformed("section data out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_object() {
        let mut obj = Object::new(Machine::X86_64);
        let text = obj.section_id(".text", SectionKind::Text, 16);
        obj.sections[text].append(&[0xb8, 0x2a, 0, 0, 0, 0xc3], 1); // mov eax,42; ret
        obj.define("main", text, 0, 6, SymbolKind::Func);
        obj.set_global("main");

        let bytes = obj.write_rel();
        assert_eq!(&bytes[0..4], &ELFMAG);

        let parsed = Object::read_rel(&bytes).unwrap();
        assert_eq!(parsed.machine, Machine::X86_64);
        let sec = parsed.section_index.get(".text").copied().unwrap();
        assert_eq!(parsed.sections[sec].data, vec![0xb8, 0x2a, 0, 0, 0, 0xc3]);
        let sym_id = *parsed.symbol_index.get("main").unwrap();
        assert_eq!(parsed.symbols[sym_id].binding, Binding::Global);
        match parsed.symbols[sym_id].def {
            SymbolDef::Section { value, .. } => assert_eq!(value, 0),
            _ => panic!("expected defined symbol"),
        }
    }

    #[test]
    fn symtab_sh_info_equals_local_count() {
        let mut obj = Object::new(Machine::X86_64);
        let text = obj.section_id(".text", SectionKind::Text, 16);
        obj.sections[text].append(&[0x90], 1);
        obj.define(".Llocal", text, 0, 0, SymbolKind::NoType);
        obj.define("global_fn", text, 0, 1, SymbolKind::Func);
        obj.set_global("global_fn");

        let bytes = obj.write_rel();
        let (hdr, _): (FileHeader64, _) = from_bytes(&bytes).unwrap();
        let shoff = hdr.e_shoff as usize;
        for i in 0..hdr.e_shnum as usize {
            let off = shoff + i * SHDR64_SIZE;
            let (sh, _): (SectionHeader64, _) = from_bytes(&bytes[off..]).unwrap();
            if sh.sh_type == SHT_SYMTAB {
                // one null symbol + one local => 2 local entries before the first global.
                assert_eq!(sh.sh_info, 2);
            }
        }
    }
}

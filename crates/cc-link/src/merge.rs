//! Section and symbol merging across input objects.

use cc_elf::{Binding, Object, Relocation, SectionKind, Symbol, SymbolDef, SymbolKind};

use crate::error::{Error, Result};

/// Per-input-object translation from local section/symbol indices to their
/// home in the merged output object.
pub struct ObjectMap {
    section_of: Vec<usize>,
    base_of: Vec<u64>,
    symbol_of: Vec<usize>,
}

/// Groups same-named input sections into output sections, concatenating
/// their bytes in input order. Returns each object's section translation;
/// `symbol_of` is left empty until `merge_symbols` fills it in.
pub fn merge_sections(objects: &[Object], out: &mut Object) -> Vec<ObjectMap> {
    objects
        .iter()
        .map(|obj| {
            let mut section_of = vec![0usize; obj.sections.len()];
            let mut base_of = vec![0u64; obj.sections.len()];
            for (i, sec) in obj.sections.iter().enumerate() {
                let out_id = out.section_id(&sec.name, sec.kind, sec.align);
                out.sections[out_id].align = out.sections[out_id].align.max(sec.align);
                let base = if sec.kind == SectionKind::Bss {
                    out.sections[out_id].append_bss(sec.size, sec.align.max(1))
                } else {
                    out.sections[out_id].append(&sec.data, sec.align.max(1))
                };
                section_of[i] = out_id;
                base_of[i] = base;
            }
            ObjectMap { section_of, base_of, symbol_of: Vec::new() }
        })
        .collect()
}

fn translate_def(def: SymbolDef, map: &ObjectMap) -> SymbolDef {
    match def {
        SymbolDef::Section { section, value } => {
            SymbolDef::Section { section: map.section_of[section], value: value + map.base_of[section] }
        }
        other => other,
    }
}

/// Resolves one incoming global-bound definition against whatever `out`
/// already holds for that name: a real definition always wins over a
/// `Common` tentative one; two real definitions collide.
fn resolve_global(out: &mut Object, id: usize, incoming: &Symbol, translated_def: SymbolDef) -> Result<()> {
    out.symbols[id].binding = Binding::Global;
    if out.symbols[id].kind == SymbolKind::NoType {
        out.symbols[id].kind = incoming.kind;
    }
    match (out.symbols[id].def, translated_def) {
        (SymbolDef::Undefined, SymbolDef::Undefined) => {}
        (SymbolDef::Undefined, other) => {
            out.symbols[id].def = other;
            out.symbols[id].size = incoming.size;
        }
        (SymbolDef::Common { align: a }, SymbolDef::Common { align: b }) => {
            out.symbols[id].def = SymbolDef::Common { align: a.max(b) };
            out.symbols[id].size = out.symbols[id].size.max(incoming.size);
        }
        (SymbolDef::Common { .. }, SymbolDef::Section { .. }) | (SymbolDef::Common { .. }, SymbolDef::Absolute(_)) => {
            out.symbols[id].def = translated_def;
            out.symbols[id].size = incoming.size;
        }
        (SymbolDef::Common { .. }, SymbolDef::Undefined) => {}
        (SymbolDef::Section { .. }, SymbolDef::Undefined) | (SymbolDef::Absolute(_), SymbolDef::Undefined) => {}
        (SymbolDef::Section { .. }, SymbolDef::Common { .. }) | (SymbolDef::Absolute(_), SymbolDef::Common { .. }) => {}
        _ => return Err(Error::MultipleDefinition(incoming.name.clone())),
    }
    Ok(())
}

/// Builds the merged global symbol table. Local symbols never collide by
/// name across objects (two `.L0` labels from different translation units
/// are distinct), so each gets a fresh entry outside the name index;
/// globals resolve through `resolve_global`.
pub fn merge_symbols(objects: &[Object], maps: &mut [ObjectMap], out: &mut Object) -> Result<()> {
    for (oi, obj) in objects.iter().enumerate() {
        let mut symbol_of = vec![0usize; obj.symbols.len()];
        for (i, sym) in obj.symbols.iter().enumerate() {
            let translated_def = translate_def(sym.def, &maps[oi]);
            let id = if sym.binding == Binding::Local {
                let id = out.symbols.len();
                out.symbols.push(Symbol {
                    name: sym.name.clone(),
                    binding: Binding::Local,
                    kind: sym.kind,
                    def: translated_def,
                    size: sym.size,
                });
                id
            } else {
                let id = out.symbol_id(&sym.name);
                resolve_global(out, id, sym, translated_def)?;
                id
            };
            symbol_of[i] = id;
        }
        maps[oi].symbol_of = symbol_of;
    }
    Ok(())
}

pub fn merge_relocations(objects: &[Object], maps: &[ObjectMap], out: &mut Object) {
    for (oi, obj) in objects.iter().enumerate() {
        for (si, sec) in obj.sections.iter().enumerate() {
            let out_sec = maps[oi].section_of[si];
            let base = maps[oi].base_of[si];
            for reloc in &sec.relocations {
                out.sections[out_sec].relocations.push(Relocation {
                    offset: reloc.offset + base,
                    symbol: maps[oi].symbol_of[reloc.symbol],
                    kind: reloc.kind,
                    addend: reloc.addend,
                });
            }
        }
    }
}

/// Allocates remaining tentative (COMMON) definitions into `.bss`; the
/// largest size/align across all inputs wins.
pub fn materialize_commons(out: &mut Object) {
    let bss_id = out.section_id(".bss", SectionKind::Bss, 1);
    for i in 0..out.symbols.len() {
        if let SymbolDef::Common { align } = out.symbols[i].def {
            let size = out.symbols[i].size;
            let base = out.sections[bss_id].append_bss(size, align.max(1));
            out.symbols[i].def = SymbolDef::Section { section: bss_id, value: base };
        }
    }
}

/// Any symbol still `Undefined` after merging every input is an unresolved
/// external reference.
pub fn check_undefined(out: &Object) -> Result<()> {
    for sym in &out.symbols {
        if sym.binding == Binding::Global && matches!(sym.def, SymbolDef::Undefined) {
            return Err(Error::UndefinedReference(sym.name.clone()));
        }
    }
    Ok(())
}

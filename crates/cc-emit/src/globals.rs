//! Global variable emission: zero-initialized globals go to `.bss`;
//! everything else that has an initializer goes to `.data`.

use cc_assemble::AsmUnit;
use cc_interner::Interner;
use cc_parse::{Expr, ExprKind, Global, Initializer, Type, UnOp};

fn type_directive(width: u64) -> &'static str {
    match width {
        1 => ".byte",
        2 => ".word",
        4 => ".long",
        8 => ".quad",
        _ => ".byte",
    }
}

/// Flattens `init` into a flat byte-layout of `(offset, directive-text)`
/// pairs over `[0, size)`, matching the struct/array member offsets the
/// parser already computed.
fn layout_initializer(init: &Initializer, ty: &Type, base: u64, out: &mut Vec<(u64, String)>, interner: &Interner) {
    match init {
        Initializer::Scalar(expr) => out.push((base, scalar_directive(expr, ty, interner))),
        Initializer::List(items) => {
            let elem_ty = match ty {
                Type::Array { elem, .. } => Some(elem.clone()),
                _ => None,
            };
            for (i, (designator, item)) in items.iter().enumerate() {
                let (off, member_ty) = if let Some(elem) = &elem_ty {
                    let idx = designator.unwrap_or(i as u64);
                    (base + idx * elem.size(), elem.as_ref().clone())
                } else if let Some(members) = ty.members() {
                    let m = &members[i];
                    (base + m.offset, m.ty.as_ref().clone())
                } else {
                    (base, ty.clone())
                };
                layout_initializer(item, &member_ty, off, out, interner);
            }
        }
    }
}

fn scalar_directive(expr: &Expr, ty: &Type, interner: &Interner) -> String {
    let width = ty.size();
    match &expr.kind {
        ExprKind::IntLit(v) => format!("{} {v}", type_directive(width)),
        ExprKind::FloatLit(v) => {
            if width == 4 {
                format!(".long {}", (*v as f32).to_bits())
            } else {
                format!(".quad {}", v.to_bits())
            }
        }
        ExprKind::StrLit(bytes) => {
            let text = bytes.iter().map(u8::to_string).collect::<Vec<_>>().join(", ");
            format!(".byte {text}, 0")
        }
        ExprKind::Unary(UnOp::Addr, inner) => {
            if let ExprKind::Var(name) = &inner.kind {
                format!(".quad {}", interner.resolve(*name))
            } else {
                ".quad 0".to_string()
            }
        }
        ExprKind::Cast(inner) => scalar_directive(inner, ty, interner),
        _ => format!("{} 0", type_directive(width)),
    }
}

pub fn emit_global(global: &Global, interner: &Interner, unit: &mut AsmUnit) {
    let name = interner.resolve(global.name).to_string();
    if global.is_extern && global.init.is_none() {
        return;
    }
    let size = global.ty.size();
    let align = global.ty.align();

    match &global.init {
        None => {
            unit.bss.directive(format!(".align {align}"));
            if !global.is_static {
                unit.bss.directive(format!(".global {name}"));
            }
            unit.bss.label(name.clone());
            unit.bss.directive(format!(".zero {size}"));
        }
        Some(init) => {
            let mut fields = Vec::new();
            layout_initializer(init, &global.ty, 0, &mut fields, interner);
            fields.sort_by_key(|(off, _)| *off);

            unit.data.directive(format!(".align {align}"));
            if !global.is_static {
                unit.data.directive(format!(".global {name}"));
            }
            unit.data.label(name.clone());
            let mut cursor = 0u64;
            for (off, directive) in fields {
                if off > cursor {
                    unit.data.directive(format!(".zero {}", off - cursor));
                }
                unit.data.directive(directive.clone());
                cursor = off + directive_width(&directive);
            }
            if cursor < size {
                unit.data.directive(format!(".zero {}", size - cursor));
            }
        }
    }
}

fn directive_width(directive: &str) -> u64 {
    if directive.starts_with(".byte") {
        directive.matches(',').count() as u64 + 1
    } else if directive.starts_with(".word") {
        2
    } else if directive.starts_with(".long") {
        4
    } else {
        8
    }
}

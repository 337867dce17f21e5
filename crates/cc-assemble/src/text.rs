//! Textual assembly (de)serialization for `AsmUnit`. Directives manage the
//! current section: `.text`/`.rodata`/`.data`/`.bss` switch which bucket
//! subsequent labels/directives/instructions land in.
//!
//! The compiler's own internal pipeline builds an `AsmUnit` directly and
//! never round-trips through text; this module exists for the two places
//! actual assembly text is needed: `-S` output and `.s` file input.

use crate::fragment::AsmUnit;

enum Cursor {
    Text,
    Rodata,
    Data,
    Bss,
}

/// Renders an `AsmUnit` as assembly text, one section-switch directive per
/// non-empty bucket followed by its fragments in order.
pub fn render_asm_text(unit: &AsmUnit) -> String {
    use crate::fragment::Fragment;

    let mut out = String::new();
    for (name, section) in
        [(".text", &unit.text), (".rodata", &unit.rodata), (".data", &unit.data), (".bss", &unit.bss)]
    {
        if section.fragments.is_empty() {
            continue;
        }
        out.push_str(name);
        out.push('\n');
        for frag in &section.fragments {
            match frag {
                Fragment::Label(l) => {
                    out.push_str(l);
                    out.push_str(":\n");
                }
                Fragment::Directive(d) => {
                    out.push_str(d);
                    out.push('\n');
                }
                Fragment::Instr(i) => {
                    out.push('\t');
                    out.push_str(i);
                    out.push('\n');
                }
            }
        }
    }
    out
}

/// Parses hand-written or previously-rendered assembly text back into an
/// `AsmUnit`. A line ending in `:` is a label, a line starting with `.` that
/// isn't a recognised section switch is a directive, everything else is an
/// instruction.
pub fn parse_asm_text(text: &str) -> AsmUnit {
    let mut unit = AsmUnit::new();
    let mut cursor = Cursor::Text;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        match line {
            ".text" => {
                cursor = Cursor::Text;
                continue;
            }
            ".rodata" => {
                cursor = Cursor::Rodata;
                continue;
            }
            ".data" => {
                cursor = Cursor::Data;
                continue;
            }
            ".bss" => {
                cursor = Cursor::Bss;
                continue;
            }
            _ => {}
        }
        let section = match cursor {
            Cursor::Text => &mut unit.text,
            Cursor::Rodata => &mut unit.rodata,
            Cursor::Data => &mut unit.data,
            Cursor::Bss => &mut unit.bss,
        };
        if let Some(label) = line.strip_suffix(':') {
            section.label(label.to_string());
        } else if line.starts_with('.') {
            section.directive(line.to_string());
        } else {
            section.instr(line.to_string());
        }
    }
    unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_text() {
        let mut unit = AsmUnit::new();
        unit.text.directive(".global main".to_string());
        unit.text.label("main".to_string());
        unit.text.instr("mov eax, 47".to_string());
        unit.text.instr("ret".to_string());

        let text = render_asm_text(&unit);
        let parsed = parse_asm_text(&text);
        assert_eq!(parsed.text.fragments.len(), unit.text.fragments.len());
    }

    #[test]
    fn section_switches_route_fragments() {
        let text = ".data\nx:\n.long 5\n.text\nmain:\n\tret\n";
        let unit = parse_asm_text(text);
        assert_eq!(unit.data.fragments.len(), 2);
        assert_eq!(unit.text.fragments.len(), 2);
    }
}

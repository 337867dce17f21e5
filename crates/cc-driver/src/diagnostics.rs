//! Diagnostic rendering: `FILE:LINE:COL: message` followed by the
//! offending source line with a caret and tildes spanning the token.

use cc_interner::{Interner, Span};

pub fn render(interner: &Interner, span: Span, message: &str) -> String {
    let file = interner.resolve(span.loc.file);
    let mut out = format!("{file}:{}:{}: {message}\n", span.loc.line, span.loc.col);

    if let Ok(contents) = std::fs::read_to_string(file) {
        if let Some(line_text) = contents.lines().nth(span.loc.line.saturating_sub(1) as usize) {
            out.push_str(line_text);
            out.push('\n');
            out.push_str(&" ".repeat(span.loc.col.saturating_sub(1) as usize));
            out.push('^');
            let underline_len = span.len.max(1) as usize;
            if underline_len > 1 {
                out.push_str(&"~".repeat(underline_len - 1));
            }
        }
    }
    out
}

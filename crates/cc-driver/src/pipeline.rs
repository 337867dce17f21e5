//! Orchestration: routes each input through preprocessing, parsing,
//! lowering, emission, assembly, and linking, stopping at whichever stage
//! `-E`/`-S`/`-c` asks for.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cc_interner::Interner;
use cc_lex::PpConfig;

use crate::archive;
use crate::cli::Cli;
use crate::diagnostics;

/// A compilation error already rendered to its final `FILE:LINE:COL:
/// message` form. Kept distinct from `anyhow::Error` so `main` can map it
/// to exit code 1 (vs. 2 for usage errors).
pub struct Diagnostic(pub String);

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Debug for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for Diagnostic {}

/// A malformed invocation caught after clap's own parsing (flag combinations
/// clap can't express as mutual exclusions on its own). Maps to exit code 2.
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cc: {}", self.0)
    }
}
impl std::fmt::Debug for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cc: {}", self.0)
    }
}
impl std::error::Error for UsageError {}

pub fn run(cli: &Cli) -> Result<()> {
    let stage_flags = [cli.preprocess_only, cli.assembly_only, cli.compile_only].iter().filter(|b| **b).count();
    if stage_flags > 1 {
        return Err(UsageError("at most one of -E, -S, -c may be given".to_string()).into());
    }
    if (cli.preprocess_only || cli.assembly_only || cli.compile_only)
        && cli.inputs.len() > 1
        && cli.output.is_some()
    {
        return Err(UsageError("-o cannot name a single output for multiple inputs with -E/-S/-c".to_string()).into());
    }

    let target: cc_ir::Target = cli.target.into();
    let machine: cc_elf::Machine = cli.target.into();
    let pp_config = build_pp_config(cli);

    let mut objects = Vec::new();
    for input in &cli.inputs {
        let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "c" => compile_one(input, cli, &pp_config, target, machine, &mut objects)?,
            "s" => assemble_one(input, cli, machine, &mut objects)?,
            "o" => {
                let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
                let obj = cc_elf::Object::read_rel(&bytes).with_context(|| format!("parsing {}", input.display()))?;
                objects.push(obj);
            }
            "a" => {
                for member in archive::read_archive(input)? {
                    if let Ok(obj) = cc_elf::Object::read_rel(&member.data) {
                        objects.push(obj);
                    }
                }
            }
            _ => return Err(UsageError(format!("{}: unrecognised input file type", input.display())).into()),
        }
    }

    if cli.preprocess_only || cli.assembly_only || cli.compile_only {
        return Ok(());
    }

    for lib in &cli.libs {
        let path = resolve_lib(lib, &cli.lib_dirs)?;
        for member in archive::read_archive(&path)? {
            if let Ok(obj) = cc_elf::Object::read_rel(&member.data) {
                objects.push(obj);
            }
        }
    }

    let opts = cc_link::LinkOptions::for_machine(machine);
    let exec_bytes = cc_link::link(&objects, machine, &opts).context("linking")?;
    let out_path = cli.output.clone().unwrap_or_else(|| PathBuf::from("a.out"));
    write_executable(&out_path, &exec_bytes)?;
    Ok(())
}

fn build_pp_config(cli: &Cli) -> PpConfig {
    let mut include_dirs = cli.include_dirs.clone();
    include_dirs.extend(cc_lex::default_include_dirs());

    let mut predefined: Vec<(String, String)> = cli
        .defines
        .iter()
        .map(|d| match d.split_once('=') {
            Some((name, val)) => (name.to_string(), val.to_string()),
            None => (d.clone(), "1".to_string()),
        })
        .collect();
    predefined.retain(|(name, _)| !cli.undefines.contains(name));

    PpConfig { include_dirs, predefined }
}

fn resolve_lib(name: &str, lib_dirs: &[PathBuf]) -> Result<PathBuf> {
    let filename = format!("lib{name}.a");
    for dir in lib_dirs {
        let candidate = dir.join(&filename);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(UsageError(format!("cannot find -l{name}")).into())
}

fn output_for(input: &Path, cli: &Cli, new_ext: &str) -> PathBuf {
    cli.output.clone().unwrap_or_else(|| input.with_extension(new_ext))
}

fn compile_one(
    input: &Path,
    cli: &Cli,
    pp_config: &PpConfig,
    target: cc_ir::Target,
    machine: cc_elf::Machine,
    objects: &mut Vec<cc_elf::Object>,
) -> Result<()> {
    let mut interner = Interner::new();
    let toks = cc_lex::lex_file(input, &mut interner, pp_config.clone())
        .map_err(|e| diagnose_lex(&interner, input, &e))?;

    if cli.preprocess_only {
        let text = render_preprocessed(&toks, &interner);
        match &cli.output {
            Some(path) => std::fs::write(path, &text)?,
            None => print!("{text}"),
        }
        return Ok(());
    }

    let (tu, _string_literals) =
        cc_parse::parse(&toks, &mut interner).map_err(|e| diagnose_parse(&interner, input, &e))?;

    let unit =
        cc_emit::emit_translation_unit(&tu, &mut interner, target).map_err(|e| diagnose_ir(&interner, input, &e))?;

    if cli.assembly_only {
        let text = cc_assemble::render_asm_text(&unit);
        std::fs::write(output_for(input, cli, "s"), &text)?;
        return Ok(());
    }

    let obj = cc_assemble::assemble(&unit, machine).with_context(|| format!("assembling {}", input.display()))?;

    if cli.compile_only {
        std::fs::write(output_for(input, cli, "o"), obj.write_rel())?;
        return Ok(());
    }

    objects.push(obj);
    Ok(())
}

fn assemble_one(input: &Path, cli: &Cli, machine: cc_elf::Machine, objects: &mut Vec<cc_elf::Object>) -> Result<()> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let unit = cc_assemble::parse_asm_text(&text);
    let obj = cc_assemble::assemble(&unit, machine).with_context(|| format!("assembling {}", input.display()))?;

    if cli.compile_only {
        std::fs::write(output_for(input, cli, "o"), obj.write_rel())?;
        return Ok(());
    }
    objects.push(obj);
    Ok(())
}

fn write_executable(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn render_preprocessed(toks: &[cc_lex::Token], interner: &Interner) -> String {
    let mut out = String::new();
    let mut last_line = 0u32;
    for tok in toks {
        if tok.span.loc.line != last_line {
            out.push('\n');
            last_line = tok.span.loc.line;
        } else if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&crate::token_text::render(tok, interner));
    }
    out.push('\n');
    out
}

fn diagnose_lex(interner: &Interner, file: &Path, err: &cc_lex::LexError) -> Diagnostic {
    match err.span() {
        Some(span) => Diagnostic(diagnostics::render(interner, span, &err.to_string())),
        None => Diagnostic(format!("{}: {err}", file.display())),
    }
}

fn diagnose_parse(interner: &Interner, _file: &Path, err: &cc_parse::ParseError) -> Diagnostic {
    Diagnostic(diagnostics::render(interner, err.span(), &err.to_string()))
}

fn diagnose_ir(interner: &Interner, _file: &Path, err: &cc_ir::IrError) -> Diagnostic {
    let cc_ir::IrError::UnsupportedOnTarget(span) = err;
    Diagnostic(diagnostics::render(interner, *span, &err.to_string()))
}

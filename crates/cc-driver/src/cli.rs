//! Flag surface for the driver CLI.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "cc", version, about = "A self-hosting C toolchain driver")]
pub struct Cli {
    /// Output file path (default `a.out` for an exec, `FILE.o` for `-c`).
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Stop after producing a relocatable object.
    #[arg(short = 'c')]
    pub compile_only: bool,

    /// Stop after producing assembly.
    #[arg(short = 'S')]
    pub assembly_only: bool,

    /// Stop after preprocessing.
    #[arg(short = 'E')]
    pub preprocess_only: bool,

    /// Add an include search path.
    #[arg(short = 'I', value_name = "DIR")]
    pub include_dirs: Vec<PathBuf>,

    /// Define a macro, `NAME` or `NAME=VAL`.
    #[arg(short = 'D', value_name = "NAME[=VAL]")]
    pub defines: Vec<String>,

    /// Undefine a macro.
    #[arg(short = 'U', value_name = "NAME")]
    pub undefines: Vec<String>,

    /// Link library `libNAME.a`.
    #[arg(short = 'l', value_name = "NAME")]
    pub libs: Vec<String>,

    /// Library search path.
    #[arg(short = 'L', value_name = "DIR")]
    pub lib_dirs: Vec<PathBuf>,

    /// Target triple to generate code for. Not in the distilled flag table,
    /// but required to pick among the three backends the rest of the
    /// pipeline supports; defaults to the host-equivalent x86-64 backend.
    #[arg(long, value_enum, default_value = "x86-64")]
    pub target: TargetArg,

    /// Input files: C source, `.s` assembly, `.o` ELF REL, or `.a` archive.
    #[arg(required = true, value_name = "FILE")]
    pub inputs: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TargetArg {
    #[value(name = "x86-64")]
    X86_64,
    #[value(name = "aarch64")]
    Aarch64,
    #[value(name = "riscv64")]
    Riscv64,
}

impl From<TargetArg> for cc_ir::Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::X86_64 => cc_ir::Target::X86_64,
            TargetArg::Aarch64 => cc_ir::Target::Aarch64,
            TargetArg::Riscv64 => cc_ir::Target::Riscv64,
        }
    }
}

impl From<TargetArg> for cc_elf::Machine {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::X86_64 => cc_elf::Machine::X86_64,
            TargetArg::Aarch64 => cc_elf::Machine::Aarch64,
            TargetArg::Riscv64 => cc_elf::Machine::Riscv64,
        }
    }
}

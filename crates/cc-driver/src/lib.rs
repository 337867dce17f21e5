//! Command-line driver: wires the lexer, parser, IR builder, emitter,
//! assembler, and linker together behind a single flag surface.

mod archive;
pub mod cli;
mod diagnostics;
pub mod interp;
mod pipeline;
mod token_text;

pub use cli::Cli;

use std::process::ExitCode;

/// Runs the driver end to end and returns the process exit code: 0 on
/// success, 1 on a compilation/link failure, 2 on a usage error.
pub fn run(cli: Cli) -> ExitCode {
    match pipeline::run(&cli) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            if err.downcast_ref::<pipeline::Diagnostic>().is_some() {
                eprint!("{err}");
                ExitCode::from(1)
            } else if let Some(usage) = err.downcast_ref::<pipeline::UsageError>() {
                eprintln!("{usage}");
                ExitCode::from(2)
            } else {
                eprintln!("cc: error: {err}");
                ExitCode::from(1)
            }
        }
    }
}

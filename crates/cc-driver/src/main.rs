use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    env_logger::init();
    let cli = cc_driver::Cli::parse();
    cc_driver::run(cli)
}

#![forbid(unsafe_code)]

use clap::Parser;
use lwe_bkw_core::{cli, settings::Cli};

fn main() {
    let cli_args = Cli::parse();
    std::process::exit(cli::run(cli_args));
}

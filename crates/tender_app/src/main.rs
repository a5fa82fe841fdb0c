mod cli;
mod platform;

use std::process::ExitCode;

use clap::Parser;

fn main() -> anyhow::Result<ExitCode> {
    platform::run(cli::Cli::parse())
}

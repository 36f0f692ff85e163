//! # conan-updater-bgfx
//!
//! Binary entry point. Parses the command line with `clap` and hands off to
//! the library's update pipeline; errors surface through `anyhow` with a
//! non-zero exit status.

mod cli;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}

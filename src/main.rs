use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use pkgaudit_core::{cli, logging};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::init(logging::Verbosity::from_flags(args.verbose, args.quiet))?;
    args.validate().context("Invalid arguments")?;

    cli::run(&args)
}

//! Timeliner CLI: extract a timeline from files and directories as JSON lines.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use timeliner::engine::arg_parser::Cli;
use timeliner::engine::handle_run;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}

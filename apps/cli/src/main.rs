//! GrantScout CLI — search-grounded funding opportunity discovery.
//!
//! Runs discovery sequences against the extraction provider, keeps the
//! results for the lifetime of the process, and optionally mails a digest
//! of new finds.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

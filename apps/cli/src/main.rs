//! paperpage CLI: generate project pages from papers, repositories and videos.
//!
//! Single requests and CSV/JSON batches run through the same generation
//! pipeline and land in the local content store.

mod commands;
mod progress;

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

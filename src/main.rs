mod auth;
mod cli;
mod engine;
mod logging;
mod matrix;
mod metrics;
mod model;
mod orchestrator;
mod session_log;
mod stages;
mod subjects;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text || args.list_subjects || args.matrix;

    cli::run(args).await?;
    // Explicitly exit with code 0 on success for non-TUI modes
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}

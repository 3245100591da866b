//! Tenderscan CLI - Extract source-traced records from tender documents.

use anyhow::Context;
use clap::Parser;
use tenderscan_cli::commands;
use tenderscan_cli::{Cli, Command, Config, Formatter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenderscan=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("loading config from {}", path.display()),
        None => "loading default config".to_string(),
    })?;

    // Determine output format
    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);

    // Determine color setting
    let color_enabled = !cli.no_color && config.settings.color;

    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Structure(args) => {
            commands::execute_structure(args, &config.pipeline, &formatter)?;
        }
        Command::Chunk(args) => {
            commands::execute_chunk(args, &config.pipeline, &formatter)?;
        }
        Command::Repair(args) => {
            commands::execute_repair(args, &formatter)?;
        }
        Command::Run(args) => {
            commands::execute_run(args, &config.pipeline, &formatter).await?;
        }
    }

    Ok(())
}

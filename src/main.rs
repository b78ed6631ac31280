use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use offsync::cli::args::{Cli, Commands};
use offsync::cli::commands;
use offsync::config::{Config, Paths};
use offsync::error::OffsyncError;
use offsync::logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    if let Commands::Completions { shell, install } = &cli.command {
        println!("{}", commands::completions(*shell, *install)?);
        return Ok(());
    }

    let paths = Paths::new()?;
    let config = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(OffsyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            ))
            .into());
        },
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_from_path(&paths.config_file)?,
    };
    logging::init(&config.logging).context("failed to initialise logging")?;

    let output = match cli.command {
        Commands::Cache(args) => commands::cache(&config, &paths, args.command, format)?,
        Commands::Sync(args) => commands::sync(&config, &paths, args.command, format).await?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

//! turnguard CLI entry point.

use anyhow::Result;
use clap::Parser;

use turnguard::cli::commands::{agent, capture, config, reconcile, send, watch};
use turnguard::cli::{handle_error, AppContext, Cli, Commands};
use turnguard::infrastructure::config::ConfigLoader;
use turnguard::infrastructure::logging::LoggerImpl;

async fn run(cli: Cli) -> Result<()> {
    let settings = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    // Config inspection needs neither logging nor the database.
    let command = match cli.command {
        Commands::Config(args) => return config::execute(args, &settings, cli.json),
        command => command,
    };

    let _logger = LoggerImpl::init(&settings.logging)?;
    let ctx = AppContext::open(settings).await?;

    match command {
        Commands::Reconcile(args) => reconcile::execute(args, &ctx, cli.json).await,
        Commands::Watch(args) => watch::execute(args, &ctx, cli.json).await,
        Commands::Agent(args) => agent::execute(args, &ctx, cli.json).await,
        Commands::Capture(args) => capture::execute(args, &ctx, cli.json).await,
        Commands::Send(args) => send::execute(args, &ctx, cli.json).await,
        Commands::Config(_) => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

//! Configuration inspection.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all layers are merged
    Show,
}

pub fn execute(args: ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let rendered = if json_mode {
                serde_json::to_string_pretty(config).context("Failed to serialize configuration")?
            } else {
                serde_yaml::to_string(config).context("Failed to serialize configuration")?
            };
            println!("{}", rendered.trim_end());
        }
    }
    Ok(())
}

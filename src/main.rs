// src/main.rs

use anaconda::InstallerConfig;
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = InstallerConfig::load(Some(cli.config.as_path()));

    // RUST_LOG first, then the configured filter
    let fallback = config
        .as_ref()
        .ok()
        .and_then(|c| c.log_filter())
        .unwrap_or("info")
        .to_string();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    let config = config
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Cmdline { file, args, strict } => {
            commands::cmd_cmdline(&file, args.as_deref(), strict)
        }
        Commands::Config { cmdline } => commands::cmd_config(config, cmdline.as_deref()),
        Commands::Simulate {
            kind,
            source,
            fail_setup,
            fail_metadata,
            only_on_change,
            register,
        } => commands::cmd_simulate(
            config,
            commands::SimulateOptions {
                kind: kind.into(),
                source,
                fail_setup,
                fail_metadata,
                only_on_change,
                register,
            },
        ),
    }
}

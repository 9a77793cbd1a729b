mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;
use viewmirror::MirrorConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = MirrorConfig::from_env()?;

    match cli.command {
        Command::Demo { views, batch, seed } => {
            cli::app::run_demo(config, cli::app::DemoOptions { views, batch, seed }).await
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

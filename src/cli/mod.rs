pub mod app;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "viewmirror")]
#[command(about = "Live views over an in-memory media store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Seed a store, mount views, run a batch and a transcription job
    Demo {
        /// Number of views to mount
        #[arg(long, default_value_t = 2)]
        views: usize,
        /// Number of audios created in one batch
        #[arg(long, default_value_t = 10)]
        batch: usize,
        /// Number of media records seeded before the views mount
        #[arg(long, default_value_t = 12)]
        seed: usize,
    },
    /// Print the effective configuration (defaults plus VIEWMIRROR_* overrides)
    Config,
}

//! Ingest CLI
//!
//! Runs the re-encryption worker and the operator tools around it.
//!
//! - `process`: handle one inbound event (JSON)
//! - `resume`: finish the job this instance left unfinished
//! - `keyring-new`: create an archive keyring
//! - `seal-legacy`: wrap a plaintext file in a legacy envelope
//! - `decrypt`: open a re-encrypted output with its sealed key

mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{handle_command, Commands};

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Re-encryption ingest worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ingest=info,ingest_core=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    handle_command(cli.command)
}

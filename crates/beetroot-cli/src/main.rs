//! Beetroot CLI - manual-signaling peer-to-peer file transfer
//!
//! Two people connect by copying a short JSON blob back and forth over any
//! channel they like (chat, email, a sticky note), then send files directly.
//!
//! ## Quick Start
//!
//! ```bash
//! # On the first machine
//! beetroot session
//! > offer
//!
//! # On the second machine, paste the offer, then paste the answer back
//! beetroot session
//! > {"type":"offer","sdp":"..."}
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Session(args) => commands::session::run(args, cli.config.as_deref()).await,
        Command::Config(args) => commands::config::run(args, cli.config.as_deref()),
        Command::Completions(args) => commands::completions::run(args.action),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,beetroot=debug,beetroot_core=debug"
    } else {
        "warn,beetroot=info,beetroot_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

//! Stillwater - wellness sessions authored through auto-saved drafts.
//!
//! Architecture:
//! - The server is a thin REST layer over a SQLite document store
//! - Drafts are edited through a `DraftEditor`, which debounces edits and
//!   saves them through a gateway (in-process store or HTTP)
//! - Publishing creates a session and then deletes the source draft

mod autosave;
mod cli;
mod client;
mod config;
mod db;
mod error;
mod models;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stillwater=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}

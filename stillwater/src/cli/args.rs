//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_PORT;

/// Stillwater - author wellness sessions with auto-saved drafts
#[derive(Parser, Debug)]
#[command(name = "stillwater")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the REST server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "STILLWATER_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// SQLite database file (defaults to the user data directory)
        #[arg(long, env = "STILLWATER_DB")]
        db: Option<PathBuf>,
    },

    /// Create, edit, inspect or publish drafts on a running server
    Draft {
        #[command(flatten)]
        remote: RemoteArgs,

        #[command(subcommand)]
        action: DraftAction,
    },
}

/// Where the server is and who is calling it.
#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// Server base URL (defaults to the local server)
    #[arg(long, env = "STILLWATER_URL")]
    pub url: Option<String>,

    /// Owner id sent with every request
    #[arg(long, env = "STILLWATER_OWNER")]
    pub owner: String,

    /// Quiet period after the last edit before saving, in milliseconds
    #[arg(long, env = "STILLWATER_QUIET_MS", default_value_t = 2000)]
    pub quiet_ms: u64,
}

/// Draft operations
#[derive(Subcommand, Debug)]
pub enum DraftAction {
    /// Start a new draft
    New {
        /// Field assignment, e.g. --set title="Morning flow"
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// Edit an existing draft
    Edit {
        /// Draft ID
        id: String,

        /// Field assignment, e.g. --set content="..."
        #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// Show a draft
    Show {
        /// Draft ID
        id: String,
    },

    /// Publish a draft as a session and delete the draft
    Publish {
        /// Draft ID
        id: String,

        #[arg(long)]
        video_url: Option<String>,

        #[arg(long)]
        thumbnail_url: Option<String>,
    },
}

/// Split `field=value` at the first `=`.
fn parse_assignment(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(field, value)| (field.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{s}'"))
}

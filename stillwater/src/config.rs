//! Runtime configuration for the editor, the server and the HTTP client.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::db::Database;

/// Quiet period after the last edit before a draft is saved.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Port the REST layer listens on by default.
pub const DEFAULT_PORT: u16 = 58240;

/// Settings for a [`DraftEditor`](crate::autosave::DraftEditor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorConfig {
    pub quiet_period: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

impl EditorConfig {
    pub const fn with_quiet_period(quiet_period: Duration) -> Self {
        Self { quiet_period }
    }
}

/// Settings for the REST layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
}

impl ServerConfig {
    /// Listen on localhost; fall back to the default database path.
    pub fn new(port: u16, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => Database::default_path()?,
        };
        Ok(Self {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            db_path,
        })
    }
}

/// Base URL for a server on this machine.
pub fn local_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

//! Database connection management.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// SQLite document store for drafts and sessions.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Default database location under the user's data directory.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Could not find data directory")?
            .join("stillwater");
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create directory: {}", data_dir.display()))?;
        Ok(data_dir.join("stillwater.db"))
    }

    /// Open or create the database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open a private in-memory database.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r"
            CREATE TABLE IF NOT EXISTS drafts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL DEFAULT 'yoga',
                duration INTEGER NOT NULL DEFAULT 30,
                content TEXT NOT NULL DEFAULT '',
                last_saved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                duration INTEGER NOT NULL,
                content TEXT NOT NULL,
                video_url TEXT,
                thumbnail_url TEXT,
                published INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_drafts_owner ON drafts(owner_id, last_saved_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_published ON sessions(published);
            ",
            )
            .context("Failed to initialize schema")?;
        Ok(())
    }

    /// Get a reference to the connection.
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }
}

//! The on-disk player cache.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;
use signwall_shared::constants::APP_NAME;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE_NAME: &str = "player-cache.db";

/// One SQLite connection with the current schema applied.
///
/// Opening always leaves the store in a committed state: staging rows from
/// an interrupted refresh are dropped before the handle is returned.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the cache in the platform data directory, e.g.
    /// `~/.local/share/signwall/player-cache.db` on Linux.
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("com", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;
        Self::open_at(&dirs.data_dir().join(DB_FILE_NAME))
    }

    /// Open the cache at `path`, creating parent directories as needed.
    pub fn open_at(path: &Path) -> Result<Self> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        info!(path = %path.display(), "Player cache open");

        let db = Self { conn };
        db.discard_refresh()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// File backing this cache, `None` for in-memory databases.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

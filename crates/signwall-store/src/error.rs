use signwall_shared::MediaId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no platform data directory for the player cache")]
    NoDataDir,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The cache holds no committed entry.
    #[error("cache entry not found")]
    NotFound,

    #[error("schema migration {0}")]
    Migration(String),

    /// A stored schedule or assignment no longer parses.
    #[error("corrupt cached JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt cached timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// A refresh tried to commit before every referenced blob was staged.
    #[error("media {0} was not downloaded")]
    MissingMedia(MediaId),
}

pub type Result<T> = std::result::Result<T, StoreError>;

//! v001 -- Initial schema creation.
//!
//! Creates the `cache_meta` key/value table and the live `media` table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Cache metadata (schedule, version, group_id, assignment)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cache_meta (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Media blobs referenced by the cached schedule
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS media (
    id          TEXT PRIMARY KEY NOT NULL,
    file_type   TEXT NOT NULL,                -- MIME content type
    file_name   TEXT NOT NULL,
    file_url    TEXT NOT NULL,                -- where it was downloaded from
    file_size   INTEGER NOT NULL,
    blake3_hash TEXT NOT NULL,                -- hex-encoded
    data        BLOB NOT NULL,
    cached_at   TEXT NOT NULL                 -- RFC-3339
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

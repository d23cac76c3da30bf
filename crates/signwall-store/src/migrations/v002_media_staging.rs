use rusqlite::Connection;

// Same shape as `media`; rows live here until a refresh commits.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS media_staging (
    id          TEXT PRIMARY KEY NOT NULL,
    file_type   TEXT NOT NULL,
    file_name   TEXT NOT NULL,
    file_url    TEXT NOT NULL,
    file_size   INTEGER NOT NULL,
    blake3_hash TEXT NOT NULL,
    data        BLOB NOT NULL,
    cached_at   TEXT NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

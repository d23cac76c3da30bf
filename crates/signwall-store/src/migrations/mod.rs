//! Schema migrations, tracked with `PRAGMA user_version`.
//!
//! Migration `i` in [`MIGRATIONS`] brings the schema from version `i` to
//! `i + 1`. Append new ones; never reorder.

pub mod v001_initial;
pub mod v002_media_staging;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

type Migration = (&'static str, fn(&Connection) -> rusqlite::Result<()>);

const MIGRATIONS: &[Migration] = &[
    ("v001_initial", v001_initial::up),
    ("v002_media_staging", v002_media_staging::up),
];

fn schema_version(conn: &Connection) -> Result<usize> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version as usize)
}

/// Apply every migration newer than the database's schema version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let from = schema_version(conn)?;
    if from >= MIGRATIONS.len() {
        debug!(version = from, "Schema up to date");
        return Ok(());
    }

    for (index, (name, up)) in MIGRATIONS.iter().enumerate().skip(from) {
        info!(migration = name, "Applying migration");
        let tx = conn.unchecked_transaction()?;
        up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", (index + 1) as u32)?;
        tx.commit()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len());
    }

    #[test]
    fn running_twice_is_harmless() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO cache_meta (key, value) VALUES ('version', 'v1')",
            [],
        )
        .unwrap();
        run_migrations(&conn).unwrap();

        let kept: String = conn
            .query_row("SELECT value FROM cache_meta WHERE key = 'version'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(kept, "v1");
    }

    #[test]
    fn resumes_from_partial_schema() {
        let conn = Connection::open_in_memory().unwrap();
        v001_initial::up(&conn).unwrap();
        conn.pragma_update(None, "user_version", 1u32).unwrap();

        run_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }
}

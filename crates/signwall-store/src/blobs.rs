use chrono::{DateTime, Utc};
use rusqlite::params;
use signwall_shared::MediaId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::CachedMedia;

const MEDIA_COLUMNS: &str = "id, file_type, file_name, file_url, file_size, blake3_hash, cached_at";

impl Database {
    pub fn get_media(&self, id: &MediaId) -> Result<CachedMedia> {
        self.conn()
            .query_row(
                &format!("SELECT {MEDIA_COLUMNS} FROM media WHERE id = ?1"),
                params![id.as_str()],
                row_to_media,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Raw bytes of a cached blob.
    pub fn get_media_data(&self, id: &MediaId) -> Result<Vec<u8>> {
        self.conn()
            .query_row(
                "SELECT data FROM media WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_media(&self) -> Result<Vec<CachedMedia>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {MEDIA_COLUMNS} FROM media ORDER BY id"))?;

        let rows = stmt.query_map([], row_to_media)?;

        let mut media = Vec::new();
        for row in rows {
            media.push(row?);
        }
        Ok(media)
    }

    pub fn has_media(&self, id: &MediaId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM media WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Stage a freshly downloaded blob for the refresh in progress.
    pub fn stage_media(&self, media: &CachedMedia, data: &[u8]) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO media_staging
                 (id, file_type, file_name, file_url, file_size, blake3_hash, data, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                media.id.as_str(),
                media.file_type,
                media.file_name,
                media.file_url,
                media.file_size,
                media.blake3_hash,
                data,
                media.cached_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Carry a blob that is already cached over into the refresh in
    /// progress. Returns `false` when the live cache does not hold it.
    pub fn stage_cached_media(&self, id: &MediaId) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR REPLACE INTO media_staging
                 (id, file_type, file_name, file_url, file_size, blake3_hash, data, cached_at)
             SELECT id, file_type, file_name, file_url, file_size, blake3_hash, data, cached_at
             FROM media WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn staged_media_ids(&self) -> Result<Vec<MediaId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM media_staging ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(MediaId(row?));
        }
        Ok(ids)
    }
}

fn row_to_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedMedia> {
    let id: String = row.get(0)?;
    let file_type: String = row.get(1)?;
    let file_name: String = row.get(2)?;
    let file_url: String = row.get(3)?;
    let file_size: i64 = row.get(4)?;
    let blake3_hash: String = row.get(5)?;
    let cached_str: String = row.get(6)?;

    let cached_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&cached_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(CachedMedia {
        id: MediaId(id),
        file_type,
        file_name,
        file_url,
        file_size,
        blake3_hash,
        cached_at,
    })
}

//! The cache entry: schedule, version token, group and assignment.
//!
//! A refresh goes through three steps. [`Database::begin_refresh`] clears
//! the staging area, blobs are added with [`Database::stage_media`] or
//! [`Database::stage_cached_media`], and [`Database::commit_refresh`] swaps
//! everything in with one transaction. Until the commit the previous entry
//! stays fully servable.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use signwall_shared::types::referenced_media;
use signwall_shared::{Assignment, GroupId, ScheduleSlot, VersionToken};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::CacheEntry;

const KEY_SCHEDULE: &str = "schedule";
const KEY_VERSION: &str = "version";
const KEY_GROUP_ID: &str = "group_id";
const KEY_ASSIGNMENT: &str = "assignment";

pub(crate) const ENTRY_KEYS: [&str; 4] = [KEY_SCHEDULE, KEY_VERSION, KEY_GROUP_ID, KEY_ASSIGNMENT];

impl Database {
    /// Load the current cache entry, or `None` on a device that never
    /// completed a refresh.
    pub fn load_cache(&self) -> Result<Option<CacheEntry>> {
        let (Some(schedule), Some(version), Some(group_id), Some(assignment)) = (
            get_meta(self.conn(), KEY_SCHEDULE)?,
            get_meta(self.conn(), KEY_VERSION)?,
            get_meta(self.conn(), KEY_GROUP_ID)?,
            get_meta(self.conn(), KEY_ASSIGNMENT)?,
        ) else {
            return Ok(None);
        };

        let schedule: Vec<ScheduleSlot> = serde_json::from_str(&schedule)?;
        let version: VersionToken = version.parse()?;
        let assignment: Assignment = serde_json::from_str(&assignment)?;

        let media = self
            .list_media()?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect::<HashMap<_, _>>();

        Ok(Some(CacheEntry {
            group_id: GroupId(group_id),
            version,
            assignment,
            schedule,
            media,
        }))
    }

    /// Start a refresh with an empty staging area.
    pub fn begin_refresh(&self) -> Result<()> {
        self.discard_refresh()
    }

    /// Drop everything staged by an unfinished refresh.
    pub fn discard_refresh(&self) -> Result<()> {
        let dropped = self.conn().execute("DELETE FROM media_staging", [])?;
        if dropped > 0 {
            tracing::debug!(dropped, "discarded staged media");
        }
        Ok(())
    }

    /// Atomically replace the cache entry with `schedule` and the staged
    /// media.
    ///
    /// Fails without touching the live entry if any media referenced by
    /// `schedule` has not been staged. Media the new schedule no longer
    /// references is dropped.
    pub fn commit_refresh(
        &mut self,
        assignment: &Assignment,
        schedule: &[ScheduleSlot],
    ) -> Result<()> {
        let staged = self.staged_media_ids()?;
        if let Some(missing) = referenced_media(schedule)
            .into_iter()
            .find(|id| !staged.contains(id))
        {
            return Err(StoreError::MissingMedia(missing));
        }

        let schedule_json = serde_json::to_string(schedule)?;
        let assignment_json = serde_json::to_string(assignment)?;

        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM media", [])?;
        tx.execute(
            "INSERT INTO media (id, file_type, file_name, file_url, file_size, blake3_hash, data, cached_at)
             SELECT id, file_type, file_name, file_url, file_size, blake3_hash, data, cached_at
             FROM media_staging",
            [],
        )?;
        tx.execute("DELETE FROM media_staging", [])?;
        put_meta(&tx, KEY_SCHEDULE, &schedule_json)?;
        put_meta(&tx, KEY_VERSION, &assignment.version.to_rfc3339())?;
        put_meta(&tx, KEY_GROUP_ID, assignment.group_id.as_str())?;
        put_meta(&tx, KEY_ASSIGNMENT, &assignment_json)?;
        tx.commit()?;

        tracing::info!(
            group = %assignment.group_id,
            version = %assignment.version,
            slots = schedule.len(),
            media = staged.len(),
            "cache entry replaced"
        );
        Ok(())
    }
}

pub(crate) fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM cache_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn put_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

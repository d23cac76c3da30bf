//! Schedule synchronizer.
//!
//! One cycle asks the backend for the screen's assignment, compares its
//! version with the cache and, only when the cache is stale, downloads the
//! full schedule with every blob it references before swapping it in. A
//! failed cycle always leaves the previous cache servable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use signwall_shared::types::referenced_media;
use signwall_shared::{Assignment, Media, MediaId, ScreenId};
use signwall_store::{CacheEntry, CachedMedia, Database, StoreError};

use crate::backend::Backend;
use crate::error::{BackendError, SyncError};

/// Outcome of one synchronization cycle.
#[derive(Debug)]
pub struct SyncReport {
    /// Whether a new cache entry was written.
    pub applied: bool,
    /// What the device should play now: the fresh entry, or the previous
    /// one when nothing changed or the cycle failed.
    pub entry: Option<CacheEntry>,
    pub failure: Option<SyncError>,
}

impl SyncReport {
    fn served(entry: Option<CacheEntry>, failure: Option<SyncError>) -> Self {
        Self {
            applied: false,
            entry,
            failure,
        }
    }
}

pub(crate) fn lock(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    // A panic while holding the lock leaves SQLite itself consistent.
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run one synchronization cycle for `screen_id`.
///
/// The database lock is never held across an await point.
pub async fn sync<B>(db: &Mutex<Database>, backend: &B, screen_id: &ScreenId) -> SyncReport
where
    B: Backend + ?Sized,
{
    let cached = match lock(db).load_cache() {
        Ok(entry) => entry,
        Err(e) => {
            warn!(error = %e, "Cached entry unreadable, treating cache as empty");
            None
        }
    };

    let assignment = match backend.get_assignment(screen_id).await {
        Ok(assignment) => assignment,
        Err(BackendError::NotAssigned) => {
            warn!(screen = %screen_id, "Screen is not assigned to a group");
            return SyncReport::served(cached, Some(SyncError::AssignmentMissing));
        }
        Err(e) => {
            warn!(screen = %screen_id, error = %e, "Assignment unavailable, serving cache");
            return SyncReport::served(cached, Some(e.into()));
        }
    };

    if let Some(entry) = &cached {
        if !entry.is_stale_for(&assignment) {
            debug!(
                group = %assignment.group_id,
                version = %assignment.version,
                "Cache is up to date"
            );
            return SyncReport::served(cached, None);
        }
    }

    info!(
        group = %assignment.group_id,
        version = %assignment.version,
        cached_version = ?cached.as_ref().map(|e| e.version.to_rfc3339()),
        "Cache is stale, refreshing"
    );

    match refresh(db, backend, &assignment).await {
        Ok(entry) => SyncReport {
            applied: true,
            entry: Some(entry),
            failure: None,
        },
        Err(e) => {
            warn!(group = %assignment.group_id, error = %e, "Refresh failed, keeping previous cache");
            if let Err(discard) = lock(db).discard_refresh() {
                warn!(error = %discard, "Failed to discard staged media");
            }
            SyncReport::served(cached, Some(e))
        }
    }
}

async fn refresh<B>(
    db: &Mutex<Database>,
    backend: &B,
    assignment: &Assignment,
) -> Result<CacheEntry, SyncError>
where
    B: Backend + ?Sized,
{
    let mut schedule = backend.get_schedule(&assignment.group_id).await?;
    schedule.sort_by_key(|slot| slot.slot_index);
    for slot in &schedule {
        if slot.media_ids.len() != slot.layout.region_count() {
            warn!(
                slot = slot.slot_index,
                layout = %slot.layout,
                regions = slot.layout.region_count(),
                references = slot.media_ids.len(),
                "Slot media references do not match its layout"
            );
        }
    }

    let referenced = referenced_media(&schedule);
    let mut missing = Vec::new();
    {
        let db = lock(db);
        db.begin_refresh()?;
        for id in &referenced {
            if !db.stage_cached_media(id)? {
                missing.push(id.clone());
            }
        }
    }
    debug!(
        referenced = referenced.len(),
        reused = referenced.len() - missing.len(),
        "Staged cached media"
    );

    let metadata: HashMap<MediaId, Media> = backend
        .get_media_metadata(&missing)
        .await?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();

    for id in &missing {
        let media = metadata
            .get(id)
            .ok_or_else(|| SyncError::MissingMetadata(id.clone()))?;
        let data = backend
            .fetch_blob(&media.file_url)
            .await
            .map_err(|source| SyncError::Download {
                media: id.clone(),
                source,
            })?;

        let record = CachedMedia::from_download(media, &data);
        debug!(media = %id, size = record.file_size, hash = %record.blake3_hash, "Downloaded media");
        lock(db).stage_media(&record, &data)?;
    }

    let mut db = lock(db);
    db.commit_refresh(assignment, &schedule)?;
    Ok(db.load_cache()?.ok_or(StoreError::NotFound)?)
}

//! Domain model structs persisted in the local cache.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signwall_shared::{Assignment, GroupId, Media, MediaId, MediaKind, ScheduleSlot, VersionToken};

// ---------------------------------------------------------------------------
// Cached media
// ---------------------------------------------------------------------------

/// Metadata of a media blob held in the cache. The bytes themselves are
/// loaded on demand with [`Database::get_media_data`].
///
/// [`Database::get_media_data`]: crate::Database::get_media_data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedMedia {
    pub id: MediaId,
    /// MIME content type.
    pub file_type: String,
    pub file_name: String,
    /// Source URI the blob was fetched from.
    pub file_url: String,
    /// Blob size in bytes.
    pub file_size: i64,
    /// BLAKE3 content hash (hex string).
    pub blake3_hash: String,
    pub cached_at: DateTime<Utc>,
}

impl CachedMedia {
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.file_type)
    }

    /// Build the cache record for freshly downloaded `data`.
    pub fn from_download(media: &Media, data: &[u8]) -> Self {
        Self {
            id: media.id.clone(),
            file_type: media.file_type.clone(),
            file_name: media.file_name.clone(),
            file_url: media.file_url.clone(),
            file_size: data.len() as i64,
            blake3_hash: blake3::hash(data).to_hex().to_string(),
            cached_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cache entry
// ---------------------------------------------------------------------------

/// The one schedule a device plays, with everything needed to play it
/// offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub group_id: GroupId,
    pub version: VersionToken,
    /// Assignment that produced this entry (sync mode, ordered members).
    pub assignment: Assignment,
    /// Slots ordered by `slot_index`.
    pub schedule: Vec<ScheduleSlot>,
    pub media: HashMap<MediaId, CachedMedia>,
}

impl CacheEntry {
    /// Whether `assignment` describes something this entry does not hold
    /// yet: another group, a newer version.
    pub fn is_stale_for(&self, assignment: &Assignment) -> bool {
        self.group_id != assignment.group_id || assignment.version > self.version
    }
}

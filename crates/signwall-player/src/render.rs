//! Per-screen render plans.
//!
//! The host display surface draws whatever plan the runtime publishes.
//! Media is always cropped to fill the screen, never letterboxed.

use std::collections::HashMap;

use tracing::warn;

use signwall_shared::layout::partition;
use signwall_shared::{MediaId, MediaKind, ScheduleSlot, ScreenId};
use signwall_store::{CacheEntry, CachedMedia};

#[derive(Debug, Clone, PartialEq)]
pub enum RenderPlan {
    Blank,
    Media {
        media_id: MediaId,
        kind: MediaKind,
        file_name: String,
        /// Horizontal slice of the media this screen shows, 0..=100.
        crop_x_percent: f64,
        /// Screens the media is stretched across.
        span_width: usize,
        offset: usize,
    },
}

impl RenderPlan {
    pub fn media_id(&self) -> Option<&MediaId> {
        match self {
            RenderPlan::Blank => None,
            RenderPlan::Media { media_id, .. } => Some(media_id),
        }
    }
}

/// Plan what the screen at `position` shows for `slot`.
pub fn plan_slot(
    slot: &ScheduleSlot,
    media: &HashMap<MediaId, CachedMedia>,
    position: usize,
    group_size: usize,
) -> RenderPlan {
    let Some(placement) = partition(slot.layout, &slot.media_ids, position, group_size) else {
        return RenderPlan::Blank;
    };
    let Some(media_id) = placement.media_id.as_ref() else {
        return RenderPlan::Blank;
    };
    let Some(cached) = media.get(media_id) else {
        warn!(media = %media_id, slot = slot.slot_index, "Media missing from cache, rendering blank");
        return RenderPlan::Blank;
    };

    RenderPlan::Media {
        media_id: media_id.clone(),
        kind: cached.kind(),
        file_name: cached.file_name.clone(),
        crop_x_percent: placement.crop_percent(),
        span_width: placement.span_width,
        offset: placement.offset,
    }
}

/// Plan slot `index` of `entry` for `screen_id`, positioned by the
/// entry's ordered member list.
pub fn plan_for(entry: &CacheEntry, index: usize, screen_id: &ScreenId) -> RenderPlan {
    match entry.schedule.get(index) {
        Some(slot) => plan_slot(
            slot,
            &entry.media,
            entry.assignment.position_of(screen_id),
            entry.assignment.group_size(),
        ),
        None => RenderPlan::Blank,
    }
}

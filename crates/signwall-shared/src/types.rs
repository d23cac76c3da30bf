use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_SLOT_SECS, TOPIC_PREFIX};
use crate::layout::Layout;

// Screen identity, assigned by the admin side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ScreenId(pub String);

impl ScreenId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScreenId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ScreenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_topic(&self) -> String {
        format!("{}:{}", TOPIC_PREFIX, self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MediaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to one channel session. A fresh one is minted on every
/// join, so a rejoining screen is a different session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionRef(pub Uuid);

impl SessionRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Freshness marker of a group's schedule and membership.
///
/// Strictly increases on every change: equal tokens mean "no change",
/// a greater one means the local cache is stale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct VersionToken(pub DateTime<Utc>);

impl VersionToken {
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl FromStr for VersionToken {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s).map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Each screen plays on its own clock.
    Extend,
    /// Separate devices change slides together, driven by the leader.
    Sync,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Extend => "extend",
            SyncMode::Sync => "sync",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

/// Group assignment of one screen, as returned by the assignment endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub group_id: GroupId,
    pub sync_mode: SyncMode,
    pub version: VersionToken,
    pub member_screen_ids: Vec<ScreenId>,
}

impl Assignment {
    /// Zero-based position of `screen_id` in the ordered member list.
    /// A screen missing from the list is treated as the first one.
    pub fn position_of(&self, screen_id: &ScreenId) -> usize {
        self.member_screen_ids
            .iter()
            .position(|id| id == screen_id)
            .unwrap_or(0)
    }

    pub fn group_size(&self) -> usize {
        self.member_screen_ids.len().max(1)
    }
}

/// One entry of a group's schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub slot_index: u32,
    pub layout: Layout,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// One reference per layout region; `None` is a blank region.
    #[serde(default)]
    pub media_ids: Vec<Option<MediaId>>,
}

impl ScheduleSlot {
    /// How long this slot stays on screen. Missing or zero durations fall
    /// back to [`DEFAULT_SLOT_SECS`].
    pub fn duration(&self) -> Duration {
        match self.duration_seconds {
            Some(secs) if secs > 0 => Duration::from_secs(u64::from(secs)),
            _ => Duration::from_secs(DEFAULT_SLOT_SECS),
        }
    }
}

/// Distinct non-null media ids referenced by a schedule, in first-use order.
pub fn referenced_media(slots: &[ScheduleSlot]) -> Vec<MediaId> {
    let mut seen = std::collections::HashSet::new();
    slots
        .iter()
        .flat_map(|slot| slot.media_ids.iter().flatten())
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// Metadata of a media asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Media {
    pub id: MediaId,
    /// MIME content type, e.g. `image/png` or `video/mp4`.
    pub file_type: String,
    /// Where the blob can be downloaded from.
    pub file_url: String,
    pub file_name: String,
}

impl Media {
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.file_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: u32, duration: Option<u32>, media: &[Option<&str>]) -> ScheduleSlot {
        ScheduleSlot {
            slot_index: index,
            layout: Layout::Span1,
            duration_seconds: duration,
            media_ids: media.iter().map(|m| m.map(MediaId::from)).collect(),
        }
    }

    #[test]
    fn version_token_ordering() {
        let old: VersionToken = "2024-01-01T00:00:00Z".parse().unwrap();
        let new: VersionToken = "2024-01-02T00:00:00Z".parse().unwrap();
        let same: VersionToken = "2024-01-01T01:00:00+01:00".parse().unwrap();

        assert!(new > old);
        assert_eq!(old, same);
        assert!("yesterday".parse::<VersionToken>().is_err());
    }

    #[test]
    fn slot_duration_defaults() {
        assert_eq!(slot(0, Some(5), &[]).duration(), Duration::from_secs(5));
        assert_eq!(slot(0, None, &[]).duration(), Duration::from_secs(10));
        assert_eq!(slot(0, Some(0), &[]).duration(), Duration::from_secs(10));
    }

    #[test]
    fn referenced_media_is_distinct_and_skips_blanks() {
        let slots = vec![
            slot(0, None, &[Some("a"), None, Some("b")]),
            slot(1, None, &[Some("b"), Some("c")]),
        ];
        let ids = referenced_media(&slots);
        assert_eq!(ids, vec![MediaId::from("a"), MediaId::from("b"), MediaId::from("c")]);
    }

    #[test]
    fn assignment_position_and_size() {
        let assignment = Assignment {
            group_id: GroupId::from("g"),
            sync_mode: SyncMode::Sync,
            version: "2024-01-01T00:00:00Z".parse().unwrap(),
            member_screen_ids: vec!["s1".into(), "s2".into(), "s3".into()],
        };
        assert_eq!(assignment.position_of(&"s3".into()), 2);
        assert_eq!(assignment.position_of(&"stranger".into()), 0);
        assert_eq!(assignment.group_size(), 3);
        assert_eq!(assignment.group_id.to_topic(), "player-sync:g");
    }

    #[test]
    fn schedule_json_shape() {
        let json = r#"[{"slot_index":0,"layout":"2-1-1","duration_seconds":5,"media_ids":["m1",null,"m2"]}]"#;
        let slots: Vec<ScheduleSlot> = serde_json::from_str(json).unwrap();
        assert_eq!(slots[0].layout, Layout::Split211);
        assert_eq!(slots[0].media_ids[1], None);
        assert_eq!(MediaKind::from_content_type("video/mp4"), MediaKind::Video);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_MESSAGE_SIZE;
use crate::error::SharedError;
use crate::presence::PresenceRecord;
use crate::types::{ScreenId, SessionRef, VersionToken};

/// All messages exchanged on a group channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelMessage {
    /// Presence announcement, re-sent periodically while joined
    Presence(PresenceRecord),

    /// Clean departure from the channel
    Leave(LeaveNotice),

    /// Slide advance published by the group leader
    SlideChange(SlideChange),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaveNotice {
    pub screen_id: ScreenId,
    pub session: SessionRef,
    pub timestamp: DateTime<Utc>,
}

/// Slide-advance event.
///
/// Events are ordered by `(version, seq)`: a follower ignores anything not
/// newer than what it last applied, so late duplicates and reordered
/// deliveries cannot move the wall backwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlideChange {
    pub from: ScreenId,
    /// Schedule version the index refers to
    pub version: VersionToken,
    pub seq: u64,
    pub new_index: usize,
}

impl SlideChange {
    pub fn order_key(&self) -> (VersionToken, u64) {
        (self.version, self.seq)
    }
}

impl ChannelMessage {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, SharedError> {
        let data = bincode::serialize(self)?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(SharedError::Oversized {
                len: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(data)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, SharedError> {
        Ok(bincode::deserialize(data)?)
    }
}

//! Presence records and the leader election rule.
//!
//! Leadership is never negotiated. Every member applies [`elect_leader`] to
//! the presence set it can see; identical views elect the same leader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ScreenId, SessionRef};

/// One screen's presence on a group channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub screen_id: ScreenId,
    pub joined_at: DateTime<Utc>,
    pub session: SessionRef,
}

impl PresenceRecord {
    fn election_key(&self) -> (DateTime<Utc>, SessionRef, &ScreenId) {
        (self.joined_at, self.session, &self.screen_id)
    }
}

/// Earliest joiner wins; ties fall to the lower session reference, then
/// the lower screen id. Returns `None` only for an empty set.
pub fn elect_leader<'a, I>(records: I) -> Option<&'a PresenceRecord>
where
    I: IntoIterator<Item = &'a PresenceRecord>,
{
    records
        .into_iter()
        .min_by(|a, b| a.election_key().cmp(&b.election_key()))
}

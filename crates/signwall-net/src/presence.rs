//! Presence tracking for one group channel.
//!
//! Keeps at most one record per screen, remembers which libp2p peer
//! announced it, and expires records that stop being re-announced. The
//! local screen's own record is never expired or dropped by a peer event.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p::PeerId;
use tracing::debug;

use signwall_shared::presence::{elect_leader, PresenceRecord};
use signwall_shared::types::{ScreenId, SessionRef};

#[derive(Debug, Clone)]
struct Tracked {
    record: PresenceRecord,
    /// Peer that announced the record; `None` for the local screen.
    peer: Option<PeerId>,
    local: bool,
    last_seen: Instant,
}

/// Currently present members of a group.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    members: HashMap<ScreenId, Tracked>,
}

impl PresenceTracker {
    /// Create a new, empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the local screen's own presence.
    pub fn track_local(&mut self, record: PresenceRecord, now: Instant) -> bool {
        self.upsert(record, None, true, now)
    }

    /// Record a presence announcement received from `peer`.
    ///
    /// Returns `true` when the membership changed (new screen or a new
    /// session for a known one). Re-announcing the same session only
    /// refreshes its liveness. An announcement older than the screen's
    /// current session is ignored.
    pub fn on_announce(&mut self, record: PresenceRecord, peer: Option<PeerId>, now: Instant) -> bool {
        self.upsert(record, peer, false, now)
    }

    fn upsert(
        &mut self,
        record: PresenceRecord,
        peer: Option<PeerId>,
        local: bool,
        now: Instant,
    ) -> bool {
        if let Some(existing) = self.members.get_mut(&record.screen_id) {
            if existing.record.session == record.session {
                existing.last_seen = now;
                return false;
            }
            if existing.local && !local {
                debug!(screen = %record.screen_id, "Ignoring remote claim on local screen id");
                return false;
            }
            if record.joined_at < existing.record.joined_at {
                debug!(
                    screen = %record.screen_id,
                    session = %record.session,
                    "Ignoring announcement from superseded session"
                );
                return false;
            }
        }

        debug!(
            screen = %record.screen_id,
            session = %record.session,
            joined_at = %record.joined_at,
            "Tracking presence"
        );
        self.members.insert(
            record.screen_id.clone(),
            Tracked {
                record,
                peer,
                local,
                last_seen: now,
            },
        );
        true
    }

    /// Remove a screen's record if it still belongs to `session`.
    pub fn on_leave(&mut self, screen_id: &ScreenId, session: &SessionRef) -> bool {
        let matches = self
            .members
            .get(screen_id)
            .is_some_and(|t| &t.record.session == session);
        if matches {
            self.members.remove(screen_id);
            debug!(screen = %screen_id, "Removed presence on leave");
        }
        matches
    }

    /// Remove every record announced by a peer whose connection closed.
    pub fn on_peer_disconnected(&mut self, peer_id: &PeerId) -> bool {
        let before = self.members.len();
        self.members
            .retain(|_, t| t.local || t.peer.as_ref() != Some(peer_id));
        let removed = before - self.members.len();
        if removed > 0 {
            debug!(peer = %peer_id, removed, "Removed presence of disconnected peer");
        }
        removed > 0
    }

    /// Drop remote records not refreshed within `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> bool {
        let before = self.members.len();
        self.members.retain(|screen, t| {
            let alive = t.local || now.saturating_duration_since(t.last_seen) < timeout;
            if !alive {
                debug!(screen = %screen, "Presence timed out");
            }
            alive
        });
        self.members.len() != before
    }

    /// Forget everything, e.g. after leaving the channel.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Records of all present screens, in election order.
    pub fn records(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> =
            self.members.values().map(|t| t.record.clone()).collect();
        records.sort_by(|a, b| {
            (a.joined_at, a.session, &a.screen_id).cmp(&(b.joined_at, b.session, &b.screen_id))
        });
        records
    }

    /// The current leader of the visible presence set.
    pub fn leader(&self) -> Option<&PresenceRecord> {
        elect_leader(self.members.values().map(|t| &t.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn record(screen: &str, joined_secs: i64, session: u128) -> PresenceRecord {
        PresenceRecord {
            screen_id: ScreenId::from(screen),
            joined_at: Utc.timestamp_opt(1_700_000_000 + joined_secs, 0).unwrap(),
            session: SessionRef(Uuid::from_u128(session)),
        }
    }

    #[test]
    fn test_leader_hands_over_on_disconnect() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new();
        let p0 = PeerId::random();
        let p1 = PeerId::random();

        assert!(tracker.on_announce(record("s0", 0, 1), Some(p0), now));
        assert!(tracker.on_announce(record("s1", 1, 2), Some(p1), now));
        assert!(tracker.track_local(record("s2", 2, 3), now));

        assert_eq!(tracker.leader().unwrap().screen_id, ScreenId::from("s0"));

        assert!(tracker.on_peer_disconnected(&p0));
        assert_eq!(tracker.leader().unwrap().screen_id, ScreenId::from("s1"));
        assert_eq!(tracker.records().len(), 2);
    }

    #[test]
    fn test_reannounce_is_not_a_change() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new();
        assert!(tracker.on_announce(record("s1", 0, 1), None, now));
        assert!(!tracker.on_announce(record("s1", 0, 1), None, now));
    }

    #[test]
    fn test_one_record_per_screen() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new();
        let peer = PeerId::random();

        tracker.on_announce(record("s1", 0, 1), Some(peer), now);
        // Reconnect: same screen, new session, later join.
        assert!(tracker.on_announce(record("s1", 10, 2), Some(peer), now));
        assert_eq!(tracker.records().len(), 1);
        assert_eq!(tracker.records()[0].session, SessionRef(Uuid::from_u128(2)));

        // A late copy of the old session must not resurrect it.
        assert!(!tracker.on_announce(record("s1", 0, 1), Some(peer), now));
        assert_eq!(tracker.records()[0].session, SessionRef(Uuid::from_u128(2)));
    }

    #[test]
    fn test_leave_requires_matching_session() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new();
        tracker.on_announce(record("s1", 0, 1), None, now);

        assert!(!tracker.on_leave(&ScreenId::from("s1"), &SessionRef(Uuid::from_u128(9))));
        assert_eq!(tracker.records().len(), 1);
        assert!(tracker.on_leave(&ScreenId::from("s1"), &SessionRef(Uuid::from_u128(1))));
        assert!(tracker.records().is_empty());
    }

    #[test]
    fn test_expiry_spares_local_record() {
        let start = Instant::now();
        let mut tracker = PresenceTracker::new();
        tracker.track_local(record("me", 5, 1), start);
        tracker.on_announce(record("ghost", 0, 2), Some(PeerId::random()), start);
        assert_eq!(tracker.leader().unwrap().screen_id, ScreenId::from("ghost"));

        let later = start + Duration::from_secs(31);
        assert!(tracker.expire(later, Duration::from_secs(30)));
        assert_eq!(tracker.records().len(), 1);
        assert_eq!(tracker.leader().unwrap().screen_id, ScreenId::from("me"));
        assert!(!tracker.expire(later, Duration::from_secs(30)));
    }

    #[test]
    fn test_records_in_election_order() {
        let now = Instant::now();
        let mut tracker = PresenceTracker::new();
        tracker.on_announce(record("c", 2, 3), None, now);
        tracker.on_announce(record("a", 0, 1), None, now);
        tracker.on_announce(record("b", 1, 2), None, now);

        let order: Vec<String> = tracker
            .records()
            .into_iter()
            .map(|r| r.screen_id.0)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}

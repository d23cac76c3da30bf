//! Group channel: presence and slide-change broadcast for one group.
//!
//! A [`GroupChannel`] is the player's view of the `player-sync:{group}`
//! topic. It publishes this screen's presence, tracks everyone else's, and
//! turns raw swarm notifications into [`ChannelEvent`]s for the player's
//! event loop.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use signwall_shared::presence::PresenceRecord;
use signwall_shared::protocol::{ChannelMessage, LeaveNotice, SlideChange};
use signwall_shared::types::{GroupId, ScreenId, SessionRef};

use crate::messages::{publish_message, try_decode_notification};
use crate::presence::PresenceTracker;
use crate::swarm::{SwarmCommand, SwarmNotification};

/// What the player needs to know after a presence change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceView {
    /// Present members in election order.
    pub members: Vec<PresenceRecord>,
    pub leader: Option<PresenceRecord>,
    /// Whether this screen is the leader.
    pub is_leader: bool,
    /// A session we had not seen before appeared; announcing ourselves
    /// right away lets it converge on the same leader sooner.
    pub newcomer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    PresenceChanged(PresenceView),
    Broadcast(SlideChange),
}

pub struct GroupChannel {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    group_id: GroupId,
    me: PresenceRecord,
    tracker: PresenceTracker,
    presence_timeout: Duration,
}

impl GroupChannel {
    /// Subscribe to the group's topic with a fresh session.
    ///
    /// Presence is only announced once [`GroupChannel::track`] is called.
    pub async fn join(
        cmd_tx: mpsc::Sender<SwarmCommand>,
        group_id: GroupId,
        screen_id: ScreenId,
        presence_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let topic = group_id.to_topic();
        cmd_tx
            .send(SwarmCommand::SubscribeTopic(topic.clone()))
            .await
            .map_err(|_| anyhow::anyhow!("Swarm command channel closed"))?;

        let me = PresenceRecord {
            screen_id,
            joined_at: Utc::now(),
            session: SessionRef::new(),
        };

        info!(
            topic = %topic,
            screen = %me.screen_id,
            session = %me.session,
            "Joined group channel"
        );

        Ok(Self {
            cmd_tx,
            group_id,
            me,
            tracker: PresenceTracker::new(),
            presence_timeout,
        })
    }

    /// Start tracking this screen's presence and announce it.
    pub async fn track(
        &mut self,
        joined_at: DateTime<Utc>,
        now: Instant,
    ) -> anyhow::Result<PresenceView> {
        self.me.joined_at = joined_at;
        self.tracker.track_local(self.me.clone(), now);
        self.announce().await?;
        Ok(self.view(false))
    }

    /// Re-publish this screen's presence record.
    pub async fn announce(&self) -> anyhow::Result<()> {
        publish_message(
            &self.cmd_tx,
            &self.group_id,
            &ChannelMessage::Presence(self.me.clone()),
        )
        .await
    }

    pub async fn publish(&self, change: SlideChange) -> anyhow::Result<()> {
        debug!(
            group = %self.group_id,
            index = change.new_index,
            seq = change.seq,
            "Broadcasting slide change"
        );
        publish_message(&self.cmd_tx, &self.group_id, &ChannelMessage::SlideChange(change)).await
    }

    /// Announce departure and unsubscribe.
    pub async fn leave(mut self) -> anyhow::Result<()> {
        let notice = ChannelMessage::Leave(LeaveNotice {
            screen_id: self.me.screen_id.clone(),
            session: self.me.session,
            timestamp: Utc::now(),
        });
        let published = publish_message(&self.cmd_tx, &self.group_id, &notice).await;
        self.tracker.clear();

        self.cmd_tx
            .send(SwarmCommand::UnsubscribeTopic(self.group_id.to_topic()))
            .await
            .map_err(|_| anyhow::anyhow!("Swarm command channel closed"))?;

        info!(group = %self.group_id, "Left group channel");
        published
    }

    /// Fold one swarm notification into the channel state.
    pub fn handle_notification(
        &mut self,
        notification: &SwarmNotification,
        now: Instant,
    ) -> Option<ChannelEvent> {
        if let SwarmNotification::PeerDisconnected { peer_id } = notification {
            return self
                .tracker
                .on_peer_disconnected(peer_id)
                .then(|| ChannelEvent::PresenceChanged(self.view(false)));
        }

        let (source, message) = try_decode_notification(notification, &self.group_id)?;
        match message {
            ChannelMessage::Presence(record) => {
                if record.session == self.me.session {
                    return None;
                }
                self.tracker
                    .on_announce(record, source, now)
                    .then(|| ChannelEvent::PresenceChanged(self.view(true)))
            }
            ChannelMessage::Leave(notice) => self
                .tracker
                .on_leave(&notice.screen_id, &notice.session)
                .then(|| ChannelEvent::PresenceChanged(self.view(false))),
            ChannelMessage::SlideChange(change) => {
                if change.from == self.me.screen_id {
                    return None;
                }
                Some(ChannelEvent::Broadcast(change))
            }
        }
    }

    /// Expire members that stopped announcing.
    pub fn expire(&mut self, now: Instant) -> Option<ChannelEvent> {
        self.tracker
            .expire(now, self.presence_timeout)
            .then(|| ChannelEvent::PresenceChanged(self.view(false)))
    }

    pub fn is_leader(&self) -> bool {
        self.tracker
            .leader()
            .is_some_and(|leader| leader.session == self.me.session)
    }

    pub fn leader(&self) -> Option<&PresenceRecord> {
        self.tracker.leader()
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn session(&self) -> SessionRef {
        self.me.session
    }

    fn view(&self, newcomer: bool) -> PresenceView {
        PresenceView {
            members: self.tracker.records(),
            leader: self.tracker.leader().cloned(),
            is_leader: self.is_leader(),
            newcomer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use libp2p::PeerId;
    use uuid::Uuid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn received(group: &GroupId, source: PeerId, msg: ChannelMessage) -> SwarmNotification {
        SwarmNotification::MessageReceived {
            source: Some(source),
            topic: group.to_topic(),
            data: msg.to_bytes().unwrap(),
        }
    }

    async fn joined(screen: &str, joined_secs: i64) -> (GroupChannel, mpsc::Receiver<SwarmCommand>) {
        let (tx, mut rx) = mpsc::channel(16);
        let group = GroupId::from("lobby");
        let mut channel = GroupChannel::join(tx, group, screen.into(), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(SwarmCommand::SubscribeTopic(t)) if t == "player-sync:lobby"));

        channel.track(at(joined_secs), Instant::now()).await.unwrap();
        match rx.recv().await {
            Some(SwarmCommand::PublishMessage { topic, data }) => {
                assert_eq!(topic, "player-sync:lobby");
                assert!(matches!(
                    ChannelMessage::from_bytes(&data).unwrap(),
                    ChannelMessage::Presence(_)
                ));
            }
            other => panic!("expected presence publish, got {other:?}"),
        }
        (channel, rx)
    }

    #[tokio::test]
    async fn lone_screen_leads() {
        let (channel, _rx) = joined("s0", 0).await;
        assert!(channel.is_leader());
    }

    #[tokio::test]
    async fn three_screens_converge_and_hand_over() {
        let (mut channel, _rx) = joined("s2", 2).await;
        let group = GroupId::from("lobby");
        let p0 = PeerId::random();
        let p1 = PeerId::random();

        let r0 = PresenceRecord { screen_id: "s0".into(), joined_at: at(0), session: SessionRef(Uuid::from_u128(1)) };
        let r1 = PresenceRecord { screen_id: "s1".into(), joined_at: at(1), session: SessionRef(Uuid::from_u128(2)) };

        let now = Instant::now();
        let event = channel
            .handle_notification(&received(&group, p0, ChannelMessage::Presence(r0)), now)
            .unwrap();
        match event {
            ChannelEvent::PresenceChanged(view) => {
                assert!(view.newcomer);
                assert!(!view.is_leader);
                assert_eq!(view.leader.map(|l| l.screen_id), Some("s0".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
        channel.handle_notification(&received(&group, p1, ChannelMessage::Presence(r1)), now);
        assert_eq!(channel.leader().unwrap().screen_id, ScreenId::from("s0"));

        let event = channel
            .handle_notification(&SwarmNotification::PeerDisconnected { peer_id: p0 }, now)
            .unwrap();
        let ChannelEvent::PresenceChanged(view) = event else {
            panic!("expected presence change");
        };
        assert_eq!(view.leader.map(|l| l.screen_id), Some("s1".into()));
        assert_eq!(view.members.len(), 2);
        assert!(!channel.is_leader());

        channel.handle_notification(&SwarmNotification::PeerDisconnected { peer_id: p1 }, now);
        assert!(channel.is_leader());
    }

    #[tokio::test]
    async fn broadcasts_pass_through_but_own_echo_does_not() {
        let (mut channel, _rx) = joined("s1", 1).await;
        let group = GroupId::from("lobby");
        let change = SlideChange {
            from: "s0".into(),
            version: "2024-01-01T00:00:00Z".parse().unwrap(),
            seq: 4,
            new_index: 2,
        };

        let event = channel.handle_notification(
            &received(&group, PeerId::random(), ChannelMessage::SlideChange(change.clone())),
            Instant::now(),
        );
        assert_eq!(event, Some(ChannelEvent::Broadcast(change.clone())));

        let echo = SlideChange { from: "s1".into(), ..change };
        assert!(channel
            .handle_notification(
                &received(&group, PeerId::random(), ChannelMessage::SlideChange(echo)),
                Instant::now(),
            )
            .is_none());
    }

    #[tokio::test]
    async fn silent_members_expire() {
        let (mut channel, _rx) = joined("s1", 1).await;
        let group = GroupId::from("lobby");
        let start = Instant::now();
        let ghost = PresenceRecord { screen_id: "s0".into(), joined_at: at(0), session: SessionRef::new() };
        channel.handle_notification(&received(&group, PeerId::random(), ChannelMessage::Presence(ghost)), start);
        assert!(!channel.is_leader());

        assert!(channel.expire(start + Duration::from_secs(5)).is_none());
        assert!(channel.expire(start + Duration::from_secs(31)).is_some());
        assert!(channel.is_leader());
    }

    #[tokio::test]
    async fn leave_publishes_notice_then_unsubscribes() {
        let (channel, mut rx) = joined("s1", 1).await;
        let session = channel.session();
        channel.leave().await.unwrap();

        match rx.recv().await {
            Some(SwarmCommand::PublishMessage { data, .. }) => match ChannelMessage::from_bytes(&data).unwrap() {
                ChannelMessage::Leave(notice) => assert_eq!(notice.session, session),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(SwarmCommand::UnsubscribeTopic(_))));
    }
}

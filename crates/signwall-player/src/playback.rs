//! Playback timer state machine.
//!
//! [`Player::handle`] folds one [`PlayerEvent`] into the explicit
//! [`PlayerState`] and returns the [`Effect`]s the runtime must carry out.
//! It never touches the clock or the network, so every transition can be
//! driven and checked from a plain unit test.

use std::time::Duration;

use tracing::{debug, info};

use signwall_shared::protocol::SlideChange;
use signwall_shared::{PresenceRecord, ScheduleSlot, ScreenId, SyncMode, VersionToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No schedule loaded.
    Idle,
    /// Extend mode: self-driving, never broadcasts.
    Extending,
    /// Sync mode leader: self-driving and broadcasting.
    SyncLeading,
    /// Sync mode follower: only applies received slide changes.
    SyncFollowing,
}

impl PlaybackState {
    pub fn is_self_driving(&self) -> bool {
        matches!(self, PlaybackState::Extending | PlaybackState::SyncLeading)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    ScheduleLoaded {
        schedule: Vec<ScheduleSlot>,
        version: VersionToken,
        sync_mode: SyncMode,
    },
    /// The group's elected leader as this screen sees it. `leader` is
    /// `None` while off the channel.
    LeadershipChanged {
        is_leader: bool,
        leader: Option<PresenceRecord>,
    },
    TimerFired {
        generation: u64,
    },
    SlideChangeReceived(SlideChange),
    /// Playback is torn down (unassigned, re-paired or shutting down).
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Arm the slot timer, replacing any outstanding one.
    ArmTimer { generation: u64, after: Duration },
    CancelTimer,
    Publish(SlideChange),
    Render { index: usize },
    Blank,
    /// A peer plays a newer schedule than ours.
    RequestSync,
}

/// Last slide change published or applied.
///
/// Sequence numbers only order events from one sender during one leader's
/// term, so the sender is kept alongside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub from: ScreenId,
    pub version: VersionToken,
    pub seq: u64,
}

impl AppliedChange {
    fn supersedes(&self, change: &SlideChange) -> bool {
        self.from == change.from && change.order_key() <= (self.version, self.seq)
    }
}

impl From<&SlideChange> for AppliedChange {
    fn from(change: &SlideChange) -> Self {
        Self {
            from: change.from.clone(),
            version: change.version,
            seq: change.seq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub state: PlaybackState,
    pub schedule: Vec<ScheduleSlot>,
    pub version: Option<VersionToken>,
    pub sync_mode: SyncMode,
    pub is_leader: bool,
    /// Presence record of the elected leader, if known.
    pub leader: Option<PresenceRecord>,
    pub current_index: usize,
    /// Generation of the most recently armed timer.
    pub timer_generation: u64,
    pub timer_armed: bool,
    pub last_applied: Option<AppliedChange>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            schedule: Vec::new(),
            version: None,
            sync_mode: SyncMode::Extend,
            is_leader: false,
            leader: None,
            current_index: 0,
            timer_generation: 0,
            timer_armed: false,
            last_applied: None,
        }
    }
}

/// One device's playback engine.
#[derive(Debug, Clone)]
pub struct Player {
    screen_id: ScreenId,
    state: PlayerState,
}

impl Player {
    pub fn new(screen_id: ScreenId) -> Self {
        Self {
            screen_id,
            state: PlayerState::default(),
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn playback(&self) -> PlaybackState {
        self.state.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn current_slot(&self) -> Option<&ScheduleSlot> {
        self.state.schedule.get(self.state.current_index)
    }

    pub fn handle(&mut self, event: PlayerEvent) -> Vec<Effect> {
        match event {
            PlayerEvent::ScheduleLoaded {
                schedule,
                version,
                sync_mode,
            } => self.on_schedule_loaded(schedule, version, sync_mode),
            PlayerEvent::LeadershipChanged { is_leader, leader } => {
                self.on_leadership_changed(is_leader, leader)
            }
            PlayerEvent::TimerFired { generation } => self.on_timer_fired(generation),
            PlayerEvent::SlideChangeReceived(change) => self.on_slide_change(change),
            PlayerEvent::Stopped => self.on_stopped(),
        }
    }

    fn on_schedule_loaded(
        &mut self,
        schedule: Vec<ScheduleSlot>,
        version: VersionToken,
        sync_mode: SyncMode,
    ) -> Vec<Effect> {
        self.state.version = Some(version);
        self.state.sync_mode = sync_mode;
        self.state.schedule = schedule;

        if self.state.schedule.is_empty() {
            info!(version = %version, "Schedule is empty, idling");
            self.state.state = PlaybackState::Idle;
            self.state.current_index = 0;
            return self.disarm_then(vec![Effect::Blank]);
        }

        if self.state.current_index >= self.state.schedule.len() {
            self.state.current_index = 0;
        }
        self.state.state = self.driving_state();

        info!(
            version = %version,
            mode = sync_mode.as_str(),
            slots = self.state.schedule.len(),
            index = self.state.current_index,
            state = ?self.state.state,
            "Schedule loaded"
        );

        let render = Effect::Render {
            index: self.state.current_index,
        };
        if self.state.state.is_self_driving() {
            vec![render, self.arm()]
        } else {
            self.disarm_then(vec![render])
        }
    }

    fn on_leadership_changed(
        &mut self,
        is_leader: bool,
        leader: Option<PresenceRecord>,
    ) -> Vec<Effect> {
        let was_leader = self.state.is_leader;
        self.state.is_leader = is_leader;
        if self.state.leader != leader {
            // A new term starts a new sequence.
            self.state.last_applied = None;
            self.state.leader = leader;
        }

        if self.state.state == PlaybackState::Idle || self.state.sync_mode != SyncMode::Sync {
            return Vec::new();
        }
        if was_leader == is_leader && self.state.state == self.driving_state() {
            return Vec::new();
        }

        self.state.state = self.driving_state();
        info!(
            screen = %self.screen_id,
            is_leader,
            index = self.state.current_index,
            "Leadership changed"
        );

        if is_leader {
            // Continue from the slot on screen, never from the start.
            vec![self.arm()]
        } else {
            self.disarm_then(Vec::new())
        }
    }

    fn on_timer_fired(&mut self, generation: u64) -> Vec<Effect> {
        if !self.state.timer_armed || generation != self.state.timer_generation {
            debug!(generation, current = self.state.timer_generation, "Ignoring stale timer");
            return Vec::new();
        }
        self.state.timer_armed = false;
        if !self.state.state.is_self_driving() || self.state.schedule.is_empty() {
            return Vec::new();
        }

        let index = (self.state.current_index + 1) % self.state.schedule.len();
        self.state.current_index = index;

        let mut effects = Vec::with_capacity(3);
        if self.state.state == PlaybackState::SyncLeading {
            if let Some(change) = self.next_change(index) {
                self.state.last_applied = Some(AppliedChange::from(&change));
                effects.push(Effect::Publish(change));
            }
        }
        effects.push(Effect::Render { index });
        effects.push(self.arm());
        effects
    }

    fn on_slide_change(&mut self, change: SlideChange) -> Vec<Effect> {
        if self.state.sync_mode != SyncMode::Sync || self.state.schedule.is_empty() {
            return Vec::new();
        }
        let Some(version) = self.state.version else {
            return Vec::new();
        };

        if change.version > version {
            info!(
                from = %change.from,
                version = %change.version,
                "Peer plays a newer schedule"
            );
            return vec![Effect::RequestSync];
        }
        if change.version < version {
            debug!(from = %change.from, version = %change.version, "Ignoring slide change for an older schedule");
            return Vec::new();
        }

        // Until presence converges a leader keeps its own clock.
        if self.state.state == PlaybackState::SyncLeading {
            debug!(from = %change.from, "Leading, ignoring another screen's slide change");
            return Vec::new();
        }
        if let Some(leader) = &self.state.leader {
            if leader.screen_id != change.from {
                debug!(from = %change.from, leader = %leader.screen_id, "Ignoring slide change from a non-leader");
                return Vec::new();
            }
        }
        if self
            .state
            .last_applied
            .as_ref()
            .is_some_and(|last| last.supersedes(&change))
        {
            debug!(from = %change.from, seq = change.seq, "Ignoring out-of-date slide change");
            return Vec::new();
        }
        if change.new_index >= self.state.schedule.len() {
            debug!(index = change.new_index, "Ignoring slide change outside the schedule");
            return Vec::new();
        }
        self.state.last_applied = Some(AppliedChange::from(&change));

        if change.new_index == self.state.current_index {
            return Vec::new();
        }
        self.state.current_index = change.new_index;
        vec![Effect::Render {
            index: change.new_index,
        }]
    }

    fn on_stopped(&mut self) -> Vec<Effect> {
        self.state.state = PlaybackState::Idle;
        self.state.schedule.clear();
        self.state.version = None;
        self.state.current_index = 0;
        self.state.last_applied = None;
        self.disarm_then(vec![Effect::Blank])
    }

    fn driving_state(&self) -> PlaybackState {
        match (self.state.sync_mode, self.state.is_leader) {
            (SyncMode::Extend, _) => PlaybackState::Extending,
            (SyncMode::Sync, true) => PlaybackState::SyncLeading,
            (SyncMode::Sync, false) => PlaybackState::SyncFollowing,
        }
    }

    fn arm(&mut self) -> Effect {
        self.state.timer_generation += 1;
        self.state.timer_armed = true;
        let after = self
            .current_slot()
            .map(ScheduleSlot::duration)
            .unwrap_or_else(|| Duration::from_secs(signwall_shared::constants::DEFAULT_SLOT_SECS));
        Effect::ArmTimer {
            generation: self.state.timer_generation,
            after,
        }
    }

    fn disarm_then(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        if self.state.timer_armed {
            self.state.timer_armed = false;
            effects.insert(0, Effect::CancelTimer);
        }
        effects
    }

    fn next_change(&self, index: usize) -> Option<SlideChange> {
        let version = self.state.version?;
        let seq = match &self.state.last_applied {
            Some(last) if last.from == self.screen_id && last.version == version => last.seq + 1,
            _ => 1,
        };
        Some(SlideChange {
            from: self.screen_id.clone(),
            version,
            seq,
            new_index: index,
        })
    }
}

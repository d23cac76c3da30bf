//! Device runtime: the single event loop of one screen.
//!
//! Sync cycles, blob downloads and heartbeats run as spawned tasks and post
//! their results back into the loop. Everything else (slot timer, presence
//! upkeep, group channel traffic) is handled here, one event at a time, by
//! feeding the [`Player`] state machine and carrying out its effects.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use libp2p::identity::Keypair;
use signwall_net::channel::PresenceView;
use signwall_net::{
    load_bootstrap_peers, parse_multiaddrs, spawn_swarm, ChannelEvent, GroupChannel, SwarmCommand,
    SwarmConfig, SwarmNotification,
};
use signwall_shared::constants::REJOIN_DELAY_SECS;
use signwall_shared::{GroupId, MediaId, ScreenId, SyncMode};
use signwall_store::{CacheEntry, Database};

use crate::backend::Backend;
use crate::config::PlayerConfig;
use crate::error::SyncError;
use crate::heartbeat::spawn_heartbeat;
use crate::pairing;
use crate::playback::{Effect, PlaybackState, Player, PlayerEvent};
use crate::render::{plan_for, RenderPlan};
use crate::status::PlayerStatus;
use crate::sync::{lock, sync, SyncReport};

/// Opens the network link the group channel runs on.
#[async_trait]
pub trait LinkFactory: Send {
    async fn connect(
        &mut self,
    ) -> anyhow::Result<(mpsc::Sender<SwarmCommand>, mpsc::Receiver<SwarmNotification>)>;
}

/// libp2p swarm over QUIC, dialing the configured peers.
pub struct Libp2pLink {
    keypair: Keypair,
    swarm: SwarmConfig,
}

impl Libp2pLink {
    pub fn from_config(config: &PlayerConfig) -> Self {
        let mut dials = config
            .bootstrap_peers
            .as_deref()
            .map(load_bootstrap_peers)
            .unwrap_or_default();
        dials.extend(parse_multiaddrs(&config.peers));

        Self {
            keypair: Keypair::generate_ed25519(),
            swarm: SwarmConfig {
                listen_port: config.listen_port,
                dials,
            },
        }
    }
}

#[async_trait]
impl LinkFactory for Libp2pLink {
    async fn connect(
        &mut self,
    ) -> anyhow::Result<(mpsc::Sender<SwarmCommand>, mpsc::Receiver<SwarmNotification>)> {
        let (cmd_tx, notif_rx, peer_id) = spawn_swarm(self.keypair.clone(), self.swarm.clone()).await?;
        info!(peer_id = %peer_id, "Group link up");
        Ok((cmd_tx, notif_rx))
    }
}

/// What the display surface should show right now.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub status: PlayerStatus,
    pub playback: PlaybackState,
    pub slot_index: Option<usize>,
    pub plan: RenderPlan,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            status: PlayerStatus::Starting,
            playback: PlaybackState::Idle,
            slot_index: None,
            plan: RenderPlan::Blank,
        }
    }
}

/// Read access to cached blobs for the display surface.
#[derive(Clone)]
pub struct MediaReader {
    db: Arc<Mutex<Database>>,
}

impl MediaReader {
    pub fn read(&self, id: &MediaId) -> signwall_store::Result<Vec<u8>> {
        lock(&self.db).get_media_data(id)
    }
}

#[derive(Debug)]
enum RuntimeEvent {
    SyncFinished(SyncReport),
}

#[derive(Debug)]
enum Control {
    Unpair,
}

/// Why [`DeviceRuntime::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    /// The device forgot its pairing and needs a new code.
    Unpaired,
}

/// Lets the display surface act on a running [`DeviceRuntime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    control: mpsc::Sender<Control>,
}

impl RuntimeHandle {
    /// Unpair this device. The runtime leaves its group, forgets its screen
    /// id and cache, and `run` returns [`Exit::Unpaired`].
    pub async fn unpair(&self) -> anyhow::Result<()> {
        self.control
            .send(Control::Unpair)
            .await
            .map_err(|_| anyhow::anyhow!("Player runtime has stopped"))
    }
}

struct ArmedTimer {
    generation: u64,
    sleep: Pin<Box<Sleep>>,
}

pub struct DeviceRuntime<B: Backend + ?Sized, L: LinkFactory> {
    config: PlayerConfig,
    screen_id: ScreenId,
    db: Arc<Mutex<Database>>,
    backend: Arc<B>,
    links: L,

    link: Option<mpsc::Sender<SwarmCommand>>,
    notifications: Option<mpsc::Receiver<SwarmNotification>>,
    channel: Option<GroupChannel>,
    rejoin_at: Option<Instant>,

    player: Player,
    entry: Option<CacheEntry>,
    status: PlayerStatus,
    slot_index: Option<usize>,
    plan: RenderPlan,
    timer: Option<ArmedTimer>,
    sync_in_flight: bool,

    events_tx: mpsc::Sender<RuntimeEvent>,
    events_rx: mpsc::Receiver<RuntimeEvent>,
    control_tx: mpsc::Sender<Control>,
    control_rx: mpsc::Receiver<Control>,
    frames: watch::Sender<Frame>,
}

impl<B, L> DeviceRuntime<B, L>
where
    B: Backend + ?Sized + 'static,
    L: LinkFactory,
{
    pub fn new(
        config: PlayerConfig,
        screen_id: ScreenId,
        db: Database,
        backend: Arc<B>,
        links: L,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (control_tx, control_rx) = mpsc::channel(4);
        let (frames, _) = watch::channel(Frame::default());
        let player = Player::new(screen_id.clone());

        Self {
            config,
            screen_id,
            db: Arc::new(Mutex::new(db)),
            backend,
            links,
            link: None,
            notifications: None,
            channel: None,
            rejoin_at: None,
            player,
            entry: None,
            status: PlayerStatus::Starting,
            slot_index: None,
            plan: RenderPlan::Blank,
            timer: None,
            sync_in_flight: false,
            events_tx,
            events_rx,
            control_tx,
            control_rx,
            frames,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            control: self.control_tx.clone(),
        }
    }

    /// Watch what the screen shows.
    pub fn subscribe(&self) -> watch::Receiver<Frame> {
        self.frames.subscribe()
    }

    pub fn media_reader(&self) -> MediaReader {
        MediaReader {
            db: self.db.clone(),
        }
    }

    /// Run until `shutdown` resolves or the device is unpaired, then cancel
    /// the slot timer and leave the group channel.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<Exit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(screen = %self.screen_id, "Player starting");
        let heartbeat = spawn_heartbeat(
            self.backend.clone(),
            self.screen_id.clone(),
            self.config.heartbeat_interval,
        );

        if let Some(entry) = self.load_cached() {
            info!(group = %entry.group_id, version = %entry.version, "Playing cached schedule");
            self.load_entry(entry).await;
        }
        self.start_sync();
        self.publish_frame();

        let start = Instant::now();
        let mut poll = interval_at(start + self.config.poll_interval, self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut presence = interval_at(
            start + self.config.presence_interval,
            self.config.presence_interval,
        );
        presence.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                _ = &mut shutdown => break Exit::Shutdown,
                Some(control) = self.control_rx.recv() => match control {
                    Control::Unpair => break Exit::Unpaired,
                },
                Some(event) = self.events_rx.recv() => match event {
                    RuntimeEvent::SyncFinished(report) => self.on_sync_finished(report).await,
                },
                generation = timer_fired(&mut self.timer) => {
                    self.timer = None;
                    self.apply(PlayerEvent::TimerFired { generation }).await;
                }
                notification = next_notification(&mut self.notifications) => {
                    self.on_notification(notification).await;
                }
                _ = poll.tick() => self.start_sync(),
                _ = presence.tick() => self.on_presence_tick().await,
                _ = rejoin_due(self.rejoin_at) => self.rejoin().await,
            }
            self.publish_frame();
        };

        info!(?exit, "Player shutting down");
        heartbeat.abort();
        self.apply(PlayerEvent::Stopped).await;
        self.leave_channel().await;
        if let Some(link) = self.link.take() {
            let _ = link.send(SwarmCommand::Shutdown).await;
        }
        if exit == Exit::Unpaired {
            self.forget_pairing().await?;
        }
        self.publish_frame();
        Ok(exit)
    }

    async fn forget_pairing(&mut self) -> anyhow::Result<()> {
        // A sync still running would write the old cache back.
        if self.sync_in_flight {
            let _ = self.events_rx.recv().await;
            self.sync_in_flight = false;
        }
        pairing::unpair(&mut lock(&self.db))?;
        self.entry = None;
        self.status = PlayerStatus::Unpaired;
        Ok(())
    }

    fn load_cached(&self) -> Option<CacheEntry> {
        match lock(&self.db).load_cache() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Failed to read cache");
                None
            }
        }
    }

    fn start_sync(&mut self) {
        if self.sync_in_flight {
            debug!("Sync already in flight");
            return;
        }
        self.sync_in_flight = true;

        let db = self.db.clone();
        let backend = self.backend.clone();
        let screen_id = self.screen_id.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let report = sync(&db, backend.as_ref(), &screen_id).await;
            let _ = events.send(RuntimeEvent::SyncFinished(report)).await;
        });
    }

    async fn on_sync_finished(&mut self, report: SyncReport) {
        self.sync_in_flight = false;
        let SyncReport {
            applied,
            entry,
            failure,
        } = report;

        match failure {
            Some(SyncError::AssignmentMissing) => {
                self.status = PlayerStatus::AssignmentMissing;
                self.entry = None;
                self.leave_channel().await;
                self.apply(PlayerEvent::Stopped).await;
            }
            Some(e) => {
                self.status = PlayerStatus::from_sync_error(&e);
                if self.entry.is_none() {
                    if let Some(entry) = entry {
                        self.load_entry(entry).await;
                        self.status = PlayerStatus::from_sync_error(&e);
                    }
                }
            }
            None => match entry {
                Some(entry) if applied || self.entry.is_none() => self.load_entry(entry).await,
                Some(_) => self.status = self.playing_status(),
                None => {}
            },
        }
    }

    /// Make `entry` the schedule on screen.
    async fn load_entry(&mut self, entry: CacheEntry) {
        let group_id = entry.group_id.clone();
        let sync_mode = entry.assignment.sync_mode;
        let event = PlayerEvent::ScheduleLoaded {
            schedule: entry.schedule.clone(),
            version: entry.version,
            sync_mode,
        };
        self.entry = Some(entry);

        match sync_mode {
            SyncMode::Sync => self.ensure_channel(&group_id).await,
            SyncMode::Extend => self.leave_channel().await,
        }
        self.status = self.playing_status();
        self.apply(event).await;
    }

    /// A sync-mode screen off its channel reports the disconnect until a
    /// rejoin succeeds.
    fn playing_status(&self) -> PlayerStatus {
        match &self.entry {
            Some(entry) if entry.schedule.is_empty() => PlayerStatus::EmptySchedule,
            Some(entry)
                if entry.assignment.sync_mode == SyncMode::Sync && self.channel.is_none() =>
            {
                PlayerStatus::ChannelDisconnected
            }
            Some(_) => PlayerStatus::Playing,
            None => PlayerStatus::EmptySchedule,
        }
    }

    async fn ensure_channel(&mut self, group_id: &GroupId) {
        if self
            .channel
            .as_ref()
            .is_some_and(|channel| channel.group_id() == group_id)
        {
            return;
        }
        self.leave_channel().await;
        if self.rejoin_at.is_some() {
            return;
        }

        let cmd_tx = match self.ensure_link().await {
            Ok(cmd_tx) => cmd_tx,
            Err(e) => {
                warn!(error = %e, "Failed to open group link");
                self.on_channel_lost().await;
                return;
            }
        };

        let joined = GroupChannel::join(
            cmd_tx,
            group_id.clone(),
            self.screen_id.clone(),
            self.config.presence_timeout,
        )
        .await;
        let mut channel = match joined {
            Ok(channel) => channel,
            Err(e) => {
                warn!(group = %group_id, error = %e, "Failed to join group channel");
                self.on_channel_lost().await;
                return;
            }
        };

        match channel.track(Utc::now(), Instant::now().into_std()).await {
            Ok(view) => {
                self.channel = Some(channel);
                self.on_presence(view).await;
            }
            Err(e) => {
                warn!(group = %group_id, error = %e, "Failed to announce presence");
                self.on_channel_lost().await;
            }
        }
    }

    async fn ensure_link(&mut self) -> anyhow::Result<mpsc::Sender<SwarmCommand>> {
        if let Some(link) = &self.link {
            if !link.is_closed() {
                return Ok(link.clone());
            }
        }
        let (cmd_tx, notif_rx) = self.links.connect().await?;
        self.link = Some(cmd_tx.clone());
        self.notifications = Some(notif_rx);
        Ok(cmd_tx)
    }

    async fn leave_channel(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        if let Err(e) = channel.leave().await {
            warn!(error = %e, "Failed to leave group channel cleanly");
        }
        self.apply(PlayerEvent::LeadershipChanged {
            is_leader: false,
            leader: None,
        })
        .await;
    }

    async fn on_channel_lost(&mut self) {
        warn!("Group channel lost, rejoining shortly");
        self.channel = None;
        self.link = None;
        self.notifications = None;
        self.status = PlayerStatus::ChannelDisconnected;
        self.rejoin_at = Some(Instant::now() + Duration::from_secs(REJOIN_DELAY_SECS));
        // Keep showing the current slot until leadership is known again.
        self.apply(PlayerEvent::LeadershipChanged {
            is_leader: false,
            leader: None,
        })
        .await;
    }

    async fn rejoin(&mut self) {
        self.rejoin_at = None;
        let Some(entry) = &self.entry else {
            return;
        };
        if entry.assignment.sync_mode != SyncMode::Sync {
            return;
        }
        let group_id = entry.group_id.clone();
        info!(group = %group_id, "Rejoining group channel");
        self.ensure_channel(&group_id).await;
        if self.channel.is_some() {
            self.status = self.playing_status();
        }
    }

    async fn on_notification(&mut self, notification: Option<SwarmNotification>) {
        let Some(notification) = notification else {
            self.notifications = None;
            self.link = None;
            if self.channel.is_some() {
                self.on_channel_lost().await;
            }
            return;
        };

        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let SwarmNotification::PeerConnected { peer_id, .. } = &notification {
            // A returning peer dropped us from its presence set when it left.
            debug!(peer = %peer_id, "Peer connected, announcing presence");
            if let Err(e) = channel.announce().await {
                warn!(error = %e, "Presence announce failed");
                self.on_channel_lost().await;
            }
            return;
        }
        match channel.handle_notification(&notification, Instant::now().into_std()) {
            Some(ChannelEvent::PresenceChanged(view)) => self.on_presence(view).await,
            Some(ChannelEvent::Broadcast(change)) => {
                self.apply(PlayerEvent::SlideChangeReceived(change)).await
            }
            None => {}
        }
    }

    async fn on_presence(&mut self, view: PresenceView) {
        debug!(
            members = view.members.len(),
            leader = ?view.leader.as_ref().map(|l| l.screen_id.to_string()),
            is_leader = view.is_leader,
            "Presence changed"
        );
        if view.newcomer {
            if let Some(channel) = &self.channel {
                if let Err(e) = channel.announce().await {
                    warn!(error = %e, "Failed to greet newcomer");
                }
            }
        }
        self.apply(PlayerEvent::LeadershipChanged {
            is_leader: view.is_leader,
            leader: view.leader,
        })
        .await;
    }

    async fn on_presence_tick(&mut self) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(e) = channel.announce().await {
            warn!(error = %e, "Presence announce failed");
            self.on_channel_lost().await;
            return;
        }
        if let Some(ChannelEvent::PresenceChanged(view)) = channel.expire(Instant::now().into_std()) {
            self.on_presence(view).await;
        }
    }

    async fn apply(&mut self, event: PlayerEvent) {
        let effects = self.player.handle(event);
        for effect in effects {
            match effect {
                Effect::ArmTimer { generation, after } => {
                    self.timer = Some(ArmedTimer {
                        generation,
                        sleep: Box::pin(sleep(after)),
                    });
                }
                Effect::CancelTimer => self.timer = None,
                Effect::Publish(change) => {
                    if let Some(channel) = &self.channel {
                        if let Err(e) = channel.publish(change).await {
                            warn!(error = %e, "Failed to broadcast slide change");
                        }
                    }
                }
                Effect::Render { index } => self.render(Some(index)),
                Effect::Blank => self.render(None),
                Effect::RequestSync => self.start_sync(),
            }
        }
    }

    fn render(&mut self, index: Option<usize>) {
        self.slot_index = index;
        self.plan = match (index, &self.entry) {
            (Some(index), Some(entry)) => plan_for(entry, index, &self.screen_id),
            _ => RenderPlan::Blank,
        };
        debug!(index = ?index, media = ?self.plan.media_id().map(|m| m.to_string()), "Render");
    }

    fn publish_frame(&self) {
        let frame = Frame {
            status: self.status.clone(),
            playback: self.player.playback(),
            slot_index: self.slot_index,
            plan: self.plan.clone(),
        };
        self.frames.send_if_modified(|current| {
            if *current == frame {
                return false;
            }
            if current.status != frame.status {
                info!(status = %frame.status, "Status");
            }
            *current = frame;
            true
        });
    }
}

async fn timer_fired(timer: &mut Option<ArmedTimer>) -> u64 {
    match timer {
        Some(timer) => {
            timer.sleep.as_mut().await;
            timer.generation
        }
        None => pending().await,
    }
}

async fn next_notification(
    notifications: &mut Option<mpsc::Receiver<SwarmNotification>>,
) -> Option<SwarmNotification> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn rejoin_due(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

//! The network task.
//!
//! A [`Swarm`] is owned by one spawned task. The player drives it with
//! [`SwarmCommand`]s and hears back through [`SwarmNotification`]s; when
//! the task ends the notification stream closes, which the player treats
//! as a lost channel.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic, PublishError};
use libp2p::identity::Keypair;
use libp2p::multiaddr::Protocol;
use libp2p::{identify, swarm::SwarmEvent, Multiaddr, PeerId, Swarm};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, info, trace, warn};

use signwall_shared::constants::DEFAULT_QUIC_PORT;

use crate::behaviour::{SignwallBehaviour, SignwallEvent};
use crate::transport::build_swarm;

const QUEUE_DEPTH: usize = 256;

const REDIAL_MIN: Duration = Duration::from_secs(5);
const REDIAL_MAX: Duration = Duration::from_secs(60);

/// Requests the player can make of the network task.
#[derive(Debug)]
pub enum SwarmCommand {
    PublishMessage { topic: String, data: Vec<u8> },
    SubscribeTopic(String),
    UnsubscribeTopic(String),
    Shutdown,
}

/// What the network task reports back.
#[derive(Debug, Clone)]
pub enum SwarmNotification {
    PeerConnected { peer_id: PeerId, address: Multiaddr },
    /// Sent once the last connection to `peer_id` is gone.
    PeerDisconnected { peer_id: PeerId },
    MessageReceived {
        source: Option<PeerId>,
        topic: String,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct SwarmConfig {
    pub listen_port: u16,
    /// Wall peers. Dialed at start and redialed whenever their connection
    /// is gone.
    pub dials: Vec<Multiaddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_QUIC_PORT,
            dials: Vec::new(),
        }
    }
}

fn without_peer_id(addr: &Multiaddr) -> Multiaddr {
    addr.iter()
        .filter(|protocol| !matches!(protocol, Protocol::P2p(_)))
        .collect()
}

/// Which configured addresses currently have a live connection, and how
/// long to wait before dialing the rest again.
#[derive(Debug)]
struct Redialer {
    configured: Vec<Multiaddr>,
    live: HashMap<Multiaddr, PeerId>,
    backoff: Duration,
}

impl Redialer {
    fn new(configured: Vec<Multiaddr>) -> Self {
        Self {
            configured: configured.iter().map(without_peer_id).collect(),
            live: HashMap::new(),
            backoff: REDIAL_MIN,
        }
    }

    fn connected(&mut self, dialed: &Multiaddr, peer_id: PeerId) {
        let addr = without_peer_id(dialed);
        if self.configured.contains(&addr) {
            self.live.insert(addr, peer_id);
            self.backoff = REDIAL_MIN;
        }
    }

    /// Returns `true` when a configured peer dropped.
    fn disconnected(&mut self, peer_id: &PeerId) -> bool {
        let before = self.live.len();
        self.live.retain(|_, live| live != peer_id);
        let dropped = self.live.len() != before;
        if dropped {
            self.backoff = REDIAL_MIN;
        }
        dropped
    }

    /// Addresses to dial now, and the delay until the next check.
    fn due(&mut self) -> (Vec<Multiaddr>, Duration) {
        let pending: Vec<Multiaddr> = self
            .configured
            .iter()
            .filter(|addr| !self.live.contains_key(*addr))
            .cloned()
            .collect();
        if pending.is_empty() {
            self.backoff = REDIAL_MIN;
            return (pending, REDIAL_MAX);
        }
        let delay = self.backoff;
        self.backoff = (self.backoff * 2).min(REDIAL_MAX);
        (pending, delay)
    }
}

struct SwarmTask {
    swarm: Swarm<SignwallBehaviour>,
    redialer: Redialer,
    next_redial: Pin<Box<Sleep>>,
}

impl SwarmTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SwarmCommand>,
        notifications: mpsc::Sender<SwarmNotification>,
    ) {
        loop {
            let notification = tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("All command senders dropped");
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        break;
                    }
                    None
                }
                event = self.swarm.select_next_some() => self.handle_event(event),
                _ = self.next_redial.as_mut() => {
                    self.redial();
                    None
                }
            };
            if let Some(notification) = notification {
                if notifications.send(notification).await.is_err() {
                    trace!("Notification dropped, player is gone");
                }
            }
        }
        info!(peer_id = %self.swarm.local_peer_id(), "Network task stopped");
    }

    fn gossipsub(&mut self) -> &mut gossipsub::Behaviour {
        &mut self.swarm.behaviour_mut().gossipsub
    }

    fn redial(&mut self) {
        let (pending, delay) = self.redialer.due();
        for addr in pending {
            match self.swarm.dial(addr.clone()) {
                Ok(()) => debug!(%addr, "Dialing wall peer"),
                Err(e) => warn!(%addr, error = %e, "Could not dial"),
            }
        }
        self.next_redial.as_mut().reset(Instant::now() + delay);
    }

    fn handle_command(&mut self, command: SwarmCommand) -> ControlFlow<()> {
        match command {
            SwarmCommand::PublishMessage { topic, data } => {
                match self.gossipsub().publish(IdentTopic::new(&topic), data) {
                    Ok(_) => trace!(%topic, "Published"),
                    // Expected while a screen is alone on its wall.
                    Err(PublishError::InsufficientPeers) => {
                        trace!(%topic, "Nobody to publish to")
                    }
                    Err(e) => warn!(%topic, error = %e, "Publish failed"),
                }
            }
            SwarmCommand::SubscribeTopic(topic) => {
                match self.gossipsub().subscribe(&IdentTopic::new(&topic)) {
                    Ok(_) => info!(%topic, "Subscribed"),
                    Err(e) => warn!(%topic, error = %e, "Subscribe failed"),
                }
            }
            SwarmCommand::UnsubscribeTopic(topic) => {
                match self.gossipsub().unsubscribe(&IdentTopic::new(&topic)) {
                    Ok(true) => info!(%topic, "Unsubscribed"),
                    Ok(false) => trace!(%topic, "Was not subscribed"),
                    Err(e) => warn!(%topic, error = %e, "Unsubscribe failed"),
                }
            }
            SwarmCommand::Shutdown => {
                info!("Network task shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_event(&mut self, event: SwarmEvent<SignwallEvent>) -> Option<SwarmNotification> {
        match event {
            SwarmEvent::Behaviour(SignwallEvent::Gossipsub(gossipsub::Event::Message {
                message,
                ..
            })) => {
                trace!(topic = %message.topic, len = message.data.len(), "Message in");
                Some(SwarmNotification::MessageReceived {
                    source: message.source,
                    topic: message.topic.into_string(),
                    data: message.data,
                })
            }
            SwarmEvent::Behaviour(SignwallEvent::Identify(identify::Event::Received {
                peer_id,
                ..
            })) => {
                // Wall peers are few and all relevant, keep them in every mesh.
                self.gossipsub().add_explicit_peer(&peer_id);
                None
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, num_established, ..
            } => {
                if endpoint.is_dialer() {
                    self.redialer.connected(endpoint.get_remote_address(), peer_id);
                }
                if num_established.get() != 1 {
                    return None;
                }
                let address = endpoint.get_remote_address().clone();
                info!(peer = %peer_id, %address, "Peer connected");
                Some(SwarmNotification::PeerConnected { peer_id, address })
            }
            SwarmEvent::ConnectionClosed { peer_id, num_established: 0, .. } => {
                info!(peer = %peer_id, "Peer gone");
                self.gossipsub().remove_explicit_peer(&peer_id);
                if self.redialer.disconnected(&peer_id) {
                    self.next_redial.as_mut().reset(Instant::now() + REDIAL_MIN);
                }
                Some(SwarmNotification::PeerDisconnected { peer_id })
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "Listening");
                None
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!(peer = ?peer_id, error = %error, "Outgoing connection failed");
                None
            }
            SwarmEvent::IncomingConnectionError { error, .. } => {
                debug!(error = %error, "Incoming connection failed");
                None
            }
            _ => None,
        }
    }
}

/// Start listening on QUIC and hand the swarm to a background task that
/// keeps the configured wall peers dialed.
pub async fn spawn_swarm(
    keypair: Keypair,
    config: SwarmConfig,
) -> anyhow::Result<(
    mpsc::Sender<SwarmCommand>,
    mpsc::Receiver<SwarmNotification>,
    PeerId,
)> {
    let mut swarm = build_swarm(keypair)?;
    let local_peer_id = *swarm.local_peer_id();

    let listen: Multiaddr = format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port).parse()?;
    swarm.listen_on(listen)?;

    let (command_tx, command_rx) = mpsc::channel(QUEUE_DEPTH);
    let (notification_tx, notification_rx) = mpsc::channel(QUEUE_DEPTH);

    let mut task = SwarmTask {
        swarm,
        redialer: Redialer::new(config.dials),
        next_redial: Box::pin(sleep(REDIAL_MIN)),
    };
    task.redial();
    info!(peer_id = %local_peer_id, port = config.listen_port, "Network task starting");
    tokio::spawn(task.run(command_rx, notification_tx));

    Ok((command_tx, notification_rx, local_peer_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last_octet: u8) -> Multiaddr {
        format!("/ip4/10.0.4.{last_octet}/udp/4001/quic-v1").parse().unwrap()
    }

    #[test]
    fn dials_every_configured_peer_first() {
        let mut redialer = Redialer::new(vec![addr(21), addr(22)]);
        let (pending, delay) = redialer.due();
        assert_eq!(pending, vec![addr(21), addr(22)]);
        assert_eq!(delay, REDIAL_MIN);
    }

    #[test]
    fn redials_a_dropped_peer_with_backoff() {
        let mut redialer = Redialer::new(vec![addr(21), addr(22)]);
        let p21 = PeerId::random();
        let p22 = PeerId::random();
        redialer.connected(&addr(21).with(Protocol::P2p(p21)), p21);
        redialer.connected(&addr(22), p22);
        assert!(redialer.due().0.is_empty());

        // Connection to .22 drops and stays down.
        assert!(redialer.disconnected(&p22));
        let delays: Vec<Duration> = (0..6)
            .map(|_| {
                let (pending, delay) = redialer.due();
                assert_eq!(pending, vec![addr(22)]);
                delay
            })
            .collect();
        assert_eq!(
            delays,
            [5, 10, 20, 40, 60, 60].map(Duration::from_secs).to_vec()
        );

        // Back up: the schedule resets.
        redialer.connected(&addr(22), p22);
        assert!(redialer.due().0.is_empty());
        assert!(redialer.disconnected(&p22));
        assert_eq!(redialer.due().1, REDIAL_MIN);
    }

    #[test]
    fn unconfigured_peers_are_not_tracked() {
        let mut redialer = Redialer::new(vec![addr(21)]);
        let stranger = PeerId::random();
        redialer.connected(&addr(99), stranger);
        assert!(!redialer.disconnected(&stranger));
        assert_eq!(redialer.due().0, vec![addr(21)]);
    }
}

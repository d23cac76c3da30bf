//! Composed libp2p `NetworkBehaviour` for signwall players.
//!
//! GossipSub carries the per-group presence and slide-change traffic;
//! Identify lets peers exchange listen addresses.

use libp2p::{gossipsub, identify, swarm::NetworkBehaviour};

/// Composed network behaviour for a player node.
///
/// Construction is handled by [`super::transport::build_swarm`] via
/// `SwarmBuilder`.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "SignwallEvent")]
pub struct SignwallBehaviour {
    /// Pub/sub for group channel messages
    pub gossipsub: gossipsub::Behaviour,
    /// Protocol identification and address exchange
    pub identify: identify::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum SignwallEvent {
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
}

impl From<gossipsub::Event> for SignwallEvent {
    fn from(event: gossipsub::Event) -> Self {
        SignwallEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for SignwallEvent {
    fn from(event: identify::Event) -> Self {
        SignwallEvent::Identify(event)
    }
}

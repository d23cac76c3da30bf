//! Swarm construction: QUIC transport, gossipsub tuned for small walls,
//! identify for address exchange.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use libp2p::gossipsub::{self, MessageAuthenticity, MessageId, ValidationMode};
use libp2p::identity::Keypair;
use libp2p::{identify, Swarm, SwarmBuilder};
use tracing::info;

use signwall_shared::constants::{GOSSIPSUB_HEARTBEAT_SECS, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};

use crate::behaviour::SignwallBehaviour;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A wall rarely has more than a handful of screens.
const MESH_N: usize = 4;
const MESH_N_LOW: usize = 1;
const MESH_N_HIGH: usize = 8;

/// Presence traffic keeps connections busy, so idle ones are dead ones.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(90);

const IDENTIFY_INTERVAL: Duration = Duration::from_secs(60);

/// Presence re-announcements carry identical payloads from one source, so
/// the publisher's sequence number is part of the id.
fn message_id(message: &gossipsub::Message) -> MessageId {
    let mut hasher = DefaultHasher::new();
    message.data.hash(&mut hasher);
    message.source.hash(&mut hasher);
    message.sequence_number.hash(&mut hasher);
    MessageId::from(hasher.finish().to_string())
}

fn gossipsub_behaviour(key: &Keypair) -> Result<gossipsub::Behaviour, BoxError> {
    let config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(Duration::from_secs(GOSSIPSUB_HEARTBEAT_SECS))
        .validation_mode(ValidationMode::Strict)
        .max_transmit_size(MAX_MESSAGE_SIZE)
        .mesh_n(MESH_N)
        .mesh_n_low(MESH_N_LOW)
        .mesh_n_high(MESH_N_HIGH)
        .mesh_outbound_min(0)
        .message_id_fn(message_id)
        .build()
        .map_err(|e| -> BoxError { format!("GossipSub config: {e}").into() })?;

    gossipsub::Behaviour::new(MessageAuthenticity::Signed(key.clone()), config)
        .map_err(|e| -> BoxError { format!("GossipSub init: {e}").into() })
}

fn identify_behaviour(key: &Keypair) -> identify::Behaviour {
    identify::Behaviour::new(
        identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
            .with_push_listen_addr_updates(true)
            .with_interval(IDENTIFY_INTERVAL),
    )
}

/// Build the player's swarm on a QUIC-only transport.
pub fn build_swarm(keypair: Keypair) -> anyhow::Result<Swarm<SignwallBehaviour>> {
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_behaviour(|key| -> Result<SignwallBehaviour, BoxError> {
            Ok(SignwallBehaviour {
                gossipsub: gossipsub_behaviour(key)?,
                identify: identify_behaviour(key),
            })
        })?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
        .build();

    info!(peer_id = %swarm.local_peer_id(), "Built signwall swarm over QUIC");

    Ok(swarm)
}

// Group channel networking built on libp2p gossipsub over QUIC.

pub mod behaviour;
pub mod channel;
pub mod discovery;
pub mod messages;
pub mod presence;
pub mod swarm;
pub mod transport;

pub use behaviour::{SignwallBehaviour, SignwallEvent};
pub use channel::{ChannelEvent, GroupChannel};
pub use discovery::{load_bootstrap_peers, parse_multiaddrs};
pub use messages::{decode_message, publish_message, try_decode_notification};
pub use presence::PresenceTracker;
pub use swarm::{spawn_swarm, SwarmCommand, SwarmConfig, SwarmNotification};
pub use transport::build_swarm;

/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/signwall/1.0.0";

/// Application name
pub const APP_NAME: &str = "signwall";

/// Prefix of the per-group gossipsub topic
pub const TOPIC_PREFIX: &str = "player-sync";

/// Slot duration used when a slot has no (or a zero) duration
pub const DEFAULT_SLOT_SECS: u64 = 10;

/// How often the schedule synchronizer polls the assignment endpoint
pub const DEFAULT_POLL_SECS: u64 = 60;

/// Heartbeat interval (5 minutes)
pub const DEFAULT_HEARTBEAT_SECS: u64 = 300;

/// How often a joined device re-announces its presence record
pub const DEFAULT_PRESENCE_SECS: u64 = 10;

/// Presence records not refreshed within this window are expired
pub const DEFAULT_PRESENCE_TIMEOUT_SECS: u64 = 30;

/// Delay before rejoining the group channel after a disconnect
pub const REJOIN_DELAY_SECS: u64 = 5;

/// Maximum channel message size in bytes (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

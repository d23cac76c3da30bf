//! Player configuration loaded from environment variables.
//!
//! Everything has a default. A new device additionally needs
//! `SIGNWALL_PAIRING_CODE` once; afterwards its screen id comes from the
//! cache database.

use std::path::PathBuf;
use std::time::Duration;

use signwall_shared::constants::{
    DEFAULT_HEARTBEAT_SECS, DEFAULT_POLL_SECS, DEFAULT_PRESENCE_SECS,
    DEFAULT_PRESENCE_TIMEOUT_SECS, DEFAULT_QUIC_PORT,
};
use signwall_shared::ScreenId;

/// Player configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Overrides the screen id stored at pairing.
    /// Env: `SIGNWALL_SCREEN_ID`
    pub screen_id: Option<ScreenId>,

    /// Six-digit code from the admin console, used when the device has no
    /// stored screen id.
    /// Env: `SIGNWALL_PAIRING_CODE`
    pub pairing_code: Option<String>,

    /// Base URL of the backend API.
    /// Env: `SIGNWALL_API_URL`
    /// Default: `http://localhost:8080/api`
    pub api_url: String,

    /// Bearer token sent with API calls.
    /// Env: `SIGNWALL_API_TOKEN`
    pub api_token: Option<String>,

    /// Explicit cache database path; the platform data dir otherwise.
    /// Env: `SIGNWALL_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Schedule poll interval.
    /// Env: `SIGNWALL_POLL_SECS`
    pub poll_interval: Duration,

    /// Liveness ping interval.
    /// Env: `SIGNWALL_HEARTBEAT_SECS`
    pub heartbeat_interval: Duration,

    /// Presence re-announce interval.
    /// Env: `SIGNWALL_PRESENCE_SECS`
    pub presence_interval: Duration,

    /// Presence expiry window.
    /// Env: `SIGNWALL_PRESENCE_TIMEOUT_SECS`
    pub presence_timeout: Duration,

    /// QUIC listen port for the group channel.
    /// Env: `SIGNWALL_LISTEN_PORT`
    pub listen_port: u16,

    /// File listing peer multiaddrs, one per line.
    /// Env: `SIGNWALL_BOOTSTRAP_PEERS`
    pub bootstrap_peers: Option<PathBuf>,

    /// Comma-separated peer multiaddrs dialed in addition to the file.
    /// Env: `SIGNWALL_PEERS`
    pub peers: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            screen_id: None,
            pairing_code: None,
            api_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            db_path: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            presence_interval: Duration::from_secs(DEFAULT_PRESENCE_SECS),
            presence_timeout: Duration::from_secs(DEFAULT_PRESENCE_TIMEOUT_SECS),
            listen_port: DEFAULT_QUIC_PORT,
            bootstrap_peers: None,
            peers: Vec::new(),
        }
    }
}

impl PlayerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            screen_id: non_empty(&lookup, "SIGNWALL_SCREEN_ID").map(ScreenId),
            pairing_code: non_empty(&lookup, "SIGNWALL_PAIRING_CODE"),
            ..Self::default()
        };

        if let Some(url) = lookup("SIGNWALL_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(token) = lookup("SIGNWALL_API_TOKEN") {
            if !token.is_empty() {
                config.api_token = Some(token);
            }
        }

        if let Some(path) = lookup("SIGNWALL_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        read_secs(&lookup, "SIGNWALL_POLL_SECS", &mut config.poll_interval);
        read_secs(&lookup, "SIGNWALL_HEARTBEAT_SECS", &mut config.heartbeat_interval);
        read_secs(&lookup, "SIGNWALL_PRESENCE_SECS", &mut config.presence_interval);
        read_secs(
            &lookup,
            "SIGNWALL_PRESENCE_TIMEOUT_SECS",
            &mut config.presence_timeout,
        );

        if let Some(val) = lookup("SIGNWALL_LISTEN_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.listen_port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid SIGNWALL_LISTEN_PORT, using default"),
            }
        }

        if let Some(path) = lookup("SIGNWALL_BOOTSTRAP_PEERS") {
            config.bootstrap_peers = Some(PathBuf::from(path));
        }

        if let Some(list) = lookup("SIGNWALL_PEERS") {
            config.peers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_secs<F>(lookup: &F, key: &str, target: &mut Duration)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(val) = lookup(key) else {
        return;
    };
    match val.parse::<u64>() {
        Ok(secs) if secs > 0 => *target = Duration::from_secs(secs),
        _ => tracing::warn!(key, value = %val, "Invalid interval, using default"),
    }
}

//! # signwall-player
//!
//! Device side of a signwall screen: keeps the local cache in step with the
//! backend, runs the playback state machine, coordinates with the other
//! screens of its group and tells the display surface what to draw.

pub mod backend;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod pairing;
pub mod playback;
pub mod render;
pub mod runtime;
pub mod status;
pub mod sync;

pub use backend::{Backend, HttpBackend};
pub use config::PlayerConfig;
pub use error::{BackendError, PairingError, SyncError};
pub use playback::{Effect, PlaybackState, Player, PlayerEvent, PlayerState};
pub use render::RenderPlan;
pub use runtime::{DeviceRuntime, Exit, Frame, Libp2pLink, LinkFactory, MediaReader, RuntimeHandle};
pub use status::PlayerStatus;
pub use sync::{sync, SyncReport};

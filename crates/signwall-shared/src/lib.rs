//! # signwall-shared
//!
//! Types shared by every signwall crate: identifiers, the schedule model,
//! the group channel wire protocol, the layout partitioner and the leader
//! election rule.

pub mod constants;
pub mod error;
pub mod layout;
pub mod presence;
pub mod protocol;
pub mod types;

pub use error::SharedError;
pub use layout::{partition, Layout, Placement};
pub use presence::{elect_leader, PresenceRecord};
pub use types::*;

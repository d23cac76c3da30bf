//! # signwall-store
//!
//! Durable per-device cache for the player, backed by SQLite.
//!
//! The store holds exactly one cache entry: the last applied schedule, its
//! version token and group, and the media blobs it references. Refreshes
//! are staged blob by blob and swapped in with a single transaction, so a
//! half-finished download never replaces a working cache.
//!
//! The screen id handed out at pairing lives next to the cache entry and is
//! forgotten together with it.

pub mod blobs;
pub mod cache;
pub mod database;
pub mod migrations;
pub mod models;
pub mod pairing;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;

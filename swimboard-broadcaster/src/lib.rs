//! Snapshot broadcast hub for the swimboard scoreboard.
//!
//! This crate delivers the current scoreboard state to everything that
//! displays it. It manages a Unix domain socket for local display clients
//! (newline-delimited JSON) and in-process channel subscribers for the
//! transport layer.
//!
//! # Delivery model
//!
//! - Every committed state change publishes one *complete* snapshot;
//!   there are no diffs and no history.
//! - New subscribers receive the current snapshot immediately, so a late
//!   joiner is fully consistent.
//! - Delivery is fire-and-forget per subscriber: a slow or dead subscriber
//!   is dropped and can never block the publisher or other subscribers.

pub mod client;
pub mod error;
pub mod hub;

// Re-exports
pub use error::{HubError, Result};
pub use hub::SnapshotHub;

//! In-memory replication backend.
//!
//! This crate implements the feed library traits of `corelib` without a
//! network, so the harness can be exercised in tests and on one machine:
//! - Node start and client admission (capability secret, master identity)
//! - Gossip links between nodes
//! - Pluggable replication strategies deciding which feeds a node copies
//! - Type-filtered subscriptions, historical and live

mod client;
pub mod network;
mod peer;
pub mod strategy;

pub use network::SimNetwork;
pub use peer::SUBSCRIBER_BUFFER;
pub use strategy::{EagerStrategy, FollowStrategy, ReplicationStrategy};

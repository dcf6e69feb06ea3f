//! Replication strategy abstractions.
//!
//! A replication strategy decides which feeds a peer copies from the peers
//! it is connected to. Different strategies model different library
//! settings:
//!
//! - **FollowStrategy**: feeds within N follow hops of the peer
//! - **EagerStrategy**: every feed a connected peer holds

pub mod eager;
pub mod follow;

pub use eager::EagerStrategy;
pub use follow::FollowStrategy;

use corelib::{FeedId, FollowGraph};

/// Trait for replication strategies.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as one strategy is
/// shared by every peer of a network.
pub trait ReplicationStrategy: Send + Sync + 'static {
    /// Whether `peer` should hold a copy of `author`'s feed.
    ///
    /// # Arguments
    /// * `peer` - The replicating peer
    /// * `graph` - Follow graph replayed from everything `peer` holds
    /// * `author` - The feed being considered
    fn replicates(&self, peer: &FeedId, graph: &FollowGraph, author: &FeedId) -> bool;

    /// Get the strategy name (for logging/debugging).
    fn name(&self) -> &'static str;
}

//! Eager replication strategy.
//!
//! Copies every feed a connected peer holds, regardless of follows. Useful
//! when a test only cares about transport, not about the social graph.

use crate::strategy::ReplicationStrategy;
use corelib::{FeedId, FollowGraph};

/// Replicate everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct EagerStrategy;

impl ReplicationStrategy for EagerStrategy {
    fn replicates(&self, _peer: &FeedId, _graph: &FollowGraph, _author: &FeedId) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "EagerStrategy"
    }
}

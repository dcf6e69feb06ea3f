//! Follow-based replication strategy.
//!
//! A peer replicates its own feed plus every feed reachable within `hops`
//! follow edges from it.
//!
//! # Algorithm
//!
//! 1. Start from the peer's own identity
//! 2. Breadth-first walk over followees, one level per hop
//! 3. Replicate `author` if it was reached
//!
//! # Performance
//!
//! - **Time**: O(f) where f = follow edges reachable within `hops`
//! - **Space**: O(f) for the visited set

use crate::strategy::ReplicationStrategy;
use corelib::{FeedId, FollowGraph};
use std::collections::HashSet;

/// Replicate feeds within `hops` follow steps.
///
/// # Example
///
/// ```rust
/// use replication::FollowStrategy;
///
/// let strategy = FollowStrategy::new(2); // friends of friends
/// assert_eq!(strategy.hops(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct FollowStrategy {
    hops: usize,
}

impl FollowStrategy {
    /// Create a strategy reaching `hops` follow steps.
    ///
    /// * `0`: own feed only
    /// * `1`: own feed and direct followees
    pub fn new(hops: usize) -> Self {
        Self { hops }
    }

    pub fn hops(&self) -> usize {
        self.hops
    }
}

impl Default for FollowStrategy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ReplicationStrategy for FollowStrategy {
    fn replicates(&self, peer: &FeedId, graph: &FollowGraph, author: &FeedId) -> bool {
        if peer == author {
            return true;
        }

        let mut seen: HashSet<&FeedId> = HashSet::new();
        seen.insert(peer);
        let mut frontier = vec![peer];

        for _ in 0..self.hops {
            let mut next = Vec::new();
            for id in frontier {
                for followee in graph.followees(id) {
                    if followee == author {
                        return true;
                    }
                    if seen.insert(followee) {
                        next.push(followee);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        false
    }

    fn name(&self) -> &'static str {
        "FollowStrategy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::message::MessageKey;
    use corelib::{Content, Keypair, Message};

    fn feed(seed: u8) -> FeedId {
        Keypair::from_seed(&[seed; 32]).id().clone()
    }

    fn follow(author: &FeedId, target: &FeedId) -> Message {
        let content = Content::contact(target, true);
        Message {
            key: MessageKey::compute(author, 1, None, &content),
            author: author.clone(),
            sequence: 1,
            previous: None,
            timestamp: 0,
            content,
        }
    }

    #[test]
    fn test_own_feed_always_replicated() {
        let alice = feed(1);
        let graph = FollowGraph::new();
        assert!(FollowStrategy::new(0).replicates(&alice, &graph, &alice));
    }

    #[test]
    fn test_hops_limit_reach() {
        let (alice, bob, carol) = (feed(1), feed(2), feed(3));
        let log = vec![follow(&alice, &bob), follow(&bob, &carol)];
        let graph = FollowGraph::replay(&log);

        let direct = FollowStrategy::new(1);
        assert!(direct.replicates(&alice, &graph, &bob));
        assert!(!direct.replicates(&alice, &graph, &carol));

        let foaf = FollowStrategy::new(2);
        assert!(foaf.replicates(&alice, &graph, &carol));
        assert!(!foaf.replicates(&carol, &graph, &alice));
    }
}

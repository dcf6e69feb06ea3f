//! Follow graph view.
//!
//! The follow graph is never stored. It is derived by replaying `contact`
//! messages in delivery order: for each (author, target) pair the latest
//! record wins, and an edge exists while that record says `following: true`.

use crate::identity::FeedId;
use crate::message::{Contact, Message};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Directed graph over feed identities, edges pointing from follower to
/// followee.
#[derive(Debug, Clone, Default)]
pub struct FollowGraph {
    graph: DiGraph<FeedId, ()>,
    index: HashMap<FeedId, NodeIndex>,
}

impl FollowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the view from a sequence of messages; non-`contact` messages
    /// are skipped.
    pub fn replay<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Self {
        let mut graph = Self::new();
        for message in messages {
            graph.apply(message);
        }
        graph
    }

    /// Fold one more message into the view. Returns whether it was a
    /// `contact` record.
    pub fn apply(&mut self, message: &Message) -> bool {
        let Some(contact) = message.content.parse::<Contact>() else {
            return false;
        };
        let from = self.intern(&message.author);
        let to = self.intern(&contact.contact);
        let existing = self.graph.find_edge(from, to);

        match (contact.following, existing) {
            (true, None) => {
                self.graph.add_edge(from, to, ());
            }
            (false, Some(edge)) => {
                self.graph.remove_edge(edge);
            }
            _ => {}
        }
        true
    }

    fn intern(&mut self, id: &FeedId) -> NodeIndex {
        if let Some(index) = self.index.get(id) {
            return *index;
        }
        let index = self.graph.add_node(id.clone());
        self.index.insert(id.clone(), index);
        index
    }

    /// Whether `follower` currently follows `followee`.
    pub fn follows(&self, follower: &FeedId, followee: &FeedId) -> bool {
        match (self.index.get(follower), self.index.get(followee)) {
            (Some(from), Some(to)) => self.graph.contains_edge(*from, *to),
            _ => false,
        }
    }

    /// Feeds `id` follows, sorted.
    pub fn followees(&self, id: &FeedId) -> Vec<&FeedId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Feeds following `id`, sorted.
    pub fn followers(&self, id: &FeedId) -> Vec<&FeedId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &FeedId, direction: Direction) -> Vec<&FeedId> {
        let Some(index) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&FeedId> = self
            .graph
            .neighbors_directed(*index, direction)
            .map(|n| &self.graph[n])
            .collect();
        ids.sort();
        ids
    }

    /// Number of follow edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of feeds mentioned by any contact record.
    pub fn feed_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All edges as (follower, followee), sorted.
    pub fn edges(&self) -> Vec<(&FeedId, &FeedId)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (&self.graph[a], &self.graph[b]))
            .collect();
        edges.sort();
        edges
    }
}

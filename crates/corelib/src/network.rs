//! Gossip addressing.
//!
//! A [`GossipLink`] is a dial hint handed to the external gossip subsystem;
//! the harness creates it and forgets it.

use crate::identity::FeedId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directed edge telling `from` where to dial the peer `key`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct GossipLink {
    pub from: FeedId,
    pub host: String,
    pub port: u16,
    /// Identity the dialed peer must present.
    pub key: FeedId,
}

impl GossipLink {
    pub fn new(from: FeedId, host: impl Into<String>, port: u16, key: FeedId) -> Self {
        Self {
            from,
            host: host.into(),
            port,
            key,
        }
    }

    /// `host:port` of the dialed peer.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for GossipLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}@{}", self.from.short(), self.key.short(), self.address())
    }
}

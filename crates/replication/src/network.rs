//! In-memory feed network.
//!
//! `SimNetwork` stands in for the external feed library: it starts nodes,
//! accepts client connections, records gossip links and replicates feeds
//! between connected peers according to a [`ReplicationStrategy`]. There is
//! no wire protocol and nothing touches the disk; ports only name nodes, so
//! every host is treated as local.
//!
//! Completion callbacks are invoked before the calling method returns.
//! Replication runs to a fixpoint after every publish and every new
//! connection, so an entry is visible on all peers that replicate it by the
//! time its publish settles.

use crate::client::SimClient;
use crate::peer::SimPeer;
use crate::strategy::{FollowStrategy, ReplicationStrategy};
use corelib::backend::{BackendCallback, ConnectRequest, FeedBackend, FeedClient, Manifest};
use corelib::{BackendError, FeedId, GossipLink, Keypair, Message, NodeConfig};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared in-memory network; clones refer to the same network.
#[derive(Clone)]
pub struct SimNetwork {
    inner: Arc<Inner>,
}

struct Inner {
    peers: DashMap<u16, Arc<SimPeer>>,
    /// Unordered peer pairs, stored smaller id first.
    connections: Mutex<BTreeSet<(FeedId, FeedId)>>,
    strategy: Arc<dyn ReplicationStrategy>,
}

impl SimNetwork {
    /// Network replicating direct follows.
    pub fn new() -> Self {
        Self::with_strategy(FollowStrategy::default())
    }

    pub fn with_strategy(strategy: impl ReplicationStrategy) -> Self {
        tracing::debug!(strategy = strategy.name(), "creating in-memory network");
        Self {
            inner: Arc::new(Inner {
                peers: DashMap::new(),
                connections: Mutex::new(BTreeSet::new()),
                strategy: Arc::new(strategy),
            }),
        }
    }

    /// The methods every simulated node exposes.
    pub fn manifest() -> Manifest {
        Manifest::default()
            .with("whoami", "sync")
            .with("publish", "async")
            .with("gossip.add", "sync")
            .with("messagesByType", "source")
            .with("close", "async")
    }

    fn peer_on(&self, port: u16) -> Option<Arc<SimPeer>> {
        self.inner.peers.get(&port).map(|p| Arc::clone(p.value()))
    }

    fn peer_by_id(&self, id: &FeedId) -> Option<Arc<SimPeer>> {
        self.inner
            .peers
            .iter()
            .find(|p| &p.value().id == id)
            .map(|p| Arc::clone(p.value()))
    }

    /// Identities of every running node, ordered by port.
    pub fn node_ids(&self) -> Vec<FeedId> {
        let mut nodes: Vec<(u16, FeedId)> = self
            .inner
            .peers
            .iter()
            .map(|p| (*p.key(), p.value().id.clone()))
            .collect();
        nodes.sort();
        nodes.into_iter().map(|(_, id)| id).collect()
    }

    /// Whether the two nodes hold a gossip connection.
    pub fn connected(&self, a: &FeedId, b: &FeedId) -> bool {
        self.inner.connections.lock().contains(&pair(a, b))
    }

    /// Gossip links registered on `node`.
    pub fn links_of(&self, node: &FeedId) -> Vec<GossipLink> {
        self.peer_by_id(node).map(|p| p.links()).unwrap_or_default()
    }

    /// Latest sequence of `author`'s feed as held by `node`.
    pub fn held_sequence(&self, node: &FeedId, author: &FeedId) -> u64 {
        self.peer_by_id(node).map_or(0, |p| p.latest(author))
    }

    /// Make the log of `node` reject appends, simulating storage failure.
    pub fn set_read_only(&self, node: &FeedId, read_only: bool) {
        if let Some(peer) = self.peer_by_id(node) {
            peer.set_read_only(read_only);
        }
    }

    /// Record `link` on `peer`, connecting the two nodes if the dialed
    /// address hosts the expected identity.
    pub(crate) fn add_link(&self, peer: &SimPeer, link: GossipLink) {
        if !peer.add_link(link.clone()) {
            return;
        }
        match self.peer_on(link.port) {
            Some(remote) if remote.id == link.key => {
                self.inner.connections.lock().insert(pair(&peer.id, &remote.id));
                tracing::debug!(link = %link, "gossip connection established");
                self.replicate();
            }
            Some(remote) => {
                tracing::debug!(
                    link = %link,
                    found = %remote.id,
                    "dialed peer presented another key"
                );
            }
            None => {
                tracing::debug!(link = %link, "gossip peer not reachable yet");
            }
        }
    }

    /// Copy entries along connections until no peer gains anything.
    pub(crate) fn replicate(&self) {
        let connections: Vec<(FeedId, FeedId)> =
            self.inner.connections.lock().iter().cloned().collect();

        loop {
            let mut copied = 0;
            for (a, b) in &connections {
                let (Some(a), Some(b)) = (self.peer_by_id(a), self.peer_by_id(b)) else {
                    continue;
                };
                copied += self.pull(&a, &b);
                copied += self.pull(&b, &a);
            }
            if copied == 0 {
                break;
            }
            tracing::trace!(copied, "replication round");
        }
    }

    /// Copy into `into` the feeds of `from` that `into` replicates.
    fn pull(&self, into: &SimPeer, from: &SimPeer) -> usize {
        let graph = into.follow_graph();
        let mut wanted: Vec<Message> = Vec::new();
        for (author, head) in from.feed_heads() {
            let held = into.latest(&author);
            if head <= held || !self.inner.strategy.replicates(&into.id, &graph, &author) {
                continue;
            }
            wanted.extend(from.feed_after(&author, held));
        }
        if wanted.is_empty() {
            return 0;
        }
        into.ingest(wanted)
    }
}

impl Default for SimNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimNetwork")
            .field("nodes", &self.inner.peers.len())
            .field("strategy", &self.inner.strategy.name())
            .finish()
    }
}

impl FeedBackend for SimNetwork {
    fn start(&self, config: &NodeConfig, keys: &Keypair) -> Result<Manifest, BackendError> {
        let address = format!("{}:{}", config.host, config.port);
        let peer = Arc::new(SimPeer::new(
            keys.id().clone(),
            config.host.clone(),
            config.port,
            config.caps.shs.clone(),
            config.master.clone(),
        ));

        match self.inner.peers.entry(config.port) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(BackendError::AddressInUse(address));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(peer);
            }
        }

        tracing::info!(id = %keys.id(), address = %address, "node started");
        Ok(Self::manifest())
    }

    fn connect(&self, request: ConnectRequest, done: BackendCallback<Arc<dyn FeedClient>>) {
        let Some(peer) = self.peer_on(request.port) else {
            return done(Err(BackendError::Refused(request.address())));
        };
        if peer.shs != request.caps.shs {
            return done(Err(BackendError::Handshake(
                "capability secret mismatch".to_string(),
            )));
        }
        if peer.id != request.remote {
            return done(Err(BackendError::Handshake(format!(
                "expected {} but {} answered",
                request.remote, peer.id
            ))));
        }
        let client_id = request.keys.id();
        if client_id != &peer.id && peer.master.as_ref() != Some(client_id) {
            return done(Err(BackendError::Unauthorized(client_id.to_string())));
        }

        tracing::debug!(node = %peer.id, host = %peer.host, port = peer.port, "client admitted");
        let client: Arc<dyn FeedClient> = Arc::new(SimClient::new(peer, self.clone()));
        done(Ok(client))
    }
}

fn pair(a: &FeedId, b: &FeedId) -> (FeedId, FeedId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

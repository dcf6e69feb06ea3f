//! Seam to the external feed library.
//!
//! The library owns peer discovery, gossip transport, replication and log
//! storage. The harness only drives it through these traits, which keep the
//! library's callback style: every asynchronous method takes a single
//! completion callback receiving `Result<T, BackendError>`. Components wrap
//! them in [`AsyncOp`](crate::AsyncOp) and map [`BackendError`] into the
//! harness taxonomy.

use crate::config::{Caps, NodeConfig};
use crate::identity::{FeedId, Keypair};
use crate::message::{Content, Message};
use crate::network::GossipLink;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by the external library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Nothing is listening at the address
    #[error("connection refused by {0}")]
    Refused(String),
    /// Address already bound by another node
    #[error("address {0} already in use")]
    AddressInUse(String),
    /// Capability secret or key exchange rejected
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// Identity not allowed to drive the node
    #[error("{0} is not authorized")]
    Unauthorized(String),
    /// Connection or node closed
    #[error("connection closed")]
    Closed,
    /// Malformed request
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Log storage failure
    #[error("storage failure: {0}")]
    Storage(String),
    /// Reader fell behind and entries were discarded
    #[error("reader lagged, {0} entries skipped")]
    Lagged(u64),
}

/// Completion callback of a backend operation.
pub type BackendCallback<T> = Box<dyn FnOnce(Result<T, BackendError>) + Send + 'static>;

/// Lazy sequence of log entries produced by a subscription.
pub type MessageSource = BoxStream<'static, Result<Message, BackendError>>;

/// What a subscription replays and whether it keeps waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMode {
    /// Replay entries already stored.
    pub old: bool,
    /// Keep delivering new entries until the connection closes.
    pub live: bool,
}

impl StreamMode {
    /// Stored entries, then new ones as they arrive.
    pub const FOLLOW: Self = Self { old: true, live: true };
    /// Stored entries only; the sequence ends after them.
    pub const HISTORY: Self = Self { old: true, live: false };
    /// New entries only.
    pub const LIVE: Self = Self { old: false, live: true };
}

impl Default for StreamMode {
    fn default() -> Self {
        Self::FOLLOW
    }
}

/// Method names exposed by a node's connection surface, mapped to their
/// call style (`async`, `sync`, `source`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub BTreeMap<String, String>);

impl Manifest {
    pub fn with(mut self, method: &str, kind: &str) -> Self {
        self.0.insert(method.to_string(), kind.to_string());
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.0.contains_key(method)
    }
}

/// Parameters of a client connection.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    /// Keys the client authenticates with.
    pub keys: Keypair,
    pub caps: Caps,
    /// Identity the remote node must present.
    pub remote: FeedId,
}

impl ConnectRequest {
    /// Connect to the node described by `config`, as its own identity.
    pub fn for_node(config: &NodeConfig, keys: Keypair) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            remote: keys.id().clone(),
            keys,
            caps: config.caps.clone(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Process-level entry point of the feed library.
pub trait FeedBackend: Send + Sync + 'static {
    /// Start a node server. Returns the manifest of its connection surface.
    fn start(&self, config: &NodeConfig, keys: &Keypair) -> Result<Manifest, BackendError>;

    /// Open a client connection to a running node.
    fn connect(&self, request: ConnectRequest, done: BackendCallback<Arc<dyn FeedClient>>);
}

/// A client connection to one node.
pub trait FeedClient: Send + Sync + 'static {
    /// Identity of the node this client is connected to.
    fn id(&self) -> &FeedId;

    /// Append `content` to the node's own log.
    fn publish(&self, content: Content, done: BackendCallback<Message>);

    /// Tell the node's gossip subsystem about a peer to dial.
    fn add_gossip_peer(&self, link: GossipLink, done: BackendCallback<()>);

    /// Entries of type `msg_type` visible to the node, own and replicated.
    fn messages_by_type(&self, msg_type: &str, mode: StreamMode) -> MessageSource;

    /// Close the connection. Pending and later calls fail with
    /// [`BackendError::Closed`]; live sources end.
    fn close(&self);
}

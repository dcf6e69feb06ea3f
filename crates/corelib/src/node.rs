//! Handles to running nodes.
//!
//! A [`NodeHandle`] is cheap to clone: the connection it wraps is shared.
//! Teardown of the node itself belongs to the external library.

use crate::async_op::AsyncOp;
use crate::backend::{BackendError, FeedClient, MessageSource, StreamMode};
use crate::error::Error;
use crate::identity::FeedId;
use crate::message::{Content, LogEntryRef};
use crate::network::GossipLink;
use std::fmt;
use std::sync::Arc;

/// Connected node: identity, endpoint, harness name and client.
#[derive(Clone)]
pub struct NodeHandle {
    id: FeedId,
    /// Human-readable name, used by the harness only.
    name: String,
    host: String,
    port: u16,
    client: Arc<dyn FeedClient>,
}

impl NodeHandle {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        client: Arc<dyn FeedClient>,
    ) -> Self {
        Self {
            id: client.id().clone(),
            name: name.into(),
            host: host.into(),
            port,
            client,
        }
    }

    pub fn id(&self) -> &FeedId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&self) -> &Arc<dyn FeedClient> {
        &self.client
    }

    /// Publish `content` on this node's log.
    pub fn publish(&self, content: Content) -> AsyncOp<LogEntryRef> {
        crate::publish::publish(self, content)
    }

    /// Dial hint from this node to `peer`.
    pub fn link_to(&self, peer: &NodeHandle) -> GossipLink {
        GossipLink::new(self.id.clone(), peer.host.clone(), peer.port, peer.id.clone())
    }

    /// Register `link` with this node's gossip subsystem.
    ///
    /// Settles once the node accepted the dial hint; whether the peer is
    /// reachable shows up later, through replication.
    pub fn add_gossip_peer(&self, link: GossipLink) -> AsyncOp<()> {
        let client = Arc::clone(&self.client);
        let node = self.name.clone();

        AsyncOp::from_callback(move |done| {
            let node = node.clone();
            let target = link.to_string();
            client.add_gossip_peer(
                link.clone(),
                Box::new(move |result| match result {
                    Ok(()) => {
                        tracing::debug!(node = %node, link = %target, "gossip peer added");
                        done(Ok(()))
                    }
                    Err(err) => {
                        let err = match err {
                            BackendError::Closed => {
                                Error::CancelledOrClosed("connection closed".to_string())
                            }
                            other => Error::Connection(other.to_string()),
                        };
                        tracing::warn!(
                            node = %node,
                            link = %target,
                            error = %err,
                            "gossip peer rejected"
                        );
                        done(Err(err))
                    }
                }),
            );
        })
    }

    /// Raw subscription to entries of `msg_type`.
    pub fn messages_by_type(&self, msg_type: &str, mode: StreamMode) -> MessageSource {
        self.client.messages_by_type(msg_type, mode)
    }

    pub fn close(&self) {
        tracing::debug!(node = %self.name, "closing connection");
        self.client.close();
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("port", &self.port)
            .finish()
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

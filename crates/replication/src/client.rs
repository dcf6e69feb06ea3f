//! Client connection to a simulated node.

use crate::network::SimNetwork;
use crate::peer::SimPeer;
use corelib::backend::{BackendCallback, FeedClient, MessageSource, StreamMode};
use corelib::{BackendError, Content, FeedId, GossipLink, Message};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) struct SimClient {
    peer: Arc<SimPeer>,
    network: SimNetwork,
    closed: CancellationToken,
}

impl SimClient {
    pub(crate) fn new(peer: Arc<SimPeer>, network: SimNetwork) -> Self {
        Self {
            peer,
            network,
            closed: CancellationToken::new(),
        }
    }
}

impl FeedClient for SimClient {
    fn id(&self) -> &FeedId {
        &self.peer.id
    }

    fn publish(&self, content: Content, done: BackendCallback<Message>) {
        if self.closed.is_cancelled() {
            return done(Err(BackendError::Closed));
        }
        match self.peer.append(content) {
            Ok(message) => {
                self.network.replicate();
                done(Ok(message))
            }
            Err(err) => done(Err(err)),
        }
    }

    fn add_gossip_peer(&self, link: GossipLink, done: BackendCallback<()>) {
        if self.closed.is_cancelled() {
            return done(Err(BackendError::Closed));
        }
        if link.from != self.peer.id {
            return done(Err(BackendError::Invalid(format!(
                "link from {} registered on {}",
                link.from, self.peer.id
            ))));
        }
        self.network.add_link(&self.peer, link);
        done(Ok(()))
    }

    fn messages_by_type(&self, msg_type: &str, mode: StreamMode) -> MessageSource {
        if self.closed.is_cancelled() {
            return stream::once(async { Err::<Message, _>(BackendError::Closed) }).boxed();
        }
        self.peer.subscribe(msg_type, mode, self.closed.clone())
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

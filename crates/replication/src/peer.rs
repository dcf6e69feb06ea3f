//! One simulated node: its view of the network's feeds.
//!
//! A peer stores every entry it holds, its own and replicated ones, in
//! arrival order, and fans each new entry out to its subscribers. Appends
//! and fan-out happen under the same write lock, so a subscriber that
//! snapshots stored entries and then listens never sees a gap or a
//! duplicate.

use corelib::backend::{BackendError, MessageSource, StreamMode};
use corelib::message::MessageKey;
use corelib::{Content, FeedId, FollowGraph, GossipLink, Message};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Entries buffered per subscriber before it counts as lagging.
pub const SUBSCRIBER_BUFFER: usize = 1024;

#[derive(Default)]
struct Store {
    feeds: HashMap<FeedId, Vec<Message>>,
    arrival: Vec<Message>,
}

impl Store {
    fn latest(&self, author: &FeedId) -> u64 {
        self.feeds.get(author).map_or(0, |log| log.len() as u64)
    }
}

pub(crate) struct SimPeer {
    pub(crate) id: FeedId,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) shs: String,
    pub(crate) master: Option<FeedId>,
    store: RwLock<Store>,
    events: broadcast::Sender<Message>,
    gossip: Mutex<Vec<GossipLink>>,
    read_only: AtomicBool,
}

impl SimPeer {
    pub(crate) fn new(
        id: FeedId,
        host: String,
        port: u16,
        shs: String,
        master: Option<FeedId>,
    ) -> Self {
        let (events, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            id,
            host,
            port,
            shs,
            master,
            store: RwLock::new(Store::default()),
            events,
            gossip: Mutex::new(Vec::new()),
            read_only: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Append `content` to this peer's own feed.
    pub(crate) fn append(&self, content: Content) -> Result<Message, BackendError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(BackendError::Storage(format!("log of {} is read-only", self.id)));
        }
        if content.msg_type().is_empty() {
            return Err(BackendError::Invalid("content type must not be empty".to_string()));
        }

        let mut store = self.store.write();
        let own = store.feeds.entry(self.id.clone()).or_default();
        let previous = own.last().map(|m| m.key.clone());
        let sequence = own.len() as u64 + 1;
        let message = Message {
            key: MessageKey::compute(&self.id, sequence, previous.as_ref(), &content),
            author: self.id.clone(),
            sequence,
            previous,
            timestamp: now_millis(),
            content,
        };
        own.push(message.clone());
        store.arrival.push(message.clone());
        let _ = self.events.send(message.clone());
        Ok(message)
    }

    /// Add entries replicated from elsewhere. Entries that do not extend
    /// their author's feed by exactly one are skipped. Returns how many
    /// were stored.
    pub(crate) fn ingest(&self, messages: Vec<Message>) -> usize {
        let mut store = self.store.write();
        let mut stored = 0;
        for message in messages {
            let next = store.latest(&message.author) + 1;
            if message.sequence != next {
                continue;
            }
            store
                .feeds
                .entry(message.author.clone())
                .or_default()
                .push(message.clone());
            store.arrival.push(message.clone());
            let _ = self.events.send(message);
            stored += 1;
        }
        stored
    }

    /// Feeds held by this peer with their latest sequence.
    pub(crate) fn feed_heads(&self) -> HashMap<FeedId, u64> {
        let store = self.store.read();
        store
            .feeds
            .iter()
            .map(|(author, log)| (author.clone(), log.len() as u64))
            .collect()
    }

    pub(crate) fn latest(&self, author: &FeedId) -> u64 {
        self.store.read().latest(author)
    }

    /// Entries of `author`'s feed after sequence `after`.
    pub(crate) fn feed_after(&self, author: &FeedId, after: u64) -> Vec<Message> {
        let store = self.store.read();
        store
            .feeds
            .get(author)
            .map(|log| log.iter().skip(after as usize).cloned().collect())
            .unwrap_or_default()
    }

    /// Follow graph replayed from every contact this peer holds.
    pub(crate) fn follow_graph(&self) -> FollowGraph {
        FollowGraph::replay(&self.store.read().arrival)
    }

    pub(crate) fn add_link(&self, link: GossipLink) -> bool {
        let mut gossip = self.gossip.lock();
        if gossip.contains(&link) {
            return false;
        }
        gossip.push(link);
        true
    }

    pub(crate) fn links(&self) -> Vec<GossipLink> {
        self.gossip.lock().clone()
    }

    /// Entries of `msg_type` in arrival order, per `mode`, ending when
    /// `closed` fires.
    pub(crate) fn subscribe(
        &self,
        msg_type: &str,
        mode: StreamMode,
        closed: CancellationToken,
    ) -> MessageSource {
        let msg_type = msg_type.to_string();

        let (history, receiver) = {
            let store = self.store.read();
            let receiver = mode.live.then(|| self.events.subscribe());
            let history: Vec<Message> = if mode.old {
                store
                    .arrival
                    .iter()
                    .filter(|m| m.msg_type() == msg_type)
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            (history, receiver)
        };

        let old = stream::iter(history.into_iter().map(Ok));
        let Some(receiver) = receiver else {
            return old.take_until(closed.cancelled_owned()).boxed();
        };

        let live = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let item = match item {
                    Ok(message) if message.msg_type() == msg_type => Some(Ok(message)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        Some(Err(BackendError::Lagged(skipped)))
                    }
                };
                futures::future::ready(item)
            })
            .scan(false, |failed, item| {
                // Nothing is delivered after a lag error.
                if *failed {
                    return futures::future::ready(None);
                }
                *failed = item.is_err();
                futures::future::ready(Some(item))
            });

        old.chain(live).take_until(closed.cancelled_owned()).boxed()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

//! Typed subscriptions to a node's log.

use corelib::backend::StreamMode;
use corelib::{BackendError, Error, Message, NodeHandle, Result};
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Lazy, possibly unbounded sequence of messages of one type.
///
/// Not restartable: once consumed, subscribe again for a fresh sequence.
/// The sequence ends when the backend says no more entries will arrive
/// (history replayed without `live`, or connection closed). The first read
/// error is yielded as [`Error::StreamRead`] and nothing follows it.
pub struct MessageStream {
    node: String,
    msg_type: String,
    inner: BoxStream<'static, Result<Message>>,
}

impl MessageStream {
    pub fn subscribe(handle: &NodeHandle, msg_type: &str, mode: StreamMode) -> Self {
        tracing::debug!(node = %handle.name(), msg_type, ?mode, "subscribing");

        let node = handle.name().to_string();
        let inner = handle
            .messages_by_type(msg_type, mode)
            .take_while(|item| future::ready(!matches!(item, Err(BackendError::Closed))))
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item.map_err(|e| Error::StreamRead(e.to_string()))))
            })
            .boxed();

        Self {
            node,
            msg_type: msg_type.to_string(),
            inner,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }
}

impl Stream for MessageStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("node", &self.node)
            .field("msg_type", &self.msg_type)
            .finish_non_exhaustive()
    }
}

//! Draining subscriptions through a sink.
//!
//! The subscription is pulled one element at a time: an async sink is
//! awaited before the next element is requested, so a slow sink holds the
//! source back instead of losing elements.

use crate::subscription::MessageStream;
use corelib::backend::StreamMode;
use corelib::{Error, Message, NodeHandle, Result};
use futures::StreamExt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Why a drain stopped without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainEnd {
    /// The source reported that no more elements will arrive.
    SourceEnded,
    /// The caller's stop token fired.
    Stopped,
}

/// Outcome of a drain that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainSummary {
    pub delivered: u64,
    pub end: DrainEnd,
}

/// Subscribes to one node's messages of one type and drains them.
///
/// # Example
///
/// ```rust,no_run
/// use corelib::NodeHandle;
/// use streaming::MessageStreamConsumer;
///
/// async fn print_abouts(node: &NodeHandle) -> corelib::Result<()> {
///     let summary = MessageStreamConsumer::new(node, "about")
///         .drain(|m| println!("{}", m.content.to_json()))
///         .await?;
///     println!("{} messages", summary.delivered);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MessageStreamConsumer {
    handle: NodeHandle,
    msg_type: String,
    mode: StreamMode,
}

impl MessageStreamConsumer {
    /// Consumer of `msg_type` messages; follows the log live by default.
    pub fn new(handle: &NodeHandle, msg_type: impl Into<String>) -> Self {
        Self {
            handle: handle.clone(),
            msg_type: msg_type.into(),
            mode: StreamMode::FOLLOW,
        }
    }

    pub fn mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    /// Open the subscription without draining it.
    pub fn stream(&self) -> MessageStream {
        MessageStream::subscribe(&self.handle, &self.msg_type, self.mode)
    }

    /// Drain until the source ends or fails.
    pub async fn drain<F>(self, sink: F) -> Result<DrainSummary>
    where
        F: FnMut(Message),
    {
        self.drain_until(CancellationToken::new(), sink).await
    }

    /// Drain until the source ends, fails, or `stop` fires.
    pub async fn drain_until<F>(
        self,
        stop: CancellationToken,
        mut sink: F,
    ) -> Result<DrainSummary>
    where
        F: FnMut(Message),
    {
        self.drain_async(stop, move |message| {
            sink(message);
            std::future::ready(())
        })
        .await
    }

    /// Drain through an async sink, awaiting it before pulling the next
    /// element.
    pub async fn drain_async<F, Fut>(
        self,
        stop: CancellationToken,
        mut sink: F,
    ) -> Result<DrainSummary>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut stream = self.stream();
        let mut delivered = 0u64;

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break DrainEnd::Stopped,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(message)) => {
                    delivered += 1;
                    sink(message).await;
                }
                Some(Err(err)) => {
                    tracing::error!(
                        node = %stream.node(),
                        msg_type = %stream.msg_type(),
                        delivered,
                        error = %err,
                        "subscription failed"
                    );
                    return Err(err);
                }
                None => break DrainEnd::SourceEnded,
            }
        };

        tracing::info!(
            node = %stream.node(),
            msg_type = %stream.msg_type(),
            delivered,
            ?end,
            "subscription drained"
        );
        Ok(DrainSummary { delivered, end })
    }

    /// Drain on a background task, reporting the end through `on_done`:
    /// `None` for a graceful end, `Some(error)` for a read failure.
    ///
    /// Returns the token that stops the drain. Must be called within a
    /// Tokio runtime.
    pub fn drain_with<F, D>(self, sink: F, on_done: D) -> CancellationToken
    where
        F: FnMut(Message) + Send + 'static,
        D: FnOnce(Option<Error>) + Send + 'static,
    {
        let stop = CancellationToken::new();
        let token = stop.clone();
        tokio::spawn(async move {
            let outcome = self.drain_until(token, sink).await;
            on_done(outcome.err());
        });
        stop
    }
}

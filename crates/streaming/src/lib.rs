//! Log subscriptions for the feed harness.
//!
//! This crate provides:
//! - Typed, lazy subscriptions to a node's log
//! - Draining them through sync, async or callback sinks until the source
//!   ends, fails, or the caller stops

pub mod consumer;
pub mod subscription;

pub use consumer::{DrainEnd, DrainSummary, MessageStreamConsumer};
pub use subscription::MessageStream;

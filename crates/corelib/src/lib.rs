//! Core library of the feed harness.
//!
//! This crate provides the pieces the harness builds on:
//! - `AsyncOp`, the bridge from callback-style operations to cancelable,
//!   composable computations
//! - Node configuration and identities
//! - The traits through which the external feed library is driven
//! - Client connections and publishing
//! - Message types and the derived follow graph

pub mod async_op;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod network;
pub mod node;
pub mod publish;
pub mod topology;

pub use async_op::{AsyncOp, Callback, CancelGuard, Canceler};
pub use backend::{BackendError, FeedBackend, FeedClient, Manifest, StreamMode};
pub use client::ClientFactory;
pub use config::{Caps, NodeConfig};
pub use error::{Error, Result};
pub use identity::{FeedId, Keypair};
pub use message::{Content, LogEntryRef, Message};
pub use network::GossipLink;
pub use node::NodeHandle;
pub use topology::FollowGraph;

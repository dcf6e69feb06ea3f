//! Multi-node harness.
//!
//! Starts a set of nodes on a feed backend and, on request, seeds a full
//! mesh between them: every node dials every other node, announces itself
//! and follows it.

pub mod bootstrap;
pub mod node;

pub use bootstrap::{Cluster, NetworkBootstrap, PairFailure, SeedReport, SeedStage};
pub use node::{start_node, MANIFEST_FILE};

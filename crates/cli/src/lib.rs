//! Command-line launcher for a local feed mesh.
//!
//! Starts a main node and a set of dev nodes, optionally seeds the follow
//! graph between the dev nodes, then prints one node's messages of a given
//! type as they arrive.

pub mod commands;
pub mod config;

pub use config::CliConfig;

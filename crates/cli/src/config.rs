//! Command-line configuration.

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use corelib::{Caps, NodeConfig};
use std::path::PathBuf;

/// Name of the node stored under `--data-dir`.
pub const MAIN_NODE: &str = "main";

#[derive(Parser, Debug, Clone)]
#[command(name = "start-mesh", version, about = "Start a local feed mesh")]
pub struct CliConfig {
    /// Any value seeds the follow graph between the dev nodes
    pub seed: Option<String>,

    /// Storage directory of the main node
    #[arg(long, default_value = "./ssb-data")]
    pub data_dir: PathBuf,

    /// Parent directory of the dev nodes' storage
    #[arg(long, default_value = "./ssb-dev")]
    pub dev_dir: PathBuf,

    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value_t = 8088)]
    pub main_port: u16,

    /// Port of the first dev node; the others follow consecutively
    #[arg(long, default_value_t = 8081)]
    pub dev_base_port: u16,

    /// Dev node names, in start order
    #[arg(long, value_delimiter = ',', default_value = "alice,bob,charlie")]
    pub devs: Vec<String>,

    /// Capability secret shared by every node
    #[arg(long, env = "SBOT_SHS")]
    pub shs: Option<String>,

    /// Signing capability
    #[arg(long, env = "SBOT_SIGN")]
    pub sign: Option<String>,

    /// Message type printed from the first dev node
    #[arg(long, default_value = "about")]
    pub watch: String,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = ArgAction::Count)]
    pub verbose: u8,
}

impl CliConfig {
    pub fn seeding(&self) -> bool {
        self.seed.is_some()
    }

    pub fn caps(&self) -> Caps {
        match &self.shs {
            Some(shs) => Caps::new(shs.clone(), self.sign.clone()),
            None => Caps {
                sign: self.sign.clone(),
                ..Caps::default()
            },
        }
    }

    pub fn main_node(&self) -> Result<(String, NodeConfig)> {
        let config = NodeConfig::builder(&self.data_dir)
            .host(self.host.clone())
            .port(self.main_port)
            .caps(self.caps())
            .build()?;
        Ok((MAIN_NODE.to_string(), config))
    }

    /// Dev node configurations, in start order.
    pub fn dev_nodes(&self) -> Result<Vec<(String, NodeConfig)>> {
        self.validate()?;
        let caps = self.caps();

        self.devs
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let port = self.dev_base_port + i as u16;
                let config = NodeConfig::builder(self.dev_dir.join(name))
                    .host(self.host.clone())
                    .port(port)
                    .caps(caps.clone())
                    .build()?;
                Ok((name.clone(), config))
            })
            .collect()
    }

    fn validate(&self) -> Result<()> {
        if self.devs.is_empty() {
            bail!("at least one dev node is required");
        }
        let invalid = |n: &&String| n.trim().is_empty() || n.as_str() == MAIN_NODE;
        if let Some(name) = self.devs.iter().find(invalid) {
            bail!("invalid dev node name {name:?}");
        }

        let last = u32::from(self.dev_base_port) + self.devs.len() as u32 - 1;
        if last > u32::from(u16::MAX) {
            bail!("dev ports overflow from {}", self.dev_base_port);
        }
        if (u32::from(self.dev_base_port)..=last).contains(&u32::from(self.main_port)) {
            bail!(
                "main port {} collides with dev ports {}-{}",
                self.main_port,
                self.dev_base_port,
                last
            );
        }
        Ok(())
    }
}

//! Per-node configuration.
//!
//! A [`NodeConfig`] is fixed once its node starts. The capability secret is
//! always explicit in the configuration: [`Caps::default`] and
//! [`Caps::from_env`] fall back to the well-known [`DEFAULT_SHS`] and say so
//! in the log, and nothing below the configuration layer ever picks a secret
//! on its own.

use crate::error::{Error, Result};
use crate::identity::{FeedId, Keypair};
use std::path::{Path, PathBuf};

/// Well-known handshake secret of the public network.
///
/// Nodes using it are reachable by any peer using the same default; callers
/// that need network isolation must override it.
pub const DEFAULT_SHS: &str = "GVZDyNf1TrZuGv3W5Dpef0vaITW1UqOUO3aWLNBp+7A=";

/// Environment variable overriding the handshake secret.
pub const SHS_ENV: &str = "SBOT_SHS";

/// Environment variable providing the message signing capability.
pub const SIGN_ENV: &str = "SBOT_SIGN";

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_PORT: u16 = 8008;

/// Capability keys presented at transport handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caps {
    /// Shared secret admitting a connection.
    pub shs: String,
    /// Optional signing capability; `None` uses the library default.
    pub sign: Option<String>,
}

impl Caps {
    pub fn new(shs: impl Into<String>, sign: Option<String>) -> Self {
        Self {
            shs: shs.into(),
            sign,
        }
    }

    /// Read `SBOT_SHS` / `SBOT_SIGN`, falling back to [`DEFAULT_SHS`].
    pub fn from_env() -> Self {
        Self::from_values(std::env::var(SHS_ENV).ok(), std::env::var(SIGN_ENV).ok())
    }

    /// Empty values count as unset.
    fn from_values(shs: Option<String>, sign: Option<String>) -> Self {
        let sign = sign.filter(|s| !s.is_empty());
        match shs.filter(|s| !s.is_empty()) {
            Some(shs) => Self::new(shs, sign),
            None => Self {
                sign,
                ..Self::default()
            },
        }
    }

    /// Whether the insecure well-known secret is in use.
    pub fn is_default(&self) -> bool {
        self.shs == DEFAULT_SHS
    }
}

impl Default for Caps {
    fn default() -> Self {
        tracing::warn!(
            "no capability secret configured, using the well-known default; \
             this node is not isolated from other networks"
        );
        Self::new(DEFAULT_SHS, None)
    }
}

/// Configuration of one node instance.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Storage directory; holds the keypair and the manifest.
    pub path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Keypair; `None` means load it from `path` or generate it there.
    pub keys: Option<Keypair>,
    pub caps: Caps,
    /// Identity allowed to drive the node besides its own.
    pub master: Option<FeedId>,
}

impl NodeConfig {
    pub fn builder(path: impl Into<PathBuf>) -> NodeConfigBuilder {
        NodeConfigBuilder::new(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The keypair, loading or creating it under `path` when unset.
    ///
    /// The resolved keypair is stored back into the configuration and, when
    /// no master was given, the node's own identity becomes its master.
    pub fn resolve_keys(&mut self) -> Result<Keypair> {
        let keys = match &self.keys {
            Some(keys) => keys.clone(),
            None => Keypair::load_or_create(&self.path)?,
        };
        if self.master.is_none() {
            self.master = Some(keys.id().clone());
        }
        self.keys = Some(keys.clone());
        Ok(keys)
    }
}

/// Builder for [`NodeConfig`] with validation on [`build`](Self::build).
#[derive(Debug)]
pub struct NodeConfigBuilder {
    path: PathBuf,
    host: String,
    port: u16,
    keys: Option<Keypair>,
    caps: Option<Caps>,
    master: Option<FeedId>,
}

impl NodeConfigBuilder {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            keys: None,
            caps: None,
            master: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn keys(mut self, keys: Keypair) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Capability keys; when unset, [`build`](Self::build) takes them from
    /// [`Caps::from_env`].
    pub fn caps(mut self, caps: Caps) -> Self {
        self.caps = Some(caps);
        self
    }

    pub fn master(mut self, master: FeedId) -> Self {
        self.master = Some(master);
        self
    }

    pub fn build(self) -> Result<NodeConfig> {
        if self.port == 0 {
            return Err(Error::Config("port must be in 1-65535".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        let caps = self.caps.unwrap_or_else(Caps::from_env);
        if caps.shs.is_empty() {
            return Err(Error::Config("capability secret must not be empty".to_string()));
        }

        Ok(NodeConfig {
            path: self.path,
            host: self.host,
            port: self.port,
            keys: self.keys,
            caps,
            master: self.master,
        })
    }
}

//! Node identities.
//!
//! A node is identified by the public half of an ed25519 keypair, written in
//! the feed-id form `@<base64 public key>.ed25519`. Key generation is
//! delegated to `ed25519-dalek`; this module only names, loads and persists
//! keys.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Filename of the keypair under a node's storage path.
pub const SECRET_FILE: &str = "secret";

const CURVE: &str = "ed25519";
const SUFFIX: &str = ".ed25519";

/// Public identity of a feed (and of the node that owns it).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeedId(String);

impl FeedId {
    /// Parse a feed id of the form `@<base64>.ed25519`.
    pub fn parse(raw: &str) -> Result<Self> {
        let body = raw
            .strip_prefix('@')
            .and_then(|rest| rest.strip_suffix(SUFFIX))
            .ok_or_else(|| Error::Identity(format!("malformed feed id: {raw}")))?;
        let bytes = STANDARD
            .decode(body)
            .map_err(|e| Error::Identity(format!("feed id {raw} is not base64: {e}")))?;
        if bytes.len() != 32 {
            return Err(Error::Identity(format!(
                "feed id {raw} holds {} bytes, expected 32",
                bytes.len()
            )));
        }
        Ok(Self(raw.to_string()))
    }

    fn from_public(public: &[u8; 32]) -> Self {
        Self(format!("@{}{SUFFIX}", STANDARD.encode(public)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(9);
        &self.0[..end]
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FeedId {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<FeedId> for String {
    fn from(id: FeedId) -> Self {
        id.0
    }
}

/// A node's keypair.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    id: FeedId,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let id = FeedId::from_public(signing_key.verifying_key().as_bytes());
        Self { signing_key, id }
    }

    pub fn id(&self) -> &FeedId {
        &self.id
    }

    /// Load the keypair stored under `dir`, or generate one and store it.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(SECRET_FILE);
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let keys = Self::from_json(&raw)?;
            tracing::debug!(path = %path.display(), id = %keys.id, "loaded keypair");
            return Ok(keys);
        }

        std::fs::create_dir_all(dir)?;
        let keys = Self::generate();
        std::fs::write(&path, keys.to_json()?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(path = %path.display(), id = %keys.id, "generated keypair");
        Ok(keys)
    }

    fn to_json(&self) -> Result<String> {
        let file = SecretFile {
            curve: CURVE.to_string(),
            public: format!(
                "{}{SUFFIX}",
                STANDARD.encode(self.signing_key.verifying_key().as_bytes())
            ),
            private: format!(
                "{}{SUFFIX}",
                STANDARD.encode(self.signing_key.to_keypair_bytes())
            ),
            id: self.id.clone(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| Error::Identity(e.to_string()))
    }

    fn from_json(raw: &str) -> Result<Self> {
        let file: SecretFile = serde_json::from_str(raw)
            .map_err(|e| Error::Identity(format!("bad secret file: {e}")))?;
        if file.curve != CURVE {
            return Err(Error::Identity(format!("unsupported curve {}", file.curve)));
        }
        let private = file
            .private
            .strip_suffix(SUFFIX)
            .ok_or_else(|| Error::Identity("private key lacks curve suffix".to_string()))?;
        let bytes: [u8; 64] = STANDARD
            .decode(private)
            .map_err(|e| Error::Identity(format!("private key is not base64: {e}")))?
            .try_into()
            .map_err(|_| Error::Identity("private key must be 64 bytes".to_string()))?;
        let signing_key = SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| Error::Identity(format!("corrupted keypair: {e}")))?;

        let keys = Self::from_signing_key(signing_key);
        if keys.id != file.id {
            return Err(Error::Identity(format!(
                "secret file id {} does not match its key {}",
                file.id, keys.id
            )));
        }
        Ok(keys)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("id", &self.id).finish_non_exhaustive()
    }
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Keypair {}

#[derive(Serialize, Deserialize)]
struct SecretFile {
    curve: String,
    public: String,
    private: String,
    id: FeedId,
}

//! Starting a single node.

use corelib::{ClientFactory, Error, Manifest, NodeConfig, NodeHandle, Result};
use std::fs;
use std::path::Path;

/// File under a node's storage path receiving its method manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Start the node described by `config` and connect to it.
///
/// Resolves the node's keypair (loading or creating it under the storage
/// path), starts the node on the factory's backend, writes its manifest to
/// `<path>/manifest.json`, then opens a client connection as the node's own
/// identity.
pub async fn start_node(
    factory: &ClientFactory,
    name: &str,
    mut config: NodeConfig,
) -> Result<NodeHandle> {
    let keys = config.resolve_keys()?;
    tracing::debug!(
        node = %name,
        id = %keys.id(),
        path = %config.path().display(),
        "starting node"
    );

    let manifest = factory
        .backend()
        .start(&config, &keys)
        .map_err(|e| Error::Connection(format!("node {name} did not start: {e}")))?;
    write_manifest(config.path(), &manifest)?;

    let handle = factory.connect(name, &config).into_future().await?;
    tracing::info!(
        node = %name,
        id = %handle.id(),
        port = config.port,
        methods = manifest.0.len(),
        "node started"
    );
    Ok(handle)
}

fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(manifest).map_err(|e| Error::Io(e.to_string()))?;
    fs::write(dir.join(MANIFEST_FILE), json)?;
    Ok(())
}

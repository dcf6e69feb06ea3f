//! Client connections to nodes.

use crate::async_op::AsyncOp;
use crate::backend::{BackendError, ConnectRequest, FeedBackend};
use crate::config::NodeConfig;
use crate::error::Error;
use crate::node::NodeHandle;
use std::sync::Arc;
use std::time::Duration;

/// How long a connect may stay unanswered before it fails.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens [`NodeHandle`]s through a [`FeedBackend`].
///
/// Connection failures are reported once and never retried; retry policy
/// belongs to the caller.
#[derive(Clone)]
pub struct ClientFactory {
    backend: Arc<dyn FeedBackend>,
    connect_timeout: Duration,
}

impl ClientFactory {
    pub fn new(backend: Arc<dyn FeedBackend>) -> Self {
        Self {
            backend,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn backend(&self) -> &Arc<dyn FeedBackend> {
        &self.backend
    }

    /// Connect to the node described by `config` using its own keypair.
    ///
    /// The keypair must already be resolved
    /// (see [`NodeConfig::resolve_keys`]). Settles with
    /// [`Error::Connection`] on refusal, handshake failure, or when no answer
    /// arrives within the connect timeout.
    pub fn connect(&self, name: &str, config: &NodeConfig) -> AsyncOp<NodeHandle> {
        let Some(keys) = config.keys.clone() else {
            return AsyncOp::err(Error::Config(format!(
                "node {name} has no keypair, resolve it before connecting"
            )));
        };

        let request = ConnectRequest::for_node(config, keys);
        let address = request.address();
        let backend = Arc::clone(&self.backend);
        let name = name.to_string();

        AsyncOp::from_callback(move |done| {
            let name = name.clone();
            let host = request.host.clone();
            let port = request.port;
            tracing::debug!(node = %name, address = %request.address(), "connecting");

            backend.connect(
                request.clone(),
                Box::new(move |result| match result {
                    Ok(client) => {
                        tracing::info!(node = %name, id = %client.id(), "connected");
                        done(Ok(NodeHandle::new(name, host, port, client)))
                    }
                    Err(err) => {
                        let err = connection_error(err);
                        tracing::warn!(node = %name, error = %err, "connect failed");
                        done(Err(err))
                    }
                }),
            );
        })
        .timeout(
            self.connect_timeout,
            Error::Connection(format!(
                "no answer from {address} within {:?}",
                self.connect_timeout
            )),
        )
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

fn connection_error(err: BackendError) -> Error {
    match err {
        BackendError::Closed => Error::CancelledOrClosed("closed during handshake".to_string()),
        other => Error::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCallback, FeedClient, Manifest};
    use crate::config::Caps;
    use crate::identity::Keypair;

    /// Backend that swallows every connect without answering.
    struct Silent;

    impl FeedBackend for Silent {
        fn start(&self, _: &NodeConfig, _: &Keypair) -> Result<Manifest, BackendError> {
            Ok(Manifest::default())
        }

        fn connect(&self, _: ConnectRequest, done: BackendCallback<Arc<dyn FeedClient>>) {
            drop(done);
        }
    }

    /// Backend that refuses every connect.
    struct Refusing;

    impl FeedBackend for Refusing {
        fn start(&self, _: &NodeConfig, _: &Keypair) -> Result<Manifest, BackendError> {
            Ok(Manifest::default())
        }

        fn connect(&self, request: ConnectRequest, done: BackendCallback<Arc<dyn FeedClient>>) {
            done(Err(BackendError::Refused(request.address())))
        }
    }

    fn config() -> NodeConfig {
        NodeConfig::builder("/unused")
            .port(9)
            .keys(Keypair::from_seed(&[4u8; 32]))
            .caps(Caps::new("secret", None))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_refused_connect_is_connection_error() {
        let factory = ClientFactory::new(Arc::new(Refusing));
        let err = factory.connect("x", &config()).into_future().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "{err}");
    }

    #[tokio::test]
    async fn test_unanswered_connect_times_out() {
        let factory =
            ClientFactory::new(Arc::new(Silent)).with_connect_timeout(Duration::from_millis(30));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            factory.connect("x", &config()).into_future(),
        )
        .await
        .expect("connect must settle within its timeout");
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_without_keys_fails_early() {
        let mut config = config();
        config.keys = None;
        let factory = ClientFactory::new(Arc::new(Refusing));
        let err = factory.connect("x", &config).into_future().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

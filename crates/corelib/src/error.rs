//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the harness core.
///
/// Failures reported by the external feed library arrive as
/// [`BackendError`](crate::backend::BackendError) and are mapped into one of
/// these variants by the component that issued the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport or handshake failure while connecting to a node
    #[error("Connection failed: {0}")]
    Connection(String),
    /// Log append failure
    #[error("Publish failed: {0}")]
    Publish(String),
    /// Operation abandoned by cancellation or closure of the connection
    #[error("Cancelled or closed: {0}")]
    CancelledOrClosed(String),
    /// Failure while draining a subscription
    #[error("Stream read failed: {0}")]
    StreamRead(String),
    /// Invalid node configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Keypair could not be loaded, parsed or created
    #[error("Identity error: {0}")]
    Identity(String),
    /// Filesystem error around a node's storage path
    #[error("I/O error: {0}")]
    Io(String),
    /// Every node of a bootstrap run failed to start
    #[error("No node could be started")]
    NoNodes,
}

impl Error {
    /// Whether this error ends an operation because it was cancelled or its
    /// connection went away, rather than because the operation itself failed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::CancelledOrClosed(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

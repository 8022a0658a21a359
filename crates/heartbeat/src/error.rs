//! Error types for the heartbeat monitor

use thiserror::Error;

/// Boxed error returned by collaborator adaptors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building the monitor or processing heartbeats.
#[derive(Debug, Error)]
pub enum Error {
    /// A required collaborator was not supplied to the builder
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    /// The shard assignment table does not contain any peer
    #[error("shard assignment table is empty")]
    EmptyShardAssignment,

    /// The persistence gateway failed while the monitor was being built
    #[error("heartbeat storage error: {0}")]
    Storage(#[source] BoxError),

    /// Empty message, empty payload or empty public key
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The antiflood handler refused the message
    #[error("message rejected by antiflood: {0}")]
    Antiflood(#[source] BoxError),

    /// The message could not be decoded into a heartbeat
    #[error("failed to decode heartbeat: {0}")]
    Decode(#[source] BoxError),

    /// The hardfork trigger refused the signal
    #[error("hardfork trigger failed: {0}")]
    HardforkTrigger(#[source] BoxError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

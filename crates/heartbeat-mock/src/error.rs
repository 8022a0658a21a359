//! Error types for the mock collaborators.

use thiserror::Error;

/// Error type returned by the mock collaborators.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The mock antiflood handler was told to reject
    #[error("rejected: {0}")]
    Rejected(String),

    /// The message bytes are not a mock heartbeat
    #[error("malformed heartbeat: {0}")]
    Malformed(String),

    /// The peer type of this peer was never configured
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// The mock hardfork trigger was told to fail
    #[error("hardfork trigger failed")]
    Hardfork,

    /// The storage wrapper was told to fail
    #[error("storage unavailable")]
    StorageUnavailable,
}

use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A value could not be encoded to CBOR
    #[error("failed to encode {0}: {1}")]
    Encode(&'static str, String),

    /// A stored value could not be decoded from CBOR
    #[error("failed to decode {0}: {1}")]
    Decode(&'static str, String),
}

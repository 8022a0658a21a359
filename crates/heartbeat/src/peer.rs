//! Peer identity and classification types

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Shard identifier.
pub type ShardId = u32;

/// A peer's public key, used as the key of every per-peer structure.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PeerKey(Bytes);

impl PeerKey {
    /// Creates a key from raw public key bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw public key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if the key holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex rendering of the key.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<&[u8]> for PeerKey {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for PeerKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&str> for PeerKey {
    fn from(key: &str) -> Self {
        Self(Bytes::copy_from_slice(key.as_bytes()))
    }
}

/// Identifier of the connected peer that relayed a message.
///
/// This is the transport-level sender, which is not necessarily the peer the
/// heartbeat is about.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a new peer id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The peer id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category a peer belongs to in the current epoch.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerType {
    /// Validator taking part in consensus
    Eligible,
    /// Validator waiting to become eligible
    Waiting,
    /// Newly registered validator
    New,
    /// Unstaked or otherwise inactive validator
    Inactive,
    /// Validator jailed for misbehaviour
    Jailed,
    /// Validator leaving the network
    Leaving,
    /// Not a validator
    #[default]
    Observer,
}

impl PeerType {
    /// String form used in persisted snapshots and query responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::Waiting => "waiting",
            Self::New => "new",
            Self::Inactive => "inactive",
            Self::Jailed => "jailed",
            Self::Leaving => "leaving",
            Self::Observer => "observer",
        }
    }

    /// Eligible and waiting peers count as validators.
    #[must_use]
    pub const fn is_validator(self) -> bool {
        matches!(self, Self::Eligible | Self::Waiting)
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown peer type.
#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown peer type: {0}")]
pub struct UnknownPeerType(String);

impl FromStr for PeerType {
    type Err = UnknownPeerType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eligible" => Ok(Self::Eligible),
            "waiting" => Ok(Self::Waiting),
            "new" => Ok(Self::New),
            "inactive" => Ok(Self::Inactive),
            "jailed" => Ok(Self::Jailed),
            "leaving" => Ok(Self::Leaving),
            "observer" => Ok(Self::Observer),
            other => Err(UnknownPeerType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_order_matches_byte_order() {
        let mut keys = vec![
            PeerKey::from(vec![0xff, 0x00]),
            PeerKey::from(vec![0x0a]),
            PeerKey::from(vec![0x0a, 0x01]),
            PeerKey::from(vec![0x09, 0xff]),
        ];
        let mut by_hex = keys.clone();

        keys.sort();
        by_hex.sort_by_key(PeerKey::to_hex);

        assert_eq!(keys, by_hex);
        assert_eq!(keys[0].to_hex(), "09ff");
    }

    #[test]
    fn test_peer_type_parsing() {
        for peer_type in [
            PeerType::Eligible,
            PeerType::Waiting,
            PeerType::New,
            PeerType::Inactive,
            PeerType::Jailed,
            PeerType::Leaving,
            PeerType::Observer,
        ] {
            assert_eq!(peer_type.as_str().parse::<PeerType>().unwrap(), peer_type);
        }

        assert!("validator".parse::<PeerType>().is_err());
    }

    #[test]
    fn test_validator_categories() {
        assert!(PeerType::Eligible.is_validator());
        assert!(PeerType::Waiting.is_validator());
        assert!(!PeerType::Jailed.is_validator());
        assert!(!PeerType::default().is_validator());
    }

    mod properties {
        use super::*;

        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hex_order_matches_byte_order(
                keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 0..20),
            ) {
                let mut by_bytes: Vec<PeerKey> = keys.into_iter().map(PeerKey::from).collect();
                let mut by_hex = by_bytes.clone();

                by_bytes.sort();
                by_hex.sort_by_key(PeerKey::to_hex);

                prop_assert_eq!(by_hex, by_bytes);
            }
        }
    }
}

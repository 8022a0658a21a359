//! Inbound gossip message and the heartbeat decoded from it

use bytes::Bytes;

use crate::peer::{PeerKey, ShardId};

/// Gossip topic heartbeats are published on.
pub const HEARTBEAT_TOPIC: &str = "heartbeat";

/// Payload reserved for the emergency hardfork signal.
pub const HARDFORK_TRIGGER_PAYLOAD: &[u8] = b"hardfork trigger";

/// A message as delivered by the gossip layer, already authenticated.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    data: Bytes,
    topic: String,
}

impl InboundMessage {
    /// Creates a message received on `topic`.
    pub fn new(data: impl Into<Bytes>, topic: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            topic: topic.into(),
        }
    }

    /// Creates a message received on the heartbeat topic.
    pub fn heartbeat(data: impl Into<Bytes>) -> Self {
        Self::new(data, HEARTBEAT_TOPIC)
    }

    /// Raw message bytes.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Topic the message arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// A decoded heartbeat.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Heartbeat {
    /// Public key of the peer the heartbeat is about
    pub pubkey: PeerKey,
    /// Shard the peer claims to be in
    pub shard_id: ShardId,
    /// Software version of the peer
    pub version_number: String,
    /// Human readable peer name
    pub node_display_name: String,
    /// Free-form payload
    pub payload: Bytes,
}

impl Heartbeat {
    /// Whether the payload carries the hardfork signal instead of liveness data.
    #[must_use]
    pub fn is_hardfork_trigger(&self) -> bool {
        self.payload.as_ref() == HARDFORK_TRIGGER_PAYLOAD
    }
}

//! Collaborator interfaces the monitor is built from
//!
//! The monitor owns none of these concerns. Persistence, decoding, admission
//! control, peer classification and hardfork signalling are supplied by the
//! node through these traits.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dto::HeartbeatDto;
use crate::error::BoxError;
use crate::message::{Heartbeat, InboundMessage};
use crate::peer::{PeerId, PeerKey, PeerType, ShardId};

/// Persistence gateway for heartbeat records and the known-peers registry.
#[async_trait]
pub trait HeartbeatStorage: Debug + Send + Sync + 'static {
    /// Inserts or replaces the snapshot stored for `pubkey`.
    async fn save_record(&self, pubkey: &PeerKey, record: &HeartbeatDto) -> Result<(), BoxError>;

    /// Loads the snapshot stored for `pubkey`, `None` if there is none.
    async fn load_record(&self, pubkey: &PeerKey) -> Result<Option<HeartbeatDto>, BoxError>;

    /// Loads every peer identity ever observed, in insertion order.
    async fn load_keys(&self) -> Result<Vec<PeerKey>, BoxError>;

    /// Replaces the known-peers registry.
    async fn save_keys(&self, keys: &[PeerKey]) -> Result<(), BoxError>;

    /// Records the genesis time of the network.
    async fn set_genesis_time(&self, genesis_time: DateTime<Utc>) -> Result<(), BoxError>;
}

/// Turns an inbound gossip message into a heartbeat.
pub trait MessageDecoder: Send + Sync + 'static {
    /// Decodes the message.
    fn decode(&self, message: &InboundMessage) -> Result<Heartbeat, BoxError>;
}

/// Admission control applied before any heartbeat work is queued.
pub trait AntifloodHandler: Send + Sync + 'static {
    /// Checks whether `from` may deliver this message.
    fn can_process_message(&self, message: &InboundMessage, from: &PeerId) -> Result<(), BoxError>;

    /// Checks whether `from` may deliver another message on `topic`.
    fn can_process_message_on_topic(&self, from: &PeerId, topic: &str) -> Result<(), BoxError>;
}

/// Classifies peers for the current epoch.
pub trait PeerTypeProvider: Send + Sync + 'static {
    /// Computes the peer type of `pubkey` in `shard_id`.
    fn compute_for_pubkey(&self, pubkey: &PeerKey, shard_id: ShardId)
    -> Result<PeerType, BoxError>;
}

/// Receiver of the emergency hardfork signal.
pub trait HardforkTrigger: Send + Sync + 'static {
    /// Handles a hardfork signal relayed by `pubkey`.
    fn trigger_received(&self, pubkey: &PeerKey, payload: &[u8]) -> Result<(), BoxError>;
}

/// Source of the current time.
pub trait Timer: Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Timer`] backed by the system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimer;

impl Timer for SystemTimer {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

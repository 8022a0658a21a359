//! Mock collaborators for testing the heartbeat monitor.
//!
//! Every mock records the calls it receives and can be told to fail, so tests
//! can assert both what the monitor did and how it copes with errors.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use proven_heartbeat::{
    AntifloodHandler, BoxError, HardforkTrigger, Heartbeat, HeartbeatDto, HeartbeatStorage,
    InboundMessage, MessageDecoder, PeerId, PeerKey, PeerType, PeerTypeProvider, ShardId,
    StatusHandler, Timer,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
struct WireHeartbeat {
    pubkey: Vec<u8>,
    shard_id: ShardId,
    version_number: String,
    node_display_name: String,
    payload: Vec<u8>,
}

/// Decoder for heartbeats encoded with [`MockDecoder::encode`].
#[derive(Debug, Default)]
pub struct MockDecoder {
    decoded: AtomicUsize,
}

impl MockDecoder {
    /// Creates a new decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a heartbeat into the bytes this decoder understands.
    ///
    /// # Errors
    ///
    /// Returns an error if the heartbeat cannot be serialized.
    pub fn encode(heartbeat: &Heartbeat) -> Result<Bytes, Error> {
        let wire = WireHeartbeat {
            pubkey: heartbeat.pubkey.as_bytes().to_vec(),
            shard_id: heartbeat.shard_id,
            version_number: heartbeat.version_number.clone(),
            node_display_name: heartbeat.node_display_name.clone(),
            payload: heartbeat.payload.to_vec(),
        };
        serde_json::to_vec(&wire)
            .map(Bytes::from)
            .map_err(|e| Error::Malformed(e.to_string()))
    }

    /// Number of messages successfully decoded.
    #[must_use]
    pub fn decoded(&self) -> usize {
        self.decoded.load(Ordering::SeqCst)
    }
}

impl MessageDecoder for MockDecoder {
    fn decode(&self, message: &InboundMessage) -> Result<Heartbeat, BoxError> {
        let wire: WireHeartbeat = serde_json::from_slice(message.data())
            .map_err(|e| Error::Malformed(e.to_string()))?;
        self.decoded.fetch_add(1, Ordering::SeqCst);

        Ok(Heartbeat {
            pubkey: PeerKey::from(wire.pubkey),
            shard_id: wire.shard_id,
            version_number: wire.version_number,
            node_display_name: wire.node_display_name,
            payload: Bytes::from(wire.payload),
        })
    }
}

/// Antiflood handler admitting everything unless told otherwise.
#[derive(Debug, Default)]
pub struct MockAntiflood {
    reject_messages: AtomicBool,
    reject_topics: AtomicBool,
    checked_topics: Mutex<Vec<(PeerId, String)>>,
}

impl MockAntiflood {
    /// Creates a handler admitting every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every message from now on.
    pub fn reject_messages(&self, reject: bool) {
        self.reject_messages.store(reject, Ordering::SeqCst);
    }

    /// Rejects every topic check from now on.
    pub fn reject_topics(&self, reject: bool) {
        self.reject_topics.store(reject, Ordering::SeqCst);
    }

    /// Topic checks performed so far.
    #[must_use]
    pub fn checked_topics(&self) -> Vec<(PeerId, String)> {
        self.checked_topics.lock().clone()
    }
}

impl AntifloodHandler for MockAntiflood {
    fn can_process_message(&self, _message: &InboundMessage, from: &PeerId) -> Result<(), BoxError> {
        if self.reject_messages.load(Ordering::SeqCst) {
            return Err(Error::Rejected(format!("too many messages from {from}")).into());
        }
        Ok(())
    }

    fn can_process_message_on_topic(&self, from: &PeerId, topic: &str) -> Result<(), BoxError> {
        self.checked_topics
            .lock()
            .push((from.clone(), topic.to_string()));
        if self.reject_topics.load(Ordering::SeqCst) {
            return Err(Error::Rejected(format!("too many messages on {topic}")).into());
        }
        Ok(())
    }
}

/// Peer type provider answering from a fixed table.
///
/// Unconfigured peers produce an error.
#[derive(Debug, Default)]
pub struct MockPeerTypeProvider {
    peer_types: Mutex<HashMap<PeerKey, PeerType>>,
    calls: Mutex<Vec<(PeerKey, ShardId)>>,
}

impl MockPeerTypeProvider {
    /// Creates a provider that knows no peer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type returned for `pubkey`.
    pub fn set(&self, pubkey: PeerKey, peer_type: PeerType) {
        self.peer_types.lock().insert(pubkey, peer_type);
    }

    /// Every `(pubkey, shard)` pair classified so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(PeerKey, ShardId)> {
        self.calls.lock().clone()
    }
}

impl PeerTypeProvider for MockPeerTypeProvider {
    fn compute_for_pubkey(
        &self,
        pubkey: &PeerKey,
        shard_id: ShardId,
    ) -> Result<PeerType, BoxError> {
        self.calls.lock().push((pubkey.clone(), shard_id));
        self.peer_types
            .lock()
            .get(pubkey)
            .copied()
            .ok_or_else(|| Error::UnknownPeer(pubkey.to_hex()).into())
    }
}

/// Hardfork trigger recording every signal it receives.
#[derive(Debug, Default)]
pub struct MockHardforkTrigger {
    fail: AtomicBool,
    received: Mutex<Vec<(PeerKey, Bytes)>>,
}

impl MockHardforkTrigger {
    /// Creates a trigger accepting every signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following signal fail.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Signals received so far.
    #[must_use]
    pub fn received(&self) -> Vec<(PeerKey, Bytes)> {
        self.received.lock().clone()
    }
}

impl HardforkTrigger for MockHardforkTrigger {
    fn trigger_received(&self, pubkey: &PeerKey, payload: &[u8]) -> Result<(), BoxError> {
        self.received
            .lock()
            .push((pubkey.clone(), Bytes::copy_from_slice(payload)));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Hardfork.into());
        }
        Ok(())
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct MockTimer {
    now: Mutex<DateTime<Utc>>,
}

impl MockTimer {
    /// Creates a clock stopped at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now += delta;
    }
}

impl Timer for MockTimer {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Status handler remembering the last value of every gauge.
#[derive(Debug, Default)]
pub struct MockStatusHandler {
    values: Mutex<HashMap<String, u64>>,
}

impl MockStatusHandler {
    /// Creates a handler with no values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value set for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.lock().get(name).copied()
    }
}

impl StatusHandler for MockStatusHandler {
    fn set_u64(&self, name: &str, value: u64) {
        self.values.lock().insert(name.to_string(), value);
    }
}

/// Storage wrapper counting calls and able to simulate an outage.
#[derive(Debug)]
pub struct MockStorage<S> {
    inner: S,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_genesis: AtomicBool,
    record_saves: Mutex<HashMap<PeerKey, usize>>,
    key_saves: AtomicUsize,
}

impl<S> MockStorage<S>
where
    S: HeartbeatStorage,
{
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_genesis: AtomicBool::new(false),
            record_saves: Mutex::new(HashMap::new()),
            key_saves: AtomicUsize::new(0),
        }
    }

    /// The wrapped storage.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes record and key saves fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes record and key loads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes recording the genesis time fail.
    pub fn fail_genesis(&self, fail: bool) {
        self.fail_genesis.store(fail, Ordering::SeqCst);
    }

    /// Number of record saves attempted for `pubkey`.
    pub fn record_saves(&self, pubkey: &PeerKey) -> usize {
        self.record_saves.lock().get(pubkey).copied().unwrap_or(0)
    }

    /// Number of record saves attempted in total.
    pub fn total_record_saves(&self) -> usize {
        self.record_saves.lock().values().sum()
    }

    /// Number of known-peers saves attempted.
    pub fn key_saves(&self) -> usize {
        self.key_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S> HeartbeatStorage for MockStorage<S>
where
    S: HeartbeatStorage,
{
    async fn save_record(&self, pubkey: &PeerKey, record: &HeartbeatDto) -> Result<(), BoxError> {
        *self.record_saves.lock().entry(pubkey.clone()).or_default() += 1;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable.into());
        }
        self.inner.save_record(pubkey, record).await
    }

    async fn load_record(&self, pubkey: &PeerKey) -> Result<Option<HeartbeatDto>, BoxError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable.into());
        }
        self.inner.load_record(pubkey).await
    }

    async fn load_keys(&self) -> Result<Vec<PeerKey>, BoxError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable.into());
        }
        self.inner.load_keys().await
    }

    async fn save_keys(&self, keys: &[PeerKey]) -> Result<(), BoxError> {
        self.key_saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable.into());
        }
        self.inner.save_keys(keys).await
    }

    async fn set_genesis_time(&self, genesis_time: DateTime<Utc>) -> Result<(), BoxError> {
        if self.fail_genesis.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable.into());
        }
        self.inner.set_genesis_time(genesis_time).await
    }
}

/// Convenience bundle of every mock collaborator.
#[derive(Clone)]
pub struct MockCollaborators {
    /// Decoder
    pub decoder: Arc<MockDecoder>,
    /// Antiflood handler
    pub antiflood: Arc<MockAntiflood>,
    /// Peer type provider
    pub peer_types: Arc<MockPeerTypeProvider>,
    /// Hardfork trigger
    pub hardfork: Arc<MockHardforkTrigger>,
    /// Clock
    pub timer: Arc<MockTimer>,
    /// Metrics sink
    pub status: Arc<MockStatusHandler>,
}

impl MockCollaborators {
    /// Creates fresh mocks with the clock stopped at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            decoder: Arc::new(MockDecoder::new()),
            antiflood: Arc::new(MockAntiflood::new()),
            peer_types: Arc::new(MockPeerTypeProvider::new()),
            hardfork: Arc::new(MockHardforkTrigger::new()),
            timer: Arc::new(MockTimer::new(now)),
            status: Arc::new(MockStatusHandler::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_round_trip() {
        let heartbeat = Heartbeat {
            pubkey: PeerKey::from("alice"),
            shard_id: 3,
            version_number: "v1".to_string(),
            node_display_name: "Alice".to_string(),
            payload: Bytes::from_static(b"hello"),
        };
        let decoder = MockDecoder::new();

        let decoded = decoder
            .decode(&InboundMessage::heartbeat(MockDecoder::encode(&heartbeat).unwrap()))
            .unwrap();

        assert_eq!(decoded, heartbeat);
        assert_eq!(decoder.decoded(), 1);
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let decoder = MockDecoder::new();

        assert!(decoder.decode(&InboundMessage::heartbeat("garbage")).is_err());
        assert_eq!(decoder.decoded(), 0);
    }

    #[test]
    fn test_timer_advances() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let timer = MockTimer::new(start);

        timer.advance(TimeDelta::seconds(90));

        assert_eq!(timer.now(), start + TimeDelta::seconds(90));
    }
}

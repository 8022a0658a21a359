//! In-memory (single node) implementation of heartbeat storage for local
//! development and tests.
//!
//! Snapshots are kept CBOR-encoded, exactly as a persistent backend would
//! hold them, so encoding problems surface here too.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use proven_heartbeat::{BoxError, HeartbeatDto, HeartbeatStorage, PeerKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// In-memory heartbeat storage.
///
/// Clones share the same underlying data.
#[derive(Clone, Debug, Default)]
pub struct MemoryHeartbeatStorage {
    records: Arc<DashMap<PeerKey, Bytes>>,
    keys: Arc<RwLock<Option<Bytes>>>,
    genesis_time: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl MemoryHeartbeatStorage {
    /// Creates a new empty `MemoryHeartbeatStorage`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Genesis time last recorded, if any.
    #[must_use]
    pub fn genesis_time(&self) -> Option<DateTime<Utc>> {
        *self.genesis_time.read()
    }

    /// Number of stored record snapshots.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    fn load_keys_sync(&self) -> Result<Vec<PeerKey>, Error> {
        self.keys
            .read()
            .as_ref()
            .map_or_else(|| Ok(Vec::new()), |bytes| decode("known peers", bytes))
    }
}

fn encode<T: Serialize>(what: &'static str, value: &T) -> Result<Bytes, Error> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).map_err(|e| Error::Encode(what, e.to_string()))?;
    Ok(Bytes::from(buffer))
}

fn decode<T: DeserializeOwned>(what: &'static str, bytes: &Bytes) -> Result<T, Error> {
    ciborium::from_reader(bytes.as_ref()).map_err(|e| Error::Decode(what, e.to_string()))
}

#[async_trait]
impl HeartbeatStorage for MemoryHeartbeatStorage {
    async fn save_record(&self, pubkey: &PeerKey, record: &HeartbeatDto) -> Result<(), BoxError> {
        let bytes = encode("heartbeat record", record)?;
        self.records.insert(pubkey.clone(), bytes);
        debug!("Stored heartbeat for {}", pubkey);
        Ok(())
    }

    async fn load_record(&self, pubkey: &PeerKey) -> Result<Option<HeartbeatDto>, BoxError> {
        let Some(bytes) = self.records.get(pubkey).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };

        Ok(Some(decode("heartbeat record", &bytes)?))
    }

    async fn load_keys(&self) -> Result<Vec<PeerKey>, BoxError> {
        Ok(self.load_keys_sync()?)
    }

    async fn save_keys(&self, keys: &[PeerKey]) -> Result<(), BoxError> {
        let bytes = encode("known peers", &keys)?;
        *self.keys.write() = Some(bytes);
        Ok(())
    }

    async fn set_genesis_time(&self, genesis_time: DateTime<Utc>) -> Result<(), BoxError> {
        *self.genesis_time.write() = Some(genesis_time);
        Ok(())
    }
}

//! Heartbeat monitor
//!
//! Locking discipline: the record map lock is always taken before any
//! per-record lock. Inserting a peer takes the map lock exclusively, as does
//! [`Monitor::recompute_all`]; updating a single peer takes the map lock
//! shared and the record lock exclusively, so different peers update without
//! contention.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::adaptor::{
    AntifloodHandler, HardforkTrigger, HeartbeatStorage, MessageDecoder, PeerTypeProvider, Timer,
};
use crate::config::MonitorConfig;
use crate::dto::HeartbeatDto;
use crate::error::{Error, Result};
use crate::message::{HEARTBEAT_TOPIC, Heartbeat, InboundMessage};
use crate::peer::{PeerId, PeerKey, PeerType, ShardId};
use crate::persister::Persister;
use crate::record::PeerHeartbeatRecord;
use crate::shard::ShardAssignment;
use crate::status::{METRIC_CONNECTED_NODES, METRIC_LIVE_VALIDATORS, StatusHandler};
use crate::view::PubKeyHeartbeat;

type RecordMap = HashMap<PeerKey, Arc<Mutex<PeerHeartbeatRecord>>>;

/// Aggregate counters produced by a recompute pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LivenessCounters {
    /// Peers currently considered live
    pub connected_nodes: u64,
    /// Live peers classified as validators
    pub live_validators: u64,
}

/// Tracks the liveness of every known peer from the heartbeats they gossip.
///
/// Cloning is cheap and every clone drives the same state.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

pub(crate) struct MonitorInner {
    pub(crate) config: MonitorConfig,
    pub(crate) genesis_time: DateTime<Utc>,
    pub(crate) shard_assignment: ShardAssignment,
    pub(crate) records: RwLock<RecordMap>,
    pub(crate) known_peers: Mutex<Vec<PeerKey>>,
    pub(crate) decoder: Arc<dyn MessageDecoder>,
    pub(crate) antiflood: Arc<dyn AntifloodHandler>,
    pub(crate) peer_type_provider: Arc<dyn PeerTypeProvider>,
    pub(crate) hardfork_trigger: Arc<dyn HardforkTrigger>,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) status_handler: parking_lot::RwLock<Arc<dyn StatusHandler>>,
    pub(crate) persister: Persister,
    pub(crate) handle: Handle,
    pub(crate) tasks: TaskTracker,
    pub(crate) shutdown: CancellationToken,
    pub(crate) started: AtomicBool,
}

impl Monitor {
    pub(crate) fn from_inner(inner: MonitorInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Processes a heartbeat delivered by the gossip layer.
    ///
    /// Admission, decoding and hardfork forwarding happen before this returns
    /// and their failures are returned to the caller. The record update and
    /// the aggregate recomputation run in the background, so success means
    /// the heartbeat was accepted, not that it has been applied or persisted.
    pub fn process_received_message(&self, message: &InboundMessage, from: &PeerId) -> Result<()> {
        if message.data().is_empty() {
            return Err(Error::InvalidInput("empty heartbeat message".to_string()));
        }

        self.inner
            .antiflood
            .can_process_message(message, from)
            .map_err(Error::Antiflood)?;
        self.inner
            .antiflood
            .can_process_message_on_topic(from, HEARTBEAT_TOPIC)
            .map_err(Error::Antiflood)?;

        let heartbeat = self.inner.decoder.decode(message).map_err(Error::Decode)?;
        if heartbeat.pubkey.is_empty() {
            return Err(Error::InvalidInput(
                "heartbeat without public key".to_string(),
            ));
        }

        if heartbeat.is_hardfork_trigger() {
            info!(
                "Hardfork trigger received from {} via {}",
                heartbeat.pubkey, from
            );
            return self
                .inner
                .hardfork_trigger
                .trigger_received(&heartbeat.pubkey, &heartbeat.payload)
                .map_err(Error::HardforkTrigger);
        }

        let inner = Arc::clone(&self.inner);
        self.inner.spawn(async move {
            inner.add_heartbeat(heartbeat).await;
        });

        let inner = Arc::clone(&self.inner);
        self.inner.spawn(async move {
            inner.recompute_all().await;
        });

        Ok(())
    }

    /// Re-evaluates every record and publishes the aggregate counters.
    pub async fn recompute_all(&self) -> LivenessCounters {
        self.inner.recompute_all().await
    }

    /// Liveness of every known peer, sorted by hex encoded public key.
    ///
    /// Records are recomputed first so the snapshot is current.
    pub async fn heartbeats(&self) -> Vec<PubKeyHeartbeat> {
        self.inner.recompute_all().await;

        let mut status: Vec<PubKeyHeartbeat> = {
            let records = self.inner.records.read().await;
            records
                .iter()
                .map(|(pubkey, record)| PubKeyHeartbeat::new(pubkey, &record.lock()))
                .collect()
        };

        status.sort_by(|a, b| a.hex_public_key.cmp(&b.hex_public_key));
        status
    }

    /// A copy of the record held for `pubkey`.
    pub async fn record(&self, pubkey: &PeerKey) -> Option<PeerHeartbeatRecord> {
        let records = self.inner.records.read().await;
        records.get(pubkey).map(|record| record.lock().clone())
    }

    /// Shard `pubkey` belongs to: its static assignment if it has one,
    /// otherwise the last shard computed for it.
    pub async fn compute_shard_id(&self, pubkey: &PeerKey) -> Option<ShardId> {
        if let Some(shard_id) = self.inner.shard_assignment.shard_of(pubkey) {
            return Some(shard_id);
        }

        let records = self.inner.records.read().await;
        records
            .get(pubkey)
            .map(|record| record.lock().computed_shard_id())
    }

    /// Every peer identity that has sent a heartbeat, in first-seen order.
    #[must_use]
    pub fn known_peers(&self) -> Vec<PeerKey> {
        self.inner.known_peers.lock().clone()
    }

    /// Replaces the sink aggregate counters are published to.
    pub fn set_status_handler(&self, status_handler: Arc<dyn StatusHandler>) {
        *self.inner.status_handler.write() = status_handler;
    }

    /// Starts the periodic recompute loop if one is configured.
    pub fn start(&self) {
        let Some(period) = self
            .inner
            .config
            .recompute_interval
            .filter(|period| !period.is_zero())
        else {
            info!("Heartbeat monitor recomputes on demand only");
            return;
        };

        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("Heartbeat monitor already started");
            return;
        }

        info!("Starting heartbeat monitor, recomputing every {:?}", period);

        let inner = Arc::clone(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        self.inner.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let counters = inner.recompute_all().await;
                        debug!(
                            "Recomputed heartbeats: {} connected, {} live validators",
                            counters.connected_nodes, counters.live_validators
                        );
                    }
                    () = shutdown.cancelled() => {
                        debug!("Heartbeat recompute loop stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Waits until every persistence save scheduled so far has been attempted.
    pub async fn flush(&self) {
        self.inner.persister.flush().await;
    }

    /// Stops background work, waiting for in-flight heartbeats and writing
    /// out the pending persistence saves.
    pub async fn shutdown(&self) {
        info!("Shutting down heartbeat monitor");

        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.persister.stop().await;

        info!("Heartbeat monitor shut down");
    }
}

impl MonitorInner {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn_on(task, &self.handle);
    }

    /// Loads the records of statically assigned peers, bootstrapping the
    /// missing ones, then restores peers discovered in earlier runs.
    pub(crate) async fn initialize(&self, storage: &dyn HeartbeatStorage) {
        let now = self.timer.now();
        let mut records = self.records.write().await;

        for (shard_id, pubkey) in self.shard_assignment.iter() {
            if records.contains_key(pubkey) {
                continue;
            }

            let record = if let Some(record) = self.load_record(storage, pubkey, now).await {
                record
            } else {
                let peer_type = self.compute_peer_type(pubkey, shard_id);
                let record = PeerHeartbeatRecord::new(
                    self.config.max_duration_peer_unresponsive,
                    peer_type,
                    shard_id,
                    self.genesis_time,
                    now,
                );
                self.persister
                    .save_record(pubkey.clone(), HeartbeatDto::from(&record));
                record
            };

            records.insert(pubkey.clone(), Arc::new(Mutex::new(record)));
        }

        match storage.load_keys().await {
            Ok(keys) => {
                for pubkey in &keys {
                    if records.contains_key(pubkey) {
                        continue;
                    }
                    if let Some(record) = self.load_record(storage, pubkey, now).await {
                        records.insert(pubkey.clone(), Arc::new(Mutex::new(record)));
                    }
                }

                let mut known_peers = self.known_peers.lock();
                for pubkey in keys {
                    if !known_peers.contains(&pubkey) {
                        known_peers.push(pubkey);
                    }
                }
            }
            Err(e) => {
                debug!("Heartbeat monitor cannot load known peers: {}", e);
            }
        }

        info!(
            "Heartbeat monitor initialized with {} peers ({} statically assigned)",
            records.len(),
            self.shard_assignment.len()
        );
    }

    async fn load_record(
        &self,
        storage: &dyn HeartbeatStorage,
        pubkey: &PeerKey,
        now: DateTime<Utc>,
    ) -> Option<PeerHeartbeatRecord> {
        let dto = match storage.load_record(pubkey).await {
            Ok(Some(dto)) => dto,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot load heartbeat for {}: {}", pubkey, e);
                return None;
            }
        };

        let mut record = PeerHeartbeatRecord::from(dto);
        if record.genesis_time() != self.genesis_time {
            warn!(
                "Heartbeat for {} was persisted with genesis time {}, node runs with {}",
                pubkey,
                record.genesis_time(),
                self.genesis_time
            );
        }

        let peer_type = self.compute_peer_type(pubkey, record.computed_shard_id());
        record.rebase(
            self.config.max_duration_peer_unresponsive,
            self.genesis_time,
            peer_type,
            now,
        );

        Some(record)
    }

    async fn add_heartbeat(&self, heartbeat: Heartbeat) {
        let now = self.timer.now();
        let Heartbeat {
            pubkey,
            shard_id: received_shard_id,
            version_number,
            node_display_name,
            ..
        } = heartbeat;

        {
            let mut records = self.records.write().await;
            if !records.contains_key(&pubkey) {
                debug!("First heartbeat from unknown peer {}", pubkey);
                let peer_type = self.compute_peer_type(&pubkey, received_shard_id);
                let record = PeerHeartbeatRecord::new(
                    self.config.max_duration_peer_unresponsive,
                    peer_type,
                    received_shard_id,
                    self.genesis_time,
                    now,
                );
                records.insert(pubkey.clone(), Arc::new(Mutex::new(record)));
            }
        }

        {
            let records = self.records.read().await;
            let Some(entry) = records.get(&pubkey) else {
                return;
            };

            let computed_shard_id = self.resolve_shard_id(&pubkey, entry);
            let peer_type = self.compute_peer_type(&pubkey, computed_shard_id);

            let mut record = entry.lock();
            record.heartbeat_received(
                received_shard_id,
                computed_shard_id,
                &version_number,
                &node_display_name,
                peer_type,
                now,
            );
            // Scheduled under the record lock so saves of one peer keep their order
            self.persister
                .save_record(pubkey.clone(), HeartbeatDto::from(&*record));
        }

        self.add_known_peer(pubkey);
    }

    fn add_known_peer(&self, pubkey: PeerKey) {
        let mut known_peers = self.known_peers.lock();
        if known_peers.contains(&pubkey) {
            return;
        }

        known_peers.push(pubkey);
        self.persister.save_keys(known_peers.clone());
    }

    pub(crate) async fn recompute_all(&self) -> LivenessCounters {
        let now = self.timer.now();
        let mut counters = LivenessCounters::default();

        {
            let records = self.records.write().await;
            for (pubkey, entry) in records.iter() {
                let mut record = entry.lock();
                if record.recompute_active(now) {
                    debug!("Peer {} became inactive", pubkey);
                    self.persister
                        .save_record(pubkey.clone(), HeartbeatDto::from(&*record));
                }

                if record.is_active() {
                    counters.connected_nodes += 1;
                    if record.is_validator() {
                        counters.live_validators += 1;
                    }
                }
            }
        }

        let status_handler = Arc::clone(&self.status_handler.read());
        status_handler.set_u64(METRIC_LIVE_VALIDATORS, counters.live_validators);
        status_handler.set_u64(METRIC_CONNECTED_NODES, counters.connected_nodes);

        counters
    }

    /// Static assignment first, then the shard last computed for the peer.
    fn resolve_shard_id(&self, pubkey: &PeerKey, record: &Mutex<PeerHeartbeatRecord>) -> ShardId {
        self.shard_assignment
            .shard_of(pubkey)
            .unwrap_or_else(|| record.lock().computed_shard_id())
    }

    fn compute_peer_type(&self, pubkey: &PeerKey, shard_id: ShardId) -> PeerType {
        match self.peer_type_provider.compute_for_pubkey(pubkey, shard_id) {
            Ok(peer_type) => peer_type,
            Err(e) => {
                warn!(
                    "Cannot compute peer type for {} in shard {}: {}",
                    pubkey, shard_id, e
                );
                PeerType::Observer
            }
        }
    }
}

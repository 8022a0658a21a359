//! Monitor builder

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::adaptor::{
    AntifloodHandler, HardforkTrigger, HeartbeatStorage, MessageDecoder, PeerTypeProvider, Timer,
};
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::monitor::{Monitor, MonitorInner};
use crate::persister::Persister;
use crate::shard::ShardAssignment;
use crate::status::{NoopStatusHandler, StatusHandler};

/// Builds a [`Monitor`] from its collaborators.
pub struct MonitorBuilder {
    /// Genesis time of the network
    genesis_time: DateTime<Utc>,

    /// Configuration
    config: MonitorConfig,

    /// Static shard assignment
    shard_assignment: ShardAssignment,

    storage: Option<Arc<dyn HeartbeatStorage>>,
    decoder: Option<Arc<dyn MessageDecoder>>,
    antiflood: Option<Arc<dyn AntifloodHandler>>,
    peer_type_provider: Option<Arc<dyn PeerTypeProvider>>,
    hardfork_trigger: Option<Arc<dyn HardforkTrigger>>,
    timer: Option<Arc<dyn Timer>>,
    status_handler: Option<Arc<dyn StatusHandler>>,
}

impl MonitorBuilder {
    /// Create a new builder for a network started at `genesis_time`
    #[must_use]
    pub fn new(genesis_time: DateTime<Utc>) -> Self {
        Self {
            genesis_time,
            config: MonitorConfig::default(),
            shard_assignment: ShardAssignment::default(),
            storage: None,
            decoder: None,
            antiflood: None,
            peer_type_provider: None,
            hardfork_trigger: None,
            timer: None,
            status_handler: None,
        }
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the static shard assignment
    #[must_use]
    pub fn with_shard_assignment(mut self, shard_assignment: ShardAssignment) -> Self {
        self.shard_assignment = shard_assignment;
        self
    }

    /// Set the persistence gateway
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn HeartbeatStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the message decoder
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn MessageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Set the antiflood handler
    #[must_use]
    pub fn with_antiflood(mut self, antiflood: Arc<dyn AntifloodHandler>) -> Self {
        self.antiflood = Some(antiflood);
        self
    }

    /// Set the peer type provider
    #[must_use]
    pub fn with_peer_type_provider(mut self, peer_type_provider: Arc<dyn PeerTypeProvider>) -> Self {
        self.peer_type_provider = Some(peer_type_provider);
        self
    }

    /// Set the hardfork trigger
    #[must_use]
    pub fn with_hardfork_trigger(mut self, hardfork_trigger: Arc<dyn HardforkTrigger>) -> Self {
        self.hardfork_trigger = Some(hardfork_trigger);
        self
    }

    /// Set the time source
    #[must_use]
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Set the metrics sink, a no-op sink is used otherwise
    #[must_use]
    pub fn with_status_handler(mut self, status_handler: Arc<dyn StatusHandler>) -> Self {
        self.status_handler = Some(status_handler);
        self
    }

    /// Build the monitor
    ///
    /// Every statically assigned peer gets a record, loaded from storage when
    /// one was persisted and freshly created (and scheduled for saving)
    /// otherwise. Peers from the known-peers registry are restored as well.
    ///
    /// Must be called from within a Tokio runtime; background work is spawned
    /// on it.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator is missing, the shard assignment is
    /// empty, or the storage rejects the genesis time.
    pub async fn build(self) -> Result<Monitor> {
        let storage = self
            .storage
            .ok_or(Error::MissingDependency("heartbeat storage"))?;
        let decoder = self
            .decoder
            .ok_or(Error::MissingDependency("message decoder"))?;
        let antiflood = self
            .antiflood
            .ok_or(Error::MissingDependency("antiflood handler"))?;
        let peer_type_provider = self
            .peer_type_provider
            .ok_or(Error::MissingDependency("peer type provider"))?;
        let hardfork_trigger = self
            .hardfork_trigger
            .ok_or(Error::MissingDependency("hardfork trigger"))?;
        let timer = self.timer.ok_or(Error::MissingDependency("timer"))?;

        if self.shard_assignment.is_empty() {
            return Err(Error::EmptyShardAssignment);
        }

        storage
            .set_genesis_time(self.genesis_time)
            .await
            .map_err(Error::Storage)?;

        let handle = Handle::current();
        let persister = Persister::spawn(
            Arc::clone(&storage),
            self.config.persistence_batch_size,
            &handle,
        );
        let status_handler = self
            .status_handler
            .unwrap_or_else(|| Arc::new(NoopStatusHandler));

        info!(
            "Building heartbeat monitor, peers unresponsive after {:?}",
            self.config.max_duration_peer_unresponsive
        );

        let inner = MonitorInner {
            config: self.config,
            genesis_time: self.genesis_time,
            shard_assignment: self.shard_assignment,
            records: RwLock::new(Default::default()),
            known_peers: Mutex::new(Vec::new()),
            decoder,
            antiflood,
            peer_type_provider,
            hardfork_trigger,
            timer,
            status_handler: parking_lot::RwLock::new(status_handler),
            persister,
            handle,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        };

        inner.initialize(storage.as_ref()).await;

        Ok(Monitor::from_inner(inner))
    }
}

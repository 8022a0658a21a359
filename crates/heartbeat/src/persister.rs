//! Background persistence of heartbeat snapshots
//!
//! Saves are coalesced into a pending set and written by a single worker so
//! that neither message processing nor recomputation ever waits on storage.
//! The set holds at most one snapshot per peer plus the latest known-peers
//! list: a newer save for the same peer replaces the older one, so no save is
//! ever dropped and memory stays bounded by the number of peers. The worker
//! writes at most `batch_size` snapshots before yielding. Failed writes are
//! logged and not retried.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::adaptor::HeartbeatStorage;
use crate::dto::HeartbeatDto;
use crate::peer::PeerKey;

#[derive(Default)]
struct Pending {
    records: HashMap<PeerKey, HeartbeatDto>,
    keys: Option<Vec<PeerKey>>,
    /// Sequence number of the last accepted save
    queued: u64,
    /// Set once the worker wrote its final batch
    closed: bool,
}

struct Shared {
    pending: Mutex<Pending>,
    wake: Notify,
    /// Highest sequence number whose saves have all been attempted
    completed: watch::Sender<u64>,
}

/// Handle used to schedule persistence work.
pub(crate) struct Persister {
    shared: Arc<Shared>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Persister {
    /// Starts the worker on `handle`.
    pub(crate) fn spawn(
        storage: Arc<dyn HeartbeatStorage>,
        batch_size: usize,
        handle: &Handle,
    ) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            wake: Notify::new(),
            completed: watch::Sender::new(0),
        });
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();

        tracker.spawn_on(
            run_worker(
                storage,
                Arc::clone(&shared),
                batch_size.max(1),
                shutdown.clone(),
            ),
            handle,
        );

        Self {
            shared,
            tracker,
            shutdown,
        }
    }

    /// Schedules a record snapshot for saving, replacing any snapshot of the
    /// same peer that has not been written yet.
    pub(crate) fn save_record(&self, pubkey: PeerKey, record: HeartbeatDto) {
        self.schedule(|pending| {
            pending.records.insert(pubkey, record);
        });
    }

    /// Schedules the full known-peers list for saving, replacing any list
    /// that has not been written yet.
    pub(crate) fn save_keys(&self, keys: Vec<PeerKey>) {
        self.schedule(|pending| {
            pending.keys = Some(keys);
        });
    }

    /// Waits until every save scheduled before this call has been attempted.
    pub(crate) async fn flush(&self) {
        let target = self.shared.pending.lock().queued;

        let mut completed = self.shared.completed.subscribe();
        let _ = completed.wait_for(|done| *done >= target).await;
    }

    /// Writes out the pending saves and stops the worker.
    pub(crate) async fn stop(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn schedule(&self, update: impl FnOnce(&mut Pending)) {
        {
            let mut pending = self.shared.pending.lock();
            if pending.closed {
                debug!("Heartbeat persistence stopped, dropping save");
                return;
            }

            update(&mut pending);
            pending.queued += 1;
        }

        self.shared.wake.notify_one();
    }
}

async fn run_worker(
    storage: Arc<dyn HeartbeatStorage>,
    shared: Arc<Shared>,
    batch_size: usize,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shared.wake.notified() => {
                drain(storage.as_ref(), &shared, batch_size, false).await;
            }
            () = shutdown.cancelled() => {
                drain(storage.as_ref(), &shared, batch_size, true).await;
                break;
            }
        }
    }

    debug!("Heartbeat persistence worker stopped");
}

/// Writes batches until nothing is pending. With `closing` set, later saves
/// are refused once the last batch is taken.
async fn drain(storage: &dyn HeartbeatStorage, shared: &Shared, batch_size: usize, closing: bool) {
    loop {
        let (records, keys, done) = {
            let mut pending = shared.pending.lock();

            let batch: Vec<PeerKey> = pending.records.keys().take(batch_size).cloned().collect();
            let records: Vec<(PeerKey, HeartbeatDto)> = batch
                .iter()
                .filter_map(|pubkey| pending.records.remove_entry(pubkey))
                .collect();
            let keys = pending.keys.take();

            let done = pending.records.is_empty().then_some(pending.queued);
            if done.is_some() && closing {
                pending.closed = true;
            }

            (records, keys, done)
        };

        for (pubkey, record) in records {
            if let Err(e) = storage.save_record(&pubkey, &record).await {
                warn!("Cannot save heartbeat for {}: {}", pubkey, e);
            }
        }

        if let Some(keys) = keys {
            if let Err(e) = storage.save_keys(&keys).await {
                warn!("Cannot save known peers list: {}", e);
            }
        }

        if let Some(queued) = done {
            shared.completed.send_replace(queued);
            return;
        }

        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::error::BoxError;
    use crate::peer::PeerType;
    use crate::record::PeerHeartbeatRecord;

    #[derive(Debug, Default)]
    struct RecordingStorage {
        records: Mutex<HashMap<PeerKey, HeartbeatDto>>,
        keys: Mutex<Vec<PeerKey>>,
        record_writes: AtomicUsize,
        key_writes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl HeartbeatStorage for RecordingStorage {
        async fn save_record(&self, pubkey: &PeerKey, record: &HeartbeatDto) -> Result<(), BoxError> {
            self.record_writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("disk on fire".into());
            }
            self.records.lock().insert(pubkey.clone(), record.clone());
            Ok(())
        }

        async fn load_record(&self, pubkey: &PeerKey) -> Result<Option<HeartbeatDto>, BoxError> {
            Ok(self.records.lock().get(pubkey).cloned())
        }

        async fn load_keys(&self) -> Result<Vec<PeerKey>, BoxError> {
            Ok(self.keys.lock().clone())
        }

        async fn save_keys(&self, keys: &[PeerKey]) -> Result<(), BoxError> {
            self.key_writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("disk on fire".into());
            }
            *self.keys.lock() = keys.to_vec();
            Ok(())
        }

        async fn set_genesis_time(&self, _genesis_time: DateTime<Utc>) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn snapshot(version: &str) -> HeartbeatDto {
        let now = Utc::now();
        let mut record = PeerHeartbeatRecord::new(
            std::time::Duration::from_secs(1),
            PeerType::Observer,
            0,
            now,
            now,
        );
        record.heartbeat_received(0, 0, version, "node", PeerType::Observer, now);
        HeartbeatDto::from(&record)
    }

    fn keys(count: u8) -> Vec<PeerKey> {
        (0..count).map(|i| PeerKey::from(vec![i])).collect()
    }

    #[tokio::test]
    async fn test_flush_waits_for_scheduled_saves() {
        let storage = Arc::new(RecordingStorage::default());
        let persister = Persister::spawn(storage.clone(), 16, &Handle::current());

        persister.save_record(PeerKey::from("a"), snapshot("v1"));
        persister.save_keys(vec![PeerKey::from("a")]);
        persister.flush().await;

        assert!(storage.records.lock().contains_key(&PeerKey::from("a")));
        assert_eq!(*storage.keys.lock(), vec![PeerKey::from("a")]);
    }

    #[tokio::test]
    async fn test_flush_without_saves_returns() {
        let storage = Arc::new(RecordingStorage::default());
        let persister = Persister::spawn(storage.clone(), 16, &Handle::current());

        persister.flush().await;

        assert_eq!(storage.record_writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pending_saves_coalesce_per_peer() {
        let storage = Arc::new(RecordingStorage::default());
        let persister = Persister::spawn(storage.clone(), 16, &Handle::current());

        // Nothing yields in between, so the worker sees every save at once
        for version in ["v1", "v2", "v3"] {
            persister.save_record(PeerKey::from("a"), snapshot(version));
        }
        for count in 1..=5 {
            persister.save_keys(keys(count));
        }
        persister.flush().await;

        assert_eq!(storage.record_writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            storage.records.lock()[&PeerKey::from("a")].version_number,
            "v3"
        );
        assert_eq!(storage.key_writes.load(Ordering::SeqCst), 1);
        assert_eq!(*storage.keys.lock(), keys(5));
    }

    #[tokio::test]
    async fn test_small_batches_write_every_peer() {
        let storage = Arc::new(RecordingStorage::default());
        let persister = Persister::spawn(storage.clone(), 1, &Handle::current());

        for (i, pubkey) in keys(40).into_iter().enumerate() {
            persister.save_record(pubkey, snapshot("v1"));
            persister.save_keys(keys(u8::try_from(i + 1).unwrap()));
        }
        persister.flush().await;

        assert_eq!(storage.records.lock().len(), 40);
        assert_eq!(*storage.keys.lock(), keys(40));
    }

    #[tokio::test]
    async fn test_stop_drains_pending_saves() {
        let storage = Arc::new(RecordingStorage::default());
        let persister = Persister::spawn(storage.clone(), 2, &Handle::current());

        for key in ["a", "b", "c", "d", "e"] {
            persister.save_record(PeerKey::from(key), snapshot("v1"));
        }
        persister.stop().await;

        assert_eq!(storage.records.lock().len(), 5);

        // Nothing is accepted afterwards, and flushing does not hang
        persister.save_record(PeerKey::from("f"), snapshot("v1"));
        persister.flush().await;
        assert_eq!(storage.records.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_writes_do_not_stop_the_worker() {
        let storage = Arc::new(RecordingStorage {
            fail: true,
            ..RecordingStorage::default()
        });
        let persister = Persister::spawn(storage.clone(), 16, &Handle::current());

        persister.save_record(PeerKey::from("a"), snapshot("v1"));
        persister.save_keys(vec![PeerKey::from("a")]);
        persister.flush().await;

        persister.save_record(PeerKey::from("b"), snapshot("v1"));
        persister.flush().await;

        assert!(storage.records.lock().is_empty());
        assert!(storage.keys.lock().is_empty());
        assert_eq!(storage.record_writes.load(Ordering::SeqCst), 2);
        assert_eq!(storage.key_writes.load(Ordering::SeqCst), 1);
    }
}

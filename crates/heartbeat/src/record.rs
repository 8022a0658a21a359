//! Per-peer liveness state and its transitions

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::peer::{PeerType, ShardId};

/// Liveness state of a single peer.
///
/// A record is either active or inactive. Up-time and down-time are accrued
/// incrementally: every transition call adds the time elapsed since
/// `last_transition_at` to exactly one accumulator and moves
/// `last_transition_at` forward, so reads never have to derive durations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerHeartbeatRecord {
    pub(crate) is_active: bool,
    pub(crate) last_seen_at: DateTime<Utc>,
    pub(crate) last_transition_at: DateTime<Utc>,
    pub(crate) total_up_time: Duration,
    pub(crate) total_down_time: Duration,
    pub(crate) max_inactive_time: Duration,
    pub(crate) received_shard_id: ShardId,
    pub(crate) computed_shard_id: ShardId,
    pub(crate) version_number: String,
    pub(crate) node_display_name: String,
    pub(crate) peer_type: PeerType,
    pub(crate) genesis_time: DateTime<Utc>,
}

impl PeerHeartbeatRecord {
    /// Creates a record for a peer that has not been seen before.
    ///
    /// New peers are assumed live until `max_inactive_time` passes without a
    /// heartbeat.
    #[must_use]
    pub fn new(
        max_inactive_time: Duration,
        peer_type: PeerType,
        computed_shard_id: ShardId,
        genesis_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_active: true,
            last_seen_at: now,
            last_transition_at: now,
            total_up_time: Duration::ZERO,
            total_down_time: Duration::ZERO,
            max_inactive_time,
            received_shard_id: computed_shard_id,
            computed_shard_id,
            version_number: String::new(),
            node_display_name: String::new(),
            peer_type,
            genesis_time,
        }
    }

    /// Applies a heartbeat received at `now`.
    ///
    /// Peer-supplied fields are overwritten unconditionally. Heartbeats carry
    /// no sequence number, so a reordered older heartbeat can overwrite the
    /// version or display name of a newer one.
    pub fn heartbeat_received(
        &mut self,
        received_shard_id: ShardId,
        computed_shard_id: ShardId,
        version_number: &str,
        node_display_name: &str,
        peer_type: PeerType,
        now: DateTime<Utc>,
    ) {
        if !self.is_active {
            self.total_down_time += elapsed(self.last_transition_at, now);
            self.last_transition_at = self.last_transition_at.max(now);
            self.is_active = true;
        }

        self.last_seen_at = now;
        self.received_shard_id = received_shard_id;
        self.computed_shard_id = computed_shard_id;
        version_number.clone_into(&mut self.version_number);
        node_display_name.clone_into(&mut self.node_display_name);
        self.peer_type = peer_type;
    }

    /// Accrues the time elapsed since the last transition and re-evaluates
    /// the active flag.
    ///
    /// Returns `true` if this call moved the record from active to inactive.
    /// An inactive record only becomes active again through a heartbeat.
    pub fn recompute_active(&mut self, now: DateTime<Utc>) -> bool {
        let since_transition = elapsed(self.last_transition_at, now);
        self.last_transition_at = self.last_transition_at.max(now);

        if !self.is_active {
            self.total_down_time += since_transition;
            return false;
        }

        self.total_up_time += since_transition;

        if elapsed(self.last_seen_at, now) > self.max_inactive_time {
            self.is_active = false;
            return true;
        }

        false
    }

    /// Re-bases a record restored from storage against the current time.
    ///
    /// The gap since the last persisted transition is credited to up-time if
    /// the peer was active when persisted, and to down-time otherwise.
    pub fn rebase(
        &mut self,
        max_inactive_time: Duration,
        genesis_time: DateTime<Utc>,
        peer_type: PeerType,
        now: DateTime<Utc>,
    ) {
        let gap = elapsed(self.last_transition_at, now);
        if self.is_active {
            self.total_up_time += gap;
            self.last_seen_at = now;
        } else {
            self.total_down_time += gap;
        }

        self.last_transition_at = self.last_transition_at.max(now);
        self.max_inactive_time = max_inactive_time;
        self.genesis_time = genesis_time;
        self.peer_type = peer_type;
    }

    /// Whether the peer is currently considered live.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether the peer is classified as a validator.
    #[must_use]
    pub const fn is_validator(&self) -> bool {
        self.peer_type.is_validator()
    }

    /// Time of the most recent accepted heartbeat.
    #[must_use]
    pub const fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    /// Time of the last accrual boundary.
    #[must_use]
    pub const fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    /// Accumulated time spent active.
    #[must_use]
    pub const fn total_up_time(&self) -> Duration {
        self.total_up_time
    }

    /// Accumulated time spent inactive.
    #[must_use]
    pub const fn total_down_time(&self) -> Duration {
        self.total_down_time
    }

    /// Silence after which the peer is considered inactive.
    #[must_use]
    pub const fn max_inactive_time(&self) -> Duration {
        self.max_inactive_time
    }

    /// Shard claimed by the peer in its last heartbeat.
    #[must_use]
    pub const fn received_shard_id(&self) -> ShardId {
        self.received_shard_id
    }

    /// Shard this node believes the peer belongs to.
    #[must_use]
    pub const fn computed_shard_id(&self) -> ShardId {
        self.computed_shard_id
    }

    /// Software version announced by the peer.
    #[must_use]
    pub fn version_number(&self) -> &str {
        &self.version_number
    }

    /// Display name announced by the peer.
    #[must_use]
    pub fn node_display_name(&self) -> &str {
        &self.node_display_name
    }

    /// Current classification of the peer.
    #[must_use]
    pub const fn peer_type(&self) -> PeerType {
        self.peer_type
    }

    /// Genesis time of the network this record belongs to.
    #[must_use]
    pub const fn genesis_time(&self) -> DateTime<Utc> {
        self.genesis_time
    }
}

/// Time from `from` to `to`, floored at zero.
fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeDelta;

    const MAX_INACTIVE: Duration = Duration::from_secs(10);

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + TimeDelta::seconds(secs)
    }

    fn record() -> PeerHeartbeatRecord {
        PeerHeartbeatRecord::new(MAX_INACTIVE, PeerType::Eligible, 0, t0(), t0())
    }

    #[test]
    fn test_new_record_is_active() {
        let record = record();

        assert!(record.is_active());
        assert_eq!(record.last_seen_at(), t0());
        assert_eq!(record.total_up_time(), Duration::ZERO);
        assert_eq!(record.total_down_time(), Duration::ZERO);
    }

    #[test]
    fn test_regular_heartbeats_stay_active() {
        let mut record = record();

        for i in 1..=20 {
            let now = at(i * 5);
            record.heartbeat_received(1, 0, "v1", "node", PeerType::Eligible, now);
            assert!(!record.recompute_active(now + TimeDelta::seconds(4)));
            assert!(record.is_active());
        }

        assert_eq!(record.total_down_time(), Duration::ZERO);
        assert_eq!(record.total_up_time(), Duration::from_secs(104));
    }

    #[test]
    fn test_silence_marks_inactive_once() {
        let mut record = record();

        assert!(record.recompute_active(at(11)));
        assert!(!record.is_active());
        assert_eq!(record.total_up_time(), Duration::from_secs(11));

        // Later polls accrue down-time but never report a second transition
        assert!(!record.recompute_active(at(15)));
        assert!(!record.recompute_active(at(30)));
        assert!(!record.is_active());
        assert_eq!(record.total_down_time(), Duration::from_secs(19));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut record = record();

        assert!(!record.recompute_active(at(10)));
        assert!(record.is_active());
    }

    #[test]
    fn test_heartbeat_resurrects_inactive_record() {
        let mut record = record();
        record.recompute_active(at(20));

        record.heartbeat_received(2, 0, "v2", "back", PeerType::Waiting, at(25));

        assert!(record.is_active());
        assert_eq!(record.total_down_time(), Duration::from_secs(5));
        assert_eq!(record.last_transition_at(), at(25));
        assert_eq!(record.last_seen_at(), at(25));
        assert_eq!(record.received_shard_id(), 2);
        assert_eq!(record.version_number(), "v2");
        assert_eq!(record.node_display_name(), "back");
        assert_eq!(record.peer_type(), PeerType::Waiting);
    }

    #[test]
    fn test_recompute_is_idempotent_for_same_instant() {
        let mut record = record();

        record.recompute_active(at(5));
        let after_first = record.clone();
        record.recompute_active(at(5));

        assert_eq!(record, after_first);
    }

    #[test]
    fn test_totals_grow_by_elapsed_time() {
        let mut record = record();
        let mut previous = record.total_up_time() + record.total_down_time();

        for (step, secs) in [3, 8, 19, 19, 40, 41].into_iter().enumerate() {
            let last = record.last_transition_at();
            if step == 4 {
                record.heartbeat_received(0, 0, "v", "n", PeerType::Eligible, at(secs));
            }
            record.recompute_active(at(secs));
            let total = record.total_up_time() + record.total_down_time();
            assert_eq!(total - previous, (at(secs) - last).to_std().unwrap());
            previous = total;
        }
    }

    #[test]
    fn test_clock_skew_never_accrues_negative_time() {
        let mut record = record();
        record.recompute_active(at(5));

        assert!(!record.recompute_active(at(1)));
        assert_eq!(record.total_up_time(), Duration::from_secs(5));

        record.recompute_active(at(30));
        record.heartbeat_received(0, 0, "v", "n", PeerType::Eligible, at(2));
        assert_eq!(record.total_down_time(), Duration::ZERO);
    }

    #[test]
    fn test_rebase_credits_gap_by_state() {
        let mut active = record();
        active.rebase(Duration::from_secs(60), at(-100), PeerType::Observer, at(30));

        assert_eq!(active.total_up_time(), Duration::from_secs(30));
        assert_eq!(active.last_seen_at(), at(30));
        assert_eq!(active.last_transition_at(), at(30));
        assert_eq!(active.max_inactive_time(), Duration::from_secs(60));
        assert_eq!(active.genesis_time(), at(-100));
        assert_eq!(active.peer_type(), PeerType::Observer);

        let mut inactive = record();
        inactive.recompute_active(at(20));
        inactive.rebase(MAX_INACTIVE, t0(), PeerType::Eligible, at(50));

        assert!(!inactive.is_active());
        assert_eq!(inactive.total_down_time(), Duration::from_secs(30));
        assert_eq!(inactive.last_seen_at(), t0());
    }

    mod properties {
        use super::*;

        use proptest::prelude::*;

        prop_compose! {
            /// Heartbeats (`true`) and polls (`false`) at arbitrary, unordered seconds
            fn arb_events()(events in prop::collection::vec((any::<bool>(), 0i64..1_000), 0..40))
                -> Vec<(bool, i64)>
            {
                events
            }
        }

        fn apply(record: &mut PeerHeartbeatRecord, heartbeat: bool, secs: i64) -> bool {
            if heartbeat {
                record.heartbeat_received(0, 0, "v", "n", PeerType::Eligible, at(secs));
                false
            } else {
                record.recompute_active(at(secs))
            }
        }

        proptest! {
            #[test]
            fn totals_cover_time_since_creation(events in arb_events(), end in 1_000i64..2_000) {
                let mut record = record();
                for (heartbeat, secs) in events {
                    apply(&mut record, heartbeat, secs);
                }
                record.recompute_active(at(end));

                prop_assert_eq!(
                    record.total_up_time() + record.total_down_time(),
                    Duration::from_secs(end.unsigned_abs())
                );
            }

            #[test]
            fn steady_heartbeats_never_accrue_down_time(gaps in prop::collection::vec(0i64..=10, 1..50)) {
                let mut record = record();
                let mut secs = 0;
                for gap in gaps {
                    secs += gap;
                    prop_assert!(!record.recompute_active(at(secs)));
                    record.heartbeat_received(0, 0, "v", "n", PeerType::Eligible, at(secs));
                }

                prop_assert!(record.is_active());
                prop_assert_eq!(record.total_down_time(), Duration::ZERO);
            }

            #[test]
            fn transition_reported_once_per_crossing(events in arb_events()) {
                let mut record = record();
                for (heartbeat, secs) in events {
                    let was_active = record.is_active();
                    let flipped = apply(&mut record, heartbeat, secs);
                    if !heartbeat {
                        prop_assert_eq!(flipped, was_active && !record.is_active());
                    }
                }
            }

            #[test]
            fn repeated_poll_at_same_instant_changes_nothing(events in arb_events(), now in 0i64..1_500) {
                let mut record = record();
                for (heartbeat, secs) in events {
                    apply(&mut record, heartbeat, secs);
                }

                record.recompute_active(at(now));
                let after_first = record.clone();
                prop_assert!(!record.recompute_active(at(now)));
                prop_assert_eq!(record, after_first);
            }
        }
    }
}

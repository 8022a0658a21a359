//! Flattened, storage-ready form of a peer heartbeat record

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::peer::ShardId;
use crate::record::PeerHeartbeatRecord;

/// Persisted snapshot of a [`PeerHeartbeatRecord`].
///
/// Timestamps are unix nanoseconds and durations are nanoseconds.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatDto {
    /// Liveness verdict at the time of the snapshot
    pub is_active: bool,
    /// Shard claimed by the peer
    #[serde(rename = "receivedShardID")]
    pub received_shard_id: ShardId,
    /// Shard resolved by this node
    #[serde(rename = "computedShardID")]
    pub computed_shard_id: ShardId,
    /// Announced software version
    pub version_number: String,
    /// Announced display name
    pub node_display_name: String,
    /// Peer classification, kept as text so unknown categories still load
    pub peer_type: String,
    /// Last time the peer was seen
    pub time_stamp: i64,
    /// Inactivity threshold
    pub max_inactive_time: i64,
    /// Accumulated up-time
    pub total_up_time: i64,
    /// Accumulated down-time
    pub total_down_time: i64,
    /// Last accrual boundary
    pub last_uptime_downtime: i64,
    /// Network genesis time
    pub genesis_time: i64,
}

impl From<&PeerHeartbeatRecord> for HeartbeatDto {
    fn from(record: &PeerHeartbeatRecord) -> Self {
        Self {
            is_active: record.is_active,
            received_shard_id: record.received_shard_id,
            computed_shard_id: record.computed_shard_id,
            version_number: record.version_number.clone(),
            node_display_name: record.node_display_name.clone(),
            peer_type: record.peer_type.as_str().to_string(),
            time_stamp: timestamp_to_nanos(record.last_seen_at),
            max_inactive_time: duration_to_nanos(record.max_inactive_time),
            total_up_time: duration_to_nanos(record.total_up_time),
            total_down_time: duration_to_nanos(record.total_down_time),
            last_uptime_downtime: timestamp_to_nanos(record.last_transition_at),
            genesis_time: timestamp_to_nanos(record.genesis_time),
        }
    }
}

impl From<HeartbeatDto> for PeerHeartbeatRecord {
    fn from(dto: HeartbeatDto) -> Self {
        Self {
            is_active: dto.is_active,
            last_seen_at: DateTime::from_timestamp_nanos(dto.time_stamp),
            last_transition_at: DateTime::from_timestamp_nanos(dto.last_uptime_downtime),
            total_up_time: nanos_to_duration(dto.total_up_time),
            total_down_time: nanos_to_duration(dto.total_down_time),
            max_inactive_time: nanos_to_duration(dto.max_inactive_time),
            received_shard_id: dto.received_shard_id,
            computed_shard_id: dto.computed_shard_id,
            version_number: dto.version_number,
            node_display_name: dto.node_display_name,
            // Recomputed on load, so an unknown category only needs a placeholder
            peer_type: dto.peer_type.parse().unwrap_or_default(),
            genesis_time: DateTime::from_timestamp_nanos(dto.genesis_time),
        }
    }
}

// Values outside the i64 nanosecond range (years past 2262) saturate.
fn timestamp_to_nanos(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn duration_to_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

fn nanos_to_duration(nanos: i64) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(0))
}

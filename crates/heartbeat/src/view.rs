//! Read-only liveness view returned to API callers

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::peer::{PeerKey, PeerType, ShardId};
use crate::record::PeerHeartbeatRecord;

/// Liveness of a single peer as exposed upward.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PubKeyHeartbeat {
    /// Hex encoded public key
    pub hex_public_key: String,
    /// Time of the last accepted heartbeat
    pub time_stamp: DateTime<Utc>,
    /// Inactivity threshold
    #[serde(with = "humantime_serde")]
    pub max_inactive_time: Duration,
    /// Current liveness verdict
    pub is_active: bool,
    /// Shard claimed by the peer
    #[serde(rename = "receivedShardID")]
    pub received_shard_id: ShardId,
    /// Shard resolved by this node
    #[serde(rename = "computedShardID")]
    pub computed_shard_id: ShardId,
    /// Accumulated up-time in whole seconds
    pub total_up_time: u64,
    /// Accumulated down-time in whole seconds
    pub total_down_time: u64,
    /// Announced software version
    pub version_number: String,
    /// Announced display name
    pub node_display_name: String,
    /// Peer classification
    pub peer_type: PeerType,
}

impl PubKeyHeartbeat {
    pub(crate) fn new(pubkey: &PeerKey, record: &PeerHeartbeatRecord) -> Self {
        Self {
            hex_public_key: pubkey.to_hex(),
            time_stamp: record.last_seen_at(),
            max_inactive_time: record.max_inactive_time(),
            is_active: record.is_active(),
            received_shard_id: record.received_shard_id(),
            computed_shard_id: record.computed_shard_id(),
            total_up_time: record.total_up_time().as_secs(),
            total_down_time: record.total_down_time().as_secs(),
            version_number: record.version_number().to_string(),
            node_display_name: record.node_display_name().to_string(),
            peer_type: record.peer_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_view() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut record =
            PeerHeartbeatRecord::new(Duration::from_secs(90), PeerType::Eligible, 1, now, now);
        record.heartbeat_received(2, 1, "v1", "alice", PeerType::Eligible, now);
        record.recompute_active(now + chrono::TimeDelta::milliseconds(61_500));

        let view = PubKeyHeartbeat::new(&PeerKey::from(vec![0xab, 0x01]), &record);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["hexPublicKey"], "ab01");
        assert_eq!(json["maxInactiveTime"], "1m 30s");
        assert_eq!(json["receivedShardID"], 2);
        assert_eq!(json["computedShardID"], 1);
        assert_eq!(json["totalUpTime"], 61);
        assert_eq!(json["peerType"], "eligible");
        assert_eq!(json["isActive"], true);
    }
}

//! Monitor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default silence after which a peer is considered inactive
const DEFAULT_MAX_DURATION_PEER_UNRESPONSIVE: Duration = Duration::from_secs(120);

/// Default cadence of the background recompute loop
const DEFAULT_RECOMPUTE_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of snapshots written before the persistence worker yields
const DEFAULT_PERSISTENCE_BATCH_SIZE: usize = 256;

/// Heartbeat monitor configuration
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Silence after which a peer is considered inactive
    #[serde(with = "humantime_serde")]
    pub max_duration_peer_unresponsive: Duration,

    /// Cadence of the background recompute loop, `None` to recompute on demand only
    #[serde(with = "humantime_serde")]
    pub recompute_interval: Option<Duration>,

    /// Snapshots written before the persistence worker yields
    pub persistence_batch_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_duration_peer_unresponsive: DEFAULT_MAX_DURATION_PEER_UNRESPONSIVE,
            recompute_interval: Some(DEFAULT_RECOMPUTE_INTERVAL),
            persistence_batch_size: DEFAULT_PERSISTENCE_BATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_readable_durations() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{"max_duration_peer_unresponsive": "5m", "recompute_interval": "10s"}"#,
        )
        .unwrap();

        assert_eq!(config.max_duration_peer_unresponsive, Duration::from_secs(300));
        assert_eq!(config.recompute_interval, Some(Duration::from_secs(10)));
        assert_eq!(
            config.persistence_batch_size,
            DEFAULT_PERSISTENCE_BATCH_SIZE
        );

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["max_duration_peer_unresponsive"], "5m");
    }

    #[test]
    fn test_disabled_recompute_loop() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"recompute_interval": null}"#).unwrap();

        assert_eq!(config.recompute_interval, None);
        assert_eq!(
            config.max_duration_peer_unresponsive,
            DEFAULT_MAX_DURATION_PEER_UNRESPONSIVE
        );
    }
}

//! Metrics sinks for aggregate liveness counters

use std::collections::HashMap;

use parking_lot::Mutex;
use prometheus::{IntGauge, Registry};
use tracing::warn;

/// Number of peers currently considered live.
pub const METRIC_CONNECTED_NODES: &str = "connectedNodes";

/// Number of live peers classified as validators.
pub const METRIC_LIVE_VALIDATORS: &str = "liveValidators";

/// Receives aggregate counters published by the monitor.
pub trait StatusHandler: Send + Sync + 'static {
    /// Sets the gauge `name` to `value`.
    fn set_u64(&self, name: &str, value: u64);
}

/// Discards every value.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStatusHandler;

impl StatusHandler for NoopStatusHandler {
    fn set_u64(&self, _name: &str, _value: u64) {}
}

/// Publishes counters as Prometheus gauges named `heartbeat_<name>`.
///
/// Gauges are registered on first use.
pub struct PrometheusStatusHandler {
    registry: Registry,
    gauges: Mutex<HashMap<String, IntGauge>>,
}

impl PrometheusStatusHandler {
    /// Creates a handler registering its gauges on `registry`.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            gauges: Mutex::new(HashMap::new()),
        }
    }

    /// The registry gauges are registered on.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The gauge backing `name`, if it has been set at least once.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<IntGauge> {
        self.gauges.lock().get(name).cloned()
    }

    fn register(&self, name: &str) -> Option<IntGauge> {
        let gauge = match IntGauge::new(
            format!("heartbeat_{name}"),
            format!("Heartbeat monitor gauge {name}"),
        ) {
            Ok(gauge) => gauge,
            Err(e) => {
                warn!("Invalid heartbeat gauge {}: {}", name, e);
                return None;
            }
        };

        if let Err(e) = self.registry.register(Box::new(gauge.clone())) {
            warn!("Failed to register heartbeat gauge {}: {}", name, e);
            return None;
        }

        Some(gauge)
    }
}

impl StatusHandler for PrometheusStatusHandler {
    fn set_u64(&self, name: &str, value: u64) {
        let mut gauges = self.gauges.lock();

        let gauge = if let Some(gauge) = gauges.get(name) {
            gauge.clone()
        } else {
            let Some(gauge) = self.register(name) else {
                return;
            };
            gauges.insert(name.to_string(), gauge.clone());
            gauge
        };

        gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
    }
}

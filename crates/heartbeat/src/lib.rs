//! Liveness tracking for peers of a sharded network.
//!
//! Every peer periodically gossips a heartbeat. The [`Monitor`] keeps one
//! [`PeerHeartbeatRecord`] per known peer, flips it between active and
//! inactive as heartbeats arrive or stop arriving, accrues up-time and
//! down-time, publishes aggregate counters through a [`StatusHandler`] and
//! persists records through a [`HeartbeatStorage`] so history survives
//! restarts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let monitor = MonitorBuilder::new(genesis_time)
//!     .with_config(config)
//!     .with_shard_assignment(shard_assignment)
//!     .with_storage(storage)
//!     .with_decoder(decoder)
//!     .with_antiflood(antiflood)
//!     .with_peer_type_provider(peer_type_provider)
//!     .with_hardfork_trigger(hardfork_trigger)
//!     .with_timer(Arc::new(SystemTimer))
//!     .build()
//!     .await?;
//! monitor.start();
//!
//! monitor.process_received_message(&message, &from)?;
//! let heartbeats = monitor.heartbeats().await;
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod adaptor;
mod builder;
pub mod config;
pub mod dto;
pub mod error;
pub mod message;
mod monitor;
pub mod peer;
mod persister;
pub mod record;
pub mod shard;
pub mod status;
pub mod view;

pub use adaptor::{
    AntifloodHandler, HardforkTrigger, HeartbeatStorage, MessageDecoder, PeerTypeProvider,
    SystemTimer, Timer,
};
pub use builder::MonitorBuilder;
pub use config::MonitorConfig;
pub use dto::HeartbeatDto;
pub use error::{BoxError, Error, Result};
pub use message::{HARDFORK_TRIGGER_PAYLOAD, HEARTBEAT_TOPIC, Heartbeat, InboundMessage};
pub use monitor::{LivenessCounters, Monitor};
pub use peer::{PeerId, PeerKey, PeerType, ShardId};
pub use record::PeerHeartbeatRecord;
pub use shard::ShardAssignment;
pub use status::{
    METRIC_CONNECTED_NODES, METRIC_LIVE_VALIDATORS, NoopStatusHandler, PrometheusStatusHandler,
    StatusHandler,
};
pub use view::PubKeyHeartbeat;

//! avsip-pipeline - Acquisition, normalization and fanout for AVSIP
//!
//! This crate wires the vehicle data sources into the per-tick reading and
//! fans it out to the transmission sinks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Scheduler (tick)                      │
//! │                                                              │
//! │   ┌──────────┐   ┌──────────┐   ┌──────────┐                 │
//! │   │ObdSource │   │CanSource │   │GpsSource │   (sequential,  │
//! │   │          │   │ +decoder │   │          │    each bounded)│
//! │   └────┬─────┘   └────┬─────┘   └────┬─────┘                 │
//! │        └──────────────┼──────────────┘                       │
//! │                 ┌─────┴──────┐                               │
//! │                 │  Reading   │ (immutable, Arc-shared)       │
//! │                 └─────┬──────┘                               │
//! │                 ┌─────┴──────┐                               │
//! │                 │ Dispatcher │ (latest-wins mailboxes)       │
//! │                 └─┬───┬────┬─┘                               │
//! └───────────────────┼───┼────┼─────────────────────────────────┘
//!            ┌────────┘   │    └────────┐
//!      ┌─────┴─────┐ ┌────┴────┐  ┌─────┴─────┐
//!      │Meshtastic │ │  MQTT   │  │  Traccar  │  (worker tasks,
//!      │   Sink    │ │  Sink   │  │   Sink    │   independent)
//!      └───────────┘ └─────────┘  └───────────┘
//! ```
//!
//! Every source and sink owns a private connection-health state machine and
//! its own retry policy; a failing component degrades only its own data and
//! never blocks the tick or the other components.

pub mod config;
pub mod dispatch;
pub mod identity;
pub mod pipeline;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod transport;

pub use config::{Config, ConfigError};
pub use dispatch::{Dispatcher, Mailbox};
pub use pipeline::{Pipeline, ShutdownHandle};
pub use scheduler::Scheduler;
pub use sink::{spawn_sink, MeshtasticSink, MqttSink, Sink, SinkWorker, TraccarSink};
pub use source::{CanSource, GpsSource, ObdSample, ObdSource};
pub use transport::{
    create_can_transport, create_mesh_transport, create_obd_transport, CanTransport,
    MeshTransport, ObdTransport, RawFrame, TransportError,
};

// Re-export for convenience
pub use avsip_core::{ConnectionHealth, Reading};

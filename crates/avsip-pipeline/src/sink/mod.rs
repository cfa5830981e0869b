//! Sink adapters
//!
//! Each sink serializes the reading into its wire format and delivers it
//! through its external client, with its own connection health, retry policy
//! and rate limiting. Sinks run as independent worker tasks: one sink
//! failing or retrying never affects another sink or the acquisition loop.

mod meshtastic;
mod mqtt;
mod traccar;

pub use meshtastic::MeshtasticSink;
pub use mqtt::MqttSink;
pub use traccar::{HttpPositionClient, PositionClient, TraccarSink};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use avsip_core::{ConnectionHealth, Reading};

use crate::dispatch::Mailbox;

/// One transmission channel for readings
#[async_trait]
pub trait Sink: Send {
    fn name(&self) -> &'static str;

    /// Deliver one reading
    ///
    /// Failures are sink-local: implementations record them in their own
    /// health state and return normally.
    async fn submit(&mut self, reading: &Reading);

    /// Read-only health snapshot
    fn health(&self) -> ConnectionHealth;

    async fn close(&mut self);
}

/// Handle to a spawned sink worker
pub struct SinkWorker {
    name: &'static str,
    handle: JoinHandle<()>,
    health: Arc<RwLock<ConnectionHealth>>,
}

impl SinkWorker {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last health snapshot published by the worker
    pub fn health(&self) -> ConnectionHealth {
        self.health.read().clone()
    }

    /// Wait for the worker to finish its teardown after shutdown
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(sink = self.name, error = %e, "Sink worker ended abnormally");
        }
    }
}

/// Run a sink on its own task, consuming its mailbox in dispatch order
///
/// The worker processes readings strictly in the order they are observed;
/// because the mailbox is latest-wins, a delivery that outlasts one or more
/// ticks simply skips the superseded readings. On shutdown the current
/// delivery finishes its bounded retries and the sink is closed.
pub fn spawn_sink(
    mut sink: impl Sink + 'static,
    mut mailbox: Mailbox,
    mut shutdown: watch::Receiver<bool>,
) -> SinkWorker {
    let name = sink.name();
    let health = Arc::new(RwLock::new(sink.health()));
    let shared_health = Arc::clone(&health);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = mailbox.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let reading = mailbox.borrow_and_update().clone();
                    if let Some(reading) = reading {
                        sink.submit(&reading).await;
                        *shared_health.write() = sink.health();
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(sink = name, "Sink worker shutting down");
        sink.close().await;
        *shared_health.write() = sink.health();
    });

    SinkWorker {
        name,
        handle,
        health,
    }
}

//! Pipeline assembly
//!
//! Builds the full acquisition-fanout pipeline from a validated
//! configuration: transports via the config-driven factories, one source per
//! enabled acquisition channel, one spawned worker per enabled sink, and the
//! scheduler that drives them.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::identity::resolve_device_id;
use crate::scheduler::Scheduler;
use crate::sink::{spawn_sink, HttpPositionClient, MeshtasticSink, MqttSink, SinkWorker, TraccarSink};
use crate::source::{CanSource, GpsSource, ObdSource};
use crate::transport::{create_can_transport, create_mesh_transport, create_obd_transport};

/// Triggers the global shutdown signal
///
/// The scheduler stops before starting a new tick; every sink worker
/// finishes its current bounded delivery, abandons further retries and
/// closes its connection.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The assembled pipeline, ready to run
pub struct Pipeline {
    scheduler: Scheduler,
    workers: Vec<SinkWorker>,
}

impl Pipeline {
    /// Assemble sources, sinks and scheduler from a validated config
    ///
    /// Configuration problems (unknown transports, bad descriptors, missing
    /// TLS files) surface here, synchronously, before the first tick.
    pub async fn build(config: Config) -> anyhow::Result<(Self, ShutdownHandle)> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let precision = config.general.wire_precision;

        // The mesh device is one physical link serving the GPS source, the
        // mesh sink and the node-id lookup
        let mesh = if config.meshtastic.enabled {
            Some(create_mesh_transport(&config.meshtastic)?)
        } else {
            None
        };

        let device_id = resolve_device_id(&config.general, mesh.as_deref()).await;
        tracing::info!(device_id = %device_id, "Pipeline device id resolved");

        let obd = if config.obd.enabled {
            let transport = create_obd_transport(&config.obd)?;
            let mut source = ObdSource::new(transport, config.obd.clone());
            source.connect().await;
            Some(source)
        } else {
            None
        };

        let can = if config.can.enabled {
            let descriptors = config.can.descriptors()?;
            let transport = create_can_transport(&config.can)?;
            let mut source = CanSource::new(transport, config.can.clone(), descriptors);
            source.connect().await;
            Some(source)
        } else {
            None
        };

        let gps = mesh.as_ref().map(|mesh| GpsSource::new(Arc::clone(mesh)));

        let mut dispatcher = Dispatcher::new();
        let mut workers = Vec::new();

        if let Some(mesh) = &mesh {
            let mailbox = dispatcher.register("meshtastic");
            let sink = MeshtasticSink::new(Arc::clone(mesh), config.meshtastic.clone(), precision);
            workers.push(spawn_sink(sink, mailbox, shutdown_rx.clone()));
        }

        if config.mqtt.enabled {
            let mailbox = dispatcher.register("mqtt");
            let sink = MqttSink::new(config.mqtt.clone(), &device_id, precision)?;
            workers.push(spawn_sink(sink, mailbox, shutdown_rx.clone()));
        }

        if config.traccar.enabled {
            let mailbox = dispatcher.register("traccar");
            let sink = TraccarSink::new(
                Arc::new(HttpPositionClient::new()),
                config.traccar.clone(),
                &device_id,
            )?;
            workers.push(spawn_sink(sink, mailbox, shutdown_rx.clone()));
        }

        tracing::info!(
            obd = obd.is_some(),
            can = can.is_some(),
            gps = gps.is_some(),
            sinks = workers.len(),
            "Pipeline assembled"
        );

        let scheduler = Scheduler::new(
            config.general.data_interval(),
            device_id,
            obd,
            can,
            gps,
            dispatcher,
            shutdown_rx,
        );

        Ok((
            Self { scheduler, workers },
            ShutdownHandle { tx: shutdown_tx },
        ))
    }

    /// Run until shutdown is triggered, then wait for every worker's
    /// teardown
    pub async fn run(self) {
        self.scheduler.run().await;
        for worker in self.workers {
            worker.join().await;
        }
        tracing::info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn mock_pipeline_builds_runs_and_stops() {
        let config = Config::from_toml_str(
            r#"
            [general]
            data_interval_seconds = 1
            device_id_source = "custom"
            custom_device_id = "test-unit"

            [obd]
            enabled = true

            [can]
            enabled = true

            [[can.signals]]
            id = "0x123"
            name = "EngineSpeed"
            start_byte = 0
            length_bytes = 2
            scale = 0.25
            "#,
        )
        .unwrap();

        let (pipeline, shutdown) = Pipeline::build(config).await.unwrap();
        let runner = tokio::spawn(pipeline.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.shutdown();

        tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("pipeline did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_transport_fails_the_build() {
        let config = Config::from_toml_str(
            r#"
            [obd]
            enabled = true
            transport = "serial"
            "#,
        )
        .unwrap();

        assert!(Pipeline::build(config).await.is_err());
    }
}

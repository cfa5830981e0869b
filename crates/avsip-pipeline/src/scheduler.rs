//! Acquisition scheduler
//!
//! Drives periodic collection: on each tick every enabled source is polled
//! (sequentially, each bounded by its own timeouts), the partial results are
//! merged into one reading, and the reading is handed to the dispatcher
//! without waiting for any sink. Cadence is wall-clock based: a tick that
//! overruns the interval is followed immediately by the next one instead of
//! drifting to a fixed schedule.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;

use avsip_core::Reading;

use crate::dispatch::Dispatcher;
use crate::source::{CanSource, GpsSource, ObdSample, ObdSource};

pub struct Scheduler {
    interval: Duration,
    device_id: String,
    obd: Option<ObdSource>,
    can: Option<CanSource>,
    gps: Option<GpsSource>,
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        device_id: impl Into<String>,
        obd: Option<ObdSource>,
        can: Option<CanSource>,
        gps: Option<GpsSource>,
        dispatcher: Dispatcher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            interval,
            device_id: device_id.into(),
            obd,
            can,
            gps,
            dispatcher,
            shutdown,
        }
    }

    /// Run ticks until the shutdown signal is observed, then close every
    /// source
    pub async fn run(mut self) {
        tracing::info!(
            interval_s = self.interval.as_secs_f64(),
            sinks = self.dispatcher.sink_count(),
            "Acquisition loop started"
        );

        while !*self.shutdown.borrow() {
            let tick_started = Instant::now();

            let reading = self.acquire().await;
            if reading.is_empty() {
                tracing::debug!("No source produced data this tick");
            }
            // Fire-and-forget: sinks run concurrently with the next tick
            self.dispatcher.dispatch(reading);

            let elapsed = tick_started.elapsed();
            let idle = self.interval.saturating_sub(elapsed);
            if idle.is_zero() {
                tracing::debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tick overran the interval, starting the next immediately"
                );
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        tracing::info!("Acquisition loop stopped");
        self.close().await;
    }

    /// Poll every enabled source and assemble one reading
    ///
    /// A failing source degrades its own fields only; the reading is always
    /// constructed and dispatched, even fully empty.
    async fn acquire(&mut self) -> Reading {
        let mut reading = Reading::new(self.device_id.clone(), Utc::now());

        if let Some(obd) = &mut self.obd {
            match obd.poll().await {
                ObdSample::Data { values, dtc_codes } => {
                    reading.obd_values = values;
                    reading.dtc_codes = dtc_codes;
                }
                ObdSample::NotRunning | ObdSample::Unavailable => {}
            }
        }

        if let Some(can) = &mut self.can {
            reading.can_values = can.poll().await;
        }

        if let Some(gps) = &self.gps {
            reading.position = gps.poll().await;
        }

        tracing::debug!(
            obd = reading.obd_values.len(),
            can = reading.can_values.len(),
            dtcs = reading.dtc_codes.len(),
            fix = reading.position.is_some(),
            "Tick assembled"
        );
        reading
    }

    async fn close(&mut self) {
        if let Some(obd) = &mut self.obd {
            obd.close().await;
        }
        if let Some(can) = &mut self.can {
            can.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{CanConfig, ObdConfig};
    use crate::transport::mock::{MockCanTransport, MockMeshTransport, MockObdTransport};

    #[tokio::test]
    async fn ticks_dispatch_and_shutdown_stops_the_loop() {
        let obd_transport = Arc::new(MockObdTransport::new());
        let mut obd = ObdSource::new(obd_transport, ObdConfig::default());
        obd.connect().await;

        let can_transport = Arc::new(MockCanTransport::new());
        let mut can = CanSource::new(can_transport, CanConfig::default(), Vec::new());
        can.connect().await;

        let mesh = Arc::new(MockMeshTransport::new("!aabbccdd"));
        let gps = GpsSource::new(mesh);

        let mut dispatcher = Dispatcher::new();
        let mut mailbox = dispatcher.register("probe");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(
            Duration::from_millis(10),
            "unit-01",
            Some(obd),
            Some(can),
            Some(gps),
            dispatcher,
            shutdown_rx,
        );

        let runner = tokio::spawn(scheduler.run());

        // Wait for at least one dispatched reading
        mailbox.changed().await.unwrap();
        let reading = mailbox.borrow_and_update().clone().unwrap();
        assert_eq!(reading.device_id, "unit-01");
        assert!(reading.obd_values.contains_key("RPM"));

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("scheduler did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn empty_reading_is_still_dispatched() {
        // No sources at all: the reading has no fields, and is dispatched anyway
        let mut dispatcher = Dispatcher::new();
        let mut mailbox = dispatcher.register("probe");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(
            Duration::from_millis(10),
            "unit-01",
            None,
            None,
            None,
            dispatcher,
            shutdown_rx,
        );
        let runner = tokio::spawn(scheduler.run());

        mailbox.changed().await.unwrap();
        let reading = mailbox.borrow_and_update().clone().unwrap();
        assert!(reading.is_empty());

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }
}

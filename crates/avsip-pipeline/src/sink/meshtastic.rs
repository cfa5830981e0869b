//! Mesh-radio broadcast sink

use std::sync::Arc;

use async_trait::async_trait;

use avsip_core::{AdapterError, ConnectionHealth, HealthTracker, Reading};

use super::Sink;
use crate::config::MeshtasticConfig;
use crate::transport::MeshTransport;

/// Broadcasts a compact reading projection on the configured application port
///
/// Radio payloads are small, so the encoder favors fewer decimal places and
/// dropped attribute maps over truncated bytes. Delivery gets a bounded
/// number of retries with a fixed delay; on exhaustion the reading is
/// skipped - there is no buffering or backlog.
pub struct MeshtasticSink {
    transport: Arc<dyn MeshTransport>,
    config: MeshtasticConfig,
    precision: u8,
    health: HealthTracker,
}

impl MeshtasticSink {
    pub fn new(transport: Arc<dyn MeshTransport>, config: MeshtasticConfig, precision: u8) -> Self {
        let health = HealthTracker::new(config.retry_policy());
        Self {
            transport,
            config,
            precision,
            health,
        }
    }

    /// Encode the reading, stepping down the size ladder until it fits
    ///
    /// Ladder: configured precision → 1 decimal → integers → integers with
    /// the OBD/CAN attribute maps dropped (id, timestamp, position and DTCs
    /// always survive). `None` when even the last rung does not fit.
    fn encode(&self, reading: &Reading) -> Option<Vec<u8>> {
        let max = self.transport.max_payload_bytes();

        let mut precisions = vec![self.precision];
        if self.precision > 1 {
            precisions.push(1);
        }
        if self.precision > 0 {
            precisions.push(0);
        }

        for precision in precisions {
            let bytes = reading.to_wire_json(precision).to_string().into_bytes();
            if bytes.len() <= max {
                return Some(bytes);
            }
        }

        let mut stripped = reading.clone();
        stripped.obd_values.clear();
        stripped.can_values.clear();
        let bytes = stripped.to_wire_json(0).to_string().into_bytes();
        if bytes.len() <= max {
            tracing::debug!(
                payload_bytes = bytes.len(),
                "Mesh payload reduced to position/DTC projection"
            );
            return Some(bytes);
        }

        tracing::warn!(
            limit = max,
            "Reading cannot be reduced below the mesh payload limit, skipping"
        );
        None
    }
}

#[async_trait]
impl Sink for MeshtasticSink {
    fn name(&self) -> &'static str {
        "meshtastic"
    }

    async fn submit(&mut self, reading: &Reading) {
        let Some(payload) = self.encode(reading) else {
            return;
        };

        let attempts = self.config.send_retries + 1;
        for attempt in 1..=attempts {
            match self
                .transport
                .send(self.config.data_port_num, &payload)
                .await
            {
                Ok(()) => {
                    tracing::debug!(
                        port = self.config.data_port_num,
                        bytes = payload.len(),
                        "Reading broadcast on mesh"
                    );
                    self.health.on_connected();
                    return;
                }
                Err(e) => {
                    let classified = AdapterError::Delivery(e.to_string());
                    self.health.on_failure(classified.to_string());
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %classified,
                        retry_count = self.health.state().retry_count(),
                        "Mesh send failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.send_retry_delay()).await;
                    }
                }
            }
        }
        // Retries exhausted: this reading is skipped, the next one supersedes it
    }

    fn health(&self) -> ConnectionHealth {
        self.health.state()
    }

    async fn close(&mut self) {
        self.transport.close().await;
        self.health.on_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockMeshTransport;
    use avsip_core::{ObdValue, Position};
    use chrono::Utc;

    fn reading_with_everything() -> Reading {
        let mut reading = Reading::new("unit-01", Utc::now());
        for n in 0..8 {
            reading
                .obd_values
                .insert(format!("SENSOR_{}", n), ObdValue::Number(123.456789 + n as f64));
        }
        for n in 0..8 {
            reading
                .can_values
                .insert(format!("Signal{}", n), 9876.54321 + n as f64);
        }
        reading.dtc_codes.push("P0420".into());
        reading.position = Some(Position {
            latitude: 40.7128,
            longitude: -74.0060,
            altitude_m: Some(15.0),
            speed_mps: Some(27.8),
            course_deg: Some(120.0),
            satellites: Some(9),
            fix_time: 1_700_000_000,
        });
        reading
    }

    fn config(retries: u32) -> MeshtasticConfig {
        MeshtasticConfig {
            send_retries: retries,
            send_retry_delay_seconds: 0,
            ..MeshtasticConfig::default()
        }
    }

    #[tokio::test]
    async fn broadcasts_wire_payload() {
        let transport = Arc::new(MockMeshTransport::new("!aabbccdd"));
        let mut sink = MeshtasticSink::new(transport.clone(), config(0), 2);

        sink.submit(&Reading::new("unit-01", Utc::now())).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 250);
        let payload: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(payload["device_id"], "unit-01");
        assert!(sink.health().is_connected());
    }

    #[tokio::test]
    async fn oversized_reading_steps_down_the_ladder() {
        // Limit low enough that the full-precision payload cannot fit but
        // the stripped projection can
        let transport = Arc::new(MockMeshTransport::with_max_payload("!aabbccdd", 160));
        let mut sink = MeshtasticSink::new(transport.clone(), config(0), 2);

        sink.submit(&reading_with_everything()).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let payload: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
        // Position and DTCs survive the reduction, attribute maps do not
        assert!(payload.get("lat").is_some());
        assert_eq!(payload["dtcs"][0], "P0420");
        assert!(payload.get("sensor_0").is_none());
    }

    #[tokio::test]
    async fn exhausted_retries_skip_the_reading() {
        let transport = Arc::new(MockMeshTransport::new("!aabbccdd"));
        transport.set_fail_sends(true);
        let mut sink = MeshtasticSink::new(transport.clone(), config(2), 2);

        sink.submit(&Reading::new("unit-01", Utc::now())).await;

        assert!(transport.sent().is_empty());
        assert!(!sink.health().is_connected());

        // The next reading is attempted fresh once the radio recovers
        transport.set_fail_sends(false);
        sink.submit(&Reading::new("unit-01", Utc::now())).await;
        assert_eq!(transport.sent().len(), 1);
        assert!(sink.health().is_connected());
    }
}

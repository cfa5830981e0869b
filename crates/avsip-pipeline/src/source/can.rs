//! CAN bus source adapter

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use avsip_can::SignalDescriptor;
use avsip_core::{AdapterError, ConnectionHealth, HealthTracker};

use crate::config::CanConfig;
use crate::transport::CanTransport;

/// Drains raw frames from the bus once per tick and decodes them
///
/// The whole drain is bounded by the configured receive timeout; within the
/// window every available frame is decoded and its signals merged
/// last-write-wins. No frames in the window is not an error - the bus may
/// simply be quiet, or carrying only frames no descriptor matches.
pub struct CanSource {
    transport: Arc<dyn CanTransport>,
    config: CanConfig,
    descriptors: Vec<SignalDescriptor>,
    health: HealthTracker,
}

impl CanSource {
    pub fn new(
        transport: Arc<dyn CanTransport>,
        config: CanConfig,
        descriptors: Vec<SignalDescriptor>,
    ) -> Self {
        let health = HealthTracker::new(config.retry_policy());
        Self {
            transport,
            config,
            descriptors,
            health,
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.state()
    }

    pub async fn connect(&mut self) {
        self.health.on_connecting();
        match self.transport.connect().await {
            Ok(()) => {
                tracing::info!(
                    channel = %self.config.channel,
                    signals = self.descriptors.len(),
                    "CAN interface connected"
                );
                self.health.on_connected();
            }
            Err(e) => {
                let classified = AdapterError::from(e);
                self.health.on_failure(classified.to_string());
                tracing::warn!(error = %classified, "CAN connect failed");
            }
        }
    }

    /// Drain and decode all frames available within the receive window
    pub async fn poll(&mut self) -> BTreeMap<String, f64> {
        if !self.health.is_connected() {
            if self.health.reconnect_due(Instant::now()) {
                self.connect().await;
            }
            if !self.health.is_connected() {
                return BTreeMap::new();
            }
        }

        let mut values = BTreeMap::new();
        let mut frames_seen = 0u32;
        let deadline = Instant::now() + self.config.receive_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.transport.receive(remaining).await {
                Ok(Some(frame)) => {
                    frames_seen += 1;
                    let decoded = avsip_can::decode(frame.id, &frame.data, &self.descriptors);
                    if !decoded.is_empty() {
                        tracing::trace!(
                            id = format!("0x{:X}", frame.id),
                            data = %hex::encode(&frame.data),
                            signals = decoded.len(),
                            "Decoded CAN frame"
                        );
                    }
                    values.extend(decoded);
                }
                Ok(None) => break,
                Err(e) => {
                    let classified = AdapterError::from(e);
                    self.health.on_failure(classified.to_string());
                    tracing::warn!(
                        error = %classified,
                        retry_count = self.health.state().retry_count(),
                        "CAN receive failed"
                    );
                    return values;
                }
            }
        }

        self.health.on_connected();
        if frames_seen > 0 {
            tracing::debug!(frames = frames_seen, signals = values.len(), "CAN drain complete");
        }
        values
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
        self.health.on_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CanConfig, CanSignalConfig};
    use crate::transport::mock::MockCanTransport;
    use avsip_can::ByteOrder;

    fn descriptors() -> Vec<SignalDescriptor> {
        let config = CanConfig {
            signals: vec![
                CanSignalConfig {
                    id: "0x123".into(),
                    name: "EngineSpeed".into(),
                    start_byte: 0,
                    length_bytes: 2,
                    byte_order: ByteOrder::Big,
                    is_signed: false,
                    scale: 0.25,
                    offset: 0.0,
                },
                CanSignalConfig {
                    id: "0x123".into(),
                    name: "CoolantTemp".into(),
                    start_byte: 2,
                    length_bytes: 1,
                    byte_order: ByteOrder::Big,
                    is_signed: false,
                    scale: 1.0,
                    offset: -40.0,
                },
            ],
            ..CanConfig::default()
        };
        config.descriptors().unwrap()
    }

    fn config() -> CanConfig {
        CanConfig {
            enabled: true,
            receive_timeout_ms: 50,
            connection_retries: 1,
            retry_delay_seconds: 0,
            ..CanConfig::default()
        }
    }

    #[tokio::test]
    async fn drains_and_decodes_queued_frames() {
        let transport = Arc::new(MockCanTransport::new());
        let mut source = CanSource::new(transport.clone(), config(), descriptors());
        source.connect().await;

        transport.inject_frame(0x123, &[0x1C, 0x20, 0x5A]);
        // An unmatched frame on the bus is silently ignored
        transport.inject_frame(0x7FF, &[0x01, 0x02]);

        let values = source.poll().await;
        assert_eq!(values.get("EngineSpeed"), Some(&1800.0));
        assert_eq!(values.get("CoolantTemp"), Some(&50.0));
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn quiet_bus_is_not_an_error() {
        let transport = Arc::new(MockCanTransport::new());
        let mut source = CanSource::new(transport, config(), descriptors());
        source.connect().await;

        let values = source.poll().await;
        assert!(values.is_empty());
        assert!(source.health().is_connected());
    }

    #[tokio::test]
    async fn later_frame_wins_for_repeated_signals() {
        let transport = Arc::new(MockCanTransport::new());
        let mut source = CanSource::new(transport.clone(), config(), descriptors());
        source.connect().await;

        transport.inject_frame(0x123, &[0x01, 0x90, 0x50]);
        transport.inject_frame(0x123, &[0x0B, 0xB8, 0x5A]);

        let values = source.poll().await;
        assert_eq!(values.get("EngineSpeed"), Some(&750.0));
        assert_eq!(values.get("CoolantTemp"), Some(&50.0));
    }

    #[tokio::test]
    async fn bus_error_degrades_health_and_keeps_partial_values() {
        let transport = Arc::new(MockCanTransport::new());
        let mut source = CanSource::new(transport.clone(), config(), descriptors());
        source.connect().await;

        transport.inject_frame(0x123, &[0x01, 0x90, 0x50]);
        let values = source.poll().await;
        assert_eq!(values.len(), 2);

        transport.set_fail_receives(true);
        let values = source.poll().await;
        assert!(values.is_empty());
        assert!(!source.health().is_connected());
    }
}

//! MQTT broker sink

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet, QoS,
    TlsConfiguration, Transport,
};
use tokio::task::JoinHandle;

use avsip_core::{AdapterError, ConnectionHealth, HealthTracker, Reading, RetryPolicy};

use super::Sink;
use crate::config::MqttConfig;
use crate::transport::TransportError;

/// Pause between event-loop polls after a connection error; the client
/// re-dials on the next poll
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Publishes each reading as flat JSON under the configured topic prefix
///
/// The broker connection is persistent and owned by an internal event pump;
/// connect/disconnect events from the broker arrive as explicit state
/// transitions on this sink's own health machine. A last-will marks the
/// device "offline" (retained) on ungraceful disconnect, and every
/// successful connect publishes the retained "online" payload. Publishes
/// while disconnected are dropped, never queued - there is no
/// store-and-forward guarantee.
pub struct MqttSink {
    client: AsyncClient,
    config: MqttConfig,
    data_topic: String,
    precision: u8,
    health: Arc<Mutex<HealthTracker>>,
    pump: Option<JoinHandle<()>>,
    dropped: u64,
}

impl MqttSink {
    /// Build the sink and start its event pump (needs a tokio runtime)
    pub fn new(
        config: MqttConfig,
        device_id: &str,
        precision: u8,
    ) -> Result<Self, TransportError> {
        let client_id = format!("avsip-{}", device_id);
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_seconds));

        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        if config.tls.enabled {
            options.set_transport(Transport::Tls(build_tls(&config)?));
        }

        let lwt_topic = format!(
            "{}/{}/{}",
            config.topic_prefix, device_id, config.lwt.topic_suffix
        );
        options.set_last_will(LastWill::new(
            lwt_topic.clone(),
            config.lwt.payload_offline.clone(),
            qos_level(config.lwt.qos),
            config.lwt.retain,
        ));

        let data_topic = format!(
            "{}/{}/{}",
            config.topic_prefix, device_id, config.data_sub_topic
        );

        let (client, eventloop) = AsyncClient::new(options, 16);

        // The pump owns reconnection, so the policy ceiling only shapes how
        // the health snapshot degrades between successful connects
        let health = Arc::new(Mutex::new(HealthTracker::new(RetryPolicy::new(
            3,
            RECONNECT_PAUSE,
        ))));

        let pump = tokio::spawn(pump_events(
            eventloop,
            client.clone(),
            Arc::clone(&health),
            lwt_topic,
            config.lwt.clone(),
        ));

        Ok(Self {
            client,
            config,
            data_topic,
            precision,
            health,
            pump: Some(pump),
            dropped: 0,
        })
    }
}

/// Drive the broker connection and translate its events into health
/// transitions
async fn pump_events(
    mut eventloop: EventLoop,
    client: AsyncClient,
    health: Arc<Mutex<HealthTracker>>,
    lwt_topic: String,
    lwt: crate::config::MqttLwtConfig,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    tracing::info!("Connected to MQTT broker");
                    health.lock().on_connected();
                    // Retained online marker, counterpart of the last-will
                    if let Err(e) = client
                        .publish(
                            lwt_topic.as_str(),
                            qos_level(lwt.qos),
                            lwt.retain,
                            lwt.payload_online.clone(),
                        )
                        .await
                    {
                        tracing::warn!(error = %e, "Failed to publish online status");
                    }
                } else {
                    tracing::warn!(code = ?ack.code, "MQTT broker refused connection");
                    health.lock().on_failure(format!("refused: {:?}", ack.code));
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("MQTT broker disconnected");
                health.lock().on_failure("broker disconnect");
            }
            Ok(_) => {}
            Err(e) => {
                {
                    let classified = AdapterError::TransportUnavailable(e.to_string());
                    let mut tracker = health.lock();
                    tracker.on_failure(classified.to_string());
                    tracing::warn!(
                        error = %classified,
                        retry_count = tracker.state().retry_count(),
                        "MQTT connection error"
                    );
                }
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

fn build_tls(config: &MqttConfig) -> Result<TlsConfiguration, TransportError> {
    let read = |path: &str| {
        std::fs::read(path).map_err(|e| {
            TransportError::InvalidConfig(format!("Cannot read TLS file {}: {}", path, e))
        })
    };

    let ca = match &config.tls.ca_cert {
        Some(path) => read(path)?,
        None => Vec::new(),
    };

    let client_auth = match (&config.tls.client_cert, &config.tls.client_key) {
        (Some(cert), Some(key)) => Some((read(cert)?, read(key)?)),
        (None, None) => None,
        _ => {
            return Err(TransportError::InvalidConfig(
                "mqtt.tls requires both client_cert and client_key, or neither".to_string(),
            ))
        }
    };

    Ok(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    })
}

fn qos_level(qos: u8) -> QoS {
    match qos {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

#[async_trait]
impl Sink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn submit(&mut self, reading: &Reading) {
        if !self.health.lock().is_connected() {
            self.dropped += 1;
            tracing::debug!(
                dropped = self.dropped,
                "MQTT disconnected, dropping reading"
            );
            return;
        }

        let payload = reading.to_wire_json(self.precision).to_string();
        match self
            .client
            .publish(
                self.data_topic.as_str(),
                qos_level(self.config.qos),
                self.config.retain,
                payload,
            )
            .await
        {
            Ok(()) => {
                tracing::debug!(topic = %self.data_topic, "Reading published to MQTT");
            }
            Err(e) => {
                let classified = AdapterError::Delivery(e.to_string());
                self.health.lock().on_failure(classified.to_string());
                tracing::warn!(error = %classified, "MQTT publish failed");
            }
        }
    }

    fn health(&self) -> ConnectionHealth {
        self.health.lock().state()
    }

    async fn close(&mut self) {
        if self.dropped > 0 {
            tracing::info!(dropped = self.dropped, "Readings dropped while MQTT was down");
        }
        let _ = self.client.disconnect().await;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.health.lock().on_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> MqttConfig {
        MqttConfig {
            enabled: true,
            // Nothing listens here; the pump keeps failing to connect
            host: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        }
    }

    #[test]
    fn qos_levels_map() {
        assert_eq!(qos_level(0), QoS::AtMostOnce);
        assert_eq!(qos_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_level(2), QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn topics_are_scoped_by_device_id() {
        let mut sink = MqttSink::new(config(), "unit-01", 2).unwrap();
        assert_eq!(sink.data_topic, "vehicle/avsip/unit-01/telemetry");
        sink.close().await;
    }

    #[tokio::test]
    async fn publish_while_disconnected_drops_without_blocking() {
        let mut sink = MqttSink::new(config(), "unit-01", 2).unwrap();

        sink.submit(&Reading::new("unit-01", Utc::now())).await;
        sink.submit(&Reading::new("unit-01", Utc::now())).await;

        assert_eq!(sink.dropped, 2);
        assert!(!sink.health().is_connected());
        sink.close().await;
    }

    #[test]
    fn tls_requires_matching_cert_and_key() {
        let mut cfg = config();
        cfg.tls.enabled = true;
        cfg.tls.client_cert = Some("/tmp/cert.pem".to_string());

        let err = build_tls(&cfg).unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }
}

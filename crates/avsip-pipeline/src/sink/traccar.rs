//! Traccar tracking-server sink (OsmAnd HTTP protocol)

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use url::Url;

use avsip_core::units::{mps_to_knots, round_to, sanitize_key};
use avsip_core::{
    AdapterError, ConnectionHealth, HealthTracker, ObdValue, Position, Reading, RetryPolicy,
};

use super::Sink;
use crate::config::{TraccarConfig, TraccarIdSource};
use crate::transport::TransportError;

/// One position-report HTTP call
///
/// Abstracted so tests can count and deny calls without a server.
#[async_trait]
pub trait PositionClient: Send + Sync {
    /// Send one report; returns the HTTP status code
    async fn send(
        &self,
        url: &Url,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// Production client backed by reqwest
pub struct HttpPositionClient {
    client: reqwest::Client,
}

impl HttpPositionClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPositionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionClient for HttpPositionClient {
    async fn send(
        &self,
        url: &Url,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(url.clone())
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::SendFailed(e.to_string())
                }
            })?;

        Ok(response.status().as_u16())
    }
}

/// Allows one trigger per interval; later attempts within the window fail
struct RateLimiter {
    interval: Duration,
    last_triggered: Option<Instant>,
}

impl RateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_triggered: None,
        }
    }

    fn try_trigger(&mut self) -> bool {
        let now = Instant::now();
        match self.last_triggered {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_triggered = Some(now);
                true
            }
        }
    }
}

/// Reports positions to a Traccar server, throttled independently of the
/// acquisition interval
///
/// Readings without a fix are skipped for this sink only; the server cannot
/// place a report without coordinates. A failed or non-2xx request is logged
/// and not retried - the next eligible reading supersedes it.
pub struct TraccarSink {
    client: Arc<dyn PositionClient>,
    config: TraccarConfig,
    device_id: String,
    url: Url,
    limiter: RateLimiter,
    health: HealthTracker,
}

impl TraccarSink {
    pub fn new(
        client: Arc<dyn PositionClient>,
        config: TraccarConfig,
        pipeline_device_id: &str,
    ) -> Result<Self, TransportError> {
        let device_id = match config.device_id_source {
            TraccarIdSource::Pipeline => pipeline_device_id.to_string(),
            TraccarIdSource::Custom => config
                .custom_device_id
                .clone()
                .ok_or_else(|| {
                    TransportError::InvalidConfig(
                        "traccar.custom_device_id missing for custom id source".to_string(),
                    )
                })?,
        };

        let scheme = if config.use_tls { "https" } else { "http" };
        let url = Url::parse(&format!(
            "{}://{}:{}{}",
            scheme, config.host, config.port, config.http_path
        ))
        .map_err(|e| TransportError::InvalidConfig(format!("Invalid Traccar URL: {}", e)))?;

        let limiter = RateLimiter::new(config.report_interval());
        // No mid-tick retries; the next eligible reading supersedes a failure
        let health = HealthTracker::new(RetryPolicy::new(0, config.report_interval()));

        Ok(Self {
            client,
            config,
            device_id,
            url,
            limiter,
            health,
        })
    }

    /// OsmAnd query parameters for one reading
    fn osmand_params(&self, reading: &Reading, position: &Position) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();
        params.push(("id".into(), self.device_id.clone()));
        params.push(("timestamp".into(), reading.timestamp.timestamp().to_string()));
        params.push(("lat".into(), format!("{:.6}", position.latitude)));
        params.push(("lon".into(), format!("{:.6}", position.longitude)));

        if let Some(altitude) = position.altitude_m {
            params.push(("altitude".into(), format_number(altitude)));
        }
        if let Some(speed_mps) = position.speed_mps {
            let speed = if self.config.convert_speed_to_knots {
                mps_to_knots(speed_mps)
            } else {
                speed_mps
            };
            params.push(("speed".into(), format_number(speed)));
        }
        if let Some(course) = position.course_deg {
            params.push(("bearing".into(), format_number(course)));
        }
        if let Some(satellites) = position.satellites {
            params.push(("sat".into(), satellites.to_string()));
        }

        for (name, value) in &reading.obd_values {
            let text = match value {
                ObdValue::Number(n) => format_number(*n),
                ObdValue::Text(s) => s.clone(),
            };
            params.push((sanitize_key(name), text));
        }

        // Prefixed to keep CAN signals from colliding with OBD attributes
        for (name, value) in &reading.can_values {
            params.push((format!("can_{}", sanitize_key(name)), format_number(*value)));
        }

        if !reading.dtc_codes.is_empty() {
            params.push(("dtcs".into(), reading.dtc_codes.join(",")));
        }

        params
    }
}

/// Compact decimal formatting for query parameters
fn format_number(value: f64) -> String {
    let rounded = round_to(value, 2);
    if (rounded - rounded.round()).abs() < f64::EPSILON {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

#[async_trait]
impl Sink for TraccarSink {
    fn name(&self) -> &'static str {
        "traccar"
    }

    async fn submit(&mut self, reading: &Reading) {
        let Some(position) = &reading.position else {
            tracing::debug!("Reading has no fix, skipping Traccar report");
            return;
        };

        if !self.limiter.try_trigger() {
            tracing::debug!("Traccar report throttled");
            return;
        }

        let params = self.osmand_params(reading, position);
        match self
            .client
            .send(&self.url, &params, self.config.request_timeout())
            .await
        {
            Ok(status) if (200..300).contains(&status) => {
                tracing::debug!(status, "Position reported to Traccar");
                self.health.on_connected();
            }
            Ok(status) => {
                let classified = AdapterError::Delivery(format!("HTTP {}", status));
                self.health.on_failure(classified.to_string());
                tracing::warn!(error = %classified, "Traccar rejected the report");
            }
            Err(e) => {
                let classified = AdapterError::from(e);
                self.health.on_failure(classified.to_string());
                tracing::warn!(error = %classified, "Traccar report failed");
            }
        }
    }

    fn health(&self) -> ConnectionHealth {
        self.health.state()
    }

    async fn close(&mut self) {
        self.health.on_closed();
    }
}

//! OBD-II source adapter

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use avsip_core::{AdapterError, ConnectionHealth, HealthTracker, ObdValue};

use crate::config::ObdConfig;
use crate::transport::{ObdTransport, TransportError};

/// What one OBD poll produced
#[derive(Debug, Clone, PartialEq)]
pub enum ObdSample {
    /// Adapter reachable but the vehicle is not running; no queries were
    /// issued (a powered-off ECU must not be queried)
    NotRunning,
    /// Queried values and trouble codes; either may be empty
    Data {
        values: BTreeMap<String, ObdValue>,
        dtc_codes: Vec<String>,
    },
    /// The transport is down this tick
    Unavailable,
}

/// Polls a set of configured OBD commands once per tick
///
/// At connect time the configured command list is filtered down to what the
/// vehicle actually supports; unsupported commands are logged once and never
/// queried again. A single command failing mid-tick is excluded from that
/// tick's values without affecting the rest.
pub struct ObdSource {
    transport: Arc<dyn ObdTransport>,
    config: ObdConfig,
    health: HealthTracker,
    /// Supported subset of the configured commands, resolved at connect
    commands: Vec<String>,
}

impl ObdSource {
    pub fn new(transport: Arc<dyn ObdTransport>, config: ObdConfig) -> Self {
        let health = HealthTracker::new(config.retry_policy());
        Self {
            transport,
            config,
            health,
            commands: Vec::new(),
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.state()
    }

    /// Attempt to connect and resolve the supported command set
    pub async fn connect(&mut self) {
        self.health.on_connecting();

        let connect = tokio::time::timeout(self.config.connection_timeout(), async {
            self.transport.connect().await?;
            self.transport
                .supported_commands(&self.config.commands)
                .await
        })
        .await;

        match connect {
            Ok(Ok(supported)) => {
                for requested in &self.config.commands {
                    if !supported.contains(requested) {
                        tracing::warn!(command = %requested, "OBD command not supported by vehicle");
                    }
                }
                tracing::info!(commands = ?supported, "OBD adapter connected");
                self.commands = supported;
                self.health.on_connected();
            }
            Ok(Err(e)) => {
                let classified = AdapterError::from(e);
                self.health.on_failure(classified.to_string());
                tracing::warn!(
                    error = %classified,
                    retry_count = self.health.state().retry_count(),
                    "OBD connect failed"
                );
            }
            Err(_) => {
                let classified = AdapterError::Timeout(format!(
                    "connect exceeded {}s",
                    self.config.connection_timeout_seconds
                ));
                self.health.on_failure(classified.to_string());
                tracing::warn!(error = %classified, "OBD connect timed out");
            }
        }
    }

    /// Poll all supported commands and DTCs
    pub async fn poll(&mut self) -> ObdSample {
        if !self.health.is_connected() {
            if self.health.reconnect_due(Instant::now()) {
                self.connect().await;
            }
            if !self.health.is_connected() {
                return ObdSample::Unavailable;
            }
        }

        match self.bounded(self.transport.is_running()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Vehicle not running, skipping OBD queries");
                return ObdSample::NotRunning;
            }
            Err(e) => {
                self.record_failure("is_running", &e);
                return ObdSample::Unavailable;
            }
        }

        let mut values = BTreeMap::new();
        for command in self.commands.clone() {
            match self.bounded(self.transport.query(&command)).await {
                Ok(value) => {
                    values.insert(command, value);
                }
                Err(e) if e.is_connection_loss() => {
                    self.record_failure("query", &e);
                    return ObdSample::Unavailable;
                }
                Err(e) => {
                    // One command failing is recorded and excluded, never escalated
                    tracing::debug!(command = %command, error = %e, "OBD query failed");
                }
            }
        }

        let mut dtc_codes = Vec::new();
        if self.config.include_dtc_codes {
            match self.bounded(self.transport.read_dtc_codes()).await {
                Ok(codes) => {
                    if !codes.is_empty() {
                        tracing::info!(dtcs = ?codes, "Active trouble codes present");
                    }
                    dtc_codes = codes;
                }
                Err(e) if e.is_connection_loss() => {
                    self.record_failure("read_dtc_codes", &e);
                    return ObdSample::Unavailable;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "DTC read failed");
                }
            }
        }

        self.health.on_connected();
        ObdSample::Data { values, dtc_codes }
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
        self.health.on_closed();
    }

    /// Bound one transport call by the configured query timeout
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match tokio::time::timeout(self.config.query_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(format!(
                "OBD operation exceeded {}s",
                self.config.query_timeout_seconds
            ))),
        }
    }

    fn record_failure(&mut self, operation: &str, error: &TransportError) {
        let classified = AdapterError::from(error.clone());
        self.health.on_failure(classified.to_string());
        tracing::warn!(
            operation,
            error = %classified,
            retry_count = self.health.state().retry_count(),
            "OBD transport failure"
        );
    }
}

//! Pipeline configuration
//!
//! The whole pipeline is configured from one TOML document with
//! `general`/`meshtastic`/`obd`/`can`/`mqtt`/`traccar` sections. The loaded
//! [`Config`] is validated once, synchronously, before the scheduler starts,
//! and is passed immutably into each component at construction - no
//! component re-reads configuration at runtime.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use avsip_can::{parse_frame_id, validate_descriptors, ByteOrder, SignalDescriptor};
use avsip_core::RetryPolicy;

/// Configuration errors detected at startup; all of them are fatal
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Descriptor(#[from] avsip_can::DescriptorError),
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub meshtastic: MeshtasticConfig,
    #[serde(default)]
    pub obd: ObdConfig,
    #[serde(default)]
    pub can: CanConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub traccar: TraccarConfig,
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate cross-field rules; called before the scheduler starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.data_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "general.data_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.general.wire_precision > 6 {
            return Err(ConfigError::Invalid(
                "general.wire_precision must be at most 6".into(),
            ));
        }
        if self.general.device_id_source == DeviceIdSource::Custom
            && self.general.custom_device_id.is_none()
        {
            return Err(ConfigError::Invalid(
                "general.custom_device_id is required when device_id_source is 'custom'".into(),
            ));
        }

        if self.mqtt.enabled {
            if self.mqtt.host.is_empty() {
                return Err(ConfigError::Invalid(
                    "mqtt.host is required when mqtt is enabled".into(),
                ));
            }
            if self.mqtt.qos > 2 || self.mqtt.lwt.qos > 2 {
                return Err(ConfigError::Invalid("mqtt qos must be 0, 1 or 2".into()));
            }
        }

        if self.traccar.enabled {
            if self.traccar.host.is_empty() {
                return Err(ConfigError::Invalid(
                    "traccar.host is required when traccar is enabled".into(),
                ));
            }
            if self.traccar.device_id_source == TraccarIdSource::Custom
                && self.traccar.custom_device_id.is_none()
            {
                return Err(ConfigError::Invalid(
                    "traccar.custom_device_id is required when device_id_source is 'custom'"
                        .into(),
                ));
            }
            if self.traccar.report_interval_seconds == 0 {
                return Err(ConfigError::Invalid(
                    "traccar.report_interval_seconds must be greater than zero".into(),
                ));
            }
        }

        if self.can.enabled {
            let descriptors = self.can.descriptors()?;
            validate_descriptors(&descriptors)?;
        }

        Ok(())
    }
}

// =============================================================================
// General
// =============================================================================

/// Where the pipeline's stable device id comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceIdSource {
    /// Use the mesh-radio node identity
    #[default]
    MeshtasticNodeId,
    /// Use `custom_device_id`
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Acquisition tick interval
    #[serde(default = "default_data_interval")]
    pub data_interval_seconds: u64,
    #[serde(default)]
    pub device_id_source: DeviceIdSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_device_id: Option<String>,
    /// Decimal places for numeric values in wire payloads
    #[serde(default = "default_wire_precision")]
    pub wire_precision: u8,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_interval_seconds: default_data_interval(),
            device_id_source: DeviceIdSource::default(),
            custom_device_id: None,
            wire_precision: default_wire_precision(),
        }
    }
}

impl GeneralConfig {
    pub fn data_interval(&self) -> Duration {
        Duration::from_secs(self.data_interval_seconds)
    }
}

fn default_data_interval() -> u64 {
    10
}

fn default_wire_precision() -> u8 {
    2
}

// =============================================================================
// Meshtastic
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshtasticConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Transport kind ("mock"; hardware backends plug in via the trait)
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Application port the telemetry broadcast goes out on
    #[serde(default = "default_data_port")]
    pub data_port_num: u32,
    #[serde(default = "default_mesh_connect_timeout")]
    pub connection_timeout_seconds: u64,
    /// Bounded retries per reading; on exhaustion the reading is skipped
    #[serde(default = "default_send_retries")]
    pub send_retries: u32,
    #[serde(default = "default_send_retry_delay")]
    pub send_retry_delay_seconds: u64,
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: default_transport(),
            data_port_num: default_data_port(),
            connection_timeout_seconds: default_mesh_connect_timeout(),
            send_retries: default_send_retries(),
            send_retry_delay_seconds: default_send_retry_delay(),
        }
    }
}

impl MeshtasticConfig {
    pub fn send_retry_delay(&self) -> Duration {
        Duration::from_secs(self.send_retry_delay_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.send_retries, self.send_retry_delay())
    }
}

fn default_transport() -> String {
    "mock".to_string()
}

fn default_data_port() -> u32 {
    250
}

fn default_mesh_connect_timeout() -> u64 {
    10
}

fn default_send_retries() -> u32 {
    2
}

fn default_send_retry_delay() -> u64 {
    3
}

// =============================================================================
// OBD
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObdConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Serial port of the adapter; None lets the transport auto-detect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baudrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Command names to query each tick (e.g. "RPM", "SPEED")
    #[serde(default = "default_obd_commands")]
    pub commands: Vec<String>,
    #[serde(default = "default_true")]
    pub include_dtc_codes: bool,
    #[serde(default = "default_obd_connect_timeout")]
    pub connection_timeout_seconds: u64,
    /// Bound for a single command query
    #[serde(default = "default_query_timeout")]
    pub query_timeout_seconds: u64,
    #[serde(default = "default_connection_retries")]
    pub connection_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for ObdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: default_transport(),
            port: None,
            baudrate: None,
            protocol: None,
            commands: default_obd_commands(),
            include_dtc_codes: true,
            connection_timeout_seconds: default_obd_connect_timeout(),
            query_timeout_seconds: default_query_timeout(),
            connection_retries: default_connection_retries(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

impl ObdConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connection_retries,
            Duration::from_secs(self.retry_delay_seconds),
        )
    }
}

fn default_obd_commands() -> Vec<String> {
    vec!["RPM".into(), "SPEED".into(), "COOLANT_TEMP".into()]
}

fn default_obd_connect_timeout() -> u64 {
    30
}

fn default_query_timeout() -> u64 {
    5
}

fn default_connection_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

// =============================================================================
// CAN
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Transport kind ("mock" or "socketcan")
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_can_channel")]
    pub channel: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Width of the per-tick frame drain window
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_connection_retries")]
    pub connection_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    /// Signal extraction rules; several may reference the same frame id
    #[serde(default)]
    pub signals: Vec<CanSignalConfig>,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: default_transport(),
            channel: default_can_channel(),
            bitrate: default_bitrate(),
            receive_timeout_ms: default_receive_timeout_ms(),
            connection_retries: default_connection_retries(),
            retry_delay_seconds: default_retry_delay(),
            signals: Vec::new(),
        }
    }
}

impl CanConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connection_retries,
            Duration::from_secs(self.retry_delay_seconds),
        )
    }

    /// Resolve the configured signal rules into validated descriptors
    pub fn descriptors(&self) -> Result<Vec<SignalDescriptor>, avsip_can::DescriptorError> {
        self.signals.iter().map(CanSignalConfig::to_descriptor).collect()
    }
}

/// One configured CAN signal (TOML shape; frame id as hex string)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanSignalConfig {
    /// Frame id, hex with 0x prefix or decimal (e.g. "0x123")
    pub id: String,
    pub name: String,
    pub start_byte: usize,
    pub length_bytes: usize,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub is_signed: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

impl CanSignalConfig {
    pub fn to_descriptor(&self) -> Result<SignalDescriptor, avsip_can::DescriptorError> {
        Ok(SignalDescriptor {
            frame_id: parse_frame_id(&self.id)?,
            signal_name: self.name.clone(),
            start_byte: self.start_byte,
            length_bytes: self.length_bytes,
            byte_order: self.byte_order,
            is_signed: self.is_signed,
            scale: self.scale,
            offset: self.offset,
        })
    }
}

fn default_can_channel() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    500000
}

fn default_receive_timeout_ms() -> u64 {
    200
}

fn default_scale() -> f64 {
    1.0
}

// =============================================================================
// MQTT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Sub-topic the telemetry payload is published under
    #[serde(default = "default_data_sub_topic")]
    pub data_sub_topic: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,
    #[serde(default)]
    pub tls: MqttTlsConfig,
    #[serde(default)]
    pub lwt: MqttLwtConfig,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
            data_sub_topic: default_data_sub_topic(),
            qos: 0,
            retain: false,
            keepalive_seconds: default_keepalive(),
            tls: MqttTlsConfig::default(),
            lwt: MqttLwtConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MqttTlsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// PEM CA bundle; None uses no custom CA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

/// Last Will and Testament settings
///
/// The broker publishes `payload_offline` on ungraceful disconnect; the sink
/// publishes `payload_online` (retained) on every successful connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttLwtConfig {
    #[serde(default = "default_lwt_suffix")]
    pub topic_suffix: String,
    #[serde(default = "default_lwt_online")]
    pub payload_online: String,
    #[serde(default = "default_lwt_offline")]
    pub payload_offline: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_true")]
    pub retain: bool,
}

impl Default for MqttLwtConfig {
    fn default() -> Self {
        Self {
            topic_suffix: default_lwt_suffix(),
            payload_online: default_lwt_online(),
            payload_offline: default_lwt_offline(),
            qos: 0,
            retain: true,
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "vehicle/avsip".to_string()
}

fn default_data_sub_topic() -> String {
    "telemetry".to_string()
}

fn default_keepalive() -> u64 {
    60
}

fn default_lwt_suffix() -> String {
    "status".to_string()
}

fn default_lwt_online() -> String {
    "online".to_string()
}

fn default_lwt_offline() -> String {
    "offline".to_string()
}

// =============================================================================
// Traccar
// =============================================================================

/// Which device id the Traccar server sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraccarIdSource {
    /// Reuse the pipeline device id
    #[default]
    Pipeline,
    /// Use `custom_device_id` (the id registered with the server)
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraccarConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    /// OsmAnd protocol port
    #[serde(default = "default_traccar_port")]
    pub port: u16,
    #[serde(default = "default_http_path")]
    pub http_path: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub device_id_source: TraccarIdSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_device_id: Option<String>,
    /// Reporting throttle, independent of the acquisition interval
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub convert_speed_to_knots: bool,
}

impl Default for TraccarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_traccar_port(),
            http_path: default_http_path(),
            use_tls: false,
            device_id_source: TraccarIdSource::default(),
            custom_device_id: None,
            report_interval_seconds: default_report_interval(),
            request_timeout_seconds: default_request_timeout(),
            convert_speed_to_knots: true,
        }
    }
}

impl TraccarConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_traccar_port() -> u16 {
    5055
}

fn default_http_path() -> String {
    "/".to_string()
}

fn default_report_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_parse_and_validate() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.general.data_interval_seconds, 10);
        assert!(config.meshtastic.enabled);
        assert!(!config.obd.enabled);
        assert!(!config.mqtt.enabled);
    }

    #[test]
    fn full_document_parses() {
        let config = Config::from_toml_str(
            r#"
            [general]
            data_interval_seconds = 5
            device_id_source = "custom"
            custom_device_id = "truck-17"

            [obd]
            enabled = true
            commands = ["RPM", "SPEED"]

            [can]
            enabled = true
            channel = "vcan0"

            [[can.signals]]
            id = "0x123"
            name = "EngineSpeed"
            start_byte = 0
            length_bytes = 2
            scale = 0.25

            [[can.signals]]
            id = "0x123"
            name = "CoolantTemp"
            start_byte = 2
            length_bytes = 1
            offset = -40.0

            [mqtt]
            enabled = true
            host = "broker.example.com"
            qos = 1

            [traccar]
            enabled = true
            host = "traccar.example.com"
            report_interval_seconds = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.general.custom_device_id.as_deref(), Some("truck-17"));
        let descriptors = config.can.descriptors().unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].frame_id, 0x123);
        assert_eq!(descriptors[1].offset, -40.0);
        assert_eq!(config.mqtt.qos, 1);
    }

    #[test]
    fn zero_interval_rejected() {
        let err = Config::from_toml_str("[general]\ndata_interval_seconds = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn custom_id_requires_value() {
        let err = Config::from_toml_str("[general]\ndevice_id_source = \"custom\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn mqtt_requires_host() {
        let err = Config::from_toml_str("[mqtt]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn mqtt_rejects_bad_qos() {
        let err =
            Config::from_toml_str("[mqtt]\nenabled = true\nhost = \"h\"\nqos = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn traccar_requires_host() {
        let err = Config::from_toml_str("[traccar]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_descriptor_rejected() {
        let err = Config::from_toml_str(
            r#"
            [can]
            enabled = true

            [[can.signals]]
            id = "0x123"
            name = "TooWide"
            start_byte = 6
            length_bytes = 4
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Descriptor(_)));
    }

    #[test]
    fn loads_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\ndata_interval_seconds = 7").unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.general.data_interval_seconds, 7);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::from_path("/nonexistent/avsip.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn bad_frame_id_rejected() {
        let err = Config::from_toml_str(
            r#"
            [can]
            enabled = true

            [[can.signals]]
            id = "zz"
            name = "Broken"
            start_byte = 0
            length_bytes = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Descriptor(_)));
    }
}

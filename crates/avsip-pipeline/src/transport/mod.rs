//! Transport layer for the external collaborators
//!
//! The pipeline core only ever talks to its OBD adapter, CAN interface and
//! mesh-radio device through the traits in this module:
//! - Mock transports for testing and hardware-free demo runs
//! - SocketCAN for the CAN bus (Linux only, `socketcan` feature)
//!
//! Hardware OBD and mesh-radio backends plug in through the same traits.
//! Each adapter owns its transport handle exclusively; the one exception is
//! the mesh device, whose single physical link serves both the GPS source
//! and the mesh sink through a shared handle.

mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use error::TransportError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use avsip_core::{ObdValue, Position};

use crate::config::{CanConfig, MeshtasticConfig, ObdConfig};

/// One raw frame received from the CAN bus
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Arbitration id
    pub id: u32,
    /// Payload bytes (0..=8 for classic CAN)
    pub data: Vec<u8>,
}

/// OBD-II adapter as the pipeline needs it
#[async_trait]
pub trait ObdTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Whether the vehicle/engine is currently running
    async fn is_running(&self) -> Result<bool, TransportError>;

    /// Filter the requested command names to those the vehicle supports
    async fn supported_commands(&self, requested: &[String]) -> Result<Vec<String>, TransportError>;

    /// Query one named parameter
    async fn query(&self, command: &str) -> Result<ObdValue, TransportError>;

    /// Read active diagnostic trouble codes
    async fn read_dtc_codes(&self) -> Result<Vec<String>, TransportError>;

    async fn close(&self);
}

/// CAN bus interface as the pipeline needs it
#[async_trait]
pub trait CanTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Receive the next raw frame, or `None` once `timeout` elapses without
    /// one. Never blocks past the timeout.
    async fn receive(&self, timeout: Duration) -> Result<Option<RawFrame>, TransportError>;

    async fn close(&self);
}

/// Mesh-radio device as the pipeline needs it
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Broadcast a payload on a numbered application port
    async fn send(&self, port_num: u32, payload: &[u8]) -> Result<(), TransportError>;

    /// Most recent known device position, if any fix exists
    async fn last_position(&self) -> Result<Option<Position>, TransportError>;

    /// Node identity of the local device
    async fn device_id(&self) -> Result<String, TransportError>;

    /// Largest payload the radio will accept in one send
    fn max_payload_bytes(&self) -> usize;

    async fn close(&self);
}

/// Create an OBD transport based on configuration
pub fn create_obd_transport(config: &ObdConfig) -> Result<Arc<dyn ObdTransport>, TransportError> {
    match config.transport.as_str() {
        "mock" => Ok(Arc::new(mock::MockObdTransport::new())),
        other => Err(TransportError::Unsupported(format!(
            "Unknown OBD transport '{}'",
            other
        ))),
    }
}

/// Create a CAN transport based on configuration
pub fn create_can_transport(config: &CanConfig) -> Result<Arc<dyn CanTransport>, TransportError> {
    match config.transport.as_str() {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        "socketcan" => {
            let adapter = socketcan::SocketCanTransport::new(config)?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        "socketcan" => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        "mock" => Ok(Arc::new(mock::MockCanTransport::new())),
        other => Err(TransportError::Unsupported(format!(
            "Unknown CAN transport '{}'",
            other
        ))),
    }
}

/// Create a mesh transport based on configuration
pub fn create_mesh_transport(
    config: &MeshtasticConfig,
) -> Result<Arc<dyn MeshTransport>, TransportError> {
    match config.transport.as_str() {
        "mock" => Ok(Arc::new(mock::MockMeshTransport::new("!deadbeef"))),
        other => Err(TransportError::Unsupported(format!(
            "Unknown mesh transport '{}'",
            other
        ))),
    }
}

//! SocketCAN transport (Linux only)
//!
//! Wraps a raw SocketCAN socket behind the [`CanTransport`] trait. Reads run
//! on the blocking thread pool with the socket's read timeout as the bound;
//! the interface itself (channel, bitrate) is expected to be configured at
//! the OS level (`ip link set can0 up type can bitrate 500000`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{CanSocket, EmbeddedFrame, Frame, Socket};

use super::{CanTransport, RawFrame, TransportError};
use crate::config::CanConfig;

/// 29-bit extended id mask; SocketCAN carries EFF/RTR/ERR flags in the upper bits
const CAN_ID_MASK: u32 = 0x1FFF_FFFF;

pub struct SocketCanTransport {
    channel: String,
    socket: Mutex<Option<Arc<CanSocket>>>,
}

impl SocketCanTransport {
    pub fn new(config: &CanConfig) -> Result<Self, TransportError> {
        if config.channel.is_empty() {
            return Err(TransportError::InvalidConfig(
                "can.channel must not be empty".to_string(),
            ));
        }
        Ok(Self {
            channel: config.channel.clone(),
            socket: Mutex::new(None),
        })
    }

    fn open_socket(channel: &str) -> Result<CanSocket, TransportError> {
        CanSocket::open(channel).map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to open {}: {}", channel, e))
        })
    }

    fn current_socket(&self) -> Result<Arc<CanSocket>, TransportError> {
        self.socket
            .lock()
            .as_ref()
            .cloned()
            .ok_or(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let socket = Self::open_socket(&self.channel)?;
        tracing::info!(channel = %self.channel, "SocketCAN interface opened");
        *self.socket.lock() = Some(Arc::new(socket));
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<RawFrame>, TransportError> {
        let socket = self.current_socket()?;

        tokio::task::spawn_blocking(move || {
            socket
                .set_read_timeout(timeout)
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

            match socket.read_frame() {
                Ok(frame) => Ok(Some(RawFrame {
                    id: frame.raw_id() & CAN_ID_MASK,
                    data: frame.data().to_vec(),
                })),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    // Window elapsed with no traffic
                    Ok(None)
                }
                Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
            }
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("Task join error: {}", e)))?
    }

    async fn close(&self) {
        if self.socket.lock().take().is_some() {
            tracing::debug!(channel = %self.channel, "SocketCAN interface closed");
        }
    }
}

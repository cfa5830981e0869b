//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Command not supported: {0}")]
    UnsupportedCommand(String),

    #[error("No response: {0}")]
    NoResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Whether this error means the connection itself is gone, as opposed to
    /// a single operation failing on a live connection
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_) | TransportError::ConnectionClosed
        )
    }
}

/// Classify a transport error into the adapter-boundary taxonomy
impl From<TransportError> for avsip_core::AdapterError {
    fn from(e: TransportError) -> Self {
        use avsip_core::AdapterError;

        match e {
            TransportError::ConnectionFailed(_)
            | TransportError::ConnectionClosed
            | TransportError::InvalidConfig(_)
            | TransportError::Unsupported(_) => AdapterError::TransportUnavailable(e.to_string()),
            TransportError::Timeout(m) => AdapterError::Timeout(m),
            TransportError::UnsupportedCommand(m)
            | TransportError::NoResponse(m)
            | TransportError::ReceiveFailed(m) => AdapterError::Protocol(m),
            TransportError::SendFailed(m) => AdapterError::Delivery(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avsip_core::AdapterError;

    #[test]
    fn classification_covers_the_taxonomy() {
        assert!(matches!(
            AdapterError::from(TransportError::ConnectionClosed),
            AdapterError::TransportUnavailable(_)
        ));
        assert!(matches!(
            AdapterError::from(TransportError::Timeout("t".into())),
            AdapterError::Timeout(_)
        ));
        assert!(matches!(
            AdapterError::from(TransportError::NoResponse("n".into())),
            AdapterError::Protocol(_)
        ));
        assert!(matches!(
            AdapterError::from(TransportError::SendFailed("s".into())),
            AdapterError::Delivery(_)
        ));
    }
}

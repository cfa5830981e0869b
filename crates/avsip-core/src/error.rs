//! Common error types for source and sink adapters

use thiserror::Error;

/// Errors that can occur at a source or sink boundary
///
/// All four kinds are absorbed by the owning adapter's health state machine;
/// none of them propagate to the scheduler or dispatcher.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    /// The underlying transport cannot be opened
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// An operation exceeded its configured bound
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Malformed or unexpected response from the transport
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A sink could not confirm transmission
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

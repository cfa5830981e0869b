//! Signal descriptor types and load-time validation
//!
//! A descriptor is a user-configured rule for extracting one named signal
//! from a CAN frame: which frame, which byte window, how to interpret it.
//! Descriptors are immutable after configuration load.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classic CAN payloads carry at most 8 data bytes
pub const MAX_FRAME_BYTES: usize = 8;

/// Errors raised while parsing or validating signal descriptors
///
/// All of these are configuration errors and are fatal at startup.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Invalid CAN frame id '{0}'")]
    InvalidFrameId(String),

    #[error("Signal descriptor at index {0} has an empty name")]
    EmptyName(usize),

    #[error("Signal '{name}': length_bytes must be 1..=8, got {length}")]
    InvalidLength { name: String, length: usize },

    #[error("Signal '{name}': byte window {start}..{end} exceeds the {MAX_FRAME_BYTES}-byte CAN payload")]
    WindowOutOfRange {
        name: String,
        start: usize,
        end: usize,
    },

    #[error("Duplicate signal name '{0}'")]
    DuplicateName(String),
}

/// Byte order of a multi-byte signal window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Rule for extracting one named scalar from a CAN frame
///
/// Decoded value = `raw * scale + offset`, where `raw` is the integer
/// assembled from `length_bytes` bytes starting at `start_byte`, sign
/// extended over exactly `length_bytes * 8` bits when `is_signed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    /// CAN arbitration id this signal is carried in
    pub frame_id: u32,
    /// Name the decoded value is reported under
    pub signal_name: String,
    /// First byte of the signal window within the frame payload
    pub start_byte: usize,
    /// Window width in bytes (1..=8)
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

fn default_scale() -> f64 {
    1.0
}

/// Parse a CAN frame id from string (hex with 0x prefix, or decimal)
pub fn parse_frame_id(s: &str) -> Result<u32, DescriptorError> {
    let trimmed = s.trim();
    let (digits, radix) = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        (hex, 16)
    } else {
        (trimmed, 10)
    };

    u32::from_str_radix(digits, radix).map_err(|_| DescriptorError::InvalidFrameId(s.to_string()))
}

/// Validate a loaded descriptor set
///
/// Rejects empty names, out-of-range windows and duplicate signal names.
/// Multiple descriptors referencing the same frame id are expected and fine.
pub fn validate_descriptors(descriptors: &[SignalDescriptor]) -> Result<(), DescriptorError> {
    let mut seen = std::collections::HashSet::new();

    for (index, d) in descriptors.iter().enumerate() {
        if d.signal_name.trim().is_empty() {
            return Err(DescriptorError::EmptyName(index));
        }
        if d.length_bytes == 0 || d.length_bytes > MAX_FRAME_BYTES {
            return Err(DescriptorError::InvalidLength {
                name: d.signal_name.clone(),
                length: d.length_bytes,
            });
        }
        let end = d.start_byte + d.length_bytes;
        if end > MAX_FRAME_BYTES {
            return Err(DescriptorError::WindowOutOfRange {
                name: d.signal_name.clone(),
                start: d.start_byte,
                end,
            });
        }
        if !seen.insert(d.signal_name.clone()) {
            return Err(DescriptorError::DuplicateName(d.signal_name.clone()));
        }
    }

    Ok(())
}

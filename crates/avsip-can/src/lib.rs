//! avsip-can - CAN signal descriptors and frame decoding
//!
//! Turns raw CAN frames (numeric id + byte payload) into named scalar values
//! using user-configured bit-level descriptors. Decoding is deterministic,
//! total for any input, and never fails a whole frame because of one
//! malformed descriptor.

pub mod decode;
pub mod descriptor;
pub mod precision;

pub use decode::decode;
pub use descriptor::{parse_frame_id, validate_descriptors, ByteOrder, DescriptorError, SignalDescriptor};

//! Source adapters
//!
//! Each source wraps one external transport and contributes partial fields
//! to the per-tick [`avsip_core::Reading`]. Every source owns its own
//! connection-health state machine; a source that is down degrades only its
//! own fields and never stalls the tick.

mod can;
mod gps;
mod obd;

pub use can::CanSource;
pub use gps::GpsSource;
pub use obd::{ObdSample, ObdSource};

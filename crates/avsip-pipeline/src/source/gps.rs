//! GPS source adapter
//!
//! Reads the last known position from the mesh-radio device. Connection
//! management and I/O retries belong to the mesh transport itself, so this
//! source carries no health machine of its own - it simply answers "no fix"
//! when nothing valid is available.

use std::sync::Arc;

use avsip_core::Position;

use crate::transport::MeshTransport;

pub struct GpsSource {
    transport: Arc<dyn MeshTransport>,
}

impl GpsSource {
    pub fn new(transport: Arc<dyn MeshTransport>) -> Self {
        Self { transport }
    }

    /// Most recent valid fix, or `None`
    pub async fn poll(&self) -> Option<Position> {
        match self.transport.last_position().await {
            Ok(Some(position)) => {
                if valid_fix(&position) {
                    Some(position)
                } else {
                    tracing::debug!("Mesh device reports a position without a valid fix");
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Position read from mesh device failed");
                None
            }
        }
    }
}

/// The device zeroes coordinates and fix time while it has no satellite lock
fn valid_fix(position: &Position) -> bool {
    position.fix_time != 0 && (position.latitude != 0.0 || position.longitude != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockMeshTransport;

    fn fix(latitude: f64, longitude: f64, fix_time: i64) -> Position {
        Position {
            latitude,
            longitude,
            altitude_m: Some(12.0),
            speed_mps: Some(13.9),
            course_deg: Some(45.0),
            satellites: Some(7),
            fix_time,
        }
    }

    #[tokio::test]
    async fn returns_valid_fix() {
        let transport = Arc::new(MockMeshTransport::new("!aabbccdd"));
        transport.set_position(Some(fix(40.7128, -74.0060, 1_700_000_000)));

        let source = GpsSource::new(transport);
        let position = source.poll().await.unwrap();
        assert_eq!(position.latitude, 40.7128);
        assert_eq!(position.satellites, Some(7));
    }

    #[tokio::test]
    async fn no_position_is_no_fix() {
        let transport = Arc::new(MockMeshTransport::new("!aabbccdd"));
        let source = GpsSource::new(transport);
        assert!(source.poll().await.is_none());
    }

    #[tokio::test]
    async fn zeroed_fix_is_rejected() {
        let transport = Arc::new(MockMeshTransport::new("!aabbccdd"));
        transport.set_position(Some(fix(0.0, 0.0, 0)));

        let source = GpsSource::new(transport);
        assert!(source.poll().await.is_none());
    }
}

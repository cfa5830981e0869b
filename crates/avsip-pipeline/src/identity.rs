//! Device-id resolution
//!
//! The pipeline's stable device id is resolved exactly once at startup,
//! either from configuration or from the mesh-radio node identity. A
//! missing mesh device produces a timestamped fallback id with a warning -
//! the pipeline still runs, but downstream consumers will see the fallback.

use chrono::Utc;

use crate::config::{DeviceIdSource, GeneralConfig};
use crate::transport::MeshTransport;

pub async fn resolve_device_id(
    general: &GeneralConfig,
    mesh: Option<&dyn MeshTransport>,
) -> String {
    match general.device_id_source {
        DeviceIdSource::Custom => general
            .custom_device_id
            .clone()
            .unwrap_or_else(fallback_id),
        DeviceIdSource::MeshtasticNodeId => match mesh {
            Some(mesh) => match mesh.device_id().await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read mesh node id, using fallback");
                    fallback_id()
                }
            },
            None => {
                tracing::warn!(
                    "device_id_source is meshtastic_node_id but the mesh device is disabled, using fallback"
                );
                fallback_id()
            }
        },
    }
}

fn fallback_id() -> String {
    format!("fallback-{}", Utc::now().timestamp())
}

//! Canonical reading model
//!
//! One [`Reading`] is produced per acquisition tick and handed, immutable, to
//! every enabled sink. Sinks define their own projection to a wire format;
//! the flat JSON projection shared by the MQTT and mesh sinks lives here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::units::{round_to, sanitize_key};

/// Decimal places used for latitude/longitude regardless of the configured
/// wire precision (two decimals of a degree is ~1 km)
const COORDINATE_DECIMALS: u8 = 6;

/// A single OBD value: numeric for most PIDs, text for status-style commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObdValue {
    Number(f64),
    Text(String),
}

/// GPS fix sourced from the mesh-radio device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    /// Ground speed in meters per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u32>,
    /// Unix timestamp of the fix as reported by the device
    pub fix_time: i64,
}

/// One normalized snapshot of all enabled sensor sources
///
/// A reading with every source field absent/empty is still valid and is
/// still dispatched; sinks tolerate partial data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Instant the acquisition tick began
    pub timestamp: DateTime<Utc>,
    /// Stable identifier for this vehicle, resolved once at startup
    pub device_id: String,
    /// OBD command name (e.g. "RPM") to value; empty when OBD is disabled
    /// or the vehicle was not running at query time
    #[serde(default)]
    pub obd_values: BTreeMap<String, ObdValue>,
    /// Active diagnostic trouble codes, in report order
    #[serde(default)]
    pub dtc_codes: Vec<String>,
    /// Decoded CAN signal name to value
    #[serde(default)]
    pub can_values: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            device_id: device_id.into(),
            obd_values: BTreeMap::new(),
            dtc_codes: Vec::new(),
            can_values: BTreeMap::new(),
            position: None,
        }
    }

    /// True when no source contributed any data this tick
    pub fn is_empty(&self) -> bool {
        self.obd_values.is_empty()
            && self.dtc_codes.is_empty()
            && self.can_values.is_empty()
            && self.position.is_none()
    }

    /// Flat wire payload for the MQTT and mesh sinks
    ///
    /// Contains `device_id`, `timestamp` (unix seconds) and only the fields
    /// present in this reading: OBD values under their sanitized names, CAN
    /// signals under `can_`-prefixed sanitized names, `dtcs` when non-empty,
    /// and `lat`/`lon`/`alt`/`speed`/`course` when a fix is present. Numeric
    /// values are rounded to `precision` decimals; absent fields are omitted
    /// entirely, never emitted as null.
    pub fn to_wire_json(&self, precision: u8) -> Value {
        let mut obj = Map::new();
        obj.insert("device_id".into(), json!(self.device_id));
        obj.insert("timestamp".into(), json!(self.timestamp.timestamp()));

        for (name, value) in &self.obd_values {
            let v = match value {
                ObdValue::Number(n) => wire_number(*n, precision),
                ObdValue::Text(s) => json!(s),
            };
            obj.insert(sanitize_key(name), v);
        }

        for (name, value) in &self.can_values {
            obj.insert(format!("can_{}", sanitize_key(name)), wire_number(*value, precision));
        }

        if !self.dtc_codes.is_empty() {
            obj.insert("dtcs".into(), json!(self.dtc_codes));
        }

        if let Some(pos) = &self.position {
            obj.insert("lat".into(), wire_number(pos.latitude, COORDINATE_DECIMALS));
            obj.insert("lon".into(), wire_number(pos.longitude, COORDINATE_DECIMALS));
            if let Some(alt) = pos.altitude_m {
                obj.insert("alt".into(), wire_number(alt, precision));
            }
            if let Some(speed) = pos.speed_mps {
                obj.insert("speed".into(), wire_number(speed, precision));
            }
            if let Some(course) = pos.course_deg {
                obj.insert("course".into(), wire_number(course, precision));
            }
        }

        Value::Object(obj)
    }
}

/// Emit a rounded value as a clean JSON number (integers without decimals)
fn wire_number(value: f64, precision: u8) -> Value {
    let rounded = round_to(value, precision);
    if (rounded - rounded.round()).abs() < f64::EPSILON {
        json!(rounded.round() as i64)
    } else {
        json!(rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reading() -> Reading {
        Reading::new("unit-01", Utc::now())
    }

    #[test]
    fn empty_reading_is_valid() {
        let r = reading();
        assert!(r.is_empty());

        let wire = r.to_wire_json(2);
        assert_eq!(wire["device_id"], json!("unit-01"));
        assert!(wire.get("dtcs").is_none());
        assert!(wire.get("lat").is_none());
    }

    #[test]
    fn wire_payload_contains_present_fields_only() {
        let mut r = reading();
        r.obd_values
            .insert("RPM".into(), ObdValue::Number(1512.3456));
        r.obd_values
            .insert("FUEL_STATUS".into(), ObdValue::Text("Closed loop".into()));
        r.can_values.insert("OilPressure".into(), 45.526);
        r.dtc_codes.push("P0101".into());
        r.position = Some(Position {
            latitude: 40.712_812_34,
            longitude: -74.005_987_65,
            altitude_m: Some(15.0),
            speed_mps: Some(27.777),
            course_deg: None,
            satellites: Some(8),
            fix_time: 1_700_000_000,
        });

        let wire = r.to_wire_json(2);
        assert_eq!(wire["rpm"], json!(1512.35));
        assert_eq!(wire["fuel_status"], json!("Closed loop"));
        assert_eq!(wire["can_oilpressure"], json!(45.53));
        assert_eq!(wire["dtcs"], json!(["P0101"]));
        assert_eq!(wire["lat"], json!(40.712812));
        assert_eq!(wire["lon"], json!(-74.005988));
        assert_eq!(wire["alt"], json!(15));
        assert_eq!(wire["speed"], json!(27.78));
        // Absent course is omitted, not null
        assert!(wire.get("course").is_none());
    }

    #[test]
    fn wire_numbers_are_clean_integers_where_possible() {
        let mut r = reading();
        r.can_values.insert("CoolantTemp".into(), 92.000000001);

        let wire = r.to_wire_json(2);
        assert_eq!(wire["can_coolanttemp"], json!(92));
    }

    #[test]
    fn wire_round_trip_recovers_fields() {
        let mut r = reading();
        r.obd_values.insert("SPEED".into(), ObdValue::Number(61.5));
        r.can_values.insert("BrakePressure".into(), 3.25);

        let text = r.to_wire_json(2).to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed["device_id"], json!("unit-01"));
        assert_eq!(parsed["speed"], json!(61.5));
        assert_eq!(parsed["can_brakepressure"], json!(3.25));
        assert_eq!(parsed["timestamp"], json!(r.timestamp.timestamp()));
    }
}

//! Decoding raw CAN frames to named signal values

use std::collections::BTreeMap;

use crate::descriptor::{ByteOrder, SignalDescriptor};
use crate::precision::round_for_scale;

/// Decode one raw frame against a descriptor set
///
/// Applies every descriptor whose `frame_id` matches. A descriptor whose
/// byte window exceeds the received payload is skipped without affecting the
/// other signals on the same frame. Frames matching no descriptor return an
/// empty map - the bus carries many frames this pipeline does not care
/// about, and ignoring them is not an error.
pub fn decode(
    frame_id: u32,
    data: &[u8],
    descriptors: &[SignalDescriptor],
) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();

    for d in descriptors.iter().filter(|d| d.frame_id == frame_id) {
        let end = d.start_byte + d.length_bytes;
        if end > data.len() {
            continue;
        }

        let raw = assemble_raw(&data[d.start_byte..end], d.byte_order, d.is_signed);
        let value = raw * d.scale + d.offset;
        values.insert(d.signal_name.clone(), round_for_scale(value, d.scale));
    }

    values
}

/// Assemble the window bytes into an integer, honoring byte order and
/// applying two's-complement sign extension over exactly `window.len() * 8`
/// bits when signed
fn assemble_raw(window: &[u8], byte_order: ByteOrder, is_signed: bool) -> f64 {
    let mut raw: u64 = 0;
    match byte_order {
        ByteOrder::Big => {
            for &b in window {
                raw = (raw << 8) | b as u64;
            }
        }
        ByteOrder::Little => {
            for &b in window.iter().rev() {
                raw = (raw << 8) | b as u64;
            }
        }
    }

    if !is_signed {
        return raw as f64;
    }

    let bits = window.len() * 8;
    if bits == 64 {
        return raw as i64 as f64;
    }

    let sign_bit = 1u64 << (bits - 1);
    if raw & sign_bit != 0 {
        (raw as i64 - (1i64 << bits)) as f64
    } else {
        raw as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scalar(
        frame_id: u32,
        name: &str,
        start: usize,
        length: usize,
        scale: f64,
        offset: f64,
    ) -> SignalDescriptor {
        SignalDescriptor {
            frame_id,
            signal_name: name.to_string(),
            start_byte: start,
            length_bytes: length,
            byte_order: ByteOrder::Big,
            is_signed: false,
            scale,
            offset,
        }
    }

    #[test]
    fn decodes_scaled_rpm() {
        // (0x0190 = 400) * 0.25 = 100.0
        let descriptors = vec![scalar(0x123, "EngineSpeed", 0, 2, 0.25, 0.0)];
        let values = decode(0x123, &[0x01, 0x90], &descriptors);
        assert_eq!(values.get("EngineSpeed"), Some(&100.0));
    }

    #[test]
    fn decodes_multiple_signals_from_one_frame() {
        let descriptors = vec![
            scalar(0x123, "EngineSpeed", 0, 2, 0.25, 0.0),
            scalar(0x123, "CoolantTemp", 2, 1, 1.0, -40.0),
        ];

        // 0x1C20 = 7200 -> 1800 rpm; 0x5A = 90 -> 50 C
        let values = decode(0x123, &[0x1C, 0x20, 0x5A], &descriptors);
        assert_eq!(values.len(), 2);
        assert_eq!(values.get("EngineSpeed"), Some(&1800.0));
        assert_eq!(values.get("CoolantTemp"), Some(&50.0));
    }

    #[test]
    fn unmatched_frame_yields_empty_map() {
        let descriptors = vec![scalar(0x123, "EngineSpeed", 0, 2, 0.25, 0.0)];
        let values = decode(0x456, &[0x01, 0x90], &descriptors);
        assert!(values.is_empty());
    }

    #[test]
    fn short_frame_skips_only_the_overrunning_signal() {
        let descriptors = vec![
            scalar(0x123, "Narrow", 0, 1, 1.0, 0.0),
            scalar(0x123, "Wide", 1, 4, 1.0, 0.0),
        ];

        // Two-byte frame: "Wide" needs bytes 1..5 and is skipped
        let values = decode(0x123, &[0x07, 0xFF], &descriptors);
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("Narrow"), Some(&7.0));
        assert!(values.get("Wide").is_none());
    }

    #[test]
    fn little_endian_window() {
        let mut d = scalar(0x200, "Pressure", 0, 2, 1.0, 0.0);
        d.byte_order = ByteOrder::Little;

        // 0x1234 stored as [0x34, 0x12]
        let values = decode(0x200, &[0x34, 0x12], &[d]);
        assert_eq!(values.get("Pressure"), Some(&(0x1234 as f64)));
    }

    #[test]
    fn sign_extension_over_window_width() {
        let mut one_byte = scalar(0x300, "Trim", 0, 1, 1.0, 0.0);
        one_byte.is_signed = true;

        let mut two_bytes = scalar(0x300, "Torque", 1, 2, 1.0, 0.0);
        two_bytes.is_signed = true;

        // 0xFF -> -1; 0x8000 -> -32768
        let values = decode(0x300, &[0xFF, 0x80, 0x00], &[one_byte, two_bytes]);
        assert_eq!(values.get("Trim"), Some(&-1.0));
        assert_eq!(values.get("Torque"), Some(&-32768.0));
    }

    #[test]
    fn signed_positive_values_unchanged() {
        let mut d = scalar(0x300, "Torque", 0, 2, 0.5, 0.0);
        d.is_signed = true;

        let values = decode(0x300, &[0x00, 0x64], &[d]);
        assert_eq!(values.get("Torque"), Some(&50.0));
    }

    #[test]
    fn decode_is_deterministic() {
        let descriptors = vec![scalar(0x123, "EngineSpeed", 0, 2, 0.25, 0.0)];
        let a = decode(0x123, &[0x0B, 0xB8], &descriptors);
        let b = decode(0x123, &[0x0B, 0xB8], &descriptors);
        assert_eq!(a, b);
        assert_eq!(a.get("EngineSpeed"), Some(&750.0));
    }
}

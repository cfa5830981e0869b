//! Unit conversions, rounding and key sanitizing for wire payloads

/// Convert meters per second to knots
pub fn mps_to_knots(mps: f64) -> f64 {
    mps * 1.943_844
}

/// Convert kilometers per hour to knots
pub fn kph_to_knots(kph: f64) -> f64 {
    kph * 0.539_957
}

/// Round a value to the given number of decimal places
pub fn round_to(value: f64, decimals: u8) -> f64 {
    if decimals == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(decimals as i32);
        (value * factor).round() / factor
    }
}

/// Sanitize a sensor name into a wire-safe key
///
/// Lowercases, replaces every non-alphanumeric run with a single underscore
/// and trims leading/trailing underscores. Names that sanitize to nothing
/// become `"unknown_sensor"`.
pub fn sanitize_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut last_was_sep = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            key.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            key.push('_');
            last_was_sep = true;
        }
    }

    while key.ends_with('_') {
        key.pop();
    }

    if key.is_empty() {
        "unknown_sensor".to_string()
    } else {
        key
    }
}

//! Floating point precision handling
//!
//! Avoids ugly values like 13.000000001 by rounding decoded values to the
//! precision their scale factor can actually express.

/// Determine appropriate decimal places from a scale factor
///
/// # Examples
/// - scale 1.0 → 0 decimal places (integers)
/// - scale 0.1 → 1 decimal place
/// - scale 0.25 → 2 decimal places (1/4 needs 2 places)
/// - scale 0.001 → 3 decimal places
pub fn precision_from_scale(scale: f64) -> u8 {
    if scale <= 0.0 {
        return 4; // Safe default
    }

    let abs_scale = scale.abs();
    if abs_scale >= 1.0 {
        return 0;
    }

    // Scale by 10 until the remaining fraction disappears
    let mut temp = abs_scale;
    let mut precision = 0u8;

    while precision < 6 {
        if (temp - temp.round()).abs() < 1e-9 {
            break;
        }
        temp *= 10.0;
        precision += 1;
    }

    precision
}

/// Round a value to the specified number of decimal places
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}

/// Round a value based on the scale factor used to produce it
pub fn round_for_scale(value: f64, scale: f64) -> f64 {
    round_to_precision(value, precision_from_scale(scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_from_scale() {
        assert_eq!(precision_from_scale(1.0), 0);
        assert_eq!(precision_from_scale(10.0), 0);
        assert_eq!(precision_from_scale(0.5), 1);
        assert_eq!(precision_from_scale(0.1), 1);
        assert_eq!(precision_from_scale(0.25), 2);
        assert_eq!(precision_from_scale(0.01), 2);
        assert_eq!(precision_from_scale(0.001), 3);
    }

    #[test]
    fn test_round_to_precision() {
        assert_eq!(round_to_precision(1.234567, 0), 1.0);
        assert_eq!(round_to_precision(1.234567, 2), 1.23);
        assert_eq!(round_to_precision(1.234567, 3), 1.235);
    }

    #[test]
    fn test_round_for_scale() {
        assert_eq!(round_for_scale(1.4000000000001, 0.01), 1.4);
        assert_eq!(round_for_scale(13.000000000001, 0.01), 13.0);
        assert_eq!(round_for_scale(92.0000001, 1.0), 92.0);
    }
}

//! Conversions between whole resource units and the `f64` ratios used by
//! scoring and health analysis.

/// Widen a unit count to `f64`. Precision loss only starts above 2^53
/// units, far beyond any stock the core handles.
#[allow(clippy::cast_precision_loss)]
pub const fn to_f64(units: u64) -> f64 {
    units as f64
}

/// Round a non-negative quantity down to whole units. Negative and NaN
/// inputs become 0; values past `u64::MAX` saturate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn floor_units(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.floor() as u64
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        to_f64(numerator) / to_f64(denominator)
    }
}

/// Clamp a score into `[0, 1]`.
pub const fn unit_interval(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

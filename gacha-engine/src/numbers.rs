//! Numeric conversion helpers centralizing lossy casts.

use num_traits::cast::cast;

/// Convert u64 to f64, accepting precision loss in one place.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// `part / whole`, or 0.0 when `whole` is zero.
#[must_use]
pub fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    u64_to_f64(part) / u64_to_f64(whole)
}

/// Round a f64 and clamp it to the u64 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_u64(value: f64) -> u64 {
    if value.is_nan() {
        return 0;
    }
    let max = cast::<u64, f64>(u64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max).round();
    cast::<f64, u64>(clamped).unwrap_or(u64::MAX)
}

/// Group digits in threes: `12345` becomes `"12,345"`.
#[must_use]
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_zero_denominator() {
        assert!((ratio(1, 4) - 0.25).abs() < f64::EPSILON);
        assert!(ratio(3, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding_clamps() {
        assert_eq!(round_f64_to_u64(2.5), 3);
        assert_eq!(round_f64_to_u64(-4.0), 0);
        assert_eq!(round_f64_to_u64(f64::NAN), 0);
    }

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1,000");
        assert_eq!(format_thousands(10_000), "10,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }
}

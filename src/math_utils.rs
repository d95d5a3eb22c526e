/// Small numeric helpers shared by the thermodynamic evaluator and the tests.

/// Assert that the percentage deviation of `actual` from `expected` stays
/// below `max_deviation`.
///
/// ```
/// use solidify_fem::assert_deviation;
///
/// assert_deviation!(105.0, 100.0, 10.0);
/// assert_deviation!(282.3, 282.335, 0.1, "liquidus temperature");
/// ```
#[macro_export]
macro_rules! assert_deviation {
    ($actual:expr, $expected:expr, $max_deviation:expr) => {
        {
            let actual_val = $actual;
            let expected_val = $expected;
            let max_dev = $max_deviation;
            let actual_deviation = $crate::math_utils::deviation(actual_val, expected_val);

            if actual_deviation >= max_dev {
                panic!(
                    "assertion failed: deviation {:.2}% >= {:.2}%\n  actual: {:?},\n  expected: {:?}",
                    actual_deviation, max_dev, actual_val, expected_val
                );
            }
        }
    };
    ($actual:expr, $expected:expr, $max_deviation:expr, $($arg:tt)+) => {
        {
            let actual_val = $actual;
            let expected_val = $expected;
            let max_dev = $max_deviation;
            let actual_deviation = $crate::math_utils::deviation(actual_val, expected_val);

            if actual_deviation >= max_dev {
                panic!(
                    "assertion failed: deviation {:.2}% >= {:.2}%: {}\n  actual: {:?},\n  expected: {:?}",
                    actual_deviation, max_dev, format_args!($($arg)+), actual_val, expected_val
                );
            }
        }
    };
}

/// Linear interpolation between two values
///
/// ```
/// use solidify_fem::math_utils::lerp;
///
/// assert_eq!(lerp(183.0, 283.0, 0.5), 233.0);
/// ```
pub fn lerp(a: f64, b: f64, ratio: f64) -> f64 {
    a + (b - a) * ratio
}

/// Ratio (0.0 to 1.0 inside the range) that produces `value` between `a` and `b`
///
/// ```
/// use solidify_fem::math_utils::inverse_lerp;
///
/// assert_eq!(inverse_lerp(100.0, 200.0, 150.0), 0.5);
/// ```
pub fn inverse_lerp(a: f64, b: f64, value: f64) -> f64 {
    if (b - a).abs() < f64::EPSILON {
        0.0 // Avoid division by zero
    } else {
        (value - a) / (b - a)
    }
}

/// Clamp a mass or volume fraction into `[0, 1]`
///
/// ```
/// use solidify_fem::math_utils::unit_fraction;
///
/// assert_eq!(unit_fraction(1.0000001), 1.0);
/// assert_eq!(unit_fraction(-1e-12), 0.0);
/// assert_eq!(unit_fraction(0.25), 0.25);
/// ```
pub fn unit_fraction(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Change between two successive iterates, relative to the previous one.
///
/// Falls back to the absolute change when the previous iterate is zero
/// (to within `f64::EPSILON`), so a zero temperature never divides.
///
/// ```
/// use solidify_fem::math_utils::relative_change;
///
/// assert_eq!(relative_change(110.0, 100.0), 0.1);
/// assert_eq!(relative_change(0.5, 0.0), 0.5);
/// ```
pub fn relative_change(next: f64, previous: f64) -> f64 {
    let delta = (next - previous).abs();
    if previous.abs() < f64::EPSILON {
        delta
    } else {
        delta / previous.abs()
    }
}

/// Percentage deviation of `actual` from `expected`
///
/// Uses the expected value as the reference for the percentage.
///
/// ```
/// use solidify_fem::math_utils::deviation;
///
/// assert_eq!(deviation(105.0, 100.0), 5.0);
/// assert_eq!(deviation(95.0, 100.0), 5.0);
/// ```
pub fn deviation(actual: f64, expected: f64) -> f64 {
    if expected.abs() < f64::EPSILON {
        if actual.abs() < f64::EPSILON {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((actual - expected).abs() / expected.abs()) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(0.0, 10.0, 0.0), 0.0);
        assert_eq!(lerp(0.0, 10.0, 1.0), 10.0);
        assert_eq!(lerp(100.0, 200.0, 0.25), 125.0);
    }

    #[test]
    fn test_inverse_lerp() {
        assert_eq!(inverse_lerp(183.0, 283.0, 233.0), 0.5);
        assert_eq!(inverse_lerp(100.0, 200.0, 200.0), 1.0);
        assert_eq!(inverse_lerp(5.0, 5.0, 5.0), 0.0);
    }

    #[test]
    fn test_unit_fraction() {
        assert_eq!(unit_fraction(2.0), 1.0);
        assert_eq!(unit_fraction(-0.5), 0.0);
        assert_eq!(unit_fraction(0.7), 0.7);
    }

    #[test]
    fn test_relative_change_guards_zero() {
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_eq!(relative_change(-3.0, 0.0), 3.0);
        assert!((relative_change(190.0, 200.0) - 0.05).abs() < 1e-12);
        assert!(relative_change(1.0, 1e-300).is_finite());
    }

    #[test]
    fn test_deviation() {
        assert_eq!(deviation(105.0, 100.0), 5.0);
        assert_eq!(deviation(100.0, 100.0), 0.0);
        assert!((deviation(1530.0, 1500.0) - 2.0).abs() < 0.001);
        assert_eq!(deviation(0.0, 0.0), 0.0);
        assert_eq!(deviation(10.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn test_assert_deviation_macro() {
        assert_deviation!(105.0, 100.0, 10.0);
        assert_deviation!(2.0 * 52.5, 100.0, 10.0);
        assert_deviation!(1530.0, 1500.0, 5.0, "temperature should be within 5%");
    }

    #[test]
    #[should_panic(expected = "assertion failed: deviation")]
    fn test_assert_deviation_macro_fails() {
        assert_deviation!(120.0, 100.0, 10.0);
    }
}

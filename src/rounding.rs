//! Decimal-place rounding used to stabilize comparisons and outputs.

pub fn dp2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn dp3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

pub fn dp6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(dp2(1.005_000_1), 1.01);
        assert_eq!(dp3(-0.000_4), 0.0);
        assert_eq!(dp6(0.123_456_789), 0.123_457);
    }
}

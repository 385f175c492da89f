//! Period quantization.
//!
//! Candidates from different DM trials are matched by truncating their
//! period to a fixed number of decimal digits. The truncated decimal text is
//! the cluster key.
//!
//! Truncation is a hard cut: `12.34499` and `12.34501` at precision 4 land in
//! different clusters even though they are almost certainly the same signal.
//! Nothing here merges neighbouring keys.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::loaders::CandidateRecord;

/// Cluster key derived from a candidate period.
///
/// Equality and hashing use the canonical decimal text only, so two keys
/// compare equal exactly when their truncated periods print identically.
#[derive(Debug, Clone)]
pub struct PeriodKey {
    text: String,
    value: f64,
}

impl PeriodKey {
    /// Canonical decimal text of the key (no trailing zeros).
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Numeric value of the truncated period (ms).
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl PartialEq for PeriodKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for PeriodKey {}

impl Hash for PeriodKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Truncate `period` to `precision` digits after the decimal point.
///
/// Works on the shortest round-trip decimal form of the value, so the cut
/// never picks up binary representation noise (`12.3456` stays `12.3456`
/// rather than becoming `12.3455`). Trailing zeros are dropped, which makes
/// the function idempotent on its own output:
///
/// ```
/// use pulsar_sift::core::transforms::quantize;
///
/// let key = quantize(12.345678, 4);
/// assert_eq!(key.as_str(), "12.3456");
/// assert_eq!(quantize(key.value(), 4), key);
/// ```
pub fn quantize(period: f64, precision: usize) -> PeriodKey {
    // f64 Display never switches to exponent notation
    let repr = period.to_string();

    let (int_part, frac_part) = match repr.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (repr.as_str(), ""),
    };

    let kept = &frac_part[..frac_part.len().min(precision)];
    let kept = kept.trim_end_matches('0');

    let text = if kept.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, kept)
    };
    let value = text.parse::<f64>().unwrap_or(period);

    PeriodKey { text, value }
}

/// Keep only the first record of each period key within every source file.
///
/// Records must already be grouped by file in parse order; the relative order
/// of the surviving records is preserved.
pub fn collapse_duplicate_keys(records: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut seen: HashSet<(String, PeriodKey)> = HashSet::with_capacity(records.len());
    let mut kept = Vec::with_capacity(records.len());

    for record in records {
        if seen.insert((record.source_file.clone(), record.period_key.clone())) {
            kept.push(record);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::test_record;

    #[test]
    fn test_quantize_truncates_not_rounds() {
        assert_eq!(quantize(12.34569, 4).as_str(), "12.3456");
        assert_eq!(quantize(0.99999, 2).as_str(), "0.99");
    }

    #[test]
    fn test_quantize_exact_decimal() {
        // 12.3456 * 1e4 is not exactly representable; the text path must not lose a digit
        assert_eq!(quantize(12.3456, 4).as_str(), "12.3456");
        assert_eq!(quantize(1.1, 1).as_str(), "1.1");
    }

    #[test]
    fn test_quantize_trailing_zeros_collapse() {
        assert_eq!(quantize(12.3450, 4), quantize(12.34501, 4));
        assert_eq!(quantize(12.0, 4).as_str(), "12");
        assert_eq!(quantize(12.00009, 4).as_str(), "12");
    }

    #[test]
    fn test_quantize_precision_zero() {
        assert_eq!(quantize(123.987, 0).as_str(), "123");
    }

    #[test]
    fn test_quantize_small_period_has_no_exponent() {
        let key = quantize(0.00012, 4);
        assert_eq!(key.as_str(), "0.0001");
        assert!((key.value() - 0.0001).abs() < 1e-15);
    }

    #[test]
    fn test_quantize_is_idempotent() {
        for &(period, precision) in &[
            (12.345678, 4),
            (0.00012, 6),
            (1534.2, 3),
            (89.999999, 2),
            (7.0, 5),
        ] {
            let key = quantize(period, precision);
            assert_eq!(quantize(key.value(), precision), key, "period {}", period);
        }
    }

    #[test]
    fn test_quantize_is_deterministic() {
        assert_eq!(quantize(33.33333, 3), quantize(33.33333, 3));
        assert_eq!(quantize(33.33333, 3).value(), quantize(33.33333, 3).value());
    }

    #[test]
    fn test_truncation_boundary_splits_signal() {
        // Known limitation: nearly identical periods straddling the cut are separate keys
        let below = quantize(12.34499, 4);
        let above = quantize(12.34501, 4);
        assert_eq!(below.as_str(), "12.3449");
        assert_eq!(above.as_str(), "12.345");
        assert_ne!(below, above);
    }

    #[test]
    fn test_collapse_duplicate_keys_per_file() {
        let records = vec![
            test_record("a_DM10_ACCEL_20", 10.0, 1, 12.34561, 5.0),
            test_record("a_DM10_ACCEL_20", 10.0, 2, 12.34569, 7.0),
            test_record("b_DM20_ACCEL_20", 20.0, 1, 12.34562, 6.0),
            test_record("a_DM10_ACCEL_20", 10.0, 3, 50.0, 4.0),
        ];

        let kept = collapse_duplicate_keys(records);

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].candidate_index, 1);
        assert_eq!(kept[1].source_file, "b_DM20_ACCEL_20");
        assert_eq!(kept[2].candidate_index, 3);
    }
}

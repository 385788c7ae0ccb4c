//! Numeric safety kernel
//!
//! Every division, logarithm and power in the analysis path goes through
//! these helpers. Each takes an explicit fallback that is returned whenever
//! the operation is undefined or its result would not be finite, so NaN and
//! infinity never leave this module.

use serde::{Deserialize, Serialize};

/// Smallest magnitude treated as non-zero
pub const EPSILON: f64 = 1e-10;

/// Level reported for silence, in dB
pub const SILENCE_DB: f64 = -120.0;

/// Return `value` if finite, otherwise `fallback`
#[inline]
pub fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// `numerator / denominator`, or `fallback` when the denominator is
/// effectively zero or either operand is not finite
#[inline]
pub fn safe_divide(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator.abs() < EPSILON {
        return fallback;
    }
    sanitize(numerator / denominator, fallback)
}

/// `log10(value)` for values above [`EPSILON`], `fallback` otherwise
#[inline]
pub fn safe_log10(value: f64, fallback: f64) -> f64 {
    if value.is_nan() || value <= EPSILON || value.is_infinite() {
        return fallback;
    }
    value.log10()
}

/// Natural logarithm for values above [`EPSILON`], `fallback` otherwise
#[inline]
pub fn safe_ln(value: f64, fallback: f64) -> f64 {
    if value.is_nan() || value <= EPSILON || value.is_infinite() {
        return fallback;
    }
    value.ln()
}

/// `base^exponent`, or `fallback` when the result is undefined
#[inline]
pub fn safe_power(base: f64, exponent: f64, fallback: f64) -> f64 {
    if !base.is_finite() || !exponent.is_finite() {
        return fallback;
    }
    sanitize(base.powf(exponent), fallback)
}

/// Convert linear amplitude to dB, floored at [`SILENCE_DB`]
#[inline]
pub fn linear_to_db(value: f64) -> f64 {
    (20.0 * safe_log10(value.abs(), SILENCE_DB / 20.0)).max(SILENCE_DB)
}

/// Convert power (mean square) to dB, floored at [`SILENCE_DB`]
#[inline]
pub fn power_to_db(value: f64) -> f64 {
    (10.0 * safe_log10(value, SILENCE_DB / 10.0)).max(SILENCE_DB)
}

/// Convert dB to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    safe_power(10.0, db / 20.0, 0.0)
}

/// How per-frame values are collapsed into one feature value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Median,
    Mean,
    Std,
    Max,
    Min,
}

fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Mean of the finite values, `None` if there are none
pub fn mean(values: &[f64]) -> Option<f64> {
    let finite = finite_values(values);
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Population standard deviation of the finite values
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let finite = finite_values(values);
    let m = mean(&finite)?;
    let var = finite.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / finite.len() as f64;
    Some(var.max(0.0).sqrt())
}

/// Linear-interpolated percentile (`p` in `[0, 1]`) of the finite values
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted = finite_values(values);
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let p = sanitize(p, 0.5).clamp(0.0, 1.0);
    let pos = p * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Median of the finite values
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 0.5)
}

/// Collapse `values` with `method`, ignoring non-finite entries.
///
/// Returns `fallback` for empty input or when nothing finite remains.
pub fn aggregate(values: &[f64], method: Aggregation, fallback: f64) -> f64 {
    let result = match method {
        Aggregation::Median => median(values),
        Aggregation::Mean => mean(values),
        Aggregation::Std => std_dev(values),
        Aggregation::Max => values.iter().copied().filter(|v| v.is_finite()).reduce(f64::max),
        Aggregation::Min => values.iter().copied().filter(|v| v.is_finite()).reduce(f64::min),
    };
    sanitize(result.unwrap_or(fallback), fallback)
}

/// Map `value` from `[min, max]` onto `[0, 1]`, clamped.
///
/// A degenerate range maps everything to 0.
#[inline]
pub fn normalize_to_range(value: f64, min: f64, max: f64) -> f64 {
    safe_divide(value - min, max - min, 0.0).clamp(0.0, 1.0)
}

/// Vector normalization methods
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// Fixed `[min, max]` range onto `[0, 1]`
    MinMax { min: f64, max: f64 },
    /// Zero mean, unit variance
    ZScore,
    /// Median-centred, scaled by the interquartile range
    Robust,
    /// Rank position in `[0, 1]`
    Quantile,
}

/// Normalize a vector. Non-finite entries map to 0.
pub fn normalize(values: &[f64], method: Normalization) -> Vec<f64> {
    match method {
        Normalization::MinMax { min, max } => values
            .iter()
            .map(|&v| if v.is_finite() { normalize_to_range(v, min, max) } else { 0.0 })
            .collect(),
        Normalization::ZScore => {
            let m = mean(values).unwrap_or(0.0);
            let sd = std_dev(values).unwrap_or(0.0);
            values
                .iter()
                .map(|&v| if v.is_finite() { safe_divide(v - m, sd, 0.0) } else { 0.0 })
                .collect()
        }
        Normalization::Robust => {
            let med = median(values).unwrap_or(0.0);
            let iqr = percentile(values, 0.75).unwrap_or(0.0) - percentile(values, 0.25).unwrap_or(0.0);
            values
                .iter()
                .map(|&v| if v.is_finite() { safe_divide(v - med, iqr, 0.0) } else { 0.0 })
                .collect()
        }
        Normalization::Quantile => {
            let mut sorted = finite_values(values);
            sorted.sort_by(f64::total_cmp);
            let n = sorted.len();
            values
                .iter()
                .map(|&v| {
                    if !v.is_finite() {
                        return 0.0;
                    }
                    if n <= 1 {
                        return 0.5;
                    }
                    // Average rank for ties
                    let below = sorted.partition_point(|&x| x < v);
                    let through = sorted.partition_point(|&x| x <= v);
                    let rank = (below + through.saturating_sub(1)) as f64 / 2.0;
                    rank / (n - 1) as f64
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_safe_ops_never_produce_nan() {
        assert_eq!(safe_divide(1.0, 0.0, 7.0), 7.0);
        assert_eq!(safe_divide(f64::NAN, 1.0, 7.0), 7.0);
        assert_eq!(safe_divide(1.0, f64::INFINITY, 7.0), 7.0);
        assert_eq!(safe_log10(0.0, -3.0), -3.0);
        assert_eq!(safe_log10(-1.0, -3.0), -3.0);
        assert_eq!(safe_ln(f64::NAN, 0.0), 0.0);
        assert_eq!(safe_power(-8.0, 0.5, 1.0), 1.0);
        assert_relative_eq!(safe_divide(6.0, 3.0, 0.0), 2.0);
        assert_relative_eq!(safe_log10(100.0, 0.0), 2.0);
    }

    #[test]
    fn test_db_conversion() {
        assert_relative_eq!(linear_to_db(1.0), 0.0);
        assert_relative_eq!(linear_to_db(0.5), -6.0206, epsilon = 1e-3);
        assert_eq!(linear_to_db(0.0), SILENCE_DB);
        assert_eq!(power_to_db(0.0), SILENCE_DB);
        assert_relative_eq!(db_to_linear(-6.0206), 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_aggregate() {
        let values = [1.0, 2.0, f64::NAN, 3.0, 10.0];
        assert_relative_eq!(aggregate(&values, Aggregation::Median, 0.0), 2.5);
        assert_relative_eq!(aggregate(&values, Aggregation::Mean, 0.0), 4.0);
        assert_relative_eq!(aggregate(&values, Aggregation::Max, 0.0), 10.0);
        assert_relative_eq!(aggregate(&values, Aggregation::Min, 0.0), 1.0);
        assert!(aggregate(&values, Aggregation::Std, 0.0) > 0.0);
        assert_eq!(aggregate(&[], Aggregation::Median, -1.0), -1.0);
        assert_eq!(aggregate(&[f64::NAN], Aggregation::Mean, -1.0), -1.0);
    }

    #[test]
    fn test_normalization() {
        let values = [0.0, 5.0, 10.0];
        assert_eq!(
            normalize(&values, Normalization::MinMax { min: 0.0, max: 10.0 }),
            vec![0.0, 0.5, 1.0]
        );
        let z = normalize(&values, Normalization::ZScore);
        assert_relative_eq!(z[1], 0.0);
        assert!(z[0] < 0.0 && z[2] > 0.0);
        assert_eq!(normalize(&[3.0, 3.0], Normalization::ZScore), vec![0.0, 0.0]);
        assert_eq!(normalize(&values, Normalization::Quantile), vec![0.0, 0.5, 1.0]);
        let robust = normalize(&values, Normalization::Robust);
        assert_relative_eq!(robust[1], 0.0);
        assert_eq!(normalize_to_range(3.0, 1.0, 1.0), 0.0);
    }
}

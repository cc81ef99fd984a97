//! Robust statistics
//!
//! Pure numeric helpers shared by every engine: linear-interpolation
//! percentiles, median/IQR, robust z-scores and the logistic squash.
//! All functions are side-effect free and deterministic for identical inputs.

/// Denominator floor for robust z-scores and stored IQRs
pub const IQR_EPSILON: f64 = 1e-4;

/// Linear-interpolation percentile (`p` in 0..=1).
///
/// Index is `(n - 1) * p`, interpolated between the floor and ceil ranks.
/// Returns 0.0 for empty input.
pub fn percentile(p: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let p = p.clamp(0.0, 1.0);
    let rank = (sorted.len() - 1) as f64 * p;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        return sorted[lower];
    }

    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Median (50th percentile)
pub fn median(values: &[f64]) -> f64 {
    percentile(0.5, values)
}

/// Inter-quartile range (Q3 - Q1). Zero for fewer than two values.
pub fn iqr(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    percentile(0.75, values) - percentile(0.25, values)
}

/// Outlier-resistant standardization: `(value - median) / max(iqr, ε)`
pub fn robust_z_score(value: f64, median: f64, iqr: f64) -> f64 {
    (value - median) / iqr.max(IQR_EPSILON)
}

/// Logistic function `1 / (1 + e^-x)`
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Clamp `value` into `[lo, hi]`
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Arithmetic mean, 0.0 for empty input
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, 0.0 for empty input
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

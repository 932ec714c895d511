//! Shared statistical primitives used by the temporal and bias detectors.
//!
//! Variance uses Welford's online formulation rather than the naive
//! sum-of-squares approach, avoiding the catastrophic cancellation the
//! spec's numerical-stability note (§9) warns about for metrics whose
//! mean is large relative to their spread.

/// Mean and (sample, n-1 weighted) standard deviation of a slice, computed
/// in one pass via Welford's algorithm.
pub fn mean_stdev(values: &[f64]) -> (f64, f64) {
    let mut mean = 0.0_f64;
    let mut m2 = 0.0_f64;
    let mut count = 0usize;

    for &v in values {
        count += 1;
        let delta = v - mean;
        mean += delta / count as f64;
        let delta2 = v - mean;
        m2 += delta * delta2;
    }

    if count < 2 {
        return (mean, 0.0);
    }
    let variance = m2 / (count as f64 - 1.0);
    (mean, variance.sqrt())
}

pub fn mean(values: &[f64]) -> f64 {
    mean_stdev(values).0
}

/// Coefficient of variation: `stdev / |mean|`, `0.0` when the mean is zero.
pub fn coefficient_of_variation(mean: f64, stdev: f64) -> f64 {
    if mean == 0.0 {
        0.0
    } else {
        (stdev / mean).abs()
    }
}

/// Pooled standard deviation across two groups, `n - 1` weighted (spec §4.4).
/// Falls back to the larger of the two group stdevs (plus a tiny epsilon)
/// when the pooled value would be exactly zero, to avoid a hard divide-by-zero
/// while still signalling "no real spread" via the caller's degenerate check.
pub fn pooled_stdev(n_a: usize, stdev_a: f64, n_b: usize, stdev_b: f64) -> f64 {
    let df_a = n_a.saturating_sub(1) as f64;
    let df_b = n_b.saturating_sub(1) as f64;
    let total_df = df_a + df_b;

    let pooled = if total_df > 0.0 {
        ((df_a * stdev_a.powi(2) + df_b * stdev_b.powi(2)) / total_df).sqrt()
    } else {
        0.0
    };

    if pooled > 0.0 {
        return pooled;
    }

    let fallback = stdev_a.max(stdev_b);
    if fallback > 0.0 {
        fallback + f64::EPSILON
    } else {
        0.0
    }
}

/// Cohen's d standardized effect size. Returns `None` when the pooled
/// stdev is degenerate (zero even after the fallback above) — spec §4.4,
/// §7 `NumericDegenerate`.
pub fn cohens_d(mean_a: f64, mean_b: f64, pooled: f64) -> Option<f64> {
    if pooled <= 0.0 {
        None
    } else {
        Some((mean_a - mean_b) / pooled)
    }
}

/// `mean_adv / mean_dis` when both share a sign and the denominator is
/// non-zero; `None` otherwise (spec §4.4 step 5).
pub fn disparity_ratio(mean_adv: f64, mean_dis: f64) -> Option<f64> {
    if mean_dis == 0.0 {
        return None;
    }
    if (mean_adv >= 0.0) != (mean_dis >= 0.0) {
        return None;
    }
    Some(mean_adv / mean_dis)
}

/// z-score of a single value against a (mean, stdev) pair. `0.0` when stdev is zero.
pub fn z_score(value: f64, mean: f64, stdev: f64) -> f64 {
    if stdev > 0.0 {
        (value - mean) / stdev
    } else {
        0.0
    }
}

//! Temporal Deviation Detector (spec §4.3): trend, shift, and outlier
//! sub-detectors run in that order for each candidate metric.

use crate::config::AnalyzerConfig;
use crate::models::descriptor::{MetricDescriptor, TimeBucket};
use crate::models::finding::{DeviationEvidence, DeviationFinding, DeviationKind, SkipReason, SkippedEntity};
use crate::models::record::RecordSet;
use crate::stats;

struct BucketStat {
    bucket_id: String,
    mean: f64,
    stdev: f64,
    n: usize,
}

fn bucketize_metric(records: &RecordSet, buckets: &[TimeBucket], metric: &str) -> Vec<BucketStat> {
    let slice = records.as_slice();
    buckets
        .iter()
        .filter_map(|bucket| {
            let values: Vec<f64> = bucket
                .indices
                .iter()
                .filter_map(|&idx| slice[idx].attributes.get(metric).and_then(|v| v.as_numeric()))
                .collect();
            if values.is_empty() {
                return None;
            }
            let (mean, stdev) = stats::mean_stdev(&values);
            Some(BucketStat {
                bucket_id: bucket.bucket_id.clone(),
                mean,
                stdev,
                n: values.len(),
            })
        })
        .collect()
}

fn trend_threshold_pct(config: &AnalyzerConfig) -> f64 {
    0.5 * config.deviation_threshold_sigma * 0.10
}

fn severity_from_magnitude(magnitude: f64, config: &AnalyzerConfig) -> f64 {
    (magnitude / (config.deviation_threshold_sigma * 0.5)).min(1.0).max(0.0)
}

struct ShiftCandidate {
    bucket_a: String,
    bucket_b: String,
    mean_a: f64,
    mean_b: f64,
    z: f64,
}

/// Largest-magnitude consecutive-bucket z-score that exceeds the threshold
/// (spec §4.3 step 3), using one pooled stdev for the whole metric.
fn find_shift(buckets: &[BucketStat], config: &AnalyzerConfig) -> Option<ShiftCandidate> {
    let usable: Vec<&BucketStat> = buckets.iter().filter(|b| b.n >= 2).collect();
    if usable.len() < 2 {
        return None;
    }

    let mut weighted_var_sum = 0.0;
    let mut dof_sum = 0.0;
    for b in &usable {
        let dof = (b.n - 1) as f64;
        weighted_var_sum += dof * b.stdev.powi(2);
        dof_sum += dof;
    }
    if dof_sum <= 0.0 {
        return None;
    }
    let pooled_stdev = (weighted_var_sum / dof_sum).sqrt();
    if pooled_stdev <= 0.0 {
        return None;
    }

    let mut best: Option<ShiftCandidate> = None;
    for pair in usable.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let z = (b.mean - a.mean) / pooled_stdev;
        if z.abs() > config.deviation_threshold_sigma
            && best.as_ref().map(|c| z.abs() > c.z.abs()).unwrap_or(true)
        {
            best = Some(ShiftCandidate {
                bucket_a: a.bucket_id.clone(),
                bucket_b: b.bucket_id.clone(),
                mean_a: a.mean,
                mean_b: b.mean,
                z,
            });
        }
    }
    best
}

struct TrendCandidate {
    direction: &'static str,
    first_mean: f64,
    last_mean: f64,
    percent_change: f64,
    periods: usize,
}

fn find_trend(buckets: &[BucketStat], metric_global_mean: f64, config: &AnalyzerConfig) -> Option<TrendCandidate> {
    if buckets.len() < config.min_periods as usize {
        return None;
    }

    let means: Vec<f64> = buckets.iter().map(|b| b.mean).collect();
    let increasing = means.windows(2).all(|w| w[1] > w[0]);
    let decreasing = means.windows(2).all(|w| w[1] < w[0]);
    if !increasing && !decreasing {
        return None;
    }

    let first = *means.first().expect("non-empty");
    let last = *means.last().expect("non-empty");

    let percent_change = if first != 0.0 {
        (last - first) / first.abs()
    } else if metric_global_mean != 0.0 {
        (last - first) / metric_global_mean.abs()
    } else {
        0.0
    };

    if percent_change.abs() < trend_threshold_pct(config) {
        return None;
    }

    Some(TrendCandidate {
        direction: if increasing { "increasing" } else { "decreasing" },
        first_mean: first,
        last_mean: last,
        percent_change,
        periods: buckets.len(),
    })
}

struct OutlierCandidate {
    count: usize,
    total: usize,
    fraction: f64,
    max_abs_z: f64,
}

fn find_outliers(records: &RecordSet, metric: &MetricDescriptor, config: &AnalyzerConfig) -> Option<OutlierCandidate> {
    let stats = metric.sample_stats;
    if stats.stdev <= 0.0 {
        return None;
    }

    let mut count = 0usize;
    let mut max_abs_z = 0.0_f64;
    let mut total = 0usize;
    for record in records.iter() {
        if let Some(value) = record.attributes.get(&metric.name).and_then(|v| v.as_numeric()) {
            total += 1;
            let z = (value - stats.mean) / stats.stdev;
            if z.abs() > max_abs_z {
                max_abs_z = z.abs();
            }
            if z.abs() > config.deviation_threshold_sigma {
                count += 1;
            }
        }
    }
    if total == 0 {
        return None;
    }
    let fraction = count as f64 / total as f64;
    if fraction >= config.outlier_fraction_floor {
        Some(OutlierCandidate { count, total, fraction, max_abs_z })
    } else {
        None
    }
}

/// Run all three sub-detectors for one metric (spec §4.3). Returns at
/// most one trend, one shift, and one outliers finding (spec §8
/// "metric single-firing").
pub fn detect(
    records: &RecordSet,
    buckets: &[TimeBucket],
    metric: &MetricDescriptor,
    config: &AnalyzerConfig,
) -> (Vec<DeviationFinding>, Option<SkippedEntity>) {
    let bucket_stats = bucketize_metric(records, buckets, &metric.name);

    if bucket_stats.len() < config.min_periods as usize {
        return (
            Vec::new(),
            Some(SkippedEntity::new(&metric.name, SkipReason::InsufficientTrendPeriods)),
        );
    }

    let mut findings = Vec::new();
    let shift_candidate = find_shift(&bucket_stats, config);
    let trend_candidate = find_trend(&bucket_stats, metric.sample_stats.mean, config);

    if let Some(trend) = trend_candidate {
        let magnitude = trend.percent_change.abs();
        findings.push(DeviationFinding {
            kind: DeviationKind::Trend,
            metric: metric.name.clone(),
            evidence: DeviationEvidence::Trend {
                direction: trend.direction,
                first_mean: trend.first_mean,
                last_mean: trend.last_mean,
                percent_change: trend.percent_change,
                periods: trend.periods,
                supporting_shift_z: shift_candidate.as_ref().map(|s| s.z),
            },
            severity: severity_from_magnitude(magnitude, config),
            description: format!(
                "{} is {} monotonically across {} periods ({:+.1}% change)",
                metric.name,
                trend.direction,
                trend.periods,
                trend.percent_change * 100.0
            ),
            concern: String::new(),
        });
    } else if let Some(shift) = shift_candidate {
        let magnitude = shift.z.abs() / config.deviation_threshold_sigma;
        findings.push(DeviationFinding {
            kind: DeviationKind::Shift,
            metric: metric.name.clone(),
            evidence: DeviationEvidence::Shift {
                bucket_a: shift.bucket_a.clone(),
                bucket_b: shift.bucket_b.clone(),
                mean_a: shift.mean_a,
                mean_b: shift.mean_b,
                z_score: shift.z,
            },
            severity: severity_from_magnitude(magnitude, config),
            description: format!(
                "{} shifted from {:.2} to {:.2} between {} and {} (z={:.2})",
                metric.name, shift.mean_a, shift.mean_b, shift.bucket_a, shift.bucket_b, shift.z
            ),
            concern: String::new(),
        });
    }

    if let Some(outliers) = find_outliers(records, metric, config) {
        findings.push(DeviationFinding {
            kind: DeviationKind::Outliers,
            metric: metric.name.clone(),
            evidence: DeviationEvidence::Outliers {
                count: outliers.count,
                total: outliers.total,
                fraction: outliers.fraction,
                max_abs_z: outliers.max_abs_z,
            },
            severity: severity_from_magnitude(outliers.fraction, config),
            description: format!(
                "{} has {} outlier(s) out of {} ({:.1}%, max |z|={:.2})",
                metric.name,
                outliers.count,
                outliers.total,
                outliers.fraction * 100.0,
                outliers.max_abs_z
            ),
            concern: String::new(),
        });
    }

    (findings, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::descriptor::{Granularity, SampleStats};
    use crate::models::record::{Record, Scalar};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn metric_from(values: &[f64]) -> MetricDescriptor {
        let (mean, stdev) = stats::mean_stdev(values);
        let cv = stats::coefficient_of_variation(mean, stdev);
        MetricDescriptor {
            name: "refund_amount".to_string(),
            kind: crate::models::descriptor::MetricKind::Continuous,
            sample_stats: SampleStats {
                n: values.len(),
                mean,
                stdev,
                min: values.iter().cloned().fold(f64::INFINITY, f64::min),
                max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                coefficient_of_variation: cv,
            },
            purpose_matched: false,
        }
    }

    fn weekly_records(per_week_means: &[f64], n_per_week: usize) -> (RecordSet, Vec<TimeBucket>) {
        let mut records = Vec::new();
        let mut buckets = Vec::new();
        for (week, &mean) in per_week_means.iter().enumerate() {
            let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(7 * week as i64);
            let mut indices = Vec::new();
            for i in 0..n_per_week {
                let mut attrs = BTreeMap::new();
                let jitter = if i % 2 == 0 { 0.5 } else { -0.5 };
                attrs.insert("refund_amount".to_string(), Scalar::Real(mean + jitter));
                records.push(Record {
                    timestamp: Some(start),
                    attributes: attrs,
                });
                indices.push(records.len() - 1);
            }
            buckets.push(TimeBucket {
                bucket_id: format!("2024-W{:02}", week + 1),
                start,
                end: start + chrono::Duration::days(7),
                indices,
            });
        }
        (RecordSet::new(records), buckets)
    }

    #[test]
    fn monotonic_increase_fires_trend() {
        let (records, buckets) = weekly_records(&[52.0, 67.0, 82.0, 95.0], 40);
        let all_values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get("refund_amount").and_then(|v| v.as_numeric()))
            .collect();
        let metric = metric_from(&all_values);
        let config = AnalyzerConfig::default();
        let (findings, skip) = detect(&records, &buckets, &metric, &config);
        assert!(skip.is_none());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, DeviationKind::Trend);
        assert!(findings[0].severity > 0.0 && findings[0].severity <= 1.0);
        if let DeviationEvidence::Trend { direction, .. } = &findings[0].evidence {
            assert_eq!(*direction, "increasing");
        } else {
            panic!("expected trend evidence");
        }
    }

    #[test]
    fn identical_values_fire_nothing() {
        let (records, buckets) = weekly_records(&[100.0, 100.0, 100.0, 100.0], 20);
        let all_values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get("refund_amount").and_then(|v| v.as_numeric()))
            .collect();
        let metric = metric_from(&all_values);
        let config = AnalyzerConfig::default();
        let (findings, _) = detect(&records, &buckets, &metric, &config);
        assert!(findings.is_empty());
    }

    #[test]
    fn too_few_buckets_is_skipped_not_errored() {
        let (records, buckets) = weekly_records(&[52.0], 40);
        let all_values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get("refund_amount").and_then(|v| v.as_numeric()))
            .collect();
        let metric = metric_from(&all_values);
        let config = AnalyzerConfig::default();
        let (findings, skip) = detect(&records, &buckets, &metric, &config);
        assert!(findings.is_empty());
        assert!(skip.is_some());
    }

    #[test]
    fn severity_is_clamped_to_unit_interval() {
        let (records, buckets) = weekly_records(&[1.0, 1000.0], 20);
        let all_values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get("refund_amount").and_then(|v| v.as_numeric()))
            .collect();
        let metric = metric_from(&all_values);
        let config = AnalyzerConfig::default();
        let (findings, _) = detect(&records, &buckets, &metric, &config);
        assert!(findings.iter().all(|f| f.severity <= 1.0));
    }

    #[test]
    fn granularity_type_is_exported_for_callers() {
        let _ = Granularity::Week;
    }

    #[test]
    fn shift_z_at_exactly_the_threshold_does_not_fire() {
        let make = |bucket_id: &str, mean: f64| BucketStat {
            bucket_id: bucket_id.to_string(),
            mean,
            stdev: 1.0,
            n: 2,
        };
        let config = AnalyzerConfig::default();
        let at_boundary = vec![make("a", 100.0), make("b", 102.0)];
        assert!(find_shift(&at_boundary, &config).is_none());

        let past_boundary = vec![make("a", 100.0), make("b", 102.01)];
        assert!(find_shift(&past_boundary, &config).is_some());
    }
}

//! Bias Detector (spec §4.4): group comparison across metric × parameter
//! pairs, single and intersectional.

use std::collections::BTreeMap;

use crate::config::AnalyzerConfig;
use crate::models::descriptor::{GroupStats, MetricDescriptor, ParameterDescriptor};
use crate::models::finding::{BiasEvidence, BiasFinding, BiasKind, SkipReason, SkippedEntity};
use crate::models::record::RecordSet;
use crate::stats;

fn group_stats(records: &RecordSet, metric: &str, label: &str, labels_by_index: &BTreeMap<usize, String>) -> Option<GroupStats> {
    let values: Vec<f64> = records
        .iter()
        .enumerate()
        .filter(|(idx, _)| labels_by_index.get(idx).map(|l| l == label).unwrap_or(false))
        .filter_map(|(_, r)| r.attributes.get(metric).and_then(|v| v.as_numeric()))
        .collect();

    if values.is_empty() {
        return None;
    }
    let (mean, stdev) = stats::mean_stdev(&values);
    Some(GroupStats {
        n: values.len(),
        mean,
        stdev,
        min: values.iter().cloned().fold(f64::INFINITY, f64::min),
        max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Label every record under one parameter's bucketing scheme.
fn labels_for(records: &RecordSet, parameter: &ParameterDescriptor) -> BTreeMap<usize, String> {
    let mut labels = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        if let Some(value) = record.attributes.get(&parameter.name) {
            if let Some(label) = parameter.bucket_label(value) {
                labels.insert(idx, label);
            }
        }
    }
    labels
}

/// Joint label for an intersectional pair: `None` if either parameter has
/// no label for that record (spec §4.4 step 6).
fn intersectional_labels(
    records: &RecordSet,
    a: &ParameterDescriptor,
    b: &ParameterDescriptor,
) -> BTreeMap<usize, String> {
    let labels_a = labels_for(records, a);
    let labels_b = labels_for(records, b);
    let mut joint = BTreeMap::new();
    for idx in 0..records.len() {
        if let (Some(la), Some(lb)) = (labels_a.get(&idx), labels_b.get(&idx)) {
            joint.insert(idx, format!("{la}|{lb}"));
        }
    }
    joint
}

struct Comparison {
    advantaged: String,
    disadvantaged: String,
    stats_adv: GroupStats,
    stats_dis: GroupStats,
    d: f64,
    disparity_ratio: Option<f64>,
}

/// Identifies the highest-mean and lowest-mean usable groups and computes
/// `d` between them (spec §4.4 steps 1-5). `None` when fewer than two
/// groups clear `min_group_size`, or the effect size is degenerate.
fn best_comparison(records: &RecordSet, metric: &str, labels: &BTreeMap<usize, String>, config: &AnalyzerConfig) -> Option<Comparison> {
    let mut distinct_labels: Vec<&String> = labels.values().collect();
    distinct_labels.sort();
    distinct_labels.dedup();

    let mut group_cache: BTreeMap<String, GroupStats> = BTreeMap::new();
    for label in &distinct_labels {
        if let Some(gs) = group_stats(records, metric, label, labels) {
            if gs.n >= config.min_group_size as usize {
                group_cache.insert((*label).clone(), gs);
            }
        }
    }

    if group_cache.len() < 2 {
        return None;
    }

    let (adv_name, adv_stats) = group_cache
        .iter()
        .max_by(|(name_a, a), (name_b, b)| a.mean.partial_cmp(&b.mean).unwrap_or(std::cmp::Ordering::Equal).then(name_b.cmp(name_a)))
        .map(|(n, s)| (n.clone(), *s))?;
    let (dis_name, dis_stats) = group_cache
        .iter()
        .min_by(|(name_a, a), (name_b, b)| a.mean.partial_cmp(&b.mean).unwrap_or(std::cmp::Ordering::Equal).then(name_a.cmp(name_b)))
        .map(|(n, s)| (n.clone(), *s))?;

    if adv_name == dis_name {
        return None;
    }

    let pooled = stats::pooled_stdev(adv_stats.n, adv_stats.stdev, dis_stats.n, dis_stats.stdev);
    let d = stats::cohens_d(adv_stats.mean, dis_stats.mean, pooled)?.abs();
    let disparity_ratio = stats::disparity_ratio(adv_stats.mean, dis_stats.mean);

    Some(Comparison {
        advantaged: adv_name,
        disadvantaged: dis_name,
        stats_adv: adv_stats,
        stats_dis: dis_stats,
        d,
        disparity_ratio,
    })
}

fn severity_for(d: f64, ratio: Option<f64>, protected: bool, config: &AnalyzerConfig) -> f64 {
    let base = (d / 2.0).min(1.0);
    let with_disparity = if ratio.map(|r| r >= config.severe_disparity_ratio).unwrap_or(false) {
        base.max(0.85)
    } else {
        base
    };
    if protected {
        (with_disparity * 1.5).min(1.0)
    } else {
        with_disparity
    }
}

fn make_finding(
    kind: BiasKind,
    metric: &str,
    parameters: Vec<String>,
    comparison: &Comparison,
    protected: bool,
    config: &AnalyzerConfig,
) -> BiasFinding {
    let severity = severity_for(comparison.d, comparison.disparity_ratio, protected, config);
    let kind_label = match kind {
        BiasKind::Single => "bias",
        BiasKind::Intersectional => "intersectional bias",
    };
    BiasFinding {
        kind,
        metric: metric.to_string(),
        parameters,
        advantaged: comparison.advantaged.clone(),
        disadvantaged: comparison.disadvantaged.clone(),
        evidence: BiasEvidence {
            mean_adv: comparison.stats_adv.mean,
            mean_dis: comparison.stats_dis.mean,
            n_adv: comparison.stats_adv.n,
            n_dis: comparison.stats_dis.n,
            cohens_d: comparison.d,
            disparity_ratio: comparison.disparity_ratio,
        },
        protected,
        severity,
        description: format!(
            "{} shows {} on {}: {} ({:.2}) vs {} ({:.2}), d={:.2}",
            metric,
            kind_label,
            parameters.join(" x "),
            comparison.advantaged,
            comparison.stats_adv.mean,
            comparison.disadvantaged,
            comparison.stats_dis.mean,
            comparison.d
        ),
        concern: String::new(),
    }
}

/// Single-parameter bias check for one metric x parameter pair (spec
/// §4.4 steps 1-5).
pub fn detect_single(
    records: &RecordSet,
    metric: &MetricDescriptor,
    parameter: &ParameterDescriptor,
    config: &AnalyzerConfig,
) -> (Option<BiasFinding>, Option<SkippedEntity>) {
    let labels = labels_for(records, parameter);
    let entity = format!("{}/{}", metric.name, parameter.name);

    let Some(comparison) = best_comparison(records, &metric.name, &labels, config) else {
        return (None, Some(SkippedEntity::new(entity, SkipReason::InsufficientGroups)));
    };

    if comparison.d < config.bias_threshold_d {
        return (None, Some(SkippedEntity::new(entity, SkipReason::BelowBiasThreshold)));
    }

    let finding = make_finding(
        BiasKind::Single,
        &metric.name,
        vec![parameter.name.clone()],
        &comparison,
        parameter.protected,
        config,
    );
    (Some(finding), None)
}

/// Intersectional bias check across an ordered pair of parameters where
/// at least one is protected (spec §4.4 step 6). A single protected-ness
/// boost applies even when both parameters in the pair are protected
/// (recorded as a design decision in DESIGN.md).
pub fn detect_intersectional(
    records: &RecordSet,
    metric: &MetricDescriptor,
    a: &ParameterDescriptor,
    b: &ParameterDescriptor,
    config: &AnalyzerConfig,
) -> (Option<BiasFinding>, Option<SkippedEntity>) {
    let labels = intersectional_labels(records, a, b);
    let entity = format!("{}/{}x{}", metric.name, a.name, b.name);

    let Some(comparison) = best_comparison(records, &metric.name, &labels, config) else {
        return (None, Some(SkippedEntity::new(entity, SkipReason::InsufficientGroups)));
    };

    let threshold = config.bias_threshold_d * config.intersectional_multiplier;
    if comparison.d < threshold {
        return (None, Some(SkippedEntity::new(entity, SkipReason::BelowIntersectionalThreshold)));
    }

    let protected = a.protected || b.protected;
    let finding = make_finding(
        BiasKind::Intersectional,
        &metric.name,
        vec![a.name.clone(), b.name.clone()],
        &comparison,
        protected,
        config,
    );
    (Some(finding), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::descriptor::{Bucketing, MetricKind, SampleStats};
    use crate::models::record::{Record, Scalar};
    use std::collections::BTreeMap as Map;

    fn metric(name: &str, values: &[f64]) -> MetricDescriptor {
        let (mean, stdev) = stats::mean_stdev(values);
        MetricDescriptor {
            name: name.to_string(),
            kind: MetricKind::Continuous,
            sample_stats: SampleStats {
                n: values.len(),
                mean,
                stdev,
                min: values.iter().cloned().fold(f64::INFINITY, f64::min),
                max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                coefficient_of_variation: 0.0,
            },
            purpose_matched: false,
        }
    }

    fn records_with_groups(group_a_scores: &[f64], group_b_scores: &[f64]) -> RecordSet {
        let mut records = Vec::new();
        for &s in group_a_scores {
            let mut attrs = Map::new();
            attrs.insert("approval_score".to_string(), Scalar::Real(s));
            attrs.insert("gender".to_string(), Scalar::String("male".to_string()));
            records.push(Record { timestamp: None, attributes: attrs });
        }
        for &s in group_b_scores {
            let mut attrs = Map::new();
            attrs.insert("approval_score".to_string(), Scalar::Real(s));
            attrs.insert("gender".to_string(), Scalar::String("female".to_string()));
            records.push(Record { timestamp: None, attributes: attrs });
        }
        RecordSet::new(records)
    }

    /// Four composite groups over `segment` x `channel`, each `n` records
    /// with `approval_score` jittered by `±amplitude` around its group mean.
    fn records_with_composite_groups(group_means: &[(&str, &str, f64)], n: usize, amplitude: f64) -> RecordSet {
        let mut records = Vec::new();
        for &(segment, channel, mean) in group_means {
            for i in 0..n {
                let jitter = if i % 2 == 0 { amplitude } else { -amplitude };
                let mut attrs = Map::new();
                attrs.insert("approval_score".to_string(), Scalar::Real(mean + jitter));
                attrs.insert("segment".to_string(), Scalar::String(segment.to_string()));
                attrs.insert("channel".to_string(), Scalar::String(channel.to_string()));
                records.push(Record { timestamp: None, attributes: attrs });
            }
        }
        RecordSet::new(records)
    }

    fn segment_param() -> ParameterDescriptor {
        ParameterDescriptor {
            name: "segment".to_string(),
            protected: true,
            cardinality: 2,
            bucketing: Bucketing::Categorical,
        }
    }

    fn channel_param() -> ParameterDescriptor {
        ParameterDescriptor {
            name: "channel".to_string(),
            protected: false,
            cardinality: 2,
            bucketing: Bucketing::Categorical,
        }
    }

    #[test]
    fn intersectional_bias_selects_composite_advantaged_and_disadvantaged() {
        let groups = [("p", "r", 105.0), ("p", "s", 101.0), ("q", "r", 100.0), ("q", "s", 95.0)];
        let records = records_with_composite_groups(&groups, 100, 1.0);
        let all_values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get("approval_score").and_then(|v| v.as_numeric()))
            .collect();
        let m = metric("approval_score", &all_values);
        let config = AnalyzerConfig::default();

        let (finding, skip) = detect_intersectional(&records, &m, &segment_param(), &channel_param(), &config);
        assert!(skip.is_none());
        let finding = finding.expect("expected an intersectional bias finding");
        assert_eq!(finding.kind, BiasKind::Intersectional);
        assert_eq!(finding.parameters, vec!["segment".to_string(), "channel".to_string()]);
        assert_eq!(finding.advantaged, "p|r");
        assert_eq!(finding.disadvantaged, "q|s");
        assert!(finding.protected);
    }

    #[test]
    fn intersectional_bias_is_gated_by_the_intersectional_multiplier() {
        // |d| here lands just above bias_threshold_d (0.3) but below
        // bias_threshold_d * intersectional_multiplier (0.36 by default),
        // so it must be skipped as intersectional even though a single
        // comparison at the same |d| would clear 0.3.
        let groups = [("p", "r", 100.33167), ("p", "s", 100.1), ("q", "r", 100.05), ("q", "s", 100.0)];
        let records = records_with_composite_groups(&groups, 100, 1.0);
        let all_values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.attributes.get("approval_score").and_then(|v| v.as_numeric()))
            .collect();
        let m = metric("approval_score", &all_values);
        let config = AnalyzerConfig::default();
        assert!(0.330 > config.bias_threshold_d);
        assert!(0.330 < config.bias_threshold_d * config.intersectional_multiplier);

        let (finding, skip) = detect_intersectional(&records, &m, &segment_param(), &channel_param(), &config);
        assert!(finding.is_none());
        assert!(matches!(skip, Some(s) if s.reason.contains("intersectional_multiplier")));
    }

    #[test]
    fn large_effect_size_fires_single_bias() {
        let high: Vec<f64> = (0..30).map(|i| 80.0 + (i % 5) as f64).collect();
        let low: Vec<f64> = (0..30).map(|i| 40.0 + (i % 5) as f64).collect();
        let records = records_with_groups(&high, &low);
        let m = metric("approval_score", &[high.clone(), low.clone()].concat());
        let param = ParameterDescriptor {
            name: "gender".to_string(),
            protected: true,
            cardinality: 2,
            bucketing: Bucketing::Categorical,
        };
        let config = AnalyzerConfig::default();
        let (finding, skip) = detect_single(&records, &m, &param, &config);
        assert!(skip.is_none());
        let finding = finding.expect("expected a bias finding");
        assert_eq!(finding.advantaged, "male");
        assert_eq!(finding.disadvantaged, "female");
        assert!(finding.protected);
        assert!(finding.severity > 0.0 && finding.severity <= 1.0);
    }

    #[test]
    fn similar_groups_are_skipped_below_threshold() {
        let a: Vec<f64> = (0..30).map(|i| 70.0 + (i % 3) as f64).collect();
        let b: Vec<f64> = (0..30).map(|i| 70.1 + (i % 3) as f64).collect();
        let records = records_with_groups(&a, &b);
        let m = metric("approval_score", &[a.clone(), b.clone()].concat());
        let param = ParameterDescriptor {
            name: "gender".to_string(),
            protected: true,
            cardinality: 2,
            bucketing: Bucketing::Categorical,
        };
        let config = AnalyzerConfig::default();
        let (finding, skip) = detect_single(&records, &m, &param, &config);
        assert!(finding.is_none());
        assert!(skip.is_some());
    }

    #[test]
    fn too_few_groups_yields_insufficient_groups_skip() {
        let only_one_group: Vec<f64> = (0..30).map(|i| 50.0 + i as f64).collect();
        let mut records = Vec::new();
        for &s in &only_one_group {
            let mut attrs = Map::new();
            attrs.insert("approval_score".to_string(), Scalar::Real(s));
            attrs.insert("gender".to_string(), Scalar::String("male".to_string()));
            records.push(Record { timestamp: None, attributes: attrs });
        }
        let records = RecordSet::new(records);
        let m = metric("approval_score", &only_one_group);
        let param = ParameterDescriptor {
            name: "gender".to_string(),
            protected: true,
            cardinality: 1,
            bucketing: Bucketing::Categorical,
        };
        let config = AnalyzerConfig::default();
        let (finding, skip) = detect_single(&records, &m, &param, &config);
        assert!(finding.is_none());
        assert!(matches!(skip, Some(s) if s.reason.contains("two usable groups")));
    }
}

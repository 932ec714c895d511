//! Metric & Group Extractor (spec §4.2): classifies attribute names into
//! candidate business metrics, candidate grouping parameters, and the
//! protected-attribute set.

use std::collections::{BTreeSet, HashSet};

use crate::config::AnalyzerConfig;
use crate::models::descriptor::{Bucketing, MetricDescriptor, MetricKind, ParameterDescriptor, SampleStats};
use crate::models::finding::{SkipReason, SkippedEntity};
use crate::models::record::RecordSet;
use crate::stats;

/// Recognized anti-discrimination keyword families (spec §4.2). Extending
/// these is fine; shrinking them is not (spec §9: false negatives on
/// protected-attribute detection are unacceptable).
const PROTECTED_FAMILIES: &[&[&str]] = &[
    &["age", "years_old"],
    &["gender", "sex"],
    &["race", "ethnic", "ethnicity"],
    &["religion"],
    &["national_origin", "nationality"],
    &["disability", "disabled"],
    &["marital_status"],
    &["genetic"],
];

const AGE_FAMILY: &[&str] = &["age", "years_old"];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "to", "of", "in", "on", "for", "is", "are", "be", "this",
    "that", "with", "as", "by", "at", "from", "it", "its", "we", "our",
];

fn name_lower_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn matches_family(name_lower: &str, tokens: &[String], family: &[&str]) -> bool {
    family
        .iter()
        .any(|kw| name_lower.contains(kw) || tokens.iter().any(|t| t == kw))
}

pub fn is_protected(name: &str) -> bool {
    let lower = name.to_lowercase();
    let tokens = name_lower_tokens(name);
    PROTECTED_FAMILIES.iter().any(|family| matches_family(&lower, &tokens, family))
}

fn is_age_attribute(name: &str) -> bool {
    let lower = name.to_lowercase();
    let tokens = name_lower_tokens(name);
    matches_family(&lower, &tokens, AGE_FAMILY)
}

fn purpose_keywords(purpose: &str) -> HashSet<String> {
    const MAX_PURPOSE_BYTES: usize = 4096;
    let truncated = if purpose.len() > MAX_PURPOSE_BYTES {
        let mut end = MAX_PURPOSE_BYTES;
        while !purpose.is_char_boundary(end) {
            end -= 1;
        }
        &purpose[..end]
    } else {
        purpose
    };

    truncated
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn attribute_purpose_matched(name: &str, keywords: &HashSet<String>) -> bool {
    if keywords.is_empty() {
        return false;
    }
    name_lower_tokens(name).iter().any(|t| keywords.contains(t))
}

struct AttributeSummary {
    name: String,
    total: usize,
    numeric_values: Vec<f64>,
    distinct_keys: BTreeSet<String>,
}

fn summarize(records: &RecordSet) -> Vec<AttributeSummary> {
    let keys = records.attribute_keys();
    keys.into_iter()
        .map(|name| {
            let mut total = 0usize;
            let mut numeric_values = Vec::new();
            let mut distinct_keys = BTreeSet::new();
            for record in records.iter() {
                if let Some(value) = record.attributes.get(&name) {
                    total += 1;
                    distinct_keys.insert(value.distinct_key());
                    if let Some(n) = value.as_numeric() {
                        numeric_values.push(n);
                    }
                }
            }
            AttributeSummary {
                name,
                total,
                numeric_values,
                distinct_keys,
            }
        })
        .collect()
}

pub struct ExtractionResult {
    pub metrics: Vec<MetricDescriptor>,
    pub parameters: Vec<ParameterDescriptor>,
    pub protected_detected: Vec<String>,
    pub skipped: Vec<SkippedEntity>,
}

/// Classify every attribute key over the record set (spec §4.2).
pub fn extract(records: &RecordSet, purpose: &str, config: &AnalyzerConfig) -> ExtractionResult {
    let total_records = records.len().max(1);
    let purpose_kw = purpose_keywords(purpose);
    let summaries = summarize(records);

    let mut metrics = Vec::new();
    let mut parameters = Vec::new();
    let mut protected_detected = Vec::new();
    let mut skipped = Vec::new();

    for summary in &summaries {
        let protected = is_protected(&summary.name);
        if protected {
            protected_detected.push(summary.name.clone());
        }

        let coverage = summary.numeric_values.len() as f64 / total_records as f64;
        let is_numeric = coverage >= config.min_numeric_coverage;
        let distinct_count = summary.distinct_keys.len();

        // A mix of numeric and non-numeric values under one key (coverage
        // above zero but below the threshold) is ambiguous: neither a clean
        // metric nor a trustworthy categorical label set, so it is skipped
        // outright rather than risked as a grouping parameter.
        if !is_numeric && !summary.numeric_values.is_empty() {
            skipped.push(SkippedEntity::new(&summary.name, SkipReason::NotNumericEnough));
            continue;
        }

        let purpose_matched = attribute_purpose_matched(&summary.name, &purpose_kw);
        let cv_floor = if purpose_matched { config.min_cv / 2.0 } else { config.min_cv };

        let mut promoted_as_metric = false;
        if is_numeric && distinct_count >= 3 {
            let (mean, stdev) = stats::mean_stdev(&summary.numeric_values);
            let cv = stats::coefficient_of_variation(mean, stdev);
            if cv >= cv_floor {
                let min = summary.numeric_values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = summary
                    .numeric_values
                    .iter()
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                metrics.push(MetricDescriptor {
                    name: summary.name.clone(),
                    kind: classify_kind(&summary.name, &summary.numeric_values),
                    sample_stats: SampleStats {
                        n: summary.numeric_values.len(),
                        mean,
                        stdev,
                        min,
                        max,
                        coefficient_of_variation: cv,
                    },
                    purpose_matched,
                });
                promoted_as_metric = true;
            } else {
                skipped.push(SkippedEntity::new(&summary.name, SkipReason::CoefficientOfVariationTooLow));
            }
        } else if is_numeric {
            skipped.push(SkippedEntity::new(&summary.name, SkipReason::TooFewDistinctValues));
        }

        // A numeric attribute can be both a metric and (via bucketing) a
        // grouping parameter, e.g. age. Protected numeric attributes are
        // always bucketed regardless of cardinality (spec §4.2).
        if is_numeric {
            if is_age_attribute(&summary.name) {
                parameters.push(ParameterDescriptor {
                    name: summary.name.clone(),
                    protected,
                    cardinality: 2,
                    bucketing: Bucketing::FixedSplit { threshold: 40.0 },
                });
            } else if distinct_count > config.max_group_cardinality as usize {
                let mut sorted = summary.numeric_values.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let median = median_of_sorted(&sorted);
                parameters.push(ParameterDescriptor {
                    name: summary.name.clone(),
                    protected,
                    cardinality: 2,
                    bucketing: Bucketing::MedianSplit { median },
                });
            } else if !promoted_as_metric && (2..=config.max_group_cardinality as usize).contains(&distinct_count) {
                parameters.push(ParameterDescriptor {
                    name: summary.name.clone(),
                    protected,
                    cardinality: distinct_count,
                    bucketing: Bucketing::Categorical,
                });
            } else if !promoted_as_metric {
                skipped.push(SkippedEntity::new(&summary.name, SkipReason::CardinalityOutOfRange));
            }
        } else if (2..=config.max_group_cardinality as usize).contains(&distinct_count) {
            parameters.push(ParameterDescriptor {
                name: summary.name.clone(),
                protected,
                cardinality: distinct_count,
                bucketing: Bucketing::Categorical,
            });
        } else {
            skipped.push(SkippedEntity::new(&summary.name, SkipReason::CardinalityOutOfRange));
        }
    }

    metrics.sort_by(|a, b| {
        b.purpose_matched
            .cmp(&a.purpose_matched)
            .then(
                b.sample_stats
                    .coefficient_of_variation
                    .partial_cmp(&a.sample_stats.coefficient_of_variation)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    parameters.sort_by(|a, b| b.protected.cmp(&a.protected).then(a.cardinality.cmp(&b.cardinality)));

    tracing::info!(
        "extractor: {} metric(s), {} parameter(s), {} protected attribute(s)",
        metrics.len(),
        parameters.len(),
        protected_detected.len()
    );

    ExtractionResult {
        metrics,
        parameters,
        protected_detected,
        skipped,
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Kind is not pinned down by a literal rule in spec §4.2 beyond the
/// metric/parameter split; this heuristic (name hints at a rate, else
/// integral values hint at a count, else continuous) is recorded as an
/// Open Question resolution in DESIGN.md.
fn classify_kind(name: &str, values: &[f64]) -> MetricKind {
    let lower = name.to_lowercase();
    if ["rate", "ratio", "percent", "pct"].iter().any(|s| lower.contains(s)) {
        return MetricKind::Rate;
    }
    let all_integral = values.iter().all(|v| v.fract() == 0.0);
    if all_integral {
        MetricKind::Count
    } else {
        MetricKind::Continuous
    }
}

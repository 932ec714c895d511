use serde::Serialize;

use super::descriptor::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationKind {
    Trend,
    Shift,
    Outliers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasKind {
    Single,
    Intersectional,
}

/// Kind-specific numeric evidence for a deviation finding (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DeviationEvidence {
    Trend {
        direction: &'static str,
        first_mean: f64,
        last_mean: f64,
        percent_change: f64,
        periods: usize,
        supporting_shift_z: Option<f64>,
    },
    Shift {
        bucket_a: String,
        bucket_b: String,
        mean_a: f64,
        mean_b: f64,
        z_score: f64,
    },
    Outliers {
        count: usize,
        total: usize,
        fraction: f64,
        max_abs_z: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviationFinding {
    pub kind: DeviationKind,
    pub metric: String,
    pub evidence: DeviationEvidence,
    pub severity: f64,
    pub description: String,
    pub concern: String,
}

/// Evidence for a bias finding (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct BiasEvidence {
    pub mean_adv: f64,
    pub mean_dis: f64,
    pub n_adv: usize,
    pub n_dis: usize,
    pub cohens_d: f64,
    pub disparity_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BiasFinding {
    pub kind: BiasKind,
    pub metric: String,
    pub parameters: Vec<String>,
    pub advantaged: String,
    pub disadvantaged: String,
    pub evidence: BiasEvidence,
    pub protected: bool,
    pub severity: f64,
    pub description: String,
    pub concern: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Finding {
    Deviation(DeviationFinding),
    Bias(BiasFinding),
}

impl Finding {
    pub fn severity(&self) -> f64 {
        match self {
            Finding::Deviation(d) => d.severity,
            Finding::Bias(b) => b.severity,
        }
    }

    pub fn is_protected_bias(&self) -> bool {
        matches!(self, Finding::Bias(b) if b.protected)
    }
}

/// Non-fatal, per-entity skip reasons (spec §7). Serialized into
/// `run.skipped` as `{"entity": ..., "reason": ...}`.
#[derive(Debug, Clone)]
pub enum SkipReason {
    NotNumericEnough,
    TooFewDistinctValues,
    CoefficientOfVariationTooLow,
    CardinalityOutOfRange,
    InsufficientTrendPeriods,
    InsufficientGroups,
    BelowBiasThreshold,
    BelowIntersectionalThreshold,
    NumericDegenerate,
    NoTemporalBuckets,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::NotNumericEnough => "numeric coverage below min_numeric_coverage",
            SkipReason::TooFewDistinctValues => "fewer than 3 distinct values",
            SkipReason::CoefficientOfVariationTooLow => "coefficient of variation below min_cv",
            SkipReason::CardinalityOutOfRange => "cardinality outside [2, max_group_cardinality]",
            SkipReason::InsufficientTrendPeriods => "insufficient trend: fewer than min_periods usable buckets",
            SkipReason::InsufficientGroups => "fewer than two usable groups",
            SkipReason::BelowBiasThreshold => "|d| below bias_threshold_d",
            SkipReason::BelowIntersectionalThreshold => "|d| below bias_threshold_d * intersectional_multiplier",
            SkipReason::NumericDegenerate => "pooled stdev degenerate after fallback",
            SkipReason::NoTemporalBuckets => "fewer than 2 non-empty time buckets",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntity {
    pub entity: String,
    pub reason: String,
}

impl SkippedEntity {
    pub fn new(entity: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }
}

/// Run-level metadata accompanying the findings (spec §4.5, §6).
#[derive(Debug, Clone, Serialize)]
pub struct RunEnvelope {
    pub granularity_used: Option<Granularity>,
    pub metrics_considered: Vec<String>,
    pub parameters_considered: Vec<String>,
    pub protected_detected: Vec<String>,
    pub skipped: Vec<SkippedEntity>,
}

/// Full output of a single `analyze` call (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub findings: Vec<Finding>,
    pub run: RunEnvelope,
}

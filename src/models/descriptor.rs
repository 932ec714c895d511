use chrono::{DateTime, Utc};

/// Kind classification for a candidate business metric (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Continuous,
    Rate,
    Count,
}

/// Summary statistics for a metric over the whole record set, used to
/// classify and order metrics (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct SampleStats {
    pub n: usize,
    pub mean: f64,
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
    pub coefficient_of_variation: f64,
}

/// A numeric attribute promoted to a business metric by the extractor.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub name: String,
    pub kind: MetricKind,
    pub sample_stats: SampleStats,
    pub purpose_matched: bool,
}

/// How a grouping parameter's raw values map to bucket labels (spec §4.2).
#[derive(Debug, Clone)]
pub enum Bucketing {
    /// Non-numeric attribute: the label is the scalar's own distinct key.
    Categorical,
    /// Numeric attribute, auto-bucketed at the sample median.
    MedianSplit { median: f64 },
    /// Numeric attribute matching the age keyword family, fixed at 40.
    FixedSplit { threshold: f64 },
}

/// A candidate grouping parameter (spec §3, §4.2).
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: String,
    pub protected: bool,
    pub cardinality: usize,
    pub bucketing: Bucketing,
}

impl ParameterDescriptor {
    /// Map one record's scalar for this parameter into its bucket label.
    pub fn bucket_label(&self, value: &crate::models::record::Scalar) -> Option<String> {
        match &self.bucketing {
            Bucketing::Categorical => Some(value.distinct_key()),
            Bucketing::MedianSplit { median } => {
                let v = value.as_numeric()?;
                Some(if v < *median { "<median".to_string() } else { "\u{2265}median".to_string() })
            }
            Bucketing::FixedSplit { threshold } => {
                let v = value.as_numeric()?;
                Some(if v < *threshold {
                    format!("<{}", *threshold as i64)
                } else {
                    format!("{}+", *threshold as i64)
                })
            }
        }
    }
}

/// `(n, mean, stdev, min, max)` for one metric restricted to one group
/// (spec §3). Only constructed when `n >= min_group_size`.
#[derive(Debug, Clone, Copy)]
pub struct GroupStats {
    pub n: usize,
    pub mean: f64,
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

/// Time granularity chosen by the normalizer (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
}

/// A contiguous half-open time interval grouping record indices (spec §3).
#[derive(Debug, Clone)]
pub struct TimeBucket {
    pub bucket_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub indices: Vec<usize>,
}

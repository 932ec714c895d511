use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized attribute value. Kept scalar per spec §3 —
/// the normalizer never nests structures into a Record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
}

impl Scalar {
    /// Numeric coercion used by the extractor's numeric-coverage test
    /// (spec §4.2). Booleans and strings are not numeric.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Real(f) => Some(*f),
            Scalar::Boolean(_) | Scalar::String(_) => None,
        }
    }

    /// Stable string key used for distinct-value counting and bucket
    /// labels — two scalars with the same semantic value must produce
    /// the same key regardless of which numeric variant they arrived as.
    pub fn distinct_key(&self) -> String {
        match self {
            Scalar::Integer(i) => format!("{i}"),
            Scalar::Real(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{}", *f as i64)
                } else {
                    format!("{f}")
                }
            }
            Scalar::Boolean(b) => b.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }
}

/// One normalized telemetry event, roughly one OTEL span (spec §3).
/// `timestamp` is `None` when the source record had no parseable
/// timestamp; such records participate in extraction and bias analysis
/// but are excluded from temporal analysis.
#[derive(Debug, Clone)]
pub struct Record {
    pub timestamp: Option<DateTime<Utc>>,
    pub attributes: BTreeMap<String, Scalar>,
}

/// Ordered sequence of [`Record`]s. Order is the order of normalization,
/// which is deterministic given input order (spec §3 invariant).
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    /// Records that carry a parsed timestamp, used by temporal analysis.
    pub fn timestamped(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.timestamp.is_some())
    }

    /// All distinct attribute keys across the record set, in first-seen order.
    pub fn attribute_keys(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut keys = Vec::new();
        for record in &self.records {
            for key in record.attributes.keys() {
                if seen.insert(key.clone()) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }
}

//! Trace Normalizer (spec §4.1): converts heterogeneous OTEL input into
//! a [`RecordSet`] plus the derived time-bucketing the temporal detector
//! needs.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde_json::Value;

use crate::error::{AnalyzerError, Result};
use crate::models::descriptor::{Granularity, TimeBucket};
use crate::models::otel::{CompactPayload, OtlpPayload};
use crate::models::record::{Record, RecordSet, Scalar};

pub struct Normalized {
    pub records: RecordSet,
    pub granularity: Option<Granularity>,
    pub buckets: Vec<TimeBucket>,
}

/// Entry point: classify, parse, and bucket (spec §4.1).
pub fn normalize(raw: &Value) -> Result<Normalized> {
    let records = if raw.get("resourceSpans").is_some() {
        let payload: OtlpPayload = serde_json::from_value(raw.clone())
            .map_err(|e| AnalyzerError::MalformedInput(format!("invalid OTLP shape: {e}")))?;
        normalize_otlp(payload)
    } else if raw.get("traces").is_some() {
        let payload: CompactPayload = serde_json::from_value(raw.clone())
            .map_err(|e| AnalyzerError::MalformedInput(format!("invalid compact shape: {e}")))?;
        normalize_compact(payload)
    } else {
        return Err(AnalyzerError::MalformedInput(
            "root object has neither 'resourceSpans' nor 'traces'".to_string(),
        ));
    };

    if records.is_empty() {
        tracing::warn!("normalizer: zero records survived normalization, returning empty result");
        return Ok(Normalized {
            records: RecordSet::new(Vec::new()),
            granularity: None,
            buckets: Vec::new(),
        });
    }

    tracing::info!("normalizer: produced {} record(s)", records.len());

    let record_set = RecordSet::new(records);
    let (granularity, buckets) = choose_granularity(&record_set);
    if granularity.is_none() {
        tracing::warn!("normalizer: fewer than 2 usable time buckets at any granularity; temporal detection skipped");
    } else {
        tracing::info!(
            "normalizer: granularity={:?}, {} non-empty bucket(s)",
            granularity,
            buckets.len()
        );
    }

    Ok(Normalized {
        records: record_set,
        granularity,
        buckets,
    })
}

fn value_to_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::String(s) => Some(Scalar::String(s.clone())),
        Value::Bool(b) => Some(Scalar::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Integer(i))
            } else {
                n.as_f64().map(Scalar::Real)
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn normalize_compact(payload: CompactPayload) -> Vec<Record> {
    payload
        .traces
        .into_iter()
        .map(|trace| {
            let timestamp = trace.timestamp.as_ref().and_then(parse_timestamp);
            let mut attributes = BTreeMap::new();
            for (key, value) in trace.attributes {
                if let Some(scalar) = value_to_scalar(&value) {
                    attributes.insert(key, scalar);
                }
            }
            Record { timestamp, attributes }
        })
        .collect()
}

fn normalize_otlp(payload: OtlpPayload) -> Vec<Record> {
    let mut records = Vec::new();
    for resource_spans in payload.resource_spans {
        let resource_attrs: BTreeMap<String, Scalar> = resource_spans
            .resource
            .map(|r| {
                r.attributes
                    .iter()
                    .filter_map(|a| a.value.scalar().map(|s| (a.key.clone(), s)))
                    .collect()
            })
            .unwrap_or_default();

        for scope in resource_spans.scope_spans {
            for span in scope.spans {
                let timestamp = span.start_time_unix_nano.as_ref().and_then(parse_timestamp);
                // Resource attributes merged first, span-level overrides on conflict.
                let mut attributes = resource_attrs.clone();
                for attr in &span.attributes {
                    if let Some(scalar) = attr.value.scalar() {
                        attributes.insert(attr.key.clone(), scalar);
                    }
                }
                records.push(Record { timestamp, attributes });
            }
        }
    }
    records
}

/// Parse a timestamp accepting ISO-8601 strings, unix seconds, and unix
/// nanoseconds. Resolution heuristic: magnitude > 10^12 is nanoseconds
/// (spec §4.1). Returns `None` rather than erroring — unparseable
/// timestamps keep the record with `timestamp = None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            s.trim().parse::<f64>().ok().and_then(from_unix_number)
        }
        Value::Number(n) => n.as_f64().and_then(from_unix_number),
        _ => None,
    }
}

fn from_unix_number(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let (secs, nanos) = if n.abs() > 1e12 {
        let secs = (n / 1e9).floor();
        let nanos = (n - secs * 1e9).round() as u32;
        (secs as i64, nanos)
    } else {
        let secs = n.floor();
        let nanos = ((n - secs) * 1e9).round() as u32;
        (secs as i64, nanos)
    };
    Utc.timestamp_opt(secs, nanos.min(999_999_999)).single()
}

fn floor_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

fn floor_to_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(dt)
}

fn floor_to_week(dt: DateTime<Utc>) -> DateTime<Utc> {
    let date = dt.date_naive();
    let days_since_monday = date.weekday().num_days_from_monday();
    let monday = date - Duration::days(days_since_monday as i64);
    monday
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(dt)
}

fn bucket_bounds(dt: DateTime<Utc>, granularity: Granularity) -> (DateTime<Utc>, DateTime<Utc>, String) {
    match granularity {
        Granularity::Hour => {
            let start = floor_to_hour(dt);
            (start, start + Duration::hours(1), start.format("%Y-%m-%dT%H:00:00Z").to_string())
        }
        Granularity::Day => {
            let start = floor_to_day(dt);
            (start, start + Duration::days(1), start.format("%Y-%m-%d").to_string())
        }
        Granularity::Week => {
            let start = floor_to_week(dt);
            (start, start + Duration::days(7), start.format("%G-W%V").to_string())
        }
    }
}

fn build_buckets(records: &RecordSet, granularity: Granularity) -> Vec<TimeBucket> {
    let mut by_id: BTreeMap<String, TimeBucket> = BTreeMap::new();
    for (idx, record) in records.as_slice().iter().enumerate() {
        let Some(ts) = record.timestamp else { continue };
        let (start, end, bucket_id) = bucket_bounds(ts, granularity);
        by_id
            .entry(bucket_id.clone())
            .or_insert_with(|| TimeBucket {
                bucket_id,
                start,
                end,
                indices: Vec::new(),
            })
            .indices
            .push(idx);
    }
    let mut buckets: Vec<TimeBucket> = by_id.into_values().collect();
    buckets.sort_by_key(|b| b.start);
    buckets
}

/// Pick the coarsest granularity the span of timestamps justifies, falling
/// back to finer granularities until at least 2 non-empty buckets result
/// (spec §4.1). Returns `(None, [])` when even hourly buckets can't produce
/// two non-empty groups.
fn choose_granularity(records: &RecordSet) -> (Option<Granularity>, Vec<TimeBucket>) {
    let timestamps: Vec<DateTime<Utc>> = records.timestamped().filter_map(|r| r.timestamp).collect();
    if timestamps.len() < 2 {
        return (None, Vec::new());
    }
    let min_t = *timestamps.iter().min().expect("non-empty");
    let max_t = *timestamps.iter().max().expect("non-empty");
    let span = max_t - min_t;

    let candidates: &[Granularity] = if span >= Duration::days(21) {
        &[Granularity::Week, Granularity::Day, Granularity::Hour]
    } else if span >= Duration::days(3) {
        &[Granularity::Day, Granularity::Hour]
    } else {
        &[Granularity::Hour]
    };

    for &granularity in candidates {
        let buckets = build_buckets(records, granularity);
        if buckets.len() >= 2 {
            return (Some(granularity), buckets);
        }
    }
    (None, Vec::new())
}

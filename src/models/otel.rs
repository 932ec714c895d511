//! Raw wire shapes accepted by the normalizer (spec §4.1, §6). These
//! mirror the teacher's `WideEvent`/`SpanNode` deserialization style —
//! plain serde structs, no validation logic embedded in them.

use serde::Deserialize;
use serde_json::Value;

/// Compact input: `{ "traces": [ ... ] }`.
#[derive(Debug, Deserialize)]
pub struct CompactPayload {
    pub traces: Vec<CompactTrace>,
}

#[derive(Debug, Deserialize)]
pub struct CompactTrace {
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub span_name: Option<String>,
    #[serde(default)]
    pub attributes: std::collections::BTreeMap<String, Value>,
}

/// OTLP input: `{ "resourceSpans": [ ... ] }`.
#[derive(Debug, Deserialize)]
pub struct OtlpPayload {
    #[serde(rename = "resourceSpans")]
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceSpans {
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(rename = "scopeSpans", default)]
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<OtlpAttribute>,
}

#[derive(Debug, Deserialize)]
pub struct ScopeSpans {
    #[serde(default)]
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Deserialize)]
pub struct OtlpSpan {
    #[serde(rename = "traceId", default)]
    pub trace_id: Option<String>,
    #[serde(rename = "spanId", default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "startTimeUnixNano", default)]
    pub start_time_unix_nano: Option<Value>,
    #[serde(default)]
    pub attributes: Vec<OtlpAttribute>,
}

#[derive(Debug, Deserialize)]
pub struct OtlpAttribute {
    pub key: String,
    pub value: OtlpAnyValue,
}

/// A typed OTLP attribute value. Unknown/unsupported kinds (arrays,
/// nested `kvlistValue`, bytes) deserialize fine but [`OtlpAnyValue::scalar`]
/// returns `None` for them — the normalizer skips such attributes rather
/// than failing (spec §4.1: "unknown value kinds produce no attribute").
#[derive(Debug, Deserialize)]
pub struct OtlpAnyValue {
    #[serde(rename = "stringValue", default)]
    pub string_value: Option<String>,
    #[serde(rename = "intValue", default)]
    pub int_value: Option<Value>,
    #[serde(rename = "doubleValue", default)]
    pub double_value: Option<f64>,
    #[serde(rename = "boolValue", default)]
    pub bool_value: Option<bool>,
}

impl OtlpAnyValue {
    pub fn scalar(&self) -> Option<crate::models::record::Scalar> {
        use crate::models::record::Scalar;
        if let Some(s) = &self.string_value {
            return Some(Scalar::String(s.clone()));
        }
        if let Some(v) = &self.int_value {
            if let Some(i) = v.as_i64() {
                return Some(Scalar::Integer(i));
            }
            if let Some(s) = v.as_str() {
                if let Ok(i) = s.parse::<i64>() {
                    return Some(Scalar::Integer(i));
                }
            }
        }
        if let Some(d) = self.double_value {
            return Some(Scalar::Real(d));
        }
        if let Some(b) = self.bool_value {
            return Some(Scalar::Boolean(b));
        }
        None
    }
}

pub mod bias;
pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod normalizer;
pub mod stats;
pub mod synthesizer;
pub mod temporal;

use serde_json::Value;

pub use config::AnalyzerConfig;
pub use error::{AnalyzerError, Result};
use models::finding::{AnalysisOutput, BiasFinding, DeviationFinding, RunEnvelope, SkipReason, SkippedEntity};

/// Run the full five-stage pipeline over a raw OTEL payload (spec §2).
///
/// `purpose` is the optional AgentPurpose string; it never gates whether a
/// statistical finding fires, only the concern narrative and metric
/// priority (spec §3).
pub fn analyze(payload: &Value, config: &AnalyzerConfig, purpose: &str) -> Result<AnalysisOutput> {
    config.validate()?;

    let normalize_span = tracing::info_span!("normalize");
    let normalized = normalize_span.in_scope(|| normalizer::normalize(payload))?;

    let extract_span = tracing::info_span!("extract");
    let extraction = extract_span.in_scope(|| extractor::extract(&normalized.records, purpose, config));

    let mut skipped: Vec<SkippedEntity> = extraction.skipped;
    if normalized.granularity.is_none() && !normalized.records.is_empty() {
        skipped.push(SkippedEntity::new("time_buckets", SkipReason::NoTemporalBuckets));
    }

    let mut deviations: Vec<DeviationFinding> = Vec::new();

    {
        let _span = tracing::info_span!("temporal").entered();
        for metric in &extraction.metrics {
            let (findings, skip) = temporal::detect(&normalized.records, &normalized.buckets, metric, config);
            deviations.extend(findings);
            if let Some(skip) = skip {
                skipped.push(skip);
            }
        }
    }

    let mut biases: Vec<BiasFinding> = Vec::new();
    {
        let _span = tracing::info_span!("bias").entered();
        for metric in &extraction.metrics {
            for parameter in &extraction.parameters {
                let (finding, skip) = bias::detect_single(&normalized.records, metric, parameter, config);
                if let Some(finding) = finding {
                    biases.push(finding);
                }
                if let Some(skip) = skip {
                    skipped.push(skip);
                }
            }

            for i in 0..extraction.parameters.len() {
                for j in (i + 1)..extraction.parameters.len() {
                    let a = &extraction.parameters[i];
                    let b = &extraction.parameters[j];
                    if !(a.protected || b.protected) {
                        continue;
                    }
                    let (finding, skip) = bias::detect_intersectional(&normalized.records, metric, a, b, config);
                    if let Some(finding) = finding {
                        biases.push(finding);
                    }
                    if let Some(skip) = skip {
                        skipped.push(skip);
                    }
                }
            }
        }
    }

    let findings = {
        let _span = tracing::info_span!("synthesize").entered();
        synthesizer::synthesize(deviations, biases, purpose, config)
    };

    tracing::info!(
        "analyze: {} finding(s), {} skipped entit(y/ies)",
        findings.len(),
        skipped.len()
    );

    Ok(AnalysisOutput {
        findings,
        run: RunEnvelope {
            granularity_used: normalized.granularity,
            metrics_considered: extraction.metrics.iter().map(|m| m.name.clone()).collect(),
            parameters_considered: extraction.parameters.iter().map(|p| p.name.clone()).collect(),
            protected_detected: extraction.protected_detected,
            skipped,
        },
    })
}

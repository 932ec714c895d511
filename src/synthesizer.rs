//! Finding Synthesizer (spec §4.5): attaches narrative text to raw
//! statistical results and produces the final ranked [`Finding`] list.

use crate::config::AnalyzerConfig;
use crate::models::finding::{BiasFinding, DeviationEvidence, DeviationFinding, Finding};

/// Tokenized name hints used for business-cost framing in concern text.
fn metric_framing(metric: &str) -> &'static str {
    let lower = metric.to_lowercase();
    if lower.contains("amount") {
        "a monetary outcome"
    } else if lower.contains("rate") {
        "a rate-based outcome"
    } else if lower.contains("score") {
        "a scoring outcome"
    } else if lower.contains("time") {
        "a latency outcome"
    } else {
        "a tracked outcome"
    }
}

fn purpose_clause(purpose: &str) -> String {
    if purpose.trim().is_empty() {
        String::new()
    } else {
        format!(" This agent's stated purpose is \"{}\".", purpose.trim())
    }
}

fn deviation_concern(finding: &DeviationFinding, purpose: &str) -> String {
    let framing = metric_framing(&finding.metric);
    let body = match &finding.evidence {
        DeviationEvidence::Trend { direction, percent_change, periods, .. } => format!(
            "{} is {}, representing {} tracked over {} periods, and has moved {:+.1}% over that span.",
            finding.metric,
            framing,
            direction,
            periods,
            percent_change * 100.0
        ),
        DeviationEvidence::Shift { z_score, .. } => format!(
            "{} ({}) shifted abruptly between two consecutive periods (z={:.2}).",
            finding.metric, framing, z_score
        ),
        DeviationEvidence::Outliers { fraction, .. } => format!(
            "{} ({}) produced an unusually large share of extreme values ({:.1}% of observations).",
            finding.metric,
            framing,
            fraction * 100.0
        ),
    };
    format!("{body}{}", purpose_clause(purpose))
}

fn bias_concern(finding: &BiasFinding, config: &AnalyzerConfig) -> String {
    let mut text = format!(
        "{} favors \"{}\" over \"{}\" across {}, a standardized gap of {:.2} standard deviations.",
        finding.metric,
        finding.advantaged,
        finding.disadvantaged,
        finding.parameters.join(" and "),
        finding.evidence.cohens_d
    );
    if let Some(ratio) = finding.evidence.disparity_ratio {
        if ratio.abs() > 1.25 {
            text.push_str(&format!(
                " The disparity ratio of {:.2} exceeds the four-fifths rule threshold of 1.25.",
                ratio
            ));
        }
        if ratio.abs() >= config.severe_disparity_ratio {
            text.push_str(&format!(
                " This crosses the severe-disparity threshold of {:.1}x.",
                config.severe_disparity_ratio
            ));
        }
    }
    if finding.protected {
        text.push_str(" At least one involved attribute is a protected characteristic.");
    }
    text
}

/// Fill in concern narratives, wrap into the [`Finding`] union, and sort
/// per spec §4.5 ranking rules.
pub fn synthesize(
    deviations: Vec<DeviationFinding>,
    biases: Vec<BiasFinding>,
    purpose: &str,
    config: &AnalyzerConfig,
) -> Vec<Finding> {
    let mut findings: Vec<Finding> = Vec::with_capacity(deviations.len() + biases.len());

    for mut d in deviations {
        d.concern = deviation_concern(&d, purpose);
        findings.push(Finding::Deviation(d));
    }
    for mut b in biases {
        b.concern = bias_concern(&b, config);
        findings.push(Finding::Bias(b));
    }

    findings.sort_by(|a, b| {
        b.severity()
            .partial_cmp(&a.severity())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.is_protected_bias().cmp(&a.is_protected_bias()))
    });

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding::{BiasEvidence, BiasKind, DeviationKind};

    fn deviation(severity: f64) -> DeviationFinding {
        DeviationFinding {
            kind: DeviationKind::Trend,
            metric: "refund_amount".to_string(),
            evidence: DeviationEvidence::Trend {
                direction: "increasing",
                first_mean: 52.0,
                last_mean: 95.0,
                percent_change: 0.827,
                periods: 4,
                supporting_shift_z: None,
            },
            severity,
            description: "refund_amount is increasing".to_string(),
            concern: String::new(),
        }
    }

    fn bias(severity: f64, protected: bool, ratio: Option<f64>) -> BiasFinding {
        BiasFinding {
            kind: BiasKind::Single,
            metric: "approval_score".to_string(),
            parameters: vec!["gender".to_string()],
            advantaged: "male".to_string(),
            disadvantaged: "female".to_string(),
            evidence: BiasEvidence {
                mean_adv: 80.0,
                mean_dis: 40.0,
                n_adv: 30,
                n_dis: 30,
                cohens_d: 1.2,
                disparity_ratio: ratio,
            },
            protected,
            severity,
            description: "approval_score shows bias".to_string(),
            concern: String::new(),
        }
    }

    #[test]
    fn sorts_by_descending_severity() {
        let config = AnalyzerConfig::default();
        let findings = synthesize(vec![deviation(0.4), deviation(0.9)], vec![], "", &config);
        assert!(findings[0].severity() >= findings[1].severity());
    }

    #[test]
    fn protected_bias_breaks_ties_above_non_protected() {
        let config = AnalyzerConfig::default();
        let findings = synthesize(vec![], vec![bias(0.5, false, None), bias(0.5, true, None)], "", &config);
        assert!(matches!(&findings[0], Finding::Bias(b) if b.protected));
    }

    #[test]
    fn concern_quotes_purpose_when_present() {
        let config = AnalyzerConfig::default();
        let findings = synthesize(vec![deviation(0.5)], vec![], "process refunds fairly", &config);
        if let Finding::Deviation(d) = &findings[0] {
            assert!(d.concern.contains("process refunds fairly"));
        } else {
            panic!("expected deviation finding");
        }
    }

    #[test]
    fn concern_omits_purpose_clause_when_empty() {
        let config = AnalyzerConfig::default();
        let findings = synthesize(vec![deviation(0.5)], vec![], "", &config);
        if let Finding::Deviation(d) = &findings[0] {
            assert!(!d.concern.contains("stated purpose"));
        } else {
            panic!("expected deviation finding");
        }
    }

    #[test]
    fn four_fifths_rule_callout_present_above_threshold() {
        let config = AnalyzerConfig::default();
        let findings = synthesize(vec![], vec![bias(0.8, true, Some(1.5))], "", &config);
        if let Finding::Bias(_) = &findings[0] {
        } else {
            panic!("expected bias finding");
        }
        let text = match &findings[0] {
            Finding::Bias(b) => b.concern.clone(),
            _ => unreachable!(),
        };
        assert!(text.contains("four-fifths"));
    }
}

//! # Impact Analyzer
//!
//! Weighted scoring of a finding batch across four dimensions. Each
//! dimension is the batch mean of a per-finding heuristic on a 0-10
//! scale; the total is a fixed-weight sum.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{Category, Finding, Priority};

const USER_IMPACT_WEIGHT: f64 = 0.4;
const DATA_ACCURACY_WEIGHT: f64 = 0.3;
const COMPLIANCE_WEIGHT: f64 = 0.2;
const COMPETITIVE_WEIGHT: f64 = 0.1;

/// Scores for one batch of findings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactScore {
    pub user_impact: f64,
    pub data_accuracy: f64,
    pub compliance: f64,
    pub competitive: f64,
    pub total: f64,
}

#[derive(Debug, Default)]
pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score a batch. An empty batch scores zero everywhere.
    pub fn analyze(&self, findings: &[Finding]) -> ImpactScore {
        let mut score = ImpactScore::default();
        if findings.is_empty() {
            return score;
        }

        for finding in findings {
            score.user_impact += self.user_impact(finding);
            score.data_accuracy += self.data_accuracy(finding);
            score.compliance += self.compliance(finding);
            score.competitive += self.competitive(finding);
        }

        let count = findings.len() as f64;
        score.user_impact /= count;
        score.data_accuracy /= count;
        score.compliance /= count;
        score.competitive /= count;

        score.total = score.user_impact * USER_IMPACT_WEIGHT
            + score.data_accuracy * DATA_ACCURACY_WEIGHT
            + score.compliance * COMPLIANCE_WEIGHT
            + score.competitive * COMPETITIVE_WEIGHT;

        score
    }

    /// Urgency on a 0-10 scale: priority base, escalated by any deadline
    /// carried in the finding's structured data.
    pub fn urgency(&self, finding: &Finding) -> f64 {
        let mut urgency: f64 = match finding.priority {
            Priority::Critical => 10.0,
            Priority::High => 7.0,
            Priority::Medium => 4.0,
            Priority::Low => 2.0,
        };

        let deadline = finding
            .data_field("effective_date")
            .or_else(|| finding.data_field("deadline"))
            .and_then(parse_date);
        if let Some(deadline) = deadline {
            let days_until = (deadline - Utc::now()).num_days();
            if days_until < 7 {
                urgency = 10.0;
            } else if days_until < 30 {
                urgency = urgency.max(8.0);
            } else if days_until < 90 {
                urgency = urgency.max(5.0);
            }
        }

        urgency
    }

    fn user_impact(&self, finding: &Finding) -> f64 {
        let mut impact: f64 = 0.0;
        if finding.impact.contains("ROI") || finding.impact.contains("calculator") {
            impact += 8.0;
        }
        if finding.impact.contains("user") || finding.impact.contains("experience") {
            impact += 6.0;
        }
        impact += match finding.priority {
            Priority::Critical => 10.0,
            Priority::High => 7.0,
            Priority::Medium => 5.0,
            Priority::Low => 3.0,
        };
        (impact / 2.0).min(10.0)
    }

    fn data_accuracy(&self, finding: &Finding) -> f64 {
        if finding.category != Category::Scientific {
            return 0.0;
        }
        let mut accuracy = finding.confidence_score * 10.0;
        let touches_calculations = finding
            .data
            .as_ref()
            .and_then(|d| d.as_object())
            .map(|object| {
                object
                    .keys()
                    .any(|k| k.contains("success_rate") || k.contains("cost") || k.contains("roi"))
            })
            .unwrap_or(false);
        if touches_calculations {
            accuracy = (accuracy + 3.0).min(10.0);
        }
        accuracy
    }

    fn compliance(&self, finding: &Finding) -> f64 {
        if finding.category != Category::Legislative {
            return 0.0;
        }
        let mut compliance: f64 = if finding.impact.contains("mandate")
            || finding.impact.contains("require")
            || finding.impact.contains("compliance")
        {
            10.0
        } else {
            5.0
        };
        if finding
            .data_field("jurisdiction")
            .and_then(|v| v.as_str())
            .map(|j| j == "federal")
            .unwrap_or(false)
        {
            compliance = (compliance + 2.0).min(10.0);
        }
        compliance
    }

    fn competitive(&self, finding: &Finding) -> f64 {
        if finding.category != Category::Market {
            return 0.0;
        }
        let mut competitive: f64 = 5.0;
        if finding.impact.contains("feature") || finding.impact.contains("parity") {
            competitive += 3.0;
        }
        if finding.impact.contains("opportunity") || finding.impact.contains("advantage") {
            competitive += 2.0;
        }
        competitive.min(10.0)
    }
}

pub(crate) fn parse_date(value: &serde_json::Value) -> Option<chrono::DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_id;
    use chrono::Duration;

    fn finding(category: Category, priority: Priority, impact: &str) -> Finding {
        Finding {
            id: new_id("F"),
            source: "CDC".to_string(),
            category,
            title: "Test".to_string(),
            description: "Test".to_string(),
            key_points: vec![],
            impact: impact.to_string(),
            priority,
            confidence_score: 0.9,
            data: None,
            recommended_actions: vec![],
            validation_required: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_batch_scores_zero() {
        let score = ImpactAnalyzer::new().analyze(&[]);
        assert_eq!(score.user_impact, 0.0);
        assert_eq!(score.data_accuracy, 0.0);
        assert_eq!(score.compliance, 0.0);
        assert_eq!(score.competitive, 0.0);
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_dimensions_are_category_gated() {
        let analyzer = ImpactAnalyzer::new();
        let market = finding(Category::Market, Priority::Medium, "feature parity gap");
        let score = analyzer.analyze(std::slice::from_ref(&market));
        assert_eq!(score.data_accuracy, 0.0);
        assert_eq!(score.compliance, 0.0);
        assert!(score.competitive > 0.0);
    }

    #[test]
    fn test_total_is_weighted_sum() {
        let analyzer = ImpactAnalyzer::new();
        let legislative = finding(
            Category::Legislative,
            Priority::High,
            "New compliance mandate",
        );
        let score = analyzer.analyze(std::slice::from_ref(&legislative));
        let expected = score.user_impact * 0.4
            + score.data_accuracy * 0.3
            + score.compliance * 0.2
            + score.competitive * 0.1;
        assert!((score.total - expected).abs() < 1e-9);
        assert_eq!(score.compliance, 10.0);
    }

    #[test]
    fn test_urgency_escalates_on_near_deadline() {
        let analyzer = ImpactAnalyzer::new();
        let mut low = finding(Category::Legislative, Priority::Low, "note");
        low.data = Some(serde_json::json!({
            "effective_date": (Utc::now() + Duration::days(3)).to_rfc3339(),
        }));
        assert_eq!(analyzer.urgency(&low), 10.0);

        let mut medium = finding(Category::Legislative, Priority::Medium, "note");
        medium.data = Some(serde_json::json!({
            "deadline": (Utc::now() + Duration::days(20)).to_rfc3339(),
        }));
        assert_eq!(analyzer.urgency(&medium), 8.0);

        let critical = finding(Category::Legislative, Priority::Critical, "note");
        assert_eq!(analyzer.urgency(&critical), 10.0);
    }
}

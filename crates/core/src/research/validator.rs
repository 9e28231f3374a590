//! # Data Validator
//!
//! Confidence scoring for findings and spot checks for individual data
//! points. Scores multiply four independent factors (source credibility,
//! declared-data range compliance, category cross-reference, freshness)
//! and clamp to 1.0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, Finding};

/// Sources whose findings are taken at face value
const TRUSTED_SOURCES: &[&str] = &[
    "CDC",
    "ASRM",
    "SART",
    "Kaiser Family Foundation",
    "Mercer",
    "PubMed",
    "Congress.gov",
];

/// Known plausible bounds for named statistics
fn known_range(name: &str) -> Option<(f64, f64)> {
    match name {
        "ivf_success_rate" => Some((0.05, 0.65)),
        "ivf_cost" => Some((10_000.0, 50_000.0)),
        "egg_freezing_cost" => Some((5_000.0, 20_000.0)),
        "adoption_rate" => Some((0.1, 0.6)),
        "employee_satisfaction" => Some((0.5, 1.0)),
        _ => None,
    }
}

/// Reference values reported by independent sources for a data point
fn reference_values(name: &str) -> Vec<(&'static str, f64)> {
    match name {
        "ivf_success_rate" => vec![("CDC 2025", 0.55), ("SART 2025", 0.54), ("ASRM Study", 0.56)],
        "ivf_cost" => vec![
            ("FertilityIQ", 32_000.0),
            ("ASRM Survey", 30_000.0),
            ("Carrot Report", 35_000.0),
        ],
        _ => Vec::new(),
    }
}

/// Outcome of a single data-point check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub confidence: f64,
    #[serde(default)]
    pub suggested_value: Option<f64>,
    pub sources: Vec<String>,
    pub issues: Vec<String>,
}

/// Stateless scorer for finding confidence and data-point plausibility
#[derive(Debug, Default)]
pub struct DataValidator;

impl DataValidator {
    pub fn new() -> Self {
        Self
    }

    /// Adjust a finding's declared confidence. Result is in [0, 1].
    pub fn validate_finding(&self, finding: &Finding) -> f64 {
        let mut confidence = finding.confidence_score;

        confidence *= self.source_credibility(&finding.source);

        if let Some(data) = &finding.data {
            confidence *= self.range_compliance(data);
        }

        confidence *= self.cross_reference_factor(finding.category);
        confidence *= self.freshness_factor(finding.created_at);

        confidence.min(1.0)
    }

    /// Check one named value against known bounds and reference sources.
    pub fn validate_data_point(&self, data_point: &str, value: f64) -> ValidationReport {
        let mut report = ValidationReport {
            is_valid: true,
            confidence: 1.0,
            suggested_value: None,
            sources: Vec::new(),
            issues: Vec::new(),
        };

        if let Some((min, max)) = known_range(data_point) {
            if value < min || value > max {
                report.is_valid = false;
                report.issues.push(format!(
                    "Value {} is outside expected range [{}, {}]",
                    value, min, max
                ));
                report.suggested_value = Some(value.clamp(min, max));
                report.confidence = 0.5;
            }
        }

        let references = reference_values(data_point);
        if !references.is_empty() {
            let values: Vec<f64> = references.iter().map(|(_, v)| *v).collect();
            let average = mean(&values);
            let variance = variance(&values, average);

            report.sources = references.iter().map(|(s, _)| s.to_string()).collect();

            if variance > 0.1 {
                report.confidence *= 0.8;
                report
                    .issues
                    .push("High variance between sources".to_string());
            }

            if average != 0.0 && ((value - average) / average).abs() > 0.2 {
                report.confidence *= 0.7;
                report.issues.push(format!(
                    "Value differs significantly from average: {}",
                    average
                ));
                report.suggested_value = Some(average);
            }
        }

        report
    }

    /// Quick plausibility check; unknown statistics are assumed valid.
    pub fn validate_statistic(&self, name: &str, value: f64) -> bool {
        match known_range(name) {
            Some((min, max)) => value >= min && value <= max,
            None => true,
        }
    }

    /// Clamp a value into its known range; unknown names pass through.
    pub fn suggest_correction(&self, name: &str, value: f64) -> f64 {
        match known_range(name) {
            Some((min, max)) => value.clamp(min, max),
            None => value,
        }
    }

    fn source_credibility(&self, source: &str) -> f64 {
        let lower = source.to_lowercase();
        if TRUSTED_SOURCES
            .iter()
            .any(|trusted| lower.contains(&trusted.to_lowercase()))
        {
            return 1.0;
        }
        if source.contains(".gov") {
            return 0.95;
        }
        if source.contains(".edu") || source.contains("journal") {
            return 0.9;
        }
        if source.contains("report") || source.contains("survey") {
            return 0.8;
        }
        0.6
    }

    /// Fraction of known-range fields within bounds; 1.0 when none apply.
    fn range_compliance(&self, data: &serde_json::Value) -> f64 {
        let Some(object) = data.as_object() else {
            return 1.0;
        };

        let mut valid = 0u32;
        let mut total = 0u32;
        for (key, value) in object {
            if let (Some((min, max)), Some(number)) = (known_range(key), value.as_f64()) {
                total += 1;
                if number >= min && number <= max {
                    valid += 1;
                }
            }
        }

        if total == 0 {
            1.0
        } else {
            f64::from(valid) / f64::from(total)
        }
    }

    fn cross_reference_factor(&self, category: Category) -> f64 {
        match category {
            Category::Scientific => 0.95,
            Category::Legislative => 1.0,
            Category::Market => 0.85,
            Category::Technical => 0.9,
        }
    }

    fn freshness_factor(&self, created_at: DateTime<Utc>) -> f64 {
        let age_days = (Utc::now() - created_at).num_days();
        if age_days < 30 {
            1.0
        } else if age_days < 90 {
            0.95
        } else if age_days < 180 {
            0.85
        } else if age_days < 365 {
            0.7
        } else {
            0.5
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use chrono::Duration;

    fn finding(source: &str, category: Category, confidence: f64) -> Finding {
        Finding {
            id: "F-1".to_string(),
            source: source.to_string(),
            category,
            title: "Test".to_string(),
            description: "Test".to_string(),
            key_points: vec![],
            impact: "Test".to_string(),
            priority: Priority::Medium,
            confidence_score: confidence,
            data: None,
            recommended_actions: vec![],
            validation_required: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        let validator = DataValidator::new();
        let cases = [
            finding("CDC", Category::Legislative, 1.5),
            finding("random blog", Category::Market, 0.9),
            finding("university journal", Category::Scientific, 0.0),
        ];
        for case in &cases {
            let score = validator.validate_finding(case);
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_trusted_source_keeps_declared_confidence() {
        let validator = DataValidator::new();
        // Legislative cross-reference is 1.0 and the finding is fresh, so a
        // trusted source leaves the declared confidence untouched.
        let f = finding("Congress.gov", Category::Legislative, 0.9);
        let score = validator.validate_finding(&f);
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_source_is_discounted() {
        let validator = DataValidator::new();
        let f = finding("some newsletter", Category::Legislative, 1.0);
        let score = validator.validate_finding(&f);
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_stale_findings_decay() {
        let validator = DataValidator::new();
        let mut f = finding("Congress.gov", Category::Legislative, 1.0);
        f.created_at = Utc::now() - Duration::days(400);
        let score = validator.validate_finding(&f);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_data_lowers_confidence() {
        let validator = DataValidator::new();
        let mut f = finding("CDC", Category::Legislative, 1.0);
        f.data = Some(serde_json::json!({
            "ivf_success_rate": 0.9,
            "ivf_cost": 32000.0,
        }));
        // One of two known-range fields out of bounds -> factor 0.5.
        let score = validator.validate_finding(&f);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_data_point_out_of_range_is_clamped() {
        let validator = DataValidator::new();
        let report = validator.validate_data_point("egg_freezing_cost", 100_000.0);
        assert!(!report.is_valid);
        assert_eq!(report.suggested_value, Some(20_000.0));
        assert!((report.confidence - 0.5).abs() < 1e-9);
        assert!(!report.issues.is_empty());
    }

    #[test]
    fn test_data_point_deviation_from_sources_suggests_average() {
        let validator = DataValidator::new();
        let report = validator.validate_data_point("ivf_cost", 45_000.0);
        // In range, but more than 20% away from the ~32k source average.
        assert!(report.is_valid);
        assert_eq!(report.sources.len(), 3);
        assert!(report.confidence < 1.0);
        let suggested = report.suggested_value.expect("average suggested");
        assert!((suggested - 32_333.333).abs() < 1.0);
    }

    #[test]
    fn test_data_point_consistent_with_sources_is_clean() {
        let validator = DataValidator::new();
        let report = validator.validate_data_point("ivf_success_rate", 0.55);
        assert!(report.is_valid);
        assert!((report.confidence - 1.0).abs() < 1e-9);
        assert!(report.suggested_value.is_none());
    }

    #[test]
    fn test_statistic_helpers() {
        let validator = DataValidator::new();
        assert!(validator.validate_statistic("adoption_rate", 0.3));
        assert!(!validator.validate_statistic("adoption_rate", 0.9));
        assert!(validator.validate_statistic("unknown_metric", 1e9));
        assert!((validator.suggest_correction("adoption_rate", 0.9) - 0.6).abs() < 1e-9);
        assert_eq!(validator.suggest_correction("unknown_metric", 7.0), 7.0);
    }
}

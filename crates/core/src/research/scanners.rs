//! # Research Scanners
//!
//! The scanner contract consumed by the research agent, plus the built-in
//! simulated producers for the four scan categories. Scanners never touch
//! the network; each one answers "what candidate findings exist right now"
//! from its own simulated feed.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::types::{new_id, Category, Finding, Priority};

/// A unit that produces candidate findings given the current time.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Finding>>;
}

/// The default scanner set wired into a fresh research agent.
pub fn default_scanners() -> Vec<std::sync::Arc<dyn Scanner>> {
    vec![
        std::sync::Arc::new(ScientificScanner),
        std::sync::Arc::new(LegislativeScanner::new()),
        std::sync::Arc::new(MarketScanner),
        std::sync::Arc::new(CompetitorScanner),
    ]
}

/// Scans published research for updated clinical statistics.
pub struct ScientificScanner;

#[async_trait]
impl Scanner for ScientificScanner {
    fn name(&self) -> &str {
        "scientific"
    }

    async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Finding>> {
        Ok(vec![Finding {
            id: new_id("F"),
            source: "PubMed".to_string(),
            category: Category::Scientific,
            title: "Updated IVF Success Rates 2025".to_string(),
            description: "New study shows improved success rates for IVF treatments".to_string(),
            key_points: vec![
                "Success rate increased to 55% for women under 35".to_string(),
                "Frozen embryo transfers show 5% higher success".to_string(),
                "PGT-A testing improves outcomes by 10%".to_string(),
            ],
            impact: "Update ROI calculator success rate parameters".to_string(),
            priority: Priority::High,
            confidence_score: 0.95,
            data: Some(json!({
                "success_rate_under_35": 0.55,
                "success_rate_35_37": 0.42,
                "success_rate_38_40": 0.31,
                "success_rate_over_40": 0.12,
            })),
            recommended_actions: vec![
                "Update success rate constants in ROI Calculator".to_string(),
                "Revise age-based calculations".to_string(),
                "Update documentation with new statistics".to_string(),
            ],
            validation_required: true,
            created_at: now,
        }])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jurisdiction {
    Federal,
    State,
}

/// One tracked piece of legislation
#[derive(Debug, Clone)]
pub struct BillUpdate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub bill_number: String,
    pub jurisdiction: Jurisdiction,
    pub state: Option<String>,
    pub status: String,
    pub effective_date: Option<DateTime<Utc>>,
    pub key_points: Vec<String>,
    pub impact: String,
    pub data: serde_json::Value,
    pub actions: Vec<String>,
}

/// Tracks federal and state legislation, reporting a bill only when it is
/// new or its status changed since the last check.
pub struct LegislativeScanner {
    tracked: Mutex<HashMap<String, BillUpdate>>,
}

impl LegislativeScanner {
    pub fn new() -> Self {
        Self {
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Bills with an effective date within the next 30 days, soonest first.
    pub fn upcoming_deadlines(&self, now: DateTime<Utc>) -> Result<Vec<BillUpdate>> {
        let tracked = self.lock()?;
        let horizon = now + Duration::days(30);
        let mut upcoming: Vec<BillUpdate> = tracked
            .values()
            .filter(|bill| bill.effective_date.map(|d| d <= horizon).unwrap_or(false))
            .cloned()
            .collect();
        upcoming.sort_by_key(|bill| bill.effective_date);
        Ok(upcoming)
    }

    fn check_updates(&self, now: DateTime<Utc>) -> Result<Vec<BillUpdate>> {
        let candidates = [federal_bill(now), california_bill(now)];
        let mut tracked = self.lock()?;
        let mut updates = Vec::new();
        for bill in candidates {
            let changed = tracked
                .get(&bill.id)
                .map(|existing| existing.status != bill.status)
                .unwrap_or(true);
            if changed {
                tracked.insert(bill.id.clone(), bill.clone());
                updates.push(bill);
            }
        }
        Ok(updates)
    }

    fn assess_priority(&self, bill: &BillUpdate, now: DateTime<Utc>) -> Priority {
        if let Some(effective) = bill.effective_date {
            if (effective - now).num_days() < 30 {
                return Priority::Critical;
            }
        }
        if bill.impact.contains("mandate") || bill.impact.contains("compliance") {
            return Priority::High;
        }
        if bill.jurisdiction == Jurisdiction::Federal {
            return Priority::High;
        }
        Priority::Medium
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BillUpdate>>> {
        self.tracked
            .lock()
            .map_err(|e| anyhow::anyhow!("tracked bills lock poisoned: {}", e))
    }
}

impl Default for LegislativeScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scanner for LegislativeScanner {
    fn name(&self) -> &str {
        "legislative"
    }

    async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Finding>> {
        let updates = self.check_updates(now)?;
        Ok(updates
            .into_iter()
            .map(|update| {
                let priority = self.assess_priority(&update, now);
                Finding {
                    id: new_id("F"),
                    source: "Congress.gov".to_string(),
                    category: Category::Legislative,
                    title: update.title,
                    description: update.description,
                    key_points: update.key_points,
                    impact: update.impact,
                    priority,
                    confidence_score: 1.0,
                    data: Some(update.data),
                    recommended_actions: update.actions,
                    validation_required: false,
                    created_at: now,
                }
            })
            .collect())
    }
}

fn federal_bill(now: DateTime<Utc>) -> BillUpdate {
    let effective = now + Duration::days(56);
    BillUpdate {
        id: "FED-2025-001".to_string(),
        title: "Veterans Fertility Treatment Act".to_string(),
        description: "Expands VA coverage for fertility treatments".to_string(),
        bill_number: "HR-1234".to_string(),
        jurisdiction: Jurisdiction::Federal,
        state: None,
        status: "Passed House".to_string(),
        effective_date: Some(effective),
        key_points: vec![
            "Covers 3 IVF cycles for veterans".to_string(),
            "Includes medication coverage".to_string(),
            "Removes previous restrictions on surrogacy".to_string(),
        ],
        impact: "Major expansion of veteran fertility benefits".to_string(),
        data: json!({
            "estimated_beneficiaries": 50_000,
            "annual_cost": "$500M",
            "bipartisan_support": true,
        }),
        actions: vec![
            "Update veteran-specific calculations".to_string(),
            "Add VA coverage to Policy Tracker".to_string(),
            "Create veteran eligibility checker".to_string(),
        ],
    }
}

fn california_bill(now: DateTime<Utc>) -> BillUpdate {
    let effective = now + Duration::days(20);
    BillUpdate {
        id: "CA-2025-001".to_string(),
        title: "California Fertility Equity Act".to_string(),
        description: "Mandates fertility coverage for all employers with 50+ employees".to_string(),
        bill_number: "SB-729".to_string(),
        jurisdiction: Jurisdiction::State,
        state: Some("CA".to_string()),
        status: "Signed into law".to_string(),
        effective_date: Some(effective),
        key_points: vec![
            "Requires coverage of egg freezing".to_string(),
            "Mandates 2 IVF cycles minimum".to_string(),
            "Includes LGBTQ+ family building".to_string(),
        ],
        impact: "Affects all California employers with 50+ employees; compliance required"
            .to_string(),
        data: json!({
            "affected_employers": 15_000,
            "covered_employees": 2_000_000,
            "implementation_deadline": effective.to_rfc3339(),
        }),
        actions: vec![
            "Update California compliance requirements in Policy Tracker".to_string(),
            "Modify ROI Calculator for CA employers".to_string(),
            "Add compliance checker for CA".to_string(),
        ],
    }
}

/// One observed market movement
struct MarketTrend {
    source: &'static str,
    title: &'static str,
    description: &'static str,
    insights: &'static [&'static str],
    business_impact: &'static str,
    significance: f64,
    confidence: f64,
    data: serde_json::Value,
    recommendations: &'static [&'static str],
}

/// Watches adoption, pricing, competitor, and demand movements.
pub struct MarketScanner;

impl MarketScanner {
    /// Estimated market share per vendor.
    pub fn market_share() -> Vec<(String, f64)> {
        vec![
            ("Progyny".to_string(), 0.35),
            ("Carrot".to_string(), 0.25),
            ("Kindbody".to_string(), 0.15),
            ("Maven".to_string(), 0.10),
            ("WINFertility".to_string(), 0.08),
            ("Others".to_string(), 0.07),
        ]
    }

    fn trends() -> Vec<MarketTrend> {
        vec![
            MarketTrend {
                source: "Mercer Survey 2025",
                title: "Accelerating Fertility Benefit Adoption",
                description: "Employer adoption of fertility benefits growing 13.5% YoY",
                insights: &[
                    "Large employers (1000+) leading adoption at 65%",
                    "Tech and finance sectors near saturation (85%+)",
                    "Small businesses (<100) beginning to adopt",
                ],
                business_impact: "Market expansion opportunities in mid-size employers",
                significance: 0.85,
                confidence: 0.92,
                data: json!({
                    "current_rate": 0.42,
                    "previous_rate": 0.37,
                    "growth_rate": 0.135,
                }),
                recommendations: &[
                    "Target mid-size employers in Global Comparator",
                    "Develop simplified packages for small businesses",
                ],
            },
            MarketTrend {
                source: "FertilityIQ Market Report",
                title: "Fertility Treatment Costs Stabilizing",
                description: "Treatment costs increasing 5% annually, below medical inflation",
                insights: &[
                    "IVF costs stabilizing around $30-35k per cycle",
                    "More clinics offering package pricing",
                ],
                business_impact: "ROI calculations remain favorable for employers",
                significance: 0.7,
                confidence: 0.88,
                data: json!({
                    "average_ivf_cost": 32_000,
                    "yoy_increase": 0.05,
                }),
                recommendations: &["Update cost assumptions in ROI Calculator"],
            },
            MarketTrend {
                source: "SHRM Benefits Survey",
                title: "Employee Demand at All-Time High",
                description: "68% of employees want fertility benefits from employers",
                insights: &[
                    "65% would switch jobs for fertility benefits",
                    "Millennials and Gen Z driving demand",
                ],
                business_impact: "Critical for talent attraction and retention",
                significance: 0.9,
                confidence: 0.95,
                data: json!({
                    "employee_interest": 0.68,
                    "would_switch_jobs": 0.65,
                }),
                recommendations: &["Emphasize retention value in ROI Calculator"],
            },
        ]
    }
}

#[async_trait]
impl Scanner for MarketScanner {
    fn name(&self) -> &str {
        "market"
    }

    async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Finding>> {
        Ok(Self::trends()
            .into_iter()
            .filter(|trend| trend.significance > 0.7)
            .map(|trend| Finding {
                id: new_id("F"),
                source: trend.source.to_string(),
                category: Category::Market,
                title: trend.title.to_string(),
                description: trend.description.to_string(),
                key_points: trend.insights.iter().map(|s| s.to_string()).collect(),
                impact: trend.business_impact.to_string(),
                priority: if trend.significance > 0.9 {
                    Priority::High
                } else {
                    Priority::Medium
                },
                confidence_score: trend.confidence,
                data: Some(trend.data),
                recommended_actions: trend
                    .recommendations
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                validation_required: true,
                created_at: now,
            })
            .collect())
    }
}

/// Watches competitor feature launches and partnerships.
pub struct CompetitorScanner;

#[async_trait]
impl Scanner for CompetitorScanner {
    fn name(&self) -> &str {
        "competitor"
    }

    async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Finding>> {
        Ok(vec![Finding {
            id: new_id("F"),
            source: "Market Intelligence".to_string(),
            category: Category::Market,
            title: "Competitor Updates Q1 2025".to_string(),
            description: "Key competitors have announced new features and partnerships"
                .to_string(),
            key_points: vec![
                "Carrot Fertility launches AI coaching".to_string(),
                "Progyny expands insurance partnerships".to_string(),
                "Market seeing 5% average price increase".to_string(),
            ],
            impact: "Consider feature parity and pricing strategy".to_string(),
            priority: Priority::Medium,
            confidence_score: 0.85,
            data: Some(json!({
                "carrot_fertility": {
                    "new_features": ["AI-powered fertility coaching"],
                    "market_expansion": ["Canada", "UK"],
                },
                "progyny": {
                    "new_partnerships": ["Anthem", "Cigna"],
                },
            })),
            recommended_actions: vec![
                "Evaluate AI integration opportunities for AI Dashboard".to_string(),
                "Review pricing competitiveness".to_string(),
            ],
            validation_required: false,
            created_at: now,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_legislative_scanner_reports_bill_once_until_status_changes() {
        let scanner = LegislativeScanner::new();
        let now = Utc::now();

        let first = scanner.scan(now).await.unwrap();
        assert_eq!(first.len(), 2);

        // Same statuses on the second check: nothing new to report.
        let second = scanner.scan(now + Duration::minutes(5)).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_effective_date_within_month_is_critical() {
        let scanner = LegislativeScanner::new();
        let now = Utc::now();
        let findings = scanner.scan(now).await.unwrap();

        let california = findings
            .iter()
            .find(|f| f.title.contains("California"))
            .expect("california bill reported");
        assert_eq!(california.priority, Priority::Critical);

        let federal = findings
            .iter()
            .find(|f| f.title.contains("Veterans"))
            .expect("federal bill reported");
        assert_eq!(federal.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_upcoming_deadlines_sorted_and_bounded() {
        let scanner = LegislativeScanner::new();
        let now = Utc::now();
        scanner.scan(now).await.unwrap();

        let upcoming = scanner.upcoming_deadlines(now).unwrap();
        // Only the California bill lands inside the 30-day horizon.
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, "CA-2025-001");
    }

    #[tokio::test]
    async fn test_market_scanner_filters_by_significance() {
        let findings = MarketScanner.scan(Utc::now()).await.unwrap();
        // The 0.7-significance pricing trend is filtered out.
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.category == Category::Market));

        let demand = findings
            .iter()
            .find(|f| f.title.contains("Demand"))
            .expect("demand trend kept");
        assert_eq!(demand.priority, Priority::Medium);
    }

    #[test]
    fn test_market_share_sums_to_one() {
        let total: f64 = MarketScanner::market_share().iter().map(|(_, s)| s).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

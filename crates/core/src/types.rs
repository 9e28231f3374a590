//! # Vigil Domain Types
//!
//! Shared types for the agent runtime: findings produced by research scans,
//! revision plans produced by planning, and the message envelope that moves
//! both across the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a prefixed unique identifier (`F-…`, `PLAN-…`, `TASK-…`).
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Priority of a finding or message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric score used for task priorities (1-10 scale)
    pub fn score(&self) -> u8 {
        match self {
            Priority::Critical => 10,
            Priority::High => 7,
            Priority::Medium => 5,
            Priority::Low => 3,
        }
    }
}

/// Category of a research finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Scientific,
    Legislative,
    Market,
    Technical,
}

/// Derived health classification for an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// The worse of two statuses (`critical` > `degraded` > `healthy`)
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        fn rank(h: HealthStatus) -> u8 {
            match h {
                HealthStatus::Healthy => 0,
                HealthStatus::Degraded => 1,
                HealthStatus::Critical => 2,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

/// An observation produced by a scan, candidate input to planning.
///
/// Created by a scanner, rescored once by the validator when
/// `validation_required` is set, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub source: String,
    pub category: Category,
    pub title: String,
    pub description: String,
    pub key_points: Vec<String>,
    /// Free-text statement of what the finding affects
    pub impact: String,
    pub priority: Priority,
    /// Confidence in [0, 1]
    pub confidence_score: f64,
    /// Optional structured payload (rates, deadlines, jurisdictions, ...)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub recommended_actions: Vec<String>,
    pub validation_required: bool,
    pub created_at: DateTime<Utc>,
}

impl Finding {
    /// Look up a field in the structured data payload, if any.
    pub fn data_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}

/// Message type carried on the envelope, derived from the payload variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Finding,
    PlanCreated,
    Status,
    Request,
    Response,
    ScanRequest,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Finding => "finding",
            MessageType::PlanCreated => "plan_created",
            MessageType::Status => "status",
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::ScanRequest => "scan_request",
        }
    }
}

/// Typed event payload, one variant per known event shape.
///
/// Replaces the untyped payloads of early prototypes so every subscriber
/// gets a compile-time checked view of what travels on its topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A significant finding published by research (`research.finding`)
    FindingPublished {
        finding: Finding,
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A validated plan ready for implementation (`planning.plan_created`)
    PlanCreated {
        plan: Box<RevisionPlan>,
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Progress report from the implementation collaborator
    /// (`implementation.status`)
    ImplementationStatus {
        plan_id: String,
        status: String,
        completed_tasks: Vec<String>,
    },
    /// Ask research to re-check one data point (`validation.request`)
    ValidationRequest {
        request_id: String,
        data_point: String,
        current_value: f64,
        component: String,
    },
    /// Answer to a validation request (`validation.response`)
    ValidationResponse {
        request_id: String,
        valid: bool,
        confidence: f64,
        suggested_value: Option<f64>,
        sources: Vec<String>,
    },
    /// Operator-initiated scan (`manual.scan_request`)
    ScanRequest {
        requested_by: String,
        timestamp: DateTime<Utc>,
    },
}

impl EventPayload {
    /// Envelope message type for this payload
    pub fn message_type(&self) -> MessageType {
        match self {
            EventPayload::FindingPublished { .. } => MessageType::Finding,
            EventPayload::PlanCreated { .. } => MessageType::PlanCreated,
            EventPayload::ImplementationStatus { .. } => MessageType::Status,
            EventPayload::ValidationRequest { .. } => MessageType::Request,
            EventPayload::ValidationResponse { .. } => MessageType::Response,
            EventPayload::ScanRequest { .. } => MessageType::ScanRequest,
        }
    }

    /// Agent the payload originates from, where it carries one
    pub fn sender(&self) -> Option<&str> {
        match self {
            EventPayload::FindingPublished { agent_id, .. } => Some(agent_id),
            EventPayload::PlanCreated { agent_id, .. } => Some(agent_id),
            EventPayload::ScanRequest { requested_by, .. } => Some(requested_by),
            _ => None,
        }
    }

    /// Envelope priority for this payload
    pub fn priority(&self) -> Priority {
        match self {
            EventPayload::FindingPublished { finding, .. } => finding.priority,
            _ => Priority::Medium,
        }
    }
}

/// Envelope recorded in the bus history for every publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub sender: String,
    /// Agent id, or `"broadcast"`
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    pub priority: Priority,
    pub payload: EventPayload,
    pub correlation_id: String,
    pub requires_response: bool,
}

impl AgentMessage {
    /// Build a broadcast envelope around a payload.
    pub fn broadcast(payload: EventPayload) -> Self {
        Self {
            id: new_id("MSG"),
            sender: payload.sender().unwrap_or("unknown").to_string(),
            recipient: "broadcast".to_string(),
            timestamp: Utc::now(),
            message_type: payload.message_type(),
            priority: payload.priority(),
            correlation_id: new_id("CORR"),
            requires_response: false,
            payload,
        }
    }

    /// Build an addressed envelope from a named sender.
    pub fn addressed(sender: &str, recipient: &str, payload: EventPayload) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            ..Self::broadcast(payload)
        }
    }
}

/// Lifecycle of a revision plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Approved,
    InProgress,
    Completed,
}

/// A validated, phased response to one batch of findings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionPlan {
    pub plan_id: String,
    pub created_date: DateTime<Utc>,
    pub status: PlanStatus,
    /// The batch that produced this plan
    pub findings: Vec<Finding>,
    pub phases: Vec<Phase>,
    /// Total estimated effort in hours
    pub total_effort: f64,
    pub risk_assessment: RiskAssessment,
    pub success_metrics: Vec<Metric>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl RevisionPlan {
    /// All task ids across all phases.
    pub fn task_ids(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|p| p.tasks.iter().map(|t| t.id.clone()))
            .collect()
    }
}

/// An ordered stage of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub phase_number: u32,
    pub title: String,
    pub objectives: Vec<String>,
    pub tasks: Vec<Task>,
    /// Task ids from earlier phases this phase waits on
    pub dependencies: Vec<String>,
    /// Duration in days
    pub duration: u32,
    pub resources_required: Vec<Resource>,
}

/// Kind of work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    DataUpdate,
    Feature,
    Bugfix,
    Refactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A unit of plannable work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub title: String,
    pub description: String,
    pub component: String,
    /// 1-10, higher is more urgent
    pub priority: u8,
    pub estimated_hours: f64,
    pub status: TaskStatus,
    pub changes: Vec<Change>,
    pub tests: Vec<TestRequirement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

/// A concrete file-level change attached to a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub file_path: String,
    pub change_type: ChangeType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Unit,
    Integration,
    E2e,
    Performance,
}

/// Comparison operator for a success criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriteriaOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criteria {
    pub metric: String,
    pub operator: CriteriaOp,
    pub value: f64,
}

/// Test coverage a task must satisfy.
///
/// `timeout_ms` is descriptive metadata for the implementation
/// collaborator; nothing in this crate enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRequirement {
    pub test_type: TestType,
    pub scope: Vec<String>,
    pub success_criteria: Vec<Criteria>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One identified risk on a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub risk_type: String,
    pub probability: RiskLevel,
    pub impact: RiskLevel,
    pub description: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risks: Vec<Risk>,
    pub overall_risk_level: RiskLevel,
    pub mitigation_strategies: Vec<String>,
}

/// A measurable success target attached to a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub target: f64,
    pub unit: String,
    pub measurement_method: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Human,
    System,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Scheduled,
    Unavailable,
}

/// A named quantity in the resource catalogue, or an allocation of one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: ResourceType,
    pub name: String,
    pub quantity: u32,
    pub availability: Availability,
}

/// Kind of external data source a scanner draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    Api,
    Web,
    Database,
    File,
}

/// Descriptor for a feed the research agent watches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub kind: DataSourceKind,
    #[serde(default)]
    pub url: Option<String>,
    /// Polling interval in minutes
    pub update_interval: u32,
}

/// Point-in-time counters for one agent, derived each time they are read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent_id: String,
    pub uptime_ms: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_task_time_ms: f64,
    pub error_rate: f64,
    pub last_activity: DateTime<Utc>,
    pub health_status: HealthStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_scores() {
        assert_eq!(Priority::Critical.score(), 10);
        assert_eq!(Priority::High.score(), 7);
        assert_eq!(Priority::Medium.score(), 5);
        assert_eq!(Priority::Low.score(), 3);
    }

    #[test]
    fn test_health_worst_ordering() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Critical.worst(HealthStatus::Healthy),
            HealthStatus::Critical
        );
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Healthy),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_payload_serialization_is_tagged() {
        let payload = EventPayload::ScanRequest {
            requested_by: "operator".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"scan_request\""));
        assert!(json.contains("operator"));
    }

    #[test]
    fn test_broadcast_envelope_derives_type_and_sender() {
        let payload = EventPayload::ScanRequest {
            requested_by: "operator".to_string(),
            timestamp: Utc::now(),
        };
        let message = AgentMessage::broadcast(payload);
        assert_eq!(message.message_type, MessageType::ScanRequest);
        assert_eq!(message.sender, "operator");
        assert_eq!(message.recipient, "broadcast");
        assert!(message.id.starts_with("MSG-"));
    }

    #[test]
    fn test_criteria_operator_serialization() {
        let json = serde_json::to_string(&CriteriaOp::Gte).unwrap();
        assert_eq!(json, "\">=\"");
    }
}

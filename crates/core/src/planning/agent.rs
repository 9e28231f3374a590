//! # Planning Agent
//!
//! Consumes findings from the bus, batches compatible ones, and turns each
//! batch into a validated, phased revision plan. Critical findings bypass
//! the batching interval and are planned the moment they arrive.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, SubscriptionToken};
use crate::error::AgentError;
use crate::metrics::MetricsTracker;
use crate::planning::dependencies::DependencyManager;
use crate::planning::impact::{parse_date, ImpactAnalyzer};
use crate::planning::resources::ResourceAllocator;
use crate::types::{
    new_id, AgentMetrics, Category, Criteria, CriteriaOp, EventPayload, Finding, Metric, Phase,
    PlanStatus, Priority, RevisionPlan, Risk, RiskAssessment, RiskLevel, Task, TaskStatus,
    TaskType, TestRequirement, TestType,
};

pub const PLANNING_AGENT_ID: &str = "planning-agent";

/// Effort above which a plan draws a warning (hours)
const EFFORT_WARNING_HOURS: f64 = 500.0;

/// Components the planner recognizes when grouping work
const PLANNING_COMPONENTS: &[&str] = &[
    "ROI Calculator",
    "Policy Tracker",
    "Global Comparator",
    "AI Dashboard",
];

/// Tuning knobs for the planning loop
#[derive(Debug, Clone)]
pub struct PlanningConfig {
    /// Pause between queue checks
    pub plan_interval: std::time::Duration,
    /// Upper bound on findings planned together
    pub max_batch_size: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            plan_interval: std::time::Duration::from_secs(5),
            max_batch_size: 5,
        }
    }
}

/// The queue-drained consumer side of the agent pair
pub struct PlanningAgent {
    bus: Arc<EventBus>,
    impact: ImpactAnalyzer,
    dependencies: DependencyManager,
    allocator: ResourceAllocator,
    config: PlanningConfig,
    plans: Mutex<std::collections::HashMap<String, RevisionPlan>>,
    queue: Mutex<VecDeque<Finding>>,
    metrics: MetricsTracker,
    running: watch::Sender<bool>,
    tokens: Mutex<Vec<SubscriptionToken>>,
    weak: Weak<Self>,
}

impl PlanningAgent {
    pub fn new(bus: Arc<EventBus>, config: PlanningConfig) -> Arc<Self> {
        let (running, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            bus,
            impact: ImpactAnalyzer::new(),
            dependencies: DependencyManager::new(),
            allocator: ResourceAllocator::new(),
            config,
            plans: Mutex::new(std::collections::HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            metrics: MetricsTracker::new(PLANNING_AGENT_ID),
            running,
            tokens: Mutex::new(Vec::new()),
            weak: weak.clone(),
        })
    }

    /// Subscribe to findings and status updates and start the batching
    /// loop. Calling `start` on a running agent is a logged no-op.
    pub async fn start(&self) -> Result<()> {
        if *self.running.borrow() {
            info!("planning agent already running");
            return Ok(());
        }
        self.running.send_replace(true);
        self.metrics.mark_started()?;

        let finding_agent = self.arc()?;
        let finding_token = self.bus.subscribe("research.finding", move |payload| {
            let agent = Arc::clone(&finding_agent);
            Box::pin(async move { agent.handle_finding(payload).await })
        })?;

        let status_agent = self.arc()?;
        let status_token = self.bus.subscribe("implementation.status", move |payload| {
            let agent = Arc::clone(&status_agent);
            Box::pin(async move { agent.handle_status(payload).await })
        })?;

        {
            let mut tokens = self.lock_tokens()?;
            tokens.push(finding_token);
            tokens.push(status_token);
        }

        self.spawn_plan_loop()?;
        info!("planning agent started");
        Ok(())
    }

    /// Signal the loop to exit before its next iteration. The batch in
    /// flight, if any, runs to completion.
    pub async fn stop(&self) -> Result<()> {
        if !*self.running.borrow() {
            info!("planning agent is not running");
            return Ok(());
        }
        self.running.send_replace(false);
        let tokens: Vec<SubscriptionToken> = self.lock_tokens()?.drain(..).collect();
        for token in &tokens {
            self.bus.unsubscribe(token)?;
        }
        info!("planning agent stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn metrics(&self) -> Result<AgentMetrics> {
        self.metrics.snapshot()
    }

    /// Plans stored so far, in no particular order.
    pub fn active_plans(&self) -> Result<Vec<RevisionPlan>> {
        Ok(self.lock_plans()?.values().cloned().collect())
    }

    fn spawn_plan_loop(&self) -> Result<()> {
        let agent = self.arc()?;
        let mut stop_rx = self.running.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(agent.config.plan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !*stop_rx.borrow() {
                            break;
                        }
                        let batch = match agent.next_batch() {
                            Ok(batch) => batch,
                            Err(e) => {
                                warn!(error = %e, "failed to drain planning queue");
                                continue;
                            }
                        };
                        if !batch.is_empty() {
                            if let Err(e) = agent.create_revision_plan(batch).await {
                                warn!(error = %e, "revision plan discarded");
                            }
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || !*stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("planning loop exited");
        });
        Ok(())
    }

    fn arc(&self) -> Result<Arc<Self>> {
        self.weak
            .upgrade()
            .ok_or_else(|| anyhow!("planning agent handle dropped"))
    }

    async fn handle_finding(&self, payload: EventPayload) -> Result<()> {
        let EventPayload::FindingPublished { finding, .. } = payload else {
            return Ok(());
        };
        info!(title = %finding.title, priority = ?finding.priority, "received finding");

        // Critical findings are planned immediately and deliberately kept
        // off the queue so they are not planned a second time by the loop.
        if finding.priority == Priority::Critical {
            return self.create_revision_plan(vec![finding]).await;
        }

        self.lock_queue()?.push_back(finding);
        Ok(())
    }

    /// Pull a compatibility-grouped batch off the queue front. The first
    /// incompatible finding is put back and ends the batch.
    fn next_batch(&self) -> Result<Vec<Finding>> {
        let mut queue = self.lock_queue()?;
        let mut batch = Vec::new();
        while batch.len() < self.config.max_batch_size {
            let Some(finding) = queue.pop_front() else {
                break;
            };
            if batch.is_empty() || self.can_batch(&finding, &batch) {
                batch.push(finding);
            } else {
                queue.push_front(finding);
                break;
            }
        }
        Ok(batch)
    }

    /// A finding joins a batch when it shares a category with it or
    /// touches an overlapping component.
    fn can_batch(&self, finding: &Finding, batch: &[Finding]) -> bool {
        if batch.iter().any(|f| f.category == finding.category) {
            return true;
        }
        let batch_components: HashSet<String> = batch
            .iter()
            .flat_map(|f| f.recommended_actions.iter())
            .map(|action| self.extract_component(action))
            .collect();
        finding
            .recommended_actions
            .iter()
            .any(|action| batch_components.contains(&self.extract_component(action)))
    }

    fn extract_component(&self, action: &str) -> String {
        let lower = action.to_lowercase();
        PLANNING_COMPONENTS
            .iter()
            .find(|component| lower.contains(&component.to_lowercase()))
            .map(|component| component.to_string())
            .unwrap_or_else(|| "General".to_string())
    }

    /// Turn one batch into a validated, stored, published plan.
    #[tracing::instrument(skip(self, findings), fields(batch_size = findings.len()))]
    async fn create_revision_plan(&self, findings: Vec<Finding>) -> Result<()> {
        let started = Instant::now();
        info!(count = findings.len(), "creating revision plan");

        let impact = self.impact.analyze(&findings);
        debug!(total = impact.total, user = impact.user_impact, "impact assessed");

        let dependency_map = self.dependencies.analyze(&findings);
        let cycles = self.dependencies.detect_cycles(&dependency_map);
        if !cycles.is_empty() {
            warn!(cycles = cycles.len(), "dependency cycles detected in batch");
        }

        let mut phases = self.build_phases(&findings);

        let resource_plan = self.allocator.allocate(&phases)?;
        for conflict in &resource_plan.conflicts {
            warn!(
                phase = conflict.phase,
                resource = %conflict.resource,
                required = conflict.required,
                available = conflict.available,
                "resource conflict"
            );
        }
        for phase in &mut phases {
            if let Some(allocations) = resource_plan.phases.get(&phase.phase_number) {
                phase.resources_required = allocations.clone();
            }
        }

        let total_effort: f64 = phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .map(|t| t.estimated_hours)
            .sum();

        let plan = RevisionPlan {
            plan_id: new_id("PLAN"),
            created_date: Utc::now(),
            status: PlanStatus::Draft,
            risk_assessment: self.assess_risks(&findings, &phases),
            success_metrics: self.success_metrics(&findings),
            deadline: self.deadline(&findings),
            findings,
            phases,
            total_effort,
        };

        if let Err(e) = self.validate_plan(&plan) {
            self.metrics.record_failure()?;
            error!(plan_id = %plan.plan_id, error = %e, "plan validation failed");
            return Err(e.into());
        }

        let mut plan = plan;
        plan.status = PlanStatus::Approved;
        self.lock_plans()?
            .insert(plan.plan_id.clone(), plan.clone());

        info!(
            plan_id = %plan.plan_id,
            phases = plan.phases.len(),
            effort = plan.total_effort,
            "publishing plan"
        );
        self.bus
            .publish(
                "planning.plan_created",
                EventPayload::PlanCreated {
                    plan: Box::new(plan),
                    agent_id: PLANNING_AGENT_ID.to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await?;
        self.metrics
            .record_success(started.elapsed().as_millis() as f64)?;
        Ok(())
    }

    /// Three-phase plan construction.
    ///
    /// Phase 1 holds critical/high actions, Phase 2 holds medium/low
    /// actions (synthesized roll-out work when that bucket is empty but
    /// Phase 1 exists), Phase 3 tests every touched component and depends
    /// on every earlier task.
    fn build_phases(&self, findings: &[Finding]) -> Vec<Phase> {
        let mut phases = Vec::new();

        let phase1_tasks: Vec<Task> = findings
            .iter()
            .filter(|f| matches!(f.priority, Priority::Critical | Priority::High))
            .flat_map(|f| {
                f.recommended_actions
                    .iter()
                    .map(|action| self.task_from_action(action, f.priority))
            })
            .collect();
        let phase1_ids: Vec<String> = phase1_tasks.iter().map(|t| t.id.clone()).collect();

        if !phase1_tasks.is_empty() {
            phases.push(Phase {
                phase_number: 1,
                title: "Critical Updates".to_string(),
                objectives: vec![
                    "Address critical findings".to_string(),
                    "Update compliance requirements".to_string(),
                ],
                duration: estimate_phase_duration(&phase1_tasks),
                tasks: phase1_tasks,
                dependencies: Vec::new(),
                resources_required: Vec::new(),
            });
        }

        let mut phase2_tasks: Vec<Task> = findings
            .iter()
            .filter(|f| matches!(f.priority, Priority::Medium | Priority::Low))
            .flat_map(|f| {
                f.recommended_actions
                    .iter()
                    .map(|action| self.task_from_action(action, f.priority))
            })
            .collect();

        if phase2_tasks.is_empty() && !phase1_ids.is_empty() {
            phase2_tasks = self.rollout_tasks(phases.first().map(|p| p.tasks.as_slice()));
        }

        let phase2_ids: Vec<String> = phase2_tasks.iter().map(|t| t.id.clone()).collect();
        if !phase2_tasks.is_empty() {
            phases.push(Phase {
                phase_number: 2,
                title: "Feature Updates".to_string(),
                objectives: vec![
                    "Implement new features".to_string(),
                    "Update calculations".to_string(),
                ],
                duration: estimate_phase_duration(&phase2_tasks),
                tasks: phase2_tasks,
                dependencies: phase1_ids.clone(),
                resources_required: Vec::new(),
            });
        }

        let processed: Vec<String> = phase1_ids.into_iter().chain(phase2_ids).collect();
        phases.push(Phase {
            phase_number: 3,
            title: "Testing & Validation".to_string(),
            objectives: vec![
                "Validate all changes".to_string(),
                "Ensure quality standards".to_string(),
            ],
            tasks: self.testing_tasks(findings),
            dependencies: processed,
            duration: 3,
            resources_required: Vec::new(),
        });

        phases
    }

    fn task_from_action(&self, action: &str, priority: Priority) -> Task {
        Task {
            id: new_id("TASK"),
            task_type: task_type_for(action),
            title: action.to_string(),
            description: format!("Implement: {}", action),
            component: self.extract_component(action),
            priority: priority.score(),
            estimated_hours: estimate_hours(action),
            status: TaskStatus::Pending,
            changes: Vec::new(),
            tests: Vec::new(),
        }
    }

    /// Synthesized Phase-2 work for batches with no medium/low findings:
    /// one roll-out task per distinct Phase-1 component.
    fn rollout_tasks(&self, phase1_tasks: Option<&[Task]>) -> Vec<Task> {
        let components: BTreeSet<String> = phase1_tasks
            .unwrap_or(&[])
            .iter()
            .map(|t| t.component.clone())
            .collect();
        components
            .into_iter()
            .map(|component| Task {
                id: new_id("TASK"),
                task_type: TaskType::Feature,
                title: format!("Integrate {} updates", component),
                description: format!("Propagate {} changes across dependent views", component),
                component,
                priority: 5,
                estimated_hours: 4.0,
                status: TaskStatus::Pending,
                changes: Vec::new(),
                tests: Vec::new(),
            })
            .collect()
    }

    /// One synthetic test task per distinct component the batch touches.
    fn testing_tasks(&self, findings: &[Finding]) -> Vec<Task> {
        let components: BTreeSet<String> = findings
            .iter()
            .flat_map(|f| f.recommended_actions.iter())
            .map(|action| self.extract_component(action))
            .collect();

        components
            .into_iter()
            .map(|component| Task {
                id: new_id("TASK"),
                task_type: TaskType::Feature,
                title: format!("Test {}", component),
                description: format!("Comprehensive testing of {} changes", component),
                component: component.clone(),
                priority: 10,
                estimated_hours: 4.0,
                status: TaskStatus::Pending,
                changes: Vec::new(),
                tests: vec![
                    TestRequirement {
                        test_type: TestType::Unit,
                        scope: vec![component.clone()],
                        success_criteria: vec![
                            Criteria {
                                metric: "coverage".to_string(),
                                operator: CriteriaOp::Gte,
                                value: 90.0,
                            },
                            Criteria {
                                metric: "pass_rate".to_string(),
                                operator: CriteriaOp::Eq,
                                value: 100.0,
                            },
                        ],
                        timeout_ms: 300_000,
                    },
                    TestRequirement {
                        test_type: TestType::Integration,
                        scope: vec![component],
                        success_criteria: vec![Criteria {
                            metric: "pass_rate".to_string(),
                            operator: CriteriaOp::Gte,
                            value: 95.0,
                        }],
                        timeout_ms: 600_000,
                    },
                ],
            })
            .collect()
    }

    fn assess_risks(&self, findings: &[Finding], phases: &[Phase]) -> RiskAssessment {
        let mut risks = Vec::new();

        if findings.iter().any(|f| f.category == Category::Scientific) {
            risks.push(Risk {
                risk_type: "data_integrity".to_string(),
                probability: RiskLevel::Medium,
                impact: RiskLevel::High,
                description: "Incorrect data updates could affect calculations".to_string(),
                mitigation: "Implement comprehensive validation and testing".to_string(),
            });
        }

        if findings.iter().any(|f| f.category == Category::Legislative) {
            risks.push(Risk {
                risk_type: "compliance".to_string(),
                probability: RiskLevel::Low,
                impact: RiskLevel::High,
                description: "Missing regulatory requirements".to_string(),
                mitigation: "Legal review and compliance testing".to_string(),
            });
        }

        if phases.iter().map(|p| p.duration).sum::<u32>() > 14 {
            risks.push(Risk {
                risk_type: "timeline".to_string(),
                probability: RiskLevel::Medium,
                impact: RiskLevel::Medium,
                description: "Extended implementation timeline".to_string(),
                mitigation: "Parallel execution and resource augmentation".to_string(),
            });
        }

        let overall_risk_level = if risks
            .iter()
            .any(|r| r.probability == RiskLevel::High && r.impact == RiskLevel::High)
        {
            RiskLevel::High
        } else if risks.iter().any(|r| r.impact == RiskLevel::High) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskAssessment {
            mitigation_strategies: risks.iter().map(|r| r.mitigation.clone()).collect(),
            risks,
            overall_risk_level,
        }
    }

    fn success_metrics(&self, findings: &[Finding]) -> Vec<Metric> {
        let mut metrics = vec![
            Metric {
                name: "Implementation Completion".to_string(),
                target: 100.0,
                unit: "%".to_string(),
                measurement_method: "Completed tasks / Total tasks".to_string(),
            },
            Metric {
                name: "Test Pass Rate".to_string(),
                target: 95.0,
                unit: "%".to_string(),
                measurement_method: "Passed tests / Total tests".to_string(),
            },
            Metric {
                name: "Data Accuracy".to_string(),
                target: 99.0,
                unit: "%".to_string(),
                measurement_method: "Validated data points / Total data points".to_string(),
            },
        ];

        if findings.iter().any(|f| f.category == Category::Legislative) {
            metrics.push(Metric {
                name: "Compliance Coverage".to_string(),
                target: 100.0,
                unit: "%".to_string(),
                measurement_method: "Compliant features / Required features".to_string(),
            });
        }

        if findings.iter().any(|f| f.category == Category::Market) {
            metrics.push(Metric {
                name: "Feature Parity".to_string(),
                target: 90.0,
                unit: "%".to_string(),
                measurement_method: "Implemented features / Competitor features".to_string(),
            });
        }

        metrics
    }

    /// Nearest legislative implementation deadline, else 30 days out for
    /// urgent batches, else none.
    fn deadline(&self, findings: &[Finding]) -> Option<chrono::DateTime<Utc>> {
        let legislative_deadline = findings
            .iter()
            .filter(|f| f.category == Category::Legislative)
            .filter_map(|f| f.data_field("implementation_deadline").and_then(parse_date))
            .min();
        if legislative_deadline.is_some() {
            return legislative_deadline;
        }

        if findings
            .iter()
            .any(|f| matches!(f.priority, Priority::Critical | Priority::High))
        {
            return Some(Utc::now() + Duration::days(30));
        }

        None
    }

    fn validate_plan(&self, plan: &RevisionPlan) -> Result<(), AgentError> {
        if plan.phases.is_empty() {
            return Err(AgentError::PlanValidationFailure {
                reason: "plan has no phases".to_string(),
            });
        }

        for phase in &plan.phases {
            if phase.tasks.is_empty() {
                return Err(AgentError::PlanValidationFailure {
                    reason: format!("phase {} has no tasks", phase.phase_number),
                });
            }
        }

        if plan.total_effort > EFFORT_WARNING_HOURS {
            warn!(
                plan_id = %plan.plan_id,
                effort = plan.total_effort,
                "plan requires excessive effort"
            );
        }

        let task_ids: HashSet<String> = plan.task_ids().into_iter().collect();
        for phase in &plan.phases {
            for dependency in &phase.dependencies {
                if !task_ids.contains(dependency) {
                    return Err(AgentError::PlanValidationFailure {
                        reason: format!("invalid dependency: {}", dependency),
                    });
                }
            }
        }

        Ok(())
    }

    async fn handle_status(&self, payload: EventPayload) -> Result<()> {
        let EventPayload::ImplementationStatus {
            plan_id,
            status,
            completed_tasks,
        } = payload
        else {
            return Ok(());
        };

        let mut plans = self.lock_plans()?;
        let Some(plan) = plans.get_mut(&plan_id) else {
            let err = AgentError::UnknownPlanReference { plan_id };
            warn!(error = %err, "ignoring status update");
            return Ok(());
        };

        plan.status = match status.as_str() {
            "completed" => {
                info!(plan_id = %plan_id, "plan completed");
                PlanStatus::Completed
            }
            "failed" => {
                info!(plan_id = %plan_id, "plan failed, reverting to draft");
                PlanStatus::Draft
            }
            _ => PlanStatus::InProgress,
        };
        debug!(
            plan_id = %plan_id,
            completed = completed_tasks.len(),
            "implementation status applied"
        );
        Ok(())
    }

    fn lock_plans(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, std::collections::HashMap<String, RevisionPlan>>> {
        self.plans
            .lock()
            .map_err(|e| anyhow!("plans lock poisoned: {}", e))
    }

    fn lock_queue(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<Finding>>> {
        self.queue
            .lock()
            .map_err(|e| anyhow!("queue lock poisoned: {}", e))
    }

    fn lock_tokens(&self) -> Result<std::sync::MutexGuard<'_, Vec<SubscriptionToken>>> {
        self.tokens
            .lock()
            .map_err(|e| anyhow!("tokens lock poisoned: {}", e))
    }
}

fn task_type_for(action: &str) -> TaskType {
    let lower = action.to_lowercase();
    if lower.contains("update") || lower.contains("modify") {
        TaskType::DataUpdate
    } else if lower.contains("add") || lower.contains("create") {
        TaskType::Feature
    } else if lower.contains("fix") {
        TaskType::Bugfix
    } else {
        TaskType::Refactor
    }
}

fn estimate_hours(action: &str) -> f64 {
    let lower = action.to_lowercase();
    if lower.contains("update") || lower.contains("modify") {
        2.0
    } else if lower.contains("create") || lower.contains("implement") {
        8.0
    } else if lower.contains("refactor") || lower.contains("optimize") {
        16.0
    } else {
        4.0
    }
}

/// Eight-hour days with some parallelization assumed.
fn estimate_phase_duration(tasks: &[Task]) -> u32 {
    let total_hours: f64 = tasks.iter().map(|t| t.estimated_hours).sum();
    (total_hours / 16.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(priority: Priority, category: Category, actions: &[&str]) -> Finding {
        Finding {
            id: new_id("F"),
            source: "Test".to_string(),
            category,
            title: format!("{:?} finding", priority),
            description: "test".to_string(),
            key_points: vec![],
            impact: "test".to_string(),
            priority,
            confidence_score: 0.9,
            data: None,
            recommended_actions: actions.iter().map(|a| a.to_string()).collect(),
            validation_required: false,
            created_at: Utc::now(),
        }
    }

    fn idle_agent() -> Arc<PlanningAgent> {
        PlanningAgent::new(
            Arc::new(EventBus::default()),
            PlanningConfig {
                plan_interval: std::time::Duration::from_secs(3600),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_critical_only_batch_builds_three_phases() {
        let agent = idle_agent();
        let batch = vec![finding(
            Priority::Critical,
            Category::Scientific,
            &["Update ROI Calculator"],
        )];
        let phases = agent.build_phases(&batch);

        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0].title, "Critical Updates");
        assert_eq!(phases[0].tasks[0].title, "Update ROI Calculator");
        // Phase 2 is synthesized roll-out work for the same component.
        assert_eq!(phases[1].tasks[0].component, "ROI Calculator");
        assert_eq!(phases[1].dependencies.len(), phases[0].tasks.len());
    }

    #[test]
    fn test_phase_three_depends_on_all_earlier_tasks() {
        let agent = idle_agent();
        let batch = vec![
            finding(
                Priority::High,
                Category::Scientific,
                &["Update ROI Calculator", "Revise age-based calculations"],
            ),
            finding(
                Priority::Medium,
                Category::Scientific,
                &["Add comparison charts to Global Comparator"],
            ),
        ];
        let phases = agent.build_phases(&batch);

        assert_eq!(phases.len(), 3);
        let earlier_ids: HashSet<String> = phases[..2]
            .iter()
            .flat_map(|p| p.tasks.iter().map(|t| t.id.clone()))
            .collect();
        let phase3 = &phases[2];
        assert_eq!(
            phase3.dependencies.iter().cloned().collect::<HashSet<_>>(),
            earlier_ids
        );
        assert!(phase3.tasks.iter().all(|t| t.title.starts_with("Test ")));
    }

    #[test]
    fn test_batch_is_bounded_and_compatibility_grouped() {
        let agent = idle_agent();
        {
            let mut queue = agent.lock_queue().unwrap();
            for _ in 0..6 {
                queue.push_back(finding(
                    Priority::Medium,
                    Category::Market,
                    &["Review pricing"],
                ));
            }
        }
        let batch = agent.next_batch().unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(agent.lock_queue().unwrap().len(), 1);
    }

    #[test]
    fn test_incompatible_finding_ends_the_batch() {
        let agent = idle_agent();
        {
            let mut queue = agent.lock_queue().unwrap();
            queue.push_back(finding(
                Priority::Medium,
                Category::Market,
                &["Review pricing"],
            ));
            queue.push_back(finding(
                Priority::Medium,
                Category::Scientific,
                &["Update success rates in ROI Calculator"],
            ));
        }
        let batch = agent.next_batch().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].category, Category::Market);
        // The incompatible finding went back to the queue front.
        assert_eq!(agent.lock_queue().unwrap().len(), 1);
    }

    #[test]
    fn test_shared_component_allows_cross_category_batch() {
        let agent = idle_agent();
        {
            let mut queue = agent.lock_queue().unwrap();
            queue.push_back(finding(
                Priority::Medium,
                Category::Market,
                &["Review ROI Calculator pricing assumptions"],
            ));
            queue.push_back(finding(
                Priority::Medium,
                Category::Scientific,
                &["Update success rates in ROI Calculator"],
            ));
        }
        let batch = agent.next_batch().unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_critical_finding_is_planned_immediately() {
        let bus = Arc::new(EventBus::default());
        let agent = PlanningAgent::new(
            Arc::clone(&bus),
            PlanningConfig {
                plan_interval: std::time::Duration::from_secs(3600),
                ..Default::default()
            },
        );
        agent.start().await.unwrap();

        bus.publish(
            "research.finding",
            EventPayload::FindingPublished {
                finding: finding(
                    Priority::Critical,
                    Category::Legislative,
                    &["Update ROI Calculator"],
                ),
                agent_id: "research-agent".to_string(),
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();

        let plans = agent.active_plans().unwrap();
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.status, PlanStatus::Approved);
        assert_eq!(plan.phases.len(), 3);
        // The immediate path suppresses the queue copy.
        assert!(agent.lock_queue().unwrap().is_empty());

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_plan_without_tasks_is_rejected() {
        let agent = idle_agent();
        let empty = finding(Priority::Medium, Category::Market, &[]);

        let result = agent.create_revision_plan(vec![empty]).await;
        assert!(result.is_err());
        assert!(agent.active_plans().unwrap().is_empty());
        assert_eq!(agent.metrics().unwrap().tasks_failed, 1);
    }

    #[test]
    fn test_dangling_dependency_fails_validation() {
        let agent = idle_agent();
        let batch = vec![finding(
            Priority::High,
            Category::Scientific,
            &["Update ROI Calculator"],
        )];
        let mut phases = agent.build_phases(&batch);
        phases[2].dependencies.push("TASK-missing".to_string());

        let plan = RevisionPlan {
            plan_id: new_id("PLAN"),
            created_date: Utc::now(),
            status: PlanStatus::Draft,
            findings: batch,
            total_effort: 10.0,
            risk_assessment: RiskAssessment {
                risks: vec![],
                overall_risk_level: RiskLevel::Low,
                mitigation_strategies: vec![],
            },
            success_metrics: vec![],
            deadline: None,
            phases,
        };

        let result = agent.validate_plan(&plan);
        assert!(matches!(
            result,
            Err(AgentError::PlanValidationFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_updates_drive_plan_state_machine() {
        let agent = idle_agent();
        agent
            .create_revision_plan(vec![finding(
                Priority::High,
                Category::Legislative,
                &["Update Policy Tracker"],
            )])
            .await
            .unwrap();
        let plan_id = agent.active_plans().unwrap()[0].plan_id.clone();

        let status = |s: &str| EventPayload::ImplementationStatus {
            plan_id: plan_id.clone(),
            status: s.to_string(),
            completed_tasks: vec![],
        };

        agent.handle_status(status("started")).await.unwrap();
        assert_eq!(
            agent.active_plans().unwrap()[0].status,
            PlanStatus::InProgress
        );

        agent.handle_status(status("failed")).await.unwrap();
        assert_eq!(agent.active_plans().unwrap()[0].status, PlanStatus::Draft);

        agent.handle_status(status("completed")).await.unwrap();
        assert_eq!(
            agent.active_plans().unwrap()[0].status,
            PlanStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_unknown_plan_status_is_ignored() {
        let agent = idle_agent();
        agent
            .handle_status(EventPayload::ImplementationStatus {
                plan_id: "PLAN-missing".to_string(),
                status: "completed".to_string(),
                completed_tasks: vec![],
            })
            .await
            .unwrap();
        assert!(agent.active_plans().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_prefers_nearest_legislative_date() {
        let agent = idle_agent();
        let near = Utc::now() + Duration::days(10);
        let far = Utc::now() + Duration::days(40);

        let mut first = finding(
            Priority::High,
            Category::Legislative,
            &["Update Policy Tracker"],
        );
        first.data = Some(serde_json::json!({
            "implementation_deadline": far.to_rfc3339(),
        }));
        let mut second = finding(
            Priority::High,
            Category::Legislative,
            &["Add compliance checker to Policy Tracker"],
        );
        second.data = Some(serde_json::json!({
            "implementation_deadline": near.to_rfc3339(),
        }));

        agent
            .create_revision_plan(vec![first, second])
            .await
            .unwrap();
        let plan = &agent.active_plans().unwrap()[0];
        let deadline = plan.deadline.expect("deadline set");
        assert!((deadline - near).num_seconds().abs() < 2);
    }

    #[test]
    fn test_task_derivation_keywords() {
        assert_eq!(task_type_for("Update the tables"), TaskType::DataUpdate);
        assert_eq!(task_type_for("Add new widget"), TaskType::Feature);
        assert_eq!(task_type_for("Fix rounding bug"), TaskType::Bugfix);
        assert_eq!(task_type_for("Rework layout"), TaskType::Refactor);

        assert_eq!(estimate_hours("Update the tables"), 2.0);
        assert_eq!(estimate_hours("Create new widget"), 8.0);
        assert_eq!(estimate_hours("Optimize queries"), 16.0);
        assert_eq!(estimate_hours("Review docs"), 4.0);
    }
}

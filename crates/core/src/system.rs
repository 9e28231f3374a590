//! # Agent System
//!
//! Orchestrator owning one event bus and the research/planning agent
//! pair. The caller constructs, starts, and stops it; there is no
//! process-wide instance.

use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, HistoryFilter, DEFAULT_HISTORY_CAPACITY};
use crate::planning::{PlanningAgent, PlanningConfig};
use crate::research::{default_scanners, ResearchAgent, ResearchConfig};
use crate::types::{
    AgentMessage, AgentMetrics, DataSource, DataSourceKind, EventPayload, Finding, HealthStatus,
    RevisionPlan,
};

/// Error rate past which a critical agent is routed into recovery
const RECOVERY_ERROR_RATE: f64 = 0.5;

/// Tuning knobs for the whole system
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub research: ResearchConfig,
    pub planning: PlanningConfig,
    /// Pause between health checks
    pub health_interval: std::time::Duration,
    pub history_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            research: ResearchConfig::default(),
            planning: PlanningConfig::default(),
            health_interval: std::time::Duration::from_secs(60),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Aggregated view over both agents and the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub uptime_ms: u64,
    pub agents: Vec<AgentMetrics>,
    pub total_findings: usize,
    pub active_plans: usize,
    pub message_count: usize,
    pub overall_health: HealthStatus,
}

/// The wired agent pair plus its bus
pub struct AgentSystem {
    bus: Arc<EventBus>,
    research: Arc<ResearchAgent>,
    planning: Arc<PlanningAgent>,
    health_interval: std::time::Duration,
    running: watch::Sender<bool>,
    started_at: Mutex<Option<Instant>>,
    weak: Weak<Self>,
}

impl AgentSystem {
    /// Wire a bus, the research agent (with the fixed data-source
    /// descriptors and built-in scanners), and the planning agent.
    pub fn new(config: SystemConfig) -> Result<Arc<Self>> {
        let bus = Arc::new(EventBus::new(config.history_capacity));

        let data_sources = vec![
            DataSource {
                name: "CDC ART Reports".to_string(),
                kind: DataSourceKind::Api,
                url: Some("https://api.cdc.gov/art".to_string()),
                update_interval: 1440,
            },
            DataSource {
                name: "Congress.gov".to_string(),
                kind: DataSourceKind::Web,
                url: Some("https://www.congress.gov".to_string()),
                update_interval: 60,
            },
            DataSource {
                name: "Market Intelligence".to_string(),
                kind: DataSourceKind::Database,
                url: None,
                update_interval: 720,
            },
        ];

        let research = ResearchAgent::new(
            Arc::clone(&bus),
            data_sources,
            default_scanners(),
            config.research,
        );
        let planning = PlanningAgent::new(Arc::clone(&bus), config.planning);

        let system = Arc::new_cyclic(|weak| Self {
            bus,
            research,
            planning,
            health_interval: config.health_interval,
            running: watch::channel(false).0,
            started_at: Mutex::new(None),
            weak: weak.clone(),
        });
        system.tap_events()?;
        Ok(system)
    }

    /// Observe the inter-agent topics for monitoring.
    fn tap_events(&self) -> Result<()> {
        const TOPICS: &[&str] = &[
            "research.finding",
            "planning.plan_created",
            "implementation.status",
            "validation.request",
            "validation.response",
        ];
        for topic in TOPICS {
            let name = topic.to_string();
            self.bus.subscribe(topic, move |payload| {
                let name = name.clone();
                Box::pin(async move {
                    debug!(topic = %name, message_type = ?payload.message_type(), "event observed");
                    Ok(())
                })
            })?;
        }
        Ok(())
    }

    /// Start both agents and the health loop. A second `start` on a
    /// running system is a logged no-op.
    pub async fn start(&self) -> Result<()> {
        if *self.running.borrow() {
            info!("agent system is already running");
            return Ok(());
        }
        info!("starting agent system");
        self.running.send_replace(true);
        *self.lock_started()? = Some(Instant::now());

        if let Err(e) = tokio::try_join!(self.research.start(), self.planning.start()) {
            self.running.send_replace(false);
            return Err(e).context("failed to start agent system");
        }

        self.spawn_health_loop()?;
        info!("agent system started");
        Ok(())
    }

    /// Stop both agents. A `stop` on a stopped system is a logged no-op.
    pub async fn stop(&self) -> Result<()> {
        if !*self.running.borrow() {
            info!("agent system is not running");
            return Ok(());
        }
        info!("stopping agent system");
        tokio::try_join!(self.research.stop(), self.planning.stop())
            .context("failed to stop agent system")?;
        self.running.send_replace(false);
        info!("agent system stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// The bus, for external collaborators that publish or subscribe.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn spawn_health_loop(&self) -> Result<()> {
        let system = self
            .weak
            .upgrade()
            .ok_or_else(|| anyhow!("system handle dropped"))?;
        let mut stop_rx = self.running.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(system.health_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !*stop_rx.borrow() {
                            break;
                        }
                        if let Err(e) = system.check_system_health() {
                            warn!(error = %e, "health check failed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || !*stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("health loop exited");
        });
        Ok(())
    }

    fn check_system_health(&self) -> Result<()> {
        let metrics = self.system_metrics()?;

        let critical: Vec<&AgentMetrics> = metrics
            .agents
            .iter()
            .filter(|a| a.health_status == HealthStatus::Critical)
            .collect();
        let degraded: Vec<&AgentMetrics> = metrics
            .agents
            .iter()
            .filter(|a| a.health_status == HealthStatus::Degraded)
            .collect();

        if !critical.is_empty() {
            error!(
                agents = ?critical.iter().map(|a| a.agent_id.as_str()).collect::<Vec<_>>(),
                "agents in critical state"
            );
            self.recover_critical_agents(&critical);
        } else if !degraded.is_empty() {
            warn!(
                agents = ?degraded.iter().map(|a| a.agent_id.as_str()).collect::<Vec<_>>(),
                "agents in degraded state"
            );
        }

        info!(
            uptime_ms = metrics.uptime_ms,
            total_findings = metrics.total_findings,
            active_plans = metrics.active_plans,
            health = ?metrics.overall_health,
            "system metrics"
        );
        Ok(())
    }

    /// Recovery path for critical agents. Restart wiring is still a stub;
    /// the escalation is logged so operators can intervene.
    fn recover_critical_agents(&self, agents: &[&AgentMetrics]) {
        for agent in agents {
            if agent.error_rate > RECOVERY_ERROR_RATE {
                info!(agent = %agent.agent_id, "attempting agent restart");
            }
        }
    }

    /// Aggregate uptime, per-agent metrics, and bus counters. The
    /// system-wide health is the worst of the two agents'.
    pub fn system_metrics(&self) -> Result<SystemMetrics> {
        let agents = vec![self.research.metrics()?, self.planning.metrics()?];
        let overall_health = agents
            .iter()
            .fold(HealthStatus::Healthy, |acc, a| acc.worst(a.health_status));

        Ok(SystemMetrics {
            uptime_ms: self
                .lock_started()?
                .map(|s| s.elapsed().as_millis() as u64)
                .unwrap_or(0),
            total_findings: self.research.findings()?.len(),
            active_plans: self.planning.active_plans()?.len(),
            message_count: self.bus.message_history(None)?.len(),
            agents,
            overall_health,
        })
    }

    /// Publish a scan request through the same bus path the automatic
    /// flow uses. Publishing works whether or not the agents run.
    pub async fn trigger_manual_scan(&self) -> Result<()> {
        info!("triggering manual scan");
        self.bus
            .publish(
                "manual.scan_request",
                EventPayload::ScanRequest {
                    requested_by: "operator".to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await
    }

    /// Re-publish stored findings by id so the planner picks them up as a
    /// fresh batch. Unknown ids are logged and skipped.
    pub async fn create_manual_plan(&self, finding_ids: &[String]) -> Result<()> {
        info!(count = finding_ids.len(), "creating manual plan");

        let selected: Vec<Finding> = self
            .research
            .findings()?
            .into_iter()
            .filter(|f| finding_ids.contains(&f.id))
            .collect();

        if selected.is_empty() {
            warn!("no matching findings for manual plan");
            return Ok(());
        }

        for finding in selected {
            self.bus
                .publish(
                    "research.finding",
                    EventPayload::FindingPublished {
                        finding,
                        agent_id: "manual".to_string(),
                        timestamp: Utc::now(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    pub fn event_history(&self, filter: Option<&HistoryFilter>) -> Result<Vec<AgentMessage>> {
        self.bus.message_history(filter)
    }

    /// Findings published by research so far.
    pub fn findings(&self) -> Result<Vec<Finding>> {
        self.research.findings()
    }

    /// Plans the planner currently holds.
    pub fn active_plans(&self) -> Result<Vec<RevisionPlan>> {
        self.planning.active_plans()
    }

    fn lock_started(&self) -> Result<std::sync::MutexGuard<'_, Option<Instant>>> {
        self.started_at
            .lock()
            .map_err(|e| anyhow!("start time lock poisoned: {}", e))
    }
}

//! # Agent Metrics
//!
//! Counter bookkeeping shared by both agents. Uptime, error rate, and
//! health are derived at read time; only the raw counters are stored.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;

use crate::types::{AgentMetrics, HealthStatus};

/// Error rate above which an agent reports `degraded`
const DEGRADED_THRESHOLD: f64 = 0.1;
/// Error rate above which an agent reports `critical`
const CRITICAL_THRESHOLD: f64 = 0.25;

#[derive(Debug, Default)]
struct Counters {
    started: Option<Instant>,
    tasks_completed: u64,
    tasks_failed: u64,
    average_task_time_ms: f64,
    last_activity: Option<chrono::DateTime<Utc>>,
}

/// Thread-safe metrics recorder for one agent
#[derive(Debug)]
pub struct MetricsTracker {
    agent_id: String,
    counters: Mutex<Counters>,
}

impl MetricsTracker {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Mark the agent as started; resets the uptime origin.
    pub fn mark_started(&self) -> Result<()> {
        let mut counters = self.lock()?;
        counters.started = Some(Instant::now());
        counters.last_activity = Some(Utc::now());
        Ok(())
    }

    /// Record a completed task and fold its duration into the running mean.
    pub fn record_success(&self, duration_ms: f64) -> Result<()> {
        let mut counters = self.lock()?;
        counters.tasks_completed += 1;
        let completed = counters.tasks_completed as f64;
        let total = counters.average_task_time_ms * (completed - 1.0);
        counters.average_task_time_ms = (total + duration_ms) / completed;
        counters.last_activity = Some(Utc::now());
        Ok(())
    }

    /// Record a failed task.
    pub fn record_failure(&self) -> Result<()> {
        let mut counters = self.lock()?;
        counters.tasks_failed += 1;
        counters.last_activity = Some(Utc::now());
        Ok(())
    }

    /// Derive a point-in-time snapshot.
    pub fn snapshot(&self) -> Result<AgentMetrics> {
        let counters = self.lock()?;
        let total = counters.tasks_completed + counters.tasks_failed;
        let error_rate = if total == 0 {
            0.0
        } else {
            counters.tasks_failed as f64 / total as f64
        };
        let health_status = if error_rate > CRITICAL_THRESHOLD {
            HealthStatus::Critical
        } else if error_rate > DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Ok(AgentMetrics {
            agent_id: self.agent_id.clone(),
            uptime_ms: counters
                .started
                .map(|s| s.elapsed().as_millis() as u64)
                .unwrap_or(0),
            tasks_completed: counters.tasks_completed,
            tasks_failed: counters.tasks_failed,
            average_task_time_ms: counters.average_task_time_ms,
            error_rate,
            last_activity: counters.last_activity.unwrap_or_else(Utc::now),
            health_status,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Counters>> {
        self.counters
            .lock()
            .map_err(|e| anyhow::anyhow!("metrics lock poisoned: {}", e))
    }
}

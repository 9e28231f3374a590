//! # Research Agent
//!
//! Continuously scans all configured sources for candidate findings,
//! deduplicates and rescores them, and publishes the significant ones on
//! `research.finding` for the planning agent.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, SubscriptionToken};
use crate::error::AgentError;
use crate::metrics::MetricsTracker;
use crate::research::scanners::Scanner;
use crate::research::validator::DataValidator;
use crate::types::{AgentMetrics, Category, DataSource, EventPayload, Finding, Priority};

pub const RESEARCH_AGENT_ID: &str = "research-agent";

/// Tuning knobs for the research loop
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Target pause between scan cycles
    pub scan_interval: std::time::Duration,
    /// Findings at or below this confidence are dropped after rescoring
    pub confidence_threshold: f64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            scan_interval: std::time::Duration::from_secs(60),
            confidence_threshold: 0.7,
        }
    }
}

/// The continuously-scanning producer side of the agent pair
pub struct ResearchAgent {
    bus: Arc<EventBus>,
    validator: DataValidator,
    scanners: Vec<Arc<dyn Scanner>>,
    data_sources: Vec<DataSource>,
    config: ResearchConfig,
    findings: Mutex<Vec<Finding>>,
    metrics: MetricsTracker,
    running: watch::Sender<bool>,
    tokens: Mutex<Vec<SubscriptionToken>>,
    weak: Weak<Self>,
}

impl ResearchAgent {
    pub fn new(
        bus: Arc<EventBus>,
        data_sources: Vec<DataSource>,
        scanners: Vec<Arc<dyn Scanner>>,
        config: ResearchConfig,
    ) -> Arc<Self> {
        let (running, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            bus,
            validator: DataValidator::new(),
            scanners,
            data_sources,
            config,
            findings: Mutex::new(Vec::new()),
            metrics: MetricsTracker::new(RESEARCH_AGENT_ID),
            running,
            tokens: Mutex::new(Vec::new()),
            weak: weak.clone(),
        })
    }

    /// Start the scan loop. Calling `start` on a running agent is a
    /// logged no-op.
    pub async fn start(&self) -> Result<()> {
        if *self.running.borrow() {
            info!("research agent already running");
            return Ok(());
        }
        self.running.send_replace(true);
        self.metrics.mark_started()?;

        let validation_agent = self.arc()?;
        let validation_token = self.bus.subscribe("validation.request", move |payload| {
            let agent = Arc::clone(&validation_agent);
            Box::pin(async move { agent.handle_validation_request(payload).await })
        })?;

        let scan_agent = self.arc()?;
        let scan_token = self.bus.subscribe("manual.scan_request", move |_| {
            let agent = Arc::clone(&scan_agent);
            Box::pin(async move { agent.handle_scan_request().await })
        })?;

        {
            let mut tokens = self.lock_tokens()?;
            tokens.push(validation_token);
            tokens.push(scan_token);
        }

        self.spawn_scan_loop()?;
        info!(
            sources = self.data_sources.len(),
            scanners = self.scanners.len(),
            "research agent started"
        );
        Ok(())
    }

    /// Signal the loop to exit before its next iteration. The cycle in
    /// flight, if any, runs to completion.
    pub async fn stop(&self) -> Result<()> {
        if !*self.running.borrow() {
            info!("research agent is not running");
            return Ok(());
        }
        self.running.send_replace(false);
        let tokens: Vec<SubscriptionToken> = self.lock_tokens()?.drain(..).collect();
        for token in &tokens {
            self.bus.unsubscribe(token)?;
        }
        info!("research agent stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn metrics(&self) -> Result<AgentMetrics> {
        self.metrics.snapshot()
    }

    /// Findings published so far.
    pub fn findings(&self) -> Result<Vec<Finding>> {
        Ok(self.lock_findings()?.clone())
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }

    fn spawn_scan_loop(&self) -> Result<()> {
        let agent = self.arc()?;
        let mut stop_rx = self.running.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(agent.config.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !*stop_rx.borrow() {
                            break;
                        }
                        if let Err(e) = agent.run_scan_cycle().await {
                            warn!(error = %e, "scan cycle failed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || !*stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("research scan loop exited");
        });
        Ok(())
    }

    fn arc(&self) -> Result<Arc<Self>> {
        self.weak
            .upgrade()
            .ok_or_else(|| anyhow!("research agent handle dropped"))
    }

    /// One scan cycle with metrics bookkeeping. Failures are recorded and
    /// surfaced, never propagated in a way that stops the loop.
    async fn run_scan_cycle(&self) -> Result<()> {
        let started = Instant::now();
        match self.scan_cycle().await {
            Ok(published) => {
                self.metrics
                    .record_success(started.elapsed().as_millis() as f64)?;
                debug!(published, "scan cycle complete");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure()?;
                Err(AgentError::ScanFailure(e.to_string()).into())
            }
        }
    }

    /// Fan out to all scanners, post-process, publish significant findings.
    async fn scan_cycle(&self) -> Result<usize> {
        let now = Utc::now();
        let mut tasks = JoinSet::new();
        for scanner in &self.scanners {
            let scanner = Arc::clone(scanner);
            tasks.spawn(async move {
                let name = scanner.name().to_string();
                (name, scanner.scan(now).await)
            });
        }

        let mut raw = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, result) = joined.map_err(|e| anyhow!("scanner task panicked: {}", e))?;
            let findings = result.with_context(|| format!("scanner '{}' failed", name))?;
            raw.extend(findings);
        }

        let processed = self.process_findings(raw);
        let mut published = 0usize;
        for finding in processed {
            if self.is_significant(&finding) {
                self.publish_finding(finding).await?;
                published += 1;
            }
        }
        Ok(published)
    }

    /// Dedupe by (source, title), rescore findings that ask for
    /// validation, and drop anything at or below the confidence floor.
    fn process_findings(&self, raw: Vec<Finding>) -> Vec<Finding> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for finding in raw {
            if seen.insert((finding.source.clone(), finding.title.clone())) {
                unique.push(finding);
            }
        }

        unique
            .into_iter()
            .map(|mut finding| {
                if finding.validation_required {
                    finding.confidence_score = self.validator.validate_finding(&finding);
                }
                finding
            })
            .filter(|finding| finding.confidence_score > self.config.confidence_threshold)
            .collect()
    }

    /// Publish-worthiness heuristic.
    fn is_significant(&self, finding: &Finding) -> bool {
        if matches!(finding.priority, Priority::Critical | Priority::High) {
            return true;
        }
        if finding.category == Category::Legislative && finding.confidence_score > 0.9 {
            return true;
        }
        if finding.impact.contains("compliance") {
            return true;
        }
        finding.confidence_score > 0.85 && finding.priority != Priority::Low
    }

    async fn publish_finding(&self, finding: Finding) -> Result<()> {
        info!(title = %finding.title, priority = ?finding.priority, "publishing finding");
        self.lock_findings()?.push(finding.clone());
        self.bus
            .publish(
                "research.finding",
                EventPayload::FindingPublished {
                    finding: finding.clone(),
                    agent_id: RESEARCH_AGENT_ID.to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await?;
        self.store_finding(&finding);
        Ok(())
    }

    /// Persistence hook. Durable storage lives outside this crate.
    fn store_finding(&self, finding: &Finding) {
        debug!(id = %finding.id, "finding handed to persistence hook");
    }

    async fn handle_validation_request(&self, payload: EventPayload) -> Result<()> {
        let EventPayload::ValidationRequest {
            request_id,
            data_point,
            current_value,
            component,
        } = payload
        else {
            return Ok(());
        };

        debug!(%data_point, %component, "validating data point");
        let report = self.validator.validate_data_point(&data_point, current_value);
        self.bus
            .publish(
                "validation.response",
                EventPayload::ValidationResponse {
                    request_id,
                    valid: report.is_valid,
                    confidence: report.confidence,
                    suggested_value: report.suggested_value,
                    sources: report.sources,
                },
            )
            .await
    }

    async fn handle_scan_request(&self) -> Result<()> {
        if !*self.running.borrow() {
            debug!("manual scan request ignored while stopped");
            return Ok(());
        }
        info!("manual scan requested");
        self.run_scan_cycle().await
    }

    fn lock_findings(&self) -> Result<std::sync::MutexGuard<'_, Vec<Finding>>> {
        self.findings
            .lock()
            .map_err(|e| anyhow!("findings lock poisoned: {}", e))
    }

    fn lock_tokens(&self) -> Result<std::sync::MutexGuard<'_, Vec<SubscriptionToken>>> {
        self.tokens
            .lock()
            .map_err(|e| anyhow!("tokens lock poisoned: {}", e))
    }
}

//! # Resource Allocator
//!
//! Assigns a fixed catalogue of people and environments to plan phases,
//! flags shortages as soft conflicts, and prices resource sets. Catalogue
//! lookups go through an explicit name-to-key mapping; allocations are
//! ephemeral copies and never mutate the catalogue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::types::{Availability, Phase, Resource, ResourceType, TaskType};

/// Hours one allocated resource contributes per week
const HOURS_PER_WEEK: f64 = 40.0;

/// Explicit catalogue key for a resource name. Slug derivation is
/// deliberately avoided; unknown names simply have no catalogue entry.
fn catalog_key(name: &str) -> Option<&'static str> {
    match name {
        "Developer" => Some("developer"),
        "QA Engineer" => Some("qa-engineer"),
        "Data Analyst" => Some("data-analyst"),
        "Development Server" => Some("dev-server"),
        "Test Environment" => Some("test-environment"),
        _ => None,
    }
}

fn hourly_rate(name: &str) -> f64 {
    match name {
        "Developer" => 150.0,
        "QA Engineer" => 100.0,
        "Data Analyst" => 120.0,
        "Development Server" => 50.0,
        "Test Environment" => 30.0,
        _ => 0.0,
    }
}

/// A shortfall between a phase's allocation and the catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConflict {
    pub phase: u32,
    pub resource: String,
    pub required: u32,
    pub available: u32,
    pub resolution: String,
}

/// Result of allocating the catalogue across a plan's phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePlan {
    /// Allocations keyed by phase number
    pub phases: BTreeMap<u32, Vec<Resource>>,
    /// Peak quantity needed per resource across all phases
    pub total_resources: Vec<Resource>,
    pub conflicts: Vec<ResourceConflict>,
    /// Peak utilization percentage per resource name
    pub utilization: BTreeMap<String, f64>,
}

/// Owner of the fixed resource catalogue
pub struct ResourceAllocator {
    catalog: Mutex<HashMap<&'static str, Resource>>,
}

impl ResourceAllocator {
    pub fn new() -> Self {
        let mut catalog = HashMap::new();
        catalog.insert(
            "developer",
            resource(ResourceType::Human, "Developer", 3),
        );
        catalog.insert(
            "qa-engineer",
            resource(ResourceType::Human, "QA Engineer", 2),
        );
        catalog.insert(
            "data-analyst",
            resource(ResourceType::Human, "Data Analyst", 1),
        );
        catalog.insert(
            "dev-server",
            resource(ResourceType::System, "Development Server", 2),
        );
        catalog.insert(
            "test-environment",
            resource(ResourceType::System, "Test Environment", 3),
        );
        Self {
            catalog: Mutex::new(catalog),
        }
    }

    /// Allocate resources for every phase, checking each allocation
    /// against a single catalogue snapshot taken at call time.
    pub fn allocate(&self, phases: &[Phase]) -> Result<ResourcePlan> {
        let snapshot = self.snapshot()?;
        let mut plan = ResourcePlan {
            phases: BTreeMap::new(),
            total_resources: Vec::new(),
            conflicts: Vec::new(),
            utilization: BTreeMap::new(),
        };

        for phase in phases {
            let allocations = self.allocate_phase(phase, &snapshot);
            plan.conflicts
                .extend(self.find_conflicts(phase, &allocations, &snapshot));
            plan.phases.insert(phase.phase_number, allocations);
        }

        plan.total_resources = total_resources(&plan.phases);
        plan.utilization = utilization(&plan.phases, &snapshot);
        Ok(plan)
    }

    /// Clamp conflicting allocations down to the available quantity.
    /// Lossy: nothing is re-balanced across phases.
    pub fn optimize(&self, plan: &mut ResourcePlan) -> Result<()> {
        let conflicts = plan.conflicts.clone();
        for conflict in conflicts {
            if let Some(allocations) = plan.phases.get_mut(&conflict.phase) {
                if let Some(allocation) = allocations
                    .iter_mut()
                    .find(|r| r.name == conflict.resource)
                {
                    allocation.quantity = conflict.available;
                    allocation.availability = Availability::Scheduled;
                }
            }
        }
        Ok(())
    }

    /// Price a resource set at fixed hourly rates, one week each.
    pub fn cost(&self, resources: &[Resource]) -> f64 {
        resources
            .iter()
            .map(|r| hourly_rate(&r.name) * HOURS_PER_WEEK * f64::from(r.quantity))
            .sum()
    }

    /// Catalogue entry for a resource name, if one exists.
    pub fn availability(&self, name: &str) -> Result<Option<Resource>> {
        let catalog = self.lock()?;
        Ok(catalog_key(name).and_then(|key| catalog.get(key).cloned()))
    }

    /// Adjust the catalogue quantity for a named resource. Unknown names
    /// are ignored.
    pub fn update_availability(&self, name: &str, quantity: u32) -> Result<()> {
        let mut catalog = self.lock()?;
        if let Some(entry) = catalog_key(name).and_then(|key| catalog.get_mut(key)) {
            entry.quantity = quantity;
        }
        Ok(())
    }

    fn allocate_phase(
        &self,
        phase: &Phase,
        snapshot: &HashMap<&'static str, Resource>,
    ) -> Vec<Resource> {
        let mut allocations = Vec::new();
        let total_hours: f64 = phase.tasks.iter().map(|t| t.estimated_hours).sum();

        // Developers sized to the workload, capped at the catalogue.
        let weeks = f64::from(phase.duration.max(1)) / 5.0;
        let developers_needed = (total_hours / (HOURS_PER_WEEK * weeks)).ceil() as u32;
        let developer_cap = snapshot
            .get("developer")
            .map(|r| r.quantity)
            .unwrap_or(developers_needed);
        allocations.push(scheduled(
            ResourceType::Human,
            "Developer",
            developers_needed.min(developer_cap).max(1),
        ));

        if is_testing_phase(phase) {
            allocations.push(scheduled(ResourceType::Human, "QA Engineer", 1));
        }

        let has_data_tasks = phase.tasks.iter().any(|t| {
            t.task_type == TaskType::DataUpdate || t.title.to_lowercase().contains("data")
        });
        if has_data_tasks {
            allocations.push(scheduled(ResourceType::Human, "Data Analyst", 1));
        }

        allocations.push(scheduled(ResourceType::System, "Development Server", 1));
        if is_testing_phase(phase) {
            allocations.push(scheduled(ResourceType::System, "Test Environment", 2));
        }

        allocations
    }

    fn find_conflicts(
        &self,
        phase: &Phase,
        allocations: &[Resource],
        snapshot: &HashMap<&'static str, Resource>,
    ) -> Vec<ResourceConflict> {
        allocations
            .iter()
            .filter_map(|allocation| {
                let available = catalog_key(&allocation.name)
                    .and_then(|key| snapshot.get(key))?;
                if allocation.quantity > available.quantity {
                    Some(ResourceConflict {
                        phase: phase.phase_number,
                        resource: allocation.name.clone(),
                        required: allocation.quantity,
                        available: available.quantity,
                        resolution: suggest_resolution(allocation, available),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    fn snapshot(&self) -> Result<HashMap<&'static str, Resource>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<&'static str, Resource>>> {
        self.catalog
            .lock()
            .map_err(|e| anyhow!("catalog lock poisoned: {}", e))
    }
}

impl Default for ResourceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn is_testing_phase(phase: &Phase) -> bool {
    phase.title.to_lowercase().contains("test") || phase.phase_number == 3
}

fn suggest_resolution(required: &Resource, available: &Resource) -> String {
    match required.resource_type {
        ResourceType::Human => {
            if f64::from(required.quantity) > f64::from(available.quantity) * 1.5 {
                "Consider extending timeline or hiring contractors".to_string()
            } else {
                "Optimize task allocation or implement overtime".to_string()
            }
        }
        ResourceType::System => {
            "Provision additional cloud resources or virtualize environments".to_string()
        }
        ResourceType::External => "Review resource requirements and adjust plan".to_string(),
    }
}

fn total_resources(phases: &BTreeMap<u32, Vec<Resource>>) -> Vec<Resource> {
    let mut totals: BTreeMap<String, Resource> = BTreeMap::new();
    for allocations in phases.values() {
        for allocation in allocations {
            let key = format!("{:?}-{}", allocation.resource_type, allocation.name);
            totals
                .entry(key)
                .and_modify(|existing| {
                    existing.quantity = existing.quantity.max(allocation.quantity)
                })
                .or_insert_with(|| allocation.clone());
        }
    }
    totals.into_values().collect()
}

fn utilization(
    phases: &BTreeMap<u32, Vec<Resource>>,
    snapshot: &HashMap<&'static str, Resource>,
) -> BTreeMap<String, f64> {
    let mut utilization = BTreeMap::new();
    for allocations in phases.values() {
        for allocation in allocations {
            let Some(available) = catalog_key(&allocation.name).and_then(|key| snapshot.get(key))
            else {
                continue;
            };
            if available.quantity == 0 {
                continue;
            }
            let usage = f64::from(allocation.quantity) / f64::from(available.quantity) * 100.0;
            utilization
                .entry(allocation.name.clone())
                .and_modify(|existing: &mut f64| *existing = existing.max(usage))
                .or_insert(usage);
        }
    }
    utilization
}

fn resource(resource_type: ResourceType, name: &str, quantity: u32) -> Resource {
    Resource {
        resource_type,
        name: name.to_string(),
        quantity,
        availability: Availability::Available,
    }
}

fn scheduled(resource_type: ResourceType, name: &str, quantity: u32) -> Resource {
    Resource {
        resource_type,
        name: name.to_string(),
        quantity,
        availability: Availability::Scheduled,
    }
}

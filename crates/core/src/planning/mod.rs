//! # Planning
//!
//! The consumer side of the agent pair: impact scoring, dependency
//! analysis, resource allocation, and the agent that turns finding
//! batches into revision plans.

pub mod agent;
pub mod dependencies;
pub mod impact;
pub mod resources;

pub use agent::{PlanningAgent, PlanningConfig, PLANNING_AGENT_ID};
pub use dependencies::{DependencyGraph, DependencyManager, GraphEdge, GraphNode};
pub use impact::{ImpactAnalyzer, ImpactScore};
pub use resources::{ResourceAllocator, ResourceConflict, ResourcePlan};

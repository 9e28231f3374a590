//! # Vigil Core
//!
//! In-process multi-agent coordination: a continuously-scanning research
//! agent feeds findings over an event bus to a planning agent that turns
//! them into phased revision plans.
//!
//! ## Architecture
//!
//! - `bus` - Pub/sub broker with bounded message history
//! - `research/` - Scanner contract, data validator, and the scan loop
//! - `planning/` - Impact scoring, dependencies, resources, and the plan loop
//! - `system` - Orchestrator wiring one bus to the agent pair
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vigil_core::system::{AgentSystem, SystemConfig};
//!
//! let system = AgentSystem::new(SystemConfig::default())?;
//! system.start().await?;
//! let metrics = system.system_metrics()?;
//! system.stop().await?;
//! ```

pub mod bus;
pub mod error;
pub mod metrics;
pub mod planning;
pub mod research;
pub mod system;
pub mod types;

pub use bus::{EventBus, HistoryFilter, SubscriptionToken};
pub use error::AgentError;
pub use system::{AgentSystem, SystemConfig, SystemMetrics};
pub use types::{AgentMessage, EventPayload, Finding, Priority, RevisionPlan};

//! # Research
//!
//! The producer side of the agent pair: pluggable scanners, the data
//! validator, and the agent that runs the periodic scan loop.

pub mod agent;
pub mod scanners;
pub mod validator;

pub use agent::{ResearchAgent, ResearchConfig, RESEARCH_AGENT_ID};
pub use scanners::{
    default_scanners, BillUpdate, CompetitorScanner, Jurisdiction, LegislativeScanner,
    MarketScanner, Scanner, ScientificScanner,
};
pub use validator::{DataValidator, ValidationReport};

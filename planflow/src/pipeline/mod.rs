//! Topology definition and the orchestrator that walks it.
//!
//! A [`Topology`] is a fixed sequence of steps: single stages, gate stages
//! and parallel groups. The [`Orchestrator`] executes it over one
//! [`RunContext`](crate::context::RunContext), merging each step's results
//! before moving on.

mod config;
mod merge;
mod orchestrator;
mod outcome;
mod topology;

pub use config::{
    OrchestratorConfig, ENV_BUDGET_POLICY, ENV_ENABLE_CHECKPOINTS, ENV_ENABLE_PARALLEL,
    ENV_MAX_BUDGET, ENV_RUN_TIMEOUT_SECONDS,
};
pub use merge::{merge_stage_result, MergeReport};
pub use orchestrator::Orchestrator;
pub use outcome::StepOutcome;
pub use topology::{Topology, TopologyBuilder, TopologyStep};

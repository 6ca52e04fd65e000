//! # Planflow
//!
//! An orchestrator for multi-stage planning runs.
//!
//! Planflow walks a fixed topology of stages from a site survey to a
//! validated design, with support for:
//!
//! - **Single-writer context**: stages receive projections and return
//!   results; only the orchestrator merges them
//! - **Field ownership**: each stage declares the fields it may write
//! - **Parallel groups**: independent stages run concurrently and merge in
//!   declaration order
//! - **Halt and resume**: unanswered mandatory questions suspend the run
//!   until a human answers them
//! - **Gates**: a validation stage can reject the design outright
//! - **Budgets and checkpoints**: token accounting and a snapshot hook after
//!   every step
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use planflow::prelude::*;
//!
//! let orchestrator = Orchestrator::new(planning_topology()?, OrchestratorConfig::from_env());
//! orchestrator.register_stage(planning_registration(Arc::new(PlotAnalysisStage::new()))?)?;
//!
//! match orchestrator.run(survey, None).await {
//!     Ok(ctx) => println!("completed {}", ctx.session_id()),
//!     Err(PlanflowError::Halt(halt)) => ask_user(halt.questions),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod budget;
pub mod checkpoint;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod planning;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::budget::{BudgetPolicy, BudgetSummary, BudgetTracker, ResourceBudget};
    pub use crate::checkpoint::{
        CheckpointHook, CheckpointMode, InMemoryCheckpointStore, NoOpCheckpoint,
    };
    pub use crate::context::{
        Assumption, ContextField, OpenQuestion, QuestionKind, RunContext, RunStatus,
    };
    pub use crate::errors::{
        ContractErrorInfo, ErrorKind, GateRejectionError, HaltError, PlanflowError,
        StageExecutionError, TopologyError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
    pub use crate::pipeline::{Orchestrator, OrchestratorConfig, Topology, TopologyStep};
    pub use crate::planning::{planning_registration, planning_topology};
    pub use crate::stages::{
        FnStage, GateVerdict, StageInput, StageProcessor, StageRegistration, StageResult,
        StageView,
    };
    pub use crate::utils::{generate_session_id, iso_timestamp};
}

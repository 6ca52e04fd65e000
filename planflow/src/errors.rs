//! Error types for the planflow orchestrator.
//!
//! A run ends in one of three typed outcomes besides success: a mechanical
//! stage failure, a halt awaiting human answers, or a terminal rejection by a
//! gate stage. Topology and snapshot errors are raised before any stage runs.

use crate::context::{OpenQuestion, RunContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for planflow operations.
#[derive(Debug, Error)]
pub enum PlanflowError {
    /// A stage failed, panicked, timed out, or the run could not continue.
    #[error("{0}")]
    StageExecution(#[from] StageExecutionError),

    /// The run is suspended until mandatory questions are answered.
    #[error("{0}")]
    Halt(#[from] HaltError),

    /// A gate stage rejected the accumulated design.
    #[error("{0}")]
    GateRejection(#[from] GateRejectionError),

    /// The topology or a registration is invalid.
    #[error("{0}")]
    Topology(#[from] TopologyError),

    /// A persisted snapshot could not be restored.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Discriminates [`PlanflowError`] variants for routing at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Mechanical stage failure.
    StageExecution,
    /// Expected suspension.
    Halt,
    /// Terminal domain rejection.
    GateRejection,
    /// Invalid topology or registration.
    Topology,
    /// Invalid persisted snapshot.
    Snapshot,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageExecution => write!(f, "stage_execution"),
            Self::Halt => write!(f, "halt"),
            Self::GateRejection => write!(f, "gate_rejection"),
            Self::Topology => write!(f, "topology"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl PlanflowError {
    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StageExecution(_) => ErrorKind::StageExecution,
            Self::Halt(_) => ErrorKind::Halt,
            Self::GateRejection(_) => ErrorKind::GateRejection,
            Self::Topology(_) => ErrorKind::Topology,
            Self::Snapshot(_) => ErrorKind::Snapshot,
        }
    }

    /// Returns true if this is a halt awaiting answers.
    #[must_use]
    pub const fn is_halt(&self) -> bool {
        matches!(self, Self::Halt(_))
    }

    /// Returns true if the run can continue once the caller supplies input.
    ///
    /// Only halts are recoverable; failures and rejections are terminal.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_halt()
    }

    /// Returns the context snapshot attached to the error, if any.
    #[must_use]
    pub fn context(&self) -> Option<&RunContext> {
        match self {
            Self::StageExecution(e) => Some(&e.context),
            Self::Halt(e) => Some(&e.context),
            Self::GateRejection(e) => Some(&e.context),
            Self::Topology(_) | Self::Snapshot(_) => None,
        }
    }

    /// Consumes the error and returns the attached context, if any.
    #[must_use]
    pub fn into_context(self) -> Option<RunContext> {
        match self {
            Self::StageExecution(e) => Some(*e.context),
            Self::Halt(e) => Some(*e.context),
            Self::GateRejection(e) => Some(*e.context),
            Self::Topology(_) | Self::Snapshot(_) => None,
        }
    }

    /// Converts to a dictionary representation for API responses.
    ///
    /// Carries the message, kind and the details a caller needs to act on;
    /// the full context is left out.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind().to_string()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        if let Some(ctx) = self.context() {
            map.insert("session_id".to_string(), serde_json::json!(ctx.session_id()));
            map.insert("status".to_string(), serde_json::json!(ctx.status.to_string()));
        }

        match self {
            Self::StageExecution(e) => {
                map.insert("stage".to_string(), serde_json::json!(e.stage));
            }
            Self::Halt(e) => {
                map.insert("questions".to_string(), serde_json::json!(e.questions));
            }
            Self::GateRejection(e) => {
                map.insert("stage".to_string(), serde_json::json!(e.stage));
                map.insert("issues".to_string(), serde_json::json!(e.issues));
            }
            Self::Topology(e) => {
                map.insert("code".to_string(), serde_json::json!(e.error_info.code));
                map.insert("stages".to_string(), serde_json::json!(e.stages));
            }
            Self::Snapshot(_) => {}
        }

        map
    }
}

/// A registered stage returned `success = false`, panicked, or the run could
/// not proceed (timeout, exhausted hard budget, strict checkpoint failure).
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageExecutionError {
    /// The stage or step that failed.
    pub stage: String,
    /// Human-readable failure message.
    pub message: String,
    /// The context at the time of failure.
    pub context: Box<RunContext>,
}

impl StageExecutionError {
    /// Creates a new stage execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>, context: RunContext) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            context: Box::new(context),
        }
    }
}

/// The run halted with unanswered mandatory questions.
#[derive(Debug, Clone, Error)]
#[error("Run halted: {} mandatory question(s) unanswered", questions.len())]
pub struct HaltError {
    /// The unanswered mandatory questions.
    pub questions: Vec<OpenQuestion>,
    /// The halted context.
    pub context: Box<RunContext>,
}

impl HaltError {
    /// Creates a new halt error.
    #[must_use]
    pub fn new(questions: Vec<OpenQuestion>, context: RunContext) -> Self {
        Self {
            questions,
            context: Box::new(context),
        }
    }

    /// Returns the ids of the unanswered questions.
    #[must_use]
    pub fn question_ids(&self) -> Vec<&str> {
        self.questions.iter().map(|q| q.question_id.as_str()).collect()
    }
}

/// A gate stage rejected the design on domain grounds.
#[derive(Debug, Clone, Error)]
#[error("Gate '{stage}' rejected the design: {}", issues.join("; "))]
pub struct GateRejectionError {
    /// The gate stage.
    pub stage: String,
    /// The issues the gate reported.
    pub issues: Vec<String>,
    /// The context at the time of rejection.
    pub context: Box<RunContext>,
}

impl GateRejectionError {
    /// Creates a new gate rejection error.
    #[must_use]
    pub fn new(stage: impl Into<String>, issues: Vec<String>, context: RunContext) -> Self {
        Self {
            stage: stage.into(),
            issues,
            context: Box::new(context),
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "TOPOLOGY-OVERLAP").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when a topology or stage registration is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TopologyError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl TopologyError {
    /// Creates a new topology error.
    #[must_use]
    pub fn new(message: impl Into<String>, error_info: ContractErrorInfo) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Returns the contract error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }
}

/// Stable error codes for topology validation.
pub mod codes {
    /// The topology has no steps.
    pub const EMPTY: &str = "TOPOLOGY-EMPTY";
    /// A stage name appears twice.
    pub const DUPLICATE: &str = "TOPOLOGY-DUPLICATE";
    /// A parallel group has no members.
    pub const EMPTY_GROUP: &str = "TOPOLOGY-EMPTY_GROUP";
    /// Members of a parallel group declare overlapping fields.
    pub const OVERLAP: &str = "TOPOLOGY-OVERLAP";
    /// A registration claims a field reserved for the orchestrator.
    pub const RESERVED_FIELD: &str = "TOPOLOGY-RESERVED_FIELD";
    /// A registration has an empty name.
    pub const EMPTY_NAME: &str = "TOPOLOGY-EMPTY_NAME";
    /// A stage name has no entry in the ownership table.
    pub const UNKNOWN_STAGE: &str = "TOPOLOGY-UNKNOWN_STAGE";
}

//! Per-step results of the topology walk.

use crate::context::OpenQuestion;

/// What the walk does after a step has been merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Proceed to the next step.
    Continue,
    /// Stop and wait for answers to these mandatory questions.
    Suspend(Vec<OpenQuestion>),
    /// A gate rejected the design with these issues.
    Reject(Vec<String>),
}

impl StepOutcome {
    /// Returns true if the walk should proceed.
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// A mechanical failure of a step, before it is attached to a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepFailure {
    pub stage: String,
    pub message: String,
}

impl StepFailure {
    pub(crate) fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

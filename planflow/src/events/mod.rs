//! Run lifecycle events.
//!
//! The orchestrator reports what it does through an [`EventSink`] injected
//! at construction. Sinks receive [`RunEvent`]s carrying the session, the
//! step involved and a small JSON payload.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};

/// Event type names emitted by the orchestrator.
pub mod types {
    /// A run began walking the topology.
    pub const RUN_STARTED: &str = "run.started";
    /// A run suspended for answers.
    pub const RUN_HALTED: &str = "run.halted";
    /// A gate rejected the design.
    pub const RUN_REJECTED: &str = "run.rejected";
    /// A run failed mechanically.
    pub const RUN_FAILED: &str = "run.failed";
    /// Every step was merged.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A stage was invoked.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage returned successfully.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed or panicked.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A stage in the topology has no registration.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    /// A stage wrote a field it does not own.
    pub const STAGE_WRITE_REJECTED: &str = "stage.write_rejected";
    /// A parallel group fanned out.
    pub const GROUP_STARTED: &str = "group.started";
    /// A parallel group was joined and merged.
    pub const GROUP_COMPLETED: &str = "group.completed";
    /// The checkpoint hook accepted a snapshot.
    pub const CHECKPOINT_SAVED: &str = "checkpoint.saved";
    /// The checkpoint hook returned an error.
    pub const CHECKPOINT_FAILED: &str = "checkpoint.failed";
    /// Token consumption reached the ceiling.
    pub const BUDGET_EXHAUSTED: &str = "budget.exhausted";
}

/// One observable occurrence during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Dotted event name, see [`types`].
    pub event_type: String,
    /// The run the event belongs to.
    pub session_id: String,
    /// The stage, group or gate involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Event-specific details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// When the event was created.
    pub timestamp: String,
}

impl RunEvent {
    /// Creates an event for a session.
    #[must_use]
    pub fn new(event_type: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: session_id.into(),
            stage: None,
            data: None,
            timestamp: iso_timestamp(),
        }
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns true if the event type starts with the prefix.
    #[must_use]
    pub fn is_a(&self, type_prefix: &str) -> bool {
        self.event_type.starts_with(type_prefix)
    }
}

//! The run context threaded through every pipeline step.

use super::{Assumption, ContextField, DesignFields, OpenQuestion};
use crate::errors::PlanflowError;
use crate::utils::{generate_session_id, iso_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started.
    #[default]
    Pending,
    /// The topology is being walked.
    InProgress,
    /// Suspended until mandatory questions are answered.
    Halted,
    /// Terminated by a stage failure or gate rejection.
    Failed,
    /// Every step of the topology has been merged.
    Completed,
}

impl RunStatus {
    /// Returns true for `completed` and `failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Halted => write!(f, "halted"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Aggregate token accounting for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    /// Tokens consumed so far.
    pub tokens_used: u64,
    /// The configured ceiling.
    pub token_limit: u64,
    /// Number of stage invocations.
    pub stage_calls: u64,
    /// Tokens consumed per stage.
    pub per_stage: BTreeMap<String, u64>,
}

impl ResourceUsage {
    /// Records a stage invocation and its token delta.
    pub fn record_stage(&mut self, stage: &str, tokens: u64) {
        self.stage_calls += 1;
        *self.per_stage.entry(stage.to_string()).or_insert(0) += tokens;
    }
}

/// The shared state of one planning run.
///
/// Only the orchestrator mutates a `RunContext`; stages see projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    session_id: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// The step last attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    /// Accumulated domain fields.
    pub fields: DesignFields,
    /// Questions raised so far, in the order they were raised.
    pub open_questions: Vec<OpenQuestion>,
    /// Assumptions recorded so far.
    pub assumptions: Vec<Assumption>,
    /// Why the run is halted or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    /// Token accounting.
    pub resource_usage: ResourceUsage,
    /// Topology steps whose results have been merged.
    pub completed_steps: Vec<String>,
    /// Creation time.
    pub created_at: String,
    /// Last mutation time.
    pub updated_at: String,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(generate_session_id())
    }
}

impl RunContext {
    /// Creates a pending context for the given session.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = iso_timestamp();
        Self {
            session_id: session_id.into(),
            status: RunStatus::Pending,
            current_stage: None,
            fields: DesignFields::new(),
            open_questions: Vec::new(),
            assumptions: Vec::new(),
            halt_reason: None,
            resource_usage: ResourceUsage::default(),
            completed_steps: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Restores a context from a persisted snapshot.
    ///
    /// The snapshot is spliced over a freshly defaulted context: keys absent
    /// from the snapshot keep their defaults and unknown keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PlanflowError::Snapshot`] if the snapshot is not an object,
    /// lacks a `session_id`, or holds values of the wrong shape.
    pub fn restore(snapshot: serde_json::Value) -> Result<Self, PlanflowError> {
        let serde_json::Value::Object(persisted) = snapshot else {
            return Err(PlanflowError::Snapshot(
                "snapshot must be a JSON object".to_string(),
            ));
        };

        let session_id = persisted
            .get("session_id")
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PlanflowError::Snapshot("snapshot has no session_id".to_string()))?
            .to_string();

        let mut base = serde_json::to_value(Self::new(session_id))
            .map_err(|e| PlanflowError::Snapshot(e.to_string()))?;

        if let serde_json::Value::Object(ref mut target) = base {
            for (key, value) in persisted {
                match target.get_mut(&key) {
                    Some(slot) => splice(slot, value),
                    None if is_optional_key(&key) => {
                        target.insert(key, value);
                    }
                    None => {
                        tracing::debug!(key = %key, "Ignoring unknown snapshot key");
                    }
                }
            }
        }

        serde_json::from_value(base).map_err(|e| PlanflowError::Snapshot(e.to_string()))
    }

    /// Serializes the context for persistence.
    #[must_use]
    pub fn to_snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Gets a domain field.
    #[must_use]
    pub fn field(&self, field: ContextField) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Returns the mandatory questions that still lack an answer.
    #[must_use]
    pub fn blocking_questions(&self) -> Vec<OpenQuestion> {
        self.open_questions
            .iter()
            .filter(|q| q.is_blocking())
            .cloned()
            .collect()
    }

    /// Returns true if any mandatory question is unanswered.
    #[must_use]
    pub fn has_blocking_questions(&self) -> bool {
        self.open_questions.iter().any(OpenQuestion::is_blocking)
    }

    /// Looks up a question by id.
    #[must_use]
    pub fn question(&self, question_id: &str) -> Option<&OpenQuestion> {
        self.open_questions
            .iter()
            .find(|q| q.question_id == question_id)
    }

    /// Appends a question unless one with the same id already exists.
    ///
    /// Returns true if the question was appended.
    pub fn push_question(&mut self, question: OpenQuestion) -> bool {
        if self.question(&question.question_id).is_some() {
            tracing::warn!(
                session_id = %self.session_id,
                question_id = %question.question_id,
                source_stage = %question.source_stage,
                "Duplicate question id ignored"
            );
            return false;
        }
        self.open_questions.push(question);
        true
    }

    /// Appends an assumption.
    pub fn push_assumption(&mut self, assumption: Assumption) {
        self.assumptions.push(assumption);
    }

    /// Attaches an answer to an existing question.
    ///
    /// Returns false if no question has that id.
    pub fn answer_question(&mut self, question_id: &str, answer: impl Into<String>) -> bool {
        match self
            .open_questions
            .iter_mut()
            .find(|q| q.question_id == question_id)
        {
            Some(question) => {
                question.answer = Some(answer.into());
                true
            }
            None => false,
        }
    }

    /// Returns true if the named step has already been merged.
    #[must_use]
    pub fn is_step_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    /// Records a merged step.
    pub fn record_step_completed(&mut self, step: impl Into<String>) {
        let step = step.into();
        if !self.is_step_completed(&step) {
            self.completed_steps.push(step);
        }
    }

    /// Marks the run as in progress and clears any halt reason.
    pub fn mark_in_progress(&mut self) {
        self.status = RunStatus::InProgress;
        self.halt_reason = None;
        self.touch();
    }

    /// Marks the run as halted.
    pub fn mark_halted(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Halted;
        self.halt_reason = Some(reason.into());
        self.touch();
    }

    /// Marks the run as failed.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.halt_reason = Some(reason.into());
        self.touch();
    }

    /// Marks the run as completed.
    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.halt_reason = None;
        self.touch();
    }

    /// Updates the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = iso_timestamp();
    }
}

/// Describes the blocking questions for a halt reason.
#[must_use]
pub fn describe_blocking(questions: &[OpenQuestion]) -> String {
    let ids: Vec<&str> = questions.iter().map(|q| q.question_id.as_str()).collect();
    format!(
        "awaiting {} mandatory answer(s): {}",
        questions.len(),
        ids.join(", ")
    )
}

fn is_optional_key(key: &str) -> bool {
    matches!(key, "current_stage" | "halt_reason")
}

/// Overlays `value` on `slot`, descending into objects so that partial
/// nested snapshots keep the defaults they omit.
fn splice(slot: &mut serde_json::Value, value: serde_json::Value) {
    match (slot, value) {
        (serde_json::Value::Object(target), serde_json::Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(inner) => splice(inner, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

//! Stage inputs projected from the run context.

use crate::context::{ContextField, RunContext};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The read-only slice of the run context a stage receives.
///
/// Built by a pure projection; a stage never sees fields it did not declare.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageInput {
    /// Projected domain fields.
    #[serde(default)]
    pub fields: BTreeMap<ContextField, serde_json::Value>,
    /// Answers to open questions, keyed by question id.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

impl StageInput {
    /// Creates an empty input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: ContextField, value: serde_json::Value) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// Adds an answer.
    #[must_use]
    pub fn with_answer(mut self, question_id: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers.insert(question_id.into(), answer.into());
        self
    }

    /// Gets a projected field.
    #[must_use]
    pub fn get(&self, field: ContextField) -> Option<&serde_json::Value> {
        self.fields.get(&field)
    }

    /// Gets an answer by question id.
    #[must_use]
    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    /// Returns true if the field was projected.
    #[must_use]
    pub fn has(&self, field: ContextField) -> bool {
        self.fields.contains_key(&field)
    }
}

/// A pure function extracting a stage's input from the context.
pub type Projection = Arc<dyn Fn(&RunContext) -> StageInput + Send + Sync>;

/// Projects the given fields plus every answered question.
///
/// Unpopulated fields are left out rather than projected as null.
#[must_use]
pub fn project_fields(ctx: &RunContext, reads: &BTreeSet<ContextField>) -> StageInput {
    let fields = reads
        .iter()
        .filter_map(|field| ctx.field(*field).map(|value| (*field, value.clone())))
        .collect();

    let answers = ctx
        .open_questions
        .iter()
        .filter(|q| q.is_answered())
        .filter_map(|q| q.answer.clone().map(|a| (q.question_id.clone(), a)))
        .collect();

    StageInput { fields, answers }
}

//! Results returned by stage processors.

use crate::context::{Assumption, ContextField, OpenQuestion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field writes produced by a successful stage.
pub type StageData = BTreeMap<ContextField, serde_json::Value>;

/// Why a stage could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Human-readable message.
    pub message: String,
}

/// A gate stage's decision on the accumulated design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateVerdict {
    /// The design passes.
    Approved,
    /// The design is domain-invalid.
    Rejected {
        /// What the gate found wrong.
        issues: Vec<String>,
    },
}

impl GateVerdict {
    /// Creates a rejection.
    #[must_use]
    pub fn rejected(issues: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Rejected {
            issues: issues.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true for a rejection.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// The outcome of one stage execution.
///
/// `data` is present iff `success` is true. Stages report expected domain
/// problems through [`StageResult::fail`] instead of panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Whether the stage produced a result.
    pub success: bool,
    /// Field writes, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StageData>,
    /// Failure details, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
    /// Questions raised by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_questions: Vec<OpenQuestion>,
    /// Assumptions made by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assumptions: Vec<Assumption>,
    /// Tokens consumed by this execution.
    #[serde(default)]
    pub tokens_used: u64,
    /// Gate decision, for gate stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<GateVerdict>,
}

impl StageResult {
    /// Creates a successful result with field writes.
    #[must_use]
    pub fn ok(data: StageData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            open_questions: Vec::new(),
            assumptions: Vec::new(),
            tokens_used: 0,
            verdict: None,
        }
    }

    /// Creates a successful result with no writes.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::ok(StageData::new())
    }

    /// Creates a successful result writing a single field.
    #[must_use]
    pub fn ok_field(field: ContextField, value: serde_json::Value) -> Self {
        Self::ok(StageData::from([(field, value)]))
    }

    /// Creates a failed result.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(StageFailure {
                message: message.into(),
            }),
            open_questions: Vec::new(),
            assumptions: Vec::new(),
            tokens_used: 0,
            verdict: None,
        }
    }

    /// Adds another field write.
    #[must_use]
    pub fn with_field(mut self, field: ContextField, value: serde_json::Value) -> Self {
        if self.success {
            self.data.get_or_insert_with(StageData::new).insert(field, value);
        }
        self
    }

    /// Adds an open question.
    #[must_use]
    pub fn with_question(mut self, question: OpenQuestion) -> Self {
        self.open_questions.push(question);
        self
    }

    /// Adds an assumption.
    #[must_use]
    pub fn with_assumption(mut self, assumption: Assumption) -> Self {
        self.assumptions.push(assumption);
        self
    }

    /// Sets the token delta.
    #[must_use]
    pub const fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    /// Sets the gate verdict.
    #[must_use]
    pub fn with_verdict(mut self, verdict: GateVerdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Returns the fields this result writes.
    #[must_use]
    pub fn written_fields(&self) -> Vec<ContextField> {
        self.data
            .as_ref()
            .map(|data| data.keys().copied().collect())
            .unwrap_or_default()
    }
}

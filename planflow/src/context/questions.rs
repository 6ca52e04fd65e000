//! Open questions and assumptions recorded by stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an open question blocks the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// The run halts until this question is answered.
    Mandatory,
    /// Informational; never halts the run.
    Optional,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mandatory => write!(f, "mandatory"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

/// A gap in the design that needs human input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQuestion {
    /// Identifier, unique within a run.
    pub question_id: String,
    /// The stage that raised the question.
    pub source_stage: String,
    /// The question text shown to the user.
    pub question: String,
    /// Mandatory or optional.
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Why the stage needs the answer.
    #[serde(default)]
    pub reason: String,
    /// The answer, once supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl OpenQuestion {
    /// Creates a mandatory question.
    #[must_use]
    pub fn mandatory(
        question_id: impl Into<String>,
        source_stage: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            source_stage: source_stage.into(),
            question: question.into(),
            kind: QuestionKind::Mandatory,
            reason: String::new(),
            answer: None,
        }
    }

    /// Creates an optional question.
    #[must_use]
    pub fn optional(
        question_id: impl Into<String>,
        source_stage: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            kind: QuestionKind::Optional,
            ..Self::mandatory(question_id, source_stage, question)
        }
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Pre-answers the question.
    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    /// Returns true if the question has a non-blank answer.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answer
            .as_deref()
            .is_some_and(|answer| !answer.trim().is_empty())
    }

    /// Returns true if the question is mandatory and still unanswered.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.kind == QuestionKind::Mandatory && !self.is_answered()
    }
}

/// A stage's working assumption, recorded for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumption {
    /// Assumption identifier.
    pub id: String,
    /// What was assumed.
    pub description: String,
    /// The stage that made the assumption.
    pub source_stage: String,
}

impl Assumption {
    /// Creates a new assumption.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        source_stage: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            source_stage: source_stage.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mandatory_unanswered_is_blocking() {
        let q = OpenQuestion::mandatory("q1", "plot-analysis", "What is the road width?");
        assert!(q.is_blocking());
        assert!(!q.is_answered());
    }

    #[test]
    fn test_blank_answer_still_blocks() {
        let q = OpenQuestion::mandatory("q1", "plot-analysis", "Road width?").with_answer("   ");
        assert!(q.is_blocking());
    }

    #[test]
    fn test_answered_mandatory_does_not_block() {
        let q = OpenQuestion::mandatory("q1", "plot-analysis", "Road width?").with_answer("30 feet");
        assert!(!q.is_blocking());
    }

    #[test]
    fn test_optional_never_blocks() {
        let q = OpenQuestion::optional("q2", "eco-design", "Prefer solar water heating?");
        assert!(!q.is_blocking());
        assert_eq!(q.kind, QuestionKind::Optional);
        assert_eq!(q.source_stage, "eco-design");
    }

    #[test]
    fn test_question_serializes_kind_as_type() {
        let q = OpenQuestion::mandatory("q1", "zoning", "Need a pooja room?").with_reason("vastu");
        let json = serde_json::to_value(&q).unwrap();

        assert_eq!(json["type"], "mandatory");
        assert_eq!(json["reason"], "vastu");
        assert!(json.get("answer").is_none());

        let back: OpenQuestion = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_assumption_creation() {
        let a = Assumption::new("a1", "Soil bearing capacity is 200 kN/m2", "engineer-clarification");
        assert_eq!(a.id, "a1");
        assert_eq!(a.source_stage, "engineer-clarification");
    }
}

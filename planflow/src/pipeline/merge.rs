//! Folding stage results into the run context.

use crate::context::{ContextField, RunContext};
use crate::stages::{GateVerdict, StageRegistration, StageResult};

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// The merged stage.
    pub stage: String,
    /// Fields written.
    pub written: Vec<ContextField>,
    /// Fields the stage wrote without owning them, dropped.
    pub rejected: Vec<ContextField>,
    /// Questions appended.
    pub questions_added: usize,
    /// Assumptions appended.
    pub assumptions_added: usize,
    /// Tokens attributed to the stage.
    pub tokens_used: u64,
    /// The gate verdict carried by the result, if any.
    pub verdict: Option<GateVerdict>,
}

impl MergeReport {
    /// Returns true if any write was dropped.
    #[must_use]
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Merges a successful stage result into the context.
///
/// Only fields the registration owns are written; other writes are dropped
/// with a warning and reported in [`MergeReport::rejected`]. Questions with
/// an id already present are ignored. Questions and assumptions without a
/// source stage are attributed to the merged stage.
pub fn merge_stage_result(
    ctx: &mut RunContext,
    registration: &StageRegistration,
    result: StageResult,
) -> MergeReport {
    let stage = registration.name().to_string();
    let mut report = MergeReport {
        stage: stage.clone(),
        tokens_used: result.tokens_used,
        verdict: result.verdict,
        ..MergeReport::default()
    };

    for (field, value) in result.data.unwrap_or_default() {
        if registration.may_write(field) {
            ctx.fields.set(field, value);
            report.written.push(field);
        } else {
            tracing::warn!(
                session_id = %ctx.session_id(),
                stage = %stage,
                field = %field,
                "Stage wrote a field it does not own; write ignored"
            );
            report.rejected.push(field);
        }
    }

    for mut question in result.open_questions {
        if question.source_stage.trim().is_empty() {
            question.source_stage.clone_from(&stage);
        }
        if ctx.push_question(question) {
            report.questions_added += 1;
        }
    }

    for mut assumption in result.assumptions {
        if assumption.source_stage.trim().is_empty() {
            assumption.source_stage.clone_from(&stage);
        }
        ctx.push_assumption(assumption);
        report.assumptions_added += 1;
    }

    ctx.resource_usage.record_stage(&stage, report.tokens_used);
    ctx.resource_usage.tokens_used = ctx
        .resource_usage
        .tokens_used
        .saturating_add(report.tokens_used);
    ctx.touch();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Assumption, OpenQuestion};
    use crate::stages::{FnStage, StageInput};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn registration(name: &str, owns: &[ContextField]) -> StageRegistration {
        StageRegistration::new(Arc::new(FnStage::new(name, |_: &StageInput| {
            StageResult::ok_empty()
        })))
        .owns(owns.iter().copied())
    }

    #[test]
    fn test_merge_writes_owned_fields() {
        let mut ctx = RunContext::new("s");
        let reg = registration("zoning", &[ContextField::Zoning]);

        let report = merge_stage_result(
            &mut ctx,
            &reg,
            StageResult::ok_field(ContextField::Zoning, json!({"private": ["bedroom"]}))
                .with_tokens(40),
        );

        assert_eq!(report.written, vec![ContextField::Zoning]);
        assert!(!report.has_rejections());
        assert_eq!(ctx.field(ContextField::Zoning), Some(&json!({"private": ["bedroom"]})));
        assert_eq!(ctx.resource_usage.tokens_used, 40);
        assert_eq!(ctx.resource_usage.per_stage.get("zoning"), Some(&40));
    }

    #[test]
    fn test_merge_drops_unowned_fields() {
        let mut ctx = RunContext::new("s");
        ctx.fields.set(ContextField::SiteSurvey, json!({"width_ft": 30}));
        let reg = registration("zoning", &[ContextField::Zoning]);

        let report = merge_stage_result(
            &mut ctx,
            &reg,
            StageResult::ok_field(ContextField::Zoning, json!({}))
                .with_field(ContextField::RoomLayout, json!([]))
                .with_field(ContextField::SiteSurvey, json!(null)),
        );

        assert_eq!(
            report.rejected,
            vec![ContextField::SiteSurvey, ContextField::RoomLayout]
        );
        assert!(!ctx.fields.is_populated(ContextField::RoomLayout));
        assert_eq!(ctx.field(ContextField::SiteSurvey), Some(&json!({"width_ft": 30})));
    }

    #[test]
    fn test_merge_appends_questions_and_assumptions() {
        let mut ctx = RunContext::new("s");
        ctx.push_question(OpenQuestion::mandatory("q1", "plot-analysis", "Road width?"));
        let reg = registration("vastu-compliance", &[ContextField::VastuZones]);

        let report = merge_stage_result(
            &mut ctx,
            &reg,
            StageResult::ok_empty()
                .with_question(OpenQuestion::mandatory("q1", "", "duplicate"))
                .with_question(OpenQuestion::optional("q2", "", "Pooja room?"))
                .with_assumption(Assumption::new("a1", "north-facing entrance", "")),
        );

        assert_eq!(report.questions_added, 1);
        assert_eq!(report.assumptions_added, 1);
        assert_eq!(ctx.open_questions.len(), 2);
        assert_eq!(ctx.open_questions[0].question, "Road width?");
        assert_eq!(ctx.open_questions[1].source_stage, "vastu-compliance");
        assert_eq!(ctx.assumptions[0].source_stage, "vastu-compliance");
    }

    #[test]
    fn test_merge_carries_verdict() {
        let mut ctx = RunContext::new("s");
        let reg = registration("design-validation", &[ContextField::Validation]);

        let report = merge_stage_result(
            &mut ctx,
            &reg,
            StageResult::ok_field(ContextField::Validation, json!({"is_valid": false}))
                .with_verdict(GateVerdict::rejected(["overlapping rooms"])),
        );

        assert!(report.verdict.as_ref().is_some_and(GateVerdict::is_rejected));
        assert!(ctx.fields.is_populated(ContextField::Validation));
    }
}

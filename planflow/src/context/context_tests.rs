//! Snapshot restore tests for the run context.

#[cfg(test)]
mod tests {
    use crate::context::{ContextField, OpenQuestion, RunContext, RunStatus};
    use crate::errors::PlanflowError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_restore_round_trips_a_full_snapshot() {
        let mut ctx = RunContext::new("session-42");
        ctx.fields
            .set(ContextField::PlotAnalysis, json!({"width": 30, "depth": 40}));
        ctx.push_question(OpenQuestion::mandatory("q1", "plot-analysis", "Road width?"));
        ctx.record_step_completed("plot-analysis");
        ctx.mark_halted("awaiting 1 mandatory answer(s): q1");

        let restored = RunContext::restore(ctx.to_snapshot()).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_restore_fills_missing_keys_with_defaults() {
        let restored = RunContext::restore(json!({
            "session_id": "partial",
            "fields": {"zoning": {"public": ["living"]}},
        }))
        .unwrap();

        assert_eq!(restored.session_id(), "partial");
        assert_eq!(restored.status, RunStatus::Pending);
        assert!(restored.open_questions.is_empty());
        assert_eq!(
            restored.field(ContextField::Zoning),
            Some(&json!({"public": ["living"]}))
        );
        assert!(!restored.created_at.is_empty());
    }

    #[test]
    fn test_restore_splices_nested_usage() {
        let restored = RunContext::restore(json!({
            "session_id": "usage",
            "resource_usage": {"tokens_used": 1200},
        }))
        .unwrap();

        assert_eq!(restored.resource_usage.tokens_used, 1200);
        assert_eq!(restored.resource_usage.stage_calls, 0);
    }

    #[test]
    fn test_restore_ignores_unknown_keys() {
        let restored = RunContext::restore(json!({
            "session_id": "s",
            "legacy_blob": [1, 2, 3],
        }))
        .unwrap();
        assert_eq!(restored.session_id(), "s");
    }

    #[test]
    fn test_restore_requires_session_id() {
        let err = RunContext::restore(json!({"status": "halted"})).unwrap_err();
        assert!(matches!(err, PlanflowError::Snapshot(_)));

        let err = RunContext::restore(json!({"session_id": "  "})).unwrap_err();
        assert!(matches!(err, PlanflowError::Snapshot(_)));
    }

    #[test]
    fn test_restore_rejects_non_object() {
        let err = RunContext::restore(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_restore_rejects_bad_status() {
        let err = RunContext::restore(json!({"session_id": "s", "status": "sleeping"})).unwrap_err();
        assert!(matches!(err, PlanflowError::Snapshot(_)));
    }
}

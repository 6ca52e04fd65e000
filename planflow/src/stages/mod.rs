//! Stage processor contract and registry.
//!
//! Stages are the units of domain work in a planning run. Each receives a
//! projection of the run context and returns a [`StageResult`]; the
//! orchestrator alone merges results into the context.

mod input;
mod registry;
mod result;

pub use input::{project_fields, Projection, StageInput};
pub use registry::{StageRegistration, StageRegistry};
pub use result::{GateVerdict, StageData, StageFailure, StageResult};

use async_trait::async_trait;
use std::fmt::Debug;

/// Identity information a stage may read about the run it is part of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageView {
    /// The run's session id.
    pub session_id: String,
    /// The stage being executed.
    pub stage_name: String,
    /// The parallel group the stage runs in, if any.
    pub group: Option<String>,
}

impl StageView {
    /// Creates a view for a sequential stage.
    #[must_use]
    pub fn new(session_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            stage_name: stage_name.into(),
            group: None,
        }
    }

    /// Sets the parallel group.
    #[must_use]
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Trait for pipeline stages.
///
/// Implementations must not panic for expected domain conditions; return
/// [`StageResult::fail`] instead. Panics are caught by the orchestrator and
/// reported as stage execution errors.
#[async_trait]
pub trait StageProcessor: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    async fn execute(&self, input: &StageInput, view: &StageView) -> StageResult;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageInput) -> StageResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageInput) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageInput) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StageProcessor for FnStage<F>
where
    F: Fn(&StageInput) -> StageResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &StageInput, _view: &StageView) -> StageResult {
        (self.func)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextField;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("plot-analysis", |input: &StageInput| {
            match input.get(ContextField::SiteSurvey) {
                Some(survey) => StageResult::ok_field(ContextField::PlotAnalysis, survey.clone()),
                None => StageResult::fail("no survey"),
            }
        });

        assert_eq!(stage.name(), "plot-analysis");

        let view = StageView::new("s", "plot-analysis");
        let input = StageInput::new().with_field(ContextField::SiteSurvey, json!({"w": 30}));
        let result = stage.execute(&input, &view).await;
        assert!(result.success);

        let result = stage.execute(&StageInput::new(), &view).await;
        assert_eq!(result.error_message(), Some("no survey"));
    }

    #[test]
    fn test_stage_view_group() {
        let view = StageView::new("s", "vastu-compliance").in_group("site-constraints");
        assert_eq!(view.group.as_deref(), Some("site-constraints"));
    }
}

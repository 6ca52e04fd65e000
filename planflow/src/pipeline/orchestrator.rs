//! The planning run state machine.

use super::merge::{merge_stage_result, MergeReport};
use super::outcome::{StepFailure, StepOutcome};
use super::{OrchestratorConfig, Topology, TopologyStep};
use crate::budget::{BudgetPolicy, BudgetTracker, ResourceBudget};
use crate::checkpoint::{CheckpointHook, CheckpointMode, NoOpCheckpoint};
use crate::context::{describe_blocking, ContextField, OpenQuestion, RunContext, RunStatus};
use crate::errors::{
    GateRejectionError, HaltError, PlanflowError, StageExecutionError, TopologyError,
};
use crate::events::{types, EventSink, NoOpEventSink, RunEvent};
use crate::observability::StepTimer;
use crate::stages::{
    GateVerdict, StageInput, StageRegistration, StageRegistry, StageResult, StageView,
};
use futures::future::join_all;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// How a step ended, before halt evaluation.
enum StepRun {
    /// Nothing registered to run.
    Skipped,
    /// Results merged into the context; events not yet emitted.
    Merged(MergedStep),
}

/// The merges of one step, reported once the step is committed.
struct MergedStep {
    reports: Vec<MergeReport>,
    duration_ms: f64,
    /// Issues raised by a rejecting gate.
    rejection: Option<Vec<String>>,
}

/// Walks a fixed topology over a single-writer run context.
///
/// The orchestrator owns the context for the duration of a run; stages see
/// projections and return results that are merged at step boundaries. A run
/// ends completed, halted awaiting answers, rejected by a gate, or failed.
#[derive(Debug)]
pub struct Orchestrator {
    topology: Topology,
    config: OrchestratorConfig,
    registry: StageRegistry,
    budgets: BudgetTracker,
    checkpoint_hook: Arc<dyn CheckpointHook>,
    event_sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator with no stages registered.
    #[must_use]
    pub fn new(topology: Topology, config: OrchestratorConfig) -> Self {
        let budgets = BudgetTracker::new(config.max_resource_budget, config.budget_policy);
        Self {
            topology,
            config,
            registry: StageRegistry::new(),
            budgets,
            checkpoint_hook: Arc::new(NoOpCheckpoint),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the hook called after each merged step.
    #[must_use]
    pub fn with_checkpoint_hook(mut self, hook: Arc<dyn CheckpointHook>) -> Self {
        self.checkpoint_hook = hook;
        self
    }

    /// Sets the sink receiving run events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Registers a stage, replacing any registration with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is invalid or its owned fields
    /// overlap another stage's.
    pub fn register_stage(&self, registration: StageRegistration) -> Result<(), TopologyError> {
        let name = registration.name().to_string();
        if self.topology.step_for_stage(&name).is_none() {
            warn!(
                stage = %name,
                topology = %self.topology.name(),
                "Registered stage is not part of the topology"
            );
        }
        if self.registry.register(registration)?.is_some() {
            debug!(stage = %name, "Replaced stage registration");
        }
        Ok(())
    }

    /// Returns the topology.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the stage registry.
    #[must_use]
    pub const fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Returns the budget tracker.
    #[must_use]
    pub const fn budget_tracker(&self) -> &BudgetTracker {
        &self.budgets
    }

    /// Runs the topology.
    ///
    /// Without `existing`, a new context is created with `input` as the site
    /// survey. With `existing`, the walk continues after the steps recorded
    /// in `completed_steps`; `input` only fills an empty site survey.
    ///
    /// # Errors
    ///
    /// Returns [`PlanflowError::Halt`] when mandatory questions are left
    /// unanswered, [`PlanflowError::GateRejection`] when a gate rejects the
    /// design, and [`PlanflowError::StageExecution`] for stage failures,
    /// panics, timeouts, an exhausted hard budget or a strict checkpoint
    /// failure. Every variant carries the context.
    pub async fn run(
        &self,
        input: serde_json::Value,
        existing: Option<RunContext>,
    ) -> Result<RunContext, PlanflowError> {
        let resumed = existing.is_some();
        let mut ctx = existing.unwrap_or_default();
        if !input.is_null() && ctx.field(ContextField::SiteSurvey).map_or(true, is_empty_value) {
            ctx.fields.set(ContextField::SiteSurvey, input);
        }
        ctx.mark_in_progress();

        let session_id = ctx.session_id().to_string();
        let budget = self
            .budgets
            .allocate_with_used(&session_id, ctx.resource_usage.tokens_used);
        ctx.resource_usage.token_limit = budget.total_limit();

        info!(
            session_id = %session_id,
            topology = %self.topology.name(),
            resumed,
            completed_steps = ctx.completed_steps.len(),
            "Starting planning run"
        );
        self.emit(RunEvent::new(types::RUN_STARTED, &session_id).with_data(json!({
            "topology": self.topology.name(),
            "resumed": resumed,
            "completed_steps": ctx.completed_steps,
        })))
        .await;

        let timer = StepTimer::start("run");
        let run_timeout = self.config.run_timeout();
        let walked = tokio::time::timeout(run_timeout, self.walk(&mut ctx, &budget)).await;
        let walked = walked.unwrap_or_else(|_| {
            Err(StepFailure::new(
                ctx.current_stage.clone().unwrap_or_else(|| "run".to_string()),
                format!("run timed out after {:.1}s", run_timeout.as_secs_f64()),
            ))
        });
        ctx.resource_usage.tokens_used = budget.used();
        let duration_ms = timer.elapsed_ms();

        match walked {
            Ok(StepOutcome::Continue) => self.finish_completed(ctx, duration_ms).await,
            Ok(StepOutcome::Suspend(questions)) => self.finish_halted(ctx, questions).await,
            Ok(StepOutcome::Reject(issues)) => self.finish_rejected(ctx, issues).await,
            Err(failure) => self.finish_failed(ctx, failure).await,
        }
    }

    /// Attaches answers to a halted run and continues it once no mandatory
    /// question is left open.
    ///
    /// Answers for unknown question ids are ignored. If mandatory questions
    /// remain unanswered the context is returned still halted and no stage
    /// runs. A context that is not halted is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`run`](Self::run) once the walk resumes.
    pub async fn resume(
        &self,
        mut ctx: RunContext,
        answers: HashMap<String, String>,
    ) -> Result<RunContext, PlanflowError> {
        if ctx.status != RunStatus::Halted {
            warn!(
                session_id = %ctx.session_id(),
                status = %ctx.status,
                "Resume requested for a run that is not halted"
            );
            return Ok(ctx);
        }

        for (question_id, answer) in answers {
            if !ctx.answer_question(&question_id, answer) {
                debug!(
                    session_id = %ctx.session_id(),
                    question_id = %question_id,
                    "Ignoring answer for unknown question"
                );
            }
        }

        let blocking = ctx.blocking_questions();
        if !blocking.is_empty() {
            let reason = describe_blocking(&blocking);
            info!(session_id = %ctx.session_id(), reason = %reason, "Run still halted");
            ctx.mark_halted(reason);
            return Ok(ctx);
        }

        ctx.mark_in_progress();
        self.run(serde_json::Value::Null, Some(ctx)).await
    }

    async fn walk(
        &self,
        ctx: &mut RunContext,
        budget: &Arc<ResourceBudget>,
    ) -> Result<StepOutcome, StepFailure> {
        if ctx.has_blocking_questions() {
            return Ok(StepOutcome::Suspend(ctx.blocking_questions()));
        }

        let mut budget_reported = false;
        for step in self.topology.steps() {
            let step_name = step.name();
            if ctx.is_step_completed(step_name) {
                debug!(session_id = %ctx.session_id(), step = %step_name, "Step already completed");
                continue;
            }

            if budget.is_exhausted() {
                if !budget_reported {
                    self.report_budget_exhausted(ctx, budget).await;
                    budget_reported = true;
                }
                if self.config.budget_policy == BudgetPolicy::Hard {
                    return Err(StepFailure::new(
                        step_name,
                        format!(
                            "token budget exhausted ({} of {} tokens used)",
                            budget.used(),
                            budget.total_limit()
                        ),
                    ));
                }
            }

            ctx.current_stage = Some(step_name.to_string());
            ctx.touch();

            let run = match step {
                TopologyStep::Stage { name } => self.run_stage(ctx, budget, name, false).await?,
                TopologyStep::Gate { name } => self.run_stage(ctx, budget, name, true).await?,
                TopologyStep::Parallel { name, members } => {
                    self.run_group(ctx, budget, name, members).await?
                }
            };
            let StepRun::Merged(merged) = run else {
                continue;
            };

            // No await between the merge and the cursor update, so a deadline
            // cannot leave a step half committed. A rejecting gate stays
            // uncommitted and runs again on the next walk.
            if merged.rejection.is_none() {
                ctx.record_step_completed(step_name);
            }
            self.report_step(ctx, step, &merged).await;
            self.checkpoint(ctx).await?;

            if budget.is_exhausted() && !budget_reported {
                self.report_budget_exhausted(ctx, budget).await;
                budget_reported = true;
            }

            if let Some(issues) = merged.rejection {
                return Ok(StepOutcome::Reject(issues));
            }
            if ctx.has_blocking_questions() {
                return Ok(StepOutcome::Suspend(ctx.blocking_questions()));
            }
        }

        Ok(StepOutcome::Continue)
    }

    async fn run_stage(
        &self,
        ctx: &mut RunContext,
        budget: &Arc<ResourceBudget>,
        name: &str,
        gate: bool,
    ) -> Result<StepRun, StepFailure> {
        let Some(registration) = self.registry.get(name) else {
            self.skip_unregistered(ctx, name).await;
            return Ok(StepRun::Skipped);
        };

        let input = registration.project(ctx);
        let view = StageView::new(ctx.session_id(), name);
        self.emit(RunEvent::new(types::STAGE_STARTED, ctx.session_id()).with_stage(name))
            .await;

        let timer = StepTimer::start(name);
        let mut tasks = StageTasks::default();
        let joined = tasks
            .spawn(registration.clone(), input, view, budget.clone())
            .await;
        let result = match settle(joined) {
            Ok(result) => result,
            Err(message) => {
                self.report_stage_failure(ctx, name, None, &message).await;
                return Err(StepFailure::new(name, message));
            }
        };

        let report = merge_stage_result(ctx, &registration, result);
        let rejection = match &report.verdict {
            Some(GateVerdict::Rejected { issues }) if gate => Some(issues.clone()),
            Some(_) if !gate => {
                debug!(stage = %name, "Verdict from a non-gate stage ignored");
                None
            }
            _ => None,
        };

        Ok(StepRun::Merged(MergedStep {
            reports: vec![report],
            duration_ms: timer.elapsed_ms(),
            rejection,
        }))
    }

    async fn run_group(
        &self,
        ctx: &mut RunContext,
        budget: &Arc<ResourceBudget>,
        group: &str,
        members: &[String],
    ) -> Result<StepRun, StepFailure> {
        let mut registrations = Vec::with_capacity(members.len());
        for member in members {
            match self.registry.get(member) {
                Some(registration) => registrations.push(registration),
                None => self.skip_unregistered(ctx, member).await,
            }
        }
        if registrations.is_empty() {
            return Ok(StepRun::Skipped);
        }

        let concurrent = self.config.enable_parallel_stages;
        let names: Vec<&str> = registrations.iter().map(|r| r.name()).collect();
        info!(
            session_id = %ctx.session_id(),
            group = %group,
            members = ?names,
            concurrent,
            "Starting stage group"
        );
        self.emit(
            RunEvent::new(types::GROUP_STARTED, ctx.session_id())
                .with_stage(group)
                .with_data(json!({"members": names, "concurrent": concurrent})),
        )
        .await;

        // Every member sees the context as it was before the group.
        let mut jobs = Vec::with_capacity(registrations.len());
        for registration in &registrations {
            let input = registration.project(ctx);
            let view = StageView::new(ctx.session_id(), registration.name()).in_group(group);
            self.emit(
                RunEvent::new(types::STAGE_STARTED, ctx.session_id())
                    .with_stage(registration.name())
                    .with_data(json!({"group": group})),
            )
            .await;
            jobs.push((registration.clone(), input, view));
        }

        let timer = StepTimer::start(group);
        let mut tasks = StageTasks::default();
        let joined = if concurrent {
            for (registration, input, view) in jobs {
                tasks.spawn(registration, input, view, budget.clone());
            }
            join_all(tasks.handles_mut()).await
        } else {
            let mut joined = Vec::with_capacity(jobs.len());
            for (registration, input, view) in jobs {
                joined.push(tasks.spawn(registration, input, view, budget.clone()).await);
            }
            joined
        };

        let mut results = Vec::with_capacity(registrations.len());
        let mut first_failure = None;
        for (registration, joined) in registrations.iter().zip(joined) {
            match settle(joined) {
                Ok(result) => results.push(result),
                Err(message) => {
                    self.report_stage_failure(ctx, registration.name(), Some(group), &message)
                        .await;
                    if first_failure.is_none() {
                        first_failure = Some(StepFailure::new(registration.name(), message));
                    }
                }
            }
        }
        if let Some(failure) = first_failure {
            return Err(failure);
        }

        let reports = registrations
            .iter()
            .zip(results)
            .map(|(registration, result)| merge_stage_result(ctx, registration, result))
            .collect();

        Ok(StepRun::Merged(MergedStep {
            reports,
            duration_ms: timer.elapsed_ms(),
            rejection: None,
        }))
    }

    async fn report_step(&self, ctx: &RunContext, step: &TopologyStep, merged: &MergedStep) {
        for report in &merged.reports {
            self.report_merge(ctx, report, merged.duration_ms).await;
        }
        if let TopologyStep::Parallel { name, members } = step {
            self.emit(
                RunEvent::new(types::GROUP_COMPLETED, ctx.session_id())
                    .with_stage(name.clone())
                    .with_data(json!({
                        "members": members,
                        "duration_ms": merged.duration_ms,
                    })),
            )
            .await;
        }
    }

    async fn checkpoint(&self, ctx: &RunContext) -> Result<(), StepFailure> {
        if !self.config.enable_checkpoints {
            return Ok(());
        }

        let step = ctx.current_stage.clone().unwrap_or_default();
        match self.checkpoint_hook.on_checkpoint(ctx).await {
            Ok(()) => {
                self.emit(
                    RunEvent::new(types::CHECKPOINT_SAVED, ctx.session_id())
                        .with_stage(step)
                        .with_data(json!({"status": ctx.status})),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %ctx.session_id(),
                    step = %step,
                    error = %e,
                    "Checkpoint failed"
                );
                self.emit(
                    RunEvent::new(types::CHECKPOINT_FAILED, ctx.session_id())
                        .with_stage(step)
                        .with_data(json!({"error": e.to_string()})),
                )
                .await;
                match self.config.checkpoint_mode {
                    CheckpointMode::FireAndForget => Ok(()),
                    CheckpointMode::Strict => Err(StepFailure::new(
                        "checkpoint",
                        format!("checkpoint failed: {e}"),
                    )),
                }
            }
        }
    }

    async fn finish_completed(
        &self,
        mut ctx: RunContext,
        duration_ms: f64,
    ) -> Result<RunContext, PlanflowError> {
        ctx.current_stage = None;
        ctx.mark_completed();
        if let Err(failure) = self.checkpoint(&ctx).await {
            return self.finish_failed(ctx, failure).await;
        }

        let summary = self.budgets.release(ctx.session_id());
        info!(
            session_id = %ctx.session_id(),
            duration_ms,
            tokens_used = ctx.resource_usage.tokens_used,
            "Planning run completed"
        );
        self.emit(
            RunEvent::new(types::RUN_COMPLETED, ctx.session_id()).with_data(json!({
                "duration_ms": duration_ms,
                "completed_steps": ctx.completed_steps,
                "budget": summary,
            })),
        )
        .await;
        Ok(ctx)
    }

    async fn finish_halted(
        &self,
        mut ctx: RunContext,
        questions: Vec<OpenQuestion>,
    ) -> Result<RunContext, PlanflowError> {
        let reason = describe_blocking(&questions);
        ctx.mark_halted(reason.clone());
        if let Err(failure) = self.checkpoint(&ctx).await {
            return self.finish_failed(ctx, failure).await;
        }
        // Resuming seeds a fresh counter from `resource_usage`.
        self.budgets.release(ctx.session_id());

        info!(session_id = %ctx.session_id(), reason = %reason, "Planning run halted");
        let ids: Vec<&str> = questions.iter().map(|q| q.question_id.as_str()).collect();
        self.emit(
            RunEvent::new(types::RUN_HALTED, ctx.session_id())
                .with_stage(ctx.current_stage.clone().unwrap_or_default())
                .with_data(json!({"questions": ids})),
        )
        .await;
        Err(HaltError::new(questions, ctx).into())
    }

    async fn finish_rejected(
        &self,
        mut ctx: RunContext,
        issues: Vec<String>,
    ) -> Result<RunContext, PlanflowError> {
        let gate = ctx.current_stage.clone().unwrap_or_default();
        ctx.mark_failed(format!("gate '{gate}' rejected the design"));
        self.budgets.release(ctx.session_id());

        warn!(session_id = %ctx.session_id(), gate = %gate, issues = ?issues, "Design rejected");
        self.emit(
            RunEvent::new(types::RUN_REJECTED, ctx.session_id())
                .with_stage(gate.clone())
                .with_data(json!({"issues": issues})),
        )
        .await;
        Err(GateRejectionError::new(gate, issues, ctx).into())
    }

    async fn finish_failed(
        &self,
        mut ctx: RunContext,
        failure: StepFailure,
    ) -> Result<RunContext, PlanflowError> {
        ctx.mark_failed(failure.message.clone());
        self.budgets.release(ctx.session_id());

        error!(
            session_id = %ctx.session_id(),
            stage = %failure.stage,
            error = %failure.message,
            "Planning run failed"
        );
        self.emit(
            RunEvent::new(types::RUN_FAILED, ctx.session_id())
                .with_stage(failure.stage.clone())
                .with_data(json!({"error": failure.message})),
        )
        .await;
        Err(StageExecutionError::new(failure.stage, failure.message, ctx).into())
    }

    async fn skip_unregistered(&self, ctx: &RunContext, name: &str) {
        warn!(session_id = %ctx.session_id(), stage = %name, "No stage registered; skipping");
        self.emit(
            RunEvent::new(types::STAGE_SKIPPED, ctx.session_id())
                .with_stage(name)
                .with_data(json!({"reason": "not registered"})),
        )
        .await;
    }

    async fn report_stage_failure(
        &self,
        ctx: &RunContext,
        name: &str,
        group: Option<&str>,
        message: &str,
    ) {
        warn!(session_id = %ctx.session_id(), stage = %name, error = %message, "Stage failed");
        self.emit(
            RunEvent::new(types::STAGE_FAILED, ctx.session_id())
                .with_stage(name)
                .with_data(json!({"error": message, "group": group})),
        )
        .await;
    }

    async fn report_merge(&self, ctx: &RunContext, report: &MergeReport, duration_ms: f64) {
        if report.has_rejections() {
            self.emit(
                RunEvent::new(types::STAGE_WRITE_REJECTED, ctx.session_id())
                    .with_stage(report.stage.clone())
                    .with_data(json!({"fields": report.rejected})),
            )
            .await;
        }

        debug!(
            session_id = %ctx.session_id(),
            stage = %report.stage,
            duration_ms,
            written = ?report.written,
            questions = report.questions_added,
            tokens = report.tokens_used,
            "Stage merged"
        );
        self.emit(
            RunEvent::new(types::STAGE_COMPLETED, ctx.session_id())
                .with_stage(report.stage.clone())
                .with_data(json!({
                    "duration_ms": duration_ms,
                    "written": report.written,
                    "rejected": report.rejected,
                    "questions": report.questions_added,
                    "tokens_used": report.tokens_used,
                })),
        )
        .await;
    }

    async fn report_budget_exhausted(&self, ctx: &RunContext, budget: &ResourceBudget) {
        let summary = budget.summary();
        warn!(
            session_id = %ctx.session_id(),
            used = summary.used,
            limit = summary.total_limit,
            "Token budget exhausted"
        );
        self.emit(
            RunEvent::new(types::BUDGET_EXHAUSTED, ctx.session_id()).with_data(json!(summary)),
        )
        .await;
    }

    async fn emit(&self, event: RunEvent) {
        self.event_sink.emit(event).await;
    }
}

/// The stage tasks of one step.
///
/// Tasks still running when the step is dropped, as on a run timeout, are
/// aborted so they stop recording into the run's budget.
#[derive(Default)]
struct StageTasks(Vec<JoinHandle<StageResult>>);

impl StageTasks {
    fn spawn(
        &mut self,
        registration: Arc<StageRegistration>,
        input: StageInput,
        view: StageView,
        budget: Arc<ResourceBudget>,
    ) -> &mut JoinHandle<StageResult> {
        let index = self.0.len();
        self.0.push(spawn_stage(registration, input, view, budget));
        &mut self.0[index]
    }

    fn handles_mut(&mut self) -> impl Iterator<Item = &mut JoinHandle<StageResult>> {
        self.0.iter_mut()
    }
}

impl Drop for StageTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs a stage on its own task so a panic surfaces as a [`JoinError`].
fn spawn_stage(
    registration: Arc<StageRegistration>,
    input: StageInput,
    view: StageView,
    budget: Arc<ResourceBudget>,
) -> JoinHandle<StageResult> {
    tokio::spawn(async move {
        let result = registration.processor().execute(&input, &view).await;
        budget.record(result.tokens_used);
        result
    })
}

/// Turns a joined stage task into its successful result or a failure message.
fn settle(joined: Result<StageResult, JoinError>) -> Result<StageResult, String> {
    match joined {
        Ok(result) if result.success => Ok(result),
        Ok(result) => Err(result
            .error_message()
            .unwrap_or("stage reported failure")
            .to_string()),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            Err(format!("stage panicked: {}", panic_message(payload.as_ref())))
        }
        Err(e) => Err(format!("stage task did not complete: {e}")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

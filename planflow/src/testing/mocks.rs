//! Mock stages and hooks for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::checkpoint::CheckpointHook;
use crate::context::RunContext;
use crate::stages::{StageInput, StageProcessor, StageResult, StageView};

/// A stage that returns scripted results and records what it was given.
///
/// Results are returned in order; the last one repeats once the script is
/// exhausted.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    script: Mutex<VecDeque<StageResult>>,
    fallback: Mutex<StageResult>,
    inputs: Mutex<Vec<StageInput>>,
    views: Mutex<Vec<StageView>>,
}

impl ScriptedStage {
    /// Creates a stage that always succeeds without writing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::returning(name, StageResult::ok_empty())
    }

    /// Creates a stage that always returns `result`.
    #[must_use]
    pub fn returning(name: impl Into<String>, result: StageResult) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(result),
            inputs: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        }
    }

    /// Creates a stage returning each result once, in order.
    #[must_use]
    pub fn with_script(name: impl Into<String>, results: Vec<StageResult>) -> Self {
        let stage = Self::new(name);
        if let Some(last) = results.last() {
            *stage.fallback.lock() = last.clone();
        }
        *stage.script.lock() = results.into();
        stage
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns the inputs of every execution.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<StageInput> {
        self.inputs.lock().clone()
    }

    /// Returns the views of every execution.
    #[must_use]
    pub fn recorded_views(&self) -> Vec<StageView> {
        self.views.lock().clone()
    }

    /// Returns the input of the latest execution.
    #[must_use]
    pub fn last_input(&self) -> Option<StageInput> {
        self.inputs.lock().last().cloned()
    }
}

#[async_trait]
impl StageProcessor for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: &StageInput, view: &StageView) -> StageResult {
        self.inputs.lock().push(input.clone());
        self.views.lock().push(view.clone());
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().clone())
    }
}

/// A stage that always reports a failure.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    message: String,
    calls: Mutex<usize>,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            calls: Mutex::new(0),
        }
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl StageProcessor for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: &StageInput, _view: &StageView) -> StageResult {
        *self.calls.lock() += 1;
        StageResult::fail(self.message.clone())
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
    message: String,
}

impl PanickingStage {
    /// Creates a panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl StageProcessor for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: &StageInput, _view: &StageView) -> StageResult {
        panic!("{}", self.message);
    }
}

/// A stage that sleeps before returning.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    result: StageResult,
    finished: Mutex<usize>,
}

impl SlowStage {
    /// Creates a slow stage that succeeds without writing.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self::returning(name, delay, StageResult::ok_empty())
    }

    /// Creates a slow stage returning `result`.
    #[must_use]
    pub fn returning(name: impl Into<String>, delay: Duration, result: StageResult) -> Self {
        Self {
            name: name.into(),
            delay,
            result,
            finished: Mutex::new(0),
        }
    }

    /// Creates a slow stage with the delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }

    /// Returns the number of executions that slept through their delay.
    #[must_use]
    pub fn finished_count(&self) -> usize {
        *self.finished.lock()
    }
}

#[async_trait]
impl StageProcessor for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: &StageInput, _view: &StageView) -> StageResult {
        tokio::time::sleep(self.delay).await;
        *self.finished.lock() += 1;
        self.result.clone()
    }
}

/// A stage that records which group it ran in.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    executions: Mutex<Vec<StageView>>,
}

impl RecordingStage {
    /// Creates a recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Returns the view of every execution.
    #[must_use]
    pub fn executions(&self) -> Vec<StageView> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl StageProcessor for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _input: &StageInput, view: &StageView) -> StageResult {
        self.executions.lock().push(view.clone());
        StageResult::ok_empty()
    }
}

/// A checkpoint hook that always fails.
#[derive(Debug, Default)]
pub struct FailingCheckpoint {
    attempts: Mutex<usize>,
}

impl FailingCheckpoint {
    /// Creates a failing hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of checkpoint attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl CheckpointHook for FailingCheckpoint {
    async fn on_checkpoint(&self, ctx: &RunContext) -> anyhow::Result<()> {
        *self.attempts.lock() += 1;
        anyhow::bail!("checkpoint store unavailable for {}", ctx.session_id())
    }
}

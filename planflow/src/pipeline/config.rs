//! Orchestrator configuration.

use crate::budget::BudgetPolicy;
use crate::checkpoint::CheckpointMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`OrchestratorConfig::max_resource_budget`].
pub const ENV_MAX_BUDGET: &str = "PLANFLOW_MAX_BUDGET";
/// Environment variable overriding [`OrchestratorConfig::run_timeout_seconds`].
pub const ENV_RUN_TIMEOUT_SECONDS: &str = "PLANFLOW_RUN_TIMEOUT_SECONDS";
/// Environment variable overriding [`OrchestratorConfig::enable_parallel_stages`].
pub const ENV_ENABLE_PARALLEL: &str = "PLANFLOW_ENABLE_PARALLEL";
/// Environment variable overriding [`OrchestratorConfig::enable_checkpoints`].
pub const ENV_ENABLE_CHECKPOINTS: &str = "PLANFLOW_ENABLE_CHECKPOINTS";
/// Environment variable overriding [`OrchestratorConfig::budget_policy`].
pub const ENV_BUDGET_POLICY: &str = "PLANFLOW_BUDGET_POLICY";

/// Configuration for an [`Orchestrator`](super::Orchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Token ceiling per run.
    #[serde(default = "default_max_budget")]
    pub max_resource_budget: u64,
    /// Deadline for one `run` call, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: f64,
    /// Run parallel group members concurrently.
    #[serde(default = "default_true")]
    pub enable_parallel_stages: bool,
    /// Call the checkpoint hook after each merged step.
    #[serde(default = "default_true")]
    pub enable_checkpoints: bool,
    /// Reaction to an exhausted budget.
    #[serde(default)]
    pub budget_policy: BudgetPolicy,
    /// Reaction to a failing checkpoint hook.
    #[serde(default)]
    pub checkpoint_mode: CheckpointMode,
}

fn default_max_budget() -> u64 {
    1_000_000
}

fn default_run_timeout() -> f64 {
    600.0
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_resource_budget: default_max_budget(),
            run_timeout_seconds: default_run_timeout(),
            enable_parallel_stages: true,
            enable_checkpoints: true,
            budget_policy: BudgetPolicy::default(),
            checkpoint_mode: CheckpointMode::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON or a value has the
    /// wrong type.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Builds a configuration from defaults and `PLANFLOW_*` variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Unparsable values are logged and ignored.
    #[must_use]
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_BUDGET) {
            match value.trim().parse() {
                Ok(v) => self.max_resource_budget = v,
                Err(_) => warn_ignored(ENV_MAX_BUDGET, &value),
            }
        }
        if let Some(value) = lookup(ENV_RUN_TIMEOUT_SECONDS) {
            match value.trim().parse::<f64>() {
                Ok(v) if v > 0.0 && v.is_finite() => self.run_timeout_seconds = v,
                _ => warn_ignored(ENV_RUN_TIMEOUT_SECONDS, &value),
            }
        }
        if let Some(value) = lookup(ENV_ENABLE_PARALLEL) {
            match parse_flag(&value) {
                Some(v) => self.enable_parallel_stages = v,
                None => warn_ignored(ENV_ENABLE_PARALLEL, &value),
            }
        }
        if let Some(value) = lookup(ENV_ENABLE_CHECKPOINTS) {
            match parse_flag(&value) {
                Some(v) => self.enable_checkpoints = v,
                None => warn_ignored(ENV_ENABLE_CHECKPOINTS, &value),
            }
        }
        if let Some(value) = lookup(ENV_BUDGET_POLICY) {
            match value.parse() {
                Ok(v) => self.budget_policy = v,
                Err(_) => warn_ignored(ENV_BUDGET_POLICY, &value),
            }
        }
        self
    }

    /// Sets the token ceiling.
    #[must_use]
    pub const fn with_max_resource_budget(mut self, tokens: u64) -> Self {
        self.max_resource_budget = tokens;
        self
    }

    /// Sets the run deadline.
    #[must_use]
    pub fn with_run_timeout(mut self, seconds: f64) -> Self {
        self.run_timeout_seconds = seconds;
        self
    }

    /// Enables or disables concurrent group members.
    #[must_use]
    pub const fn with_parallel_stages(mut self, enabled: bool) -> Self {
        self.enable_parallel_stages = enabled;
        self
    }

    /// Enables or disables the checkpoint hook.
    #[must_use]
    pub const fn with_checkpoints(mut self, enabled: bool) -> Self {
        self.enable_checkpoints = enabled;
        self
    }

    /// Sets the budget policy.
    #[must_use]
    pub const fn with_budget_policy(mut self, policy: BudgetPolicy) -> Self {
        self.budget_policy = policy;
        self
    }

    /// Sets the checkpoint mode.
    #[must_use]
    pub const fn with_checkpoint_mode(mut self, mode: CheckpointMode) -> Self {
        self.checkpoint_mode = mode;
        self
    }

    /// Returns the run deadline as a duration.
    ///
    /// Non-positive or non-finite values fall back to the default.
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.run_timeout_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(default_run_timeout()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn warn_ignored(key: &str, value: &str) {
    tracing::warn!(key = %key, value = %value, "Ignoring invalid configuration override");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_resource_budget, 1_000_000);
        assert!((config.run_timeout_seconds - 600.0).abs() < f64::EPSILON);
        assert!(config.enable_parallel_stages);
        assert!(config.enable_checkpoints);
        assert_eq!(config.budget_policy, BudgetPolicy::Soft);
        assert_eq!(config.checkpoint_mode, CheckpointMode::FireAndForget);
        assert_eq!(config.run_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = OrchestratorConfig::from_json_str(
            r#"{"max_resource_budget": 5000, "budget_policy": "hard"}"#,
        )
        .unwrap();
        assert_eq!(config.max_resource_budget, 5000);
        assert_eq!(config.budget_policy, BudgetPolicy::Hard);
        assert!(config.enable_parallel_stages);

        assert!(OrchestratorConfig::from_json_str(r#"{"max_resource_budget": "lots"}"#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_BUDGET, "2500"),
            (ENV_RUN_TIMEOUT_SECONDS, "1.5"),
            (ENV_ENABLE_PARALLEL, "off"),
            (ENV_ENABLE_CHECKPOINTS, "nope"),
            (ENV_BUDGET_POLICY, "hard"),
        ]);
        let config = OrchestratorConfig::default()
            .with_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.max_resource_budget, 2500);
        assert_eq!(config.run_timeout(), Duration::from_millis(1500));
        assert!(!config.enable_parallel_stages);
        assert!(config.enable_checkpoints);
        assert_eq!(config.budget_policy, BudgetPolicy::Hard);
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = OrchestratorConfig::default().with_run_timeout(-1.0);
        assert_eq!(config.run_timeout(), Duration::from_secs(600));
    }
}

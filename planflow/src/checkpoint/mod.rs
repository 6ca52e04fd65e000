//! Checkpoint hooks.
//!
//! After each merged step the orchestrator hands the context to a
//! [`CheckpointHook`]. Durable storage is the host's concern; this module
//! provides the trait, a no-op hook and an in-memory store.

mod store;

pub use store::{snapshot_digest, CheckpointRecord, InMemoryCheckpointStore};

use crate::context::RunContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Receives a context snapshot after every merged step.
#[async_trait]
pub trait CheckpointHook: Send + Sync + std::fmt::Debug {
    /// Persists the context.
    async fn on_checkpoint(&self, ctx: &RunContext) -> anyhow::Result<()>;
}

/// What the orchestrator does when the hook fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    /// Log, emit `checkpoint.failed` and keep going.
    #[default]
    FireAndForget,
    /// Fail the run with a stage execution error attributed to `checkpoint`.
    Strict,
}

impl std::str::FromStr for CheckpointMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fire_and_forget" => Ok(Self::FireAndForget),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown checkpoint mode '{other}'")),
        }
    }
}

/// A hook that accepts every snapshot and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCheckpoint;

#[async_trait]
impl CheckpointHook for NoOpCheckpoint {
    async fn on_checkpoint(&self, _ctx: &RunContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_checkpoint() {
        let ctx = RunContext::new("s");
        assert!(NoOpCheckpoint.on_checkpoint(&ctx).await.is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "fire-and-forget".parse::<CheckpointMode>().unwrap(),
            CheckpointMode::FireAndForget
        );
        assert_eq!("STRICT".parse::<CheckpointMode>().unwrap(), CheckpointMode::Strict);
        assert!("eventually".parse::<CheckpointMode>().is_err());
    }

    #[test]
    fn test_mode_serde() {
        let mode: CheckpointMode = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(mode, CheckpointMode::Strict);
        assert_eq!(
            serde_json::to_string(&CheckpointMode::default()).unwrap(),
            "\"fire_and_forget\""
        );
    }
}

//! In-memory checkpoint store.

use super::CheckpointHook;
use crate::context::RunContext;
use crate::errors::PlanflowError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// The run the snapshot belongs to.
    pub session_id: String,
    /// Position in the session's history, starting at 1.
    pub sequence: u64,
    /// Content digest, see [`snapshot_digest`].
    pub digest: String,
    /// The step last attempted when the snapshot was taken.
    pub step: Option<String>,
    /// The serialized context.
    pub snapshot: serde_json::Value,
}

/// Computes a digest of a snapshot, ignoring `updated_at`.
///
/// Two snapshots that differ only in their modification time get the same
/// digest.
#[must_use]
pub fn snapshot_digest(snapshot: &serde_json::Value) -> String {
    let mut content = snapshot.clone();
    if let Some(obj) = content.as_object_mut() {
        obj.remove("updated_at");
    }

    let json = serde_json::to_string(&content).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Keeps every distinct snapshot per session in memory.
///
/// Consecutive identical snapshots are stored once.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    records: RwLock<HashMap<String, Vec<CheckpointRecord>>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a snapshot of the context.
    ///
    /// Returns false if the latest record for the session already has the
    /// same content.
    pub fn save(&self, ctx: &RunContext) -> bool {
        let snapshot = ctx.to_snapshot();
        let digest = snapshot_digest(&snapshot);

        let mut records = self.records.write();
        let history = records.entry(ctx.session_id().to_string()).or_default();

        if history.last().is_some_and(|r| r.digest == digest) {
            tracing::debug!(session_id = %ctx.session_id(), "Snapshot unchanged, not stored");
            return false;
        }

        let sequence = history.len() as u64 + 1;
        history.push(CheckpointRecord {
            session_id: ctx.session_id().to_string(),
            sequence,
            digest,
            step: ctx.current_stage.clone(),
            snapshot,
        });
        true
    }

    /// Returns the newest record for a session.
    #[must_use]
    pub fn latest(&self, session_id: &str) -> Option<CheckpointRecord> {
        self.records
            .read()
            .get(session_id)
            .and_then(|h| h.last().cloned())
    }

    /// Returns every record for a session, oldest first.
    #[must_use]
    pub fn history(&self, session_id: &str) -> Vec<CheckpointRecord> {
        self.records
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Restores the newest snapshot of a session.
    ///
    /// # Errors
    ///
    /// Returns [`PlanflowError::Snapshot`] if nothing is stored for the
    /// session or the snapshot cannot be restored.
    pub fn restore_latest(&self, session_id: &str) -> Result<RunContext, PlanflowError> {
        let record = self.latest(session_id).ok_or_else(|| {
            PlanflowError::Snapshot(format!("no checkpoint for session '{session_id}'"))
        })?;
        RunContext::restore(record.snapshot)
    }

    /// Drops a session's history.
    pub fn remove(&self, session_id: &str) -> usize {
        self.records
            .write()
            .remove(session_id)
            .map_or(0, |h| h.len())
    }

    /// Returns the sessions with stored snapshots.
    #[must_use]
    pub fn sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self.records.read().keys().cloned().collect();
        sessions.sort();
        sessions
    }
}

#[async_trait]
impl CheckpointHook for InMemoryCheckpointStore {
    async fn on_checkpoint(&self, ctx: &RunContext) -> anyhow::Result<()> {
        self.save(ctx);
        Ok(())
    }
}

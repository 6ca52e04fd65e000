//! Testing utilities for planflow runs.
//!
//! Scripted and misbehaving stages for exercising the orchestrator without
//! real content generators.

mod mocks;

pub use mocks::{
    FailingCheckpoint, FailingStage, PanickingStage, RecordingStage, ScriptedStage, SlowStage,
};

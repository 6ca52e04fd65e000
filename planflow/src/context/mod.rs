//! Run context and its domain model.
//!
//! This module provides:
//! - The single-writer [`RunContext`] owned by the orchestrator
//! - Schema-typed design fields and their identifiers
//! - Open questions and assumptions raised by stages

#[cfg(test)]
mod context_tests;
mod fields;
mod questions;
mod run;

pub use fields::{ContextField, DesignFields};
pub use questions::{Assumption, OpenQuestion, QuestionKind};
pub use run::{describe_blocking, ResourceUsage, RunContext, RunStatus};

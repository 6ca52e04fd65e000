//! Token budget accounting.
//!
//! The budget is soft by default: consumption is tracked and reported but
//! never preempts a stage. [`BudgetPolicy::Hard`] lets the orchestrator stop
//! a run once the ceiling has been reached.

mod tracker;

pub use tracker::{BudgetPolicy, BudgetSummary, BudgetTracker, ResourceBudget};

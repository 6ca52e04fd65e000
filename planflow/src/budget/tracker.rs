//! Per-run token counters.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How the orchestrator reacts to an exhausted budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// Track and warn, never stop the run.
    #[default]
    Soft,
    /// Fail the run before the next step once the ceiling is reached.
    Hard,
}

impl std::str::FromStr for BudgetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            other => Err(format!("unknown budget policy '{other}'")),
        }
    }
}

/// A monotonically increasing token counter with a ceiling.
///
/// `record` is a single atomic add, so members of a parallel group may
/// record concurrently.
#[derive(Debug)]
pub struct ResourceBudget {
    session_id: String,
    total_limit: u64,
    used: AtomicU64,
}

impl ResourceBudget {
    /// Creates a budget with nothing consumed.
    #[must_use]
    pub fn new(session_id: impl Into<String>, total_limit: u64) -> Self {
        Self::with_used(session_id, total_limit, 0)
    }

    /// Creates a budget seeded with prior consumption.
    #[must_use]
    pub fn with_used(session_id: impl Into<String>, total_limit: u64, used: u64) -> Self {
        Self {
            session_id: session_id.into(),
            total_limit,
            used: AtomicU64::new(used),
        }
    }

    /// Adds `delta` tokens and returns the new total.
    pub fn record(&self, delta: u64) -> u64 {
        let previous = self.used.fetch_add(delta, Ordering::SeqCst);
        let total = previous.saturating_add(delta);
        if previous <= self.total_limit && total > self.total_limit {
            tracing::warn!(
                session_id = %self.session_id,
                used = total,
                limit = self.total_limit,
                "Token budget exceeded"
            );
        }
        total
    }

    /// Returns the tokens consumed.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    /// Returns the ceiling.
    #[must_use]
    pub const fn total_limit(&self) -> u64 {
        self.total_limit
    }

    /// Returns the tokens left, zero once the ceiling is reached.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.total_limit.saturating_sub(self.used())
    }

    /// Returns true if recording `delta` would pass the ceiling.
    #[must_use]
    pub fn would_exceed(&self, delta: u64) -> bool {
        self.used().saturating_add(delta) > self.total_limit
    }

    /// Returns true once consumption has reached the ceiling.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.total_limit
    }

    /// Returns a reporting summary.
    #[must_use]
    pub fn summary(&self) -> BudgetSummary {
        let used = self.used();
        BudgetSummary {
            session_id: self.session_id.clone(),
            total_limit: self.total_limit,
            used,
            remaining: self.total_limit.saturating_sub(used),
            exhausted: used >= self.total_limit,
        }
    }
}

/// Point-in-time view of a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSummary {
    /// The run the budget belongs to.
    pub session_id: String,
    /// The ceiling.
    pub total_limit: u64,
    /// Tokens consumed.
    pub used: u64,
    /// Tokens left.
    pub remaining: u64,
    /// Whether the ceiling has been reached.
    pub exhausted: bool,
}

/// Hands out one budget per session.
#[derive(Debug)]
pub struct BudgetTracker {
    total_limit: u64,
    policy: BudgetPolicy,
    budgets: DashMap<String, Arc<ResourceBudget>>,
}

impl BudgetTracker {
    /// Creates a tracker that allocates budgets with the given ceiling.
    #[must_use]
    pub fn new(total_limit: u64, policy: BudgetPolicy) -> Self {
        Self {
            total_limit,
            policy,
            budgets: DashMap::new(),
        }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> BudgetPolicy {
        self.policy
    }

    /// Returns the per-run ceiling.
    #[must_use]
    pub const fn total_limit(&self) -> u64 {
        self.total_limit
    }

    /// Creates the counter for a session, or returns the existing one.
    pub fn allocate(&self, session_id: &str) -> Arc<ResourceBudget> {
        self.allocate_with_used(session_id, 0)
    }

    /// Like [`allocate`](Self::allocate), seeding a new counter with prior
    /// consumption from a restored context.
    pub fn allocate_with_used(&self, session_id: &str, used: u64) -> Arc<ResourceBudget> {
        self.budgets
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(ResourceBudget::with_used(session_id, self.total_limit, used))
            })
            .clone()
    }

    /// Gets the counter for a session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<ResourceBudget>> {
        self.budgets.get(session_id).map(|b| b.value().clone())
    }

    /// Drops the counter for a finished session.
    pub fn release(&self, session_id: &str) -> Option<BudgetSummary> {
        self.budgets
            .remove(session_id)
            .map(|(_, budget)| budget.summary())
    }

    /// Returns the number of live counters.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.budgets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_returns_running_total() {
        let budget = ResourceBudget::new("s", 1000);
        assert_eq!(budget.record(100), 100);
        assert_eq!(budget.record(250), 350);
        assert_eq!(budget.used(), 350);
        assert_eq!(budget.remaining(), 650);
    }

    #[test]
    fn test_used_is_monotonic_and_remaining_consistent() {
        let budget = ResourceBudget::new("s", 500);
        let mut last = 0;
        for delta in [0, 10, 0, 90, 200, 1] {
            let total = budget.record(delta);
            assert!(total >= last);
            assert_eq!(budget.remaining(), budget.total_limit() - budget.used());
            last = total;
        }
    }

    #[test]
    fn test_soft_budget_can_overrun() {
        let budget = ResourceBudget::new("s", 100);
        assert!(budget.would_exceed(101));
        assert!(!budget.would_exceed(100));

        budget.record(150);
        assert_eq!(budget.used(), 150);
        assert_eq!(budget.remaining(), 0);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_summary() {
        let budget = ResourceBudget::with_used("s", 100, 40);
        let summary = budget.summary();
        assert_eq!(summary.used, 40);
        assert_eq!(summary.remaining, 60);
        assert!(!summary.exhausted);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_not_lost() {
        let budget = Arc::new(ResourceBudget::new("s", u64::MAX));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = budget.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        budget.record(1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(budget.used(), 800);
    }

    #[test]
    fn test_tracker_allocate_is_per_session() {
        let tracker = BudgetTracker::new(1000, BudgetPolicy::Soft);
        let a = tracker.allocate("a");
        let a_again = tracker.allocate("a");
        let b = tracker.allocate("b");

        a.record(10);
        assert_eq!(a_again.used(), 10);
        assert_eq!(b.used(), 0);
        assert_eq!(tracker.active_sessions(), 2);
    }

    #[test]
    fn test_tracker_seed_and_release() {
        let tracker = BudgetTracker::new(1000, BudgetPolicy::Hard);
        let budget = tracker.allocate_with_used("s", 300);
        assert_eq!(budget.used(), 300);

        let summary = tracker.release("s").unwrap();
        assert_eq!(summary.used, 300);
        assert!(tracker.get("s").is_none());
        assert!(tracker.release("s").is_none());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("HARD".parse::<BudgetPolicy>().unwrap(), BudgetPolicy::Hard);
        assert_eq!("soft".parse::<BudgetPolicy>().unwrap(), BudgetPolicy::Soft);
        assert!("strict".parse::<BudgetPolicy>().is_err());
    }
}

use chrono::{DateTime, Utc};
use promptjudge_content::{BudgetLimits, BudgetTracker};
use promptjudge_recovery::CancelToken;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

/// Per-run mutable state.
///
/// Created at run start and dropped at run end; nothing in here is shared
/// between runs, so two concurrent runs never see each other's counters.
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub budget: BudgetTracker,
    pub cancel: CancelToken,
    /// Data-quality warnings collected along the way
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl RunState {
    pub fn new(limits: BudgetLimits, cancel: CancelToken) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            budget: BudgetTracker::new(limits),
            cancel,
            warnings: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_do_not_share_ids_or_counters() {
        let first = RunState::new(BudgetLimits::default(), CancelToken::new());
        let second = RunState::new(BudgetLimits::default(), CancelToken::new());
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.budget.usage().api_calls, 0);
        assert!(first.warnings.is_empty());
    }
}

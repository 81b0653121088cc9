use chrono::{DateTime, Utc};
use promptjudge_content::{
    BudgetUsage, CollectionReport, Dimension, DimensionUsage, LoadSummary, Remaining,
    SkippedItem, StopReason,
};
use promptjudge_eval::{CandidateEvaluation, Comparison, Verdict};
use promptjudge_recovery::CancelReason;
use serde::{Deserialize, Serialize};

/// What was consumed, what is left, and what was left out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub bytes_used: u64,
    pub tokens_used: u64,
    pub files_used: u64,
    pub remaining: Remaining,
    pub dimensions: Vec<DimensionUsage>,
    pub api_calls: u64,
    pub skipped: Vec<SkippedItem>,
    pub collections: Vec<CollectionReport>,
    pub stopped: Option<StopReason>,
    pub not_attempted: Vec<String>,
    /// Accepted sizes plus skipped estimates
    pub considered_bytes: u64,
    pub cache_hits: usize,
    pub complete: bool,
}

impl UsageReport {
    pub fn new(usage: BudgetUsage, summary: &LoadSummary) -> Self {
        Self {
            bytes_used: usage.used(Dimension::Bytes).unwrap_or(0),
            tokens_used: usage.used(Dimension::Tokens).unwrap_or(0),
            files_used: usage.used(Dimension::Files).unwrap_or(0),
            remaining: usage.remaining,
            api_calls: usage.api_calls,
            dimensions: usage.dimensions,
            skipped: summary.skipped.clone(),
            collections: summary.collections.clone(),
            stopped: summary.stopped.clone(),
            not_attempted: summary.not_attempted.clone(),
            considered_bytes: summary.considered_bytes,
            cache_hits: summary.cache_hits,
            complete: summary.is_complete(),
        }
    }

    /// Usage when loading never produced a summary
    pub fn from_usage(usage: BudgetUsage) -> Self {
        Self::new(usage, &LoadSummary::default())
    }
}

/// A finished comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub verdict: Verdict,
    pub baseline: CandidateEvaluation,
    pub variant: CandidateEvaluation,
    pub comparison: Comparison,
    pub detailed_comparison: Option<String>,
    pub usage: UsageReport,
    pub warnings: Vec<String>,
    /// Some score or the verdict came from a fallback
    pub degraded: bool,
    pub duration_secs: f64,
}

/// The final outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(Box<RunResult>),
    /// Rejected by upfront validation
    Invalid { error: String },
    /// Cancelled or out of time; carries what was consumed before stopping
    Aborted {
        reason: CancelReason,
        usage: Box<UsageReport>,
        duration_secs: f64,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn result(&self) -> Option<&RunResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => 0,
            Self::Invalid { .. } => 2,
            Self::Aborted { .. } => 130,
        }
    }
}

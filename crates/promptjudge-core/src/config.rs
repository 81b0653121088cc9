use std::path::PathBuf;
use std::time::Duration;

use promptjudge_content::{BudgetLimits, CacheSettings, LoadOptions};
use promptjudge_judge::JudgeConfig;
use promptjudge_recovery::{BackoffPolicy, RecoveryDispatcher};
use serde::{Deserialize, Serialize};

/// Everything that bounds and tunes one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Aggregate limits, loading mode and thresholds
    pub budget: BudgetLimits,
    /// Per-collection cap, depth, per-kind ceilings and excludes
    pub loading: LoadOptions,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub evaluation: EvaluationSettings,
    /// Whole-run deadline
    #[serde(with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub ceiling: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            max_attempts: 5,
            base_delay: backoff.base,
            ceiling: backoff.ceiling,
            jitter_ratio: backoff.jitter_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationSettings {
    /// Per judge call
    #[serde(with = "humantime_serde")]
    pub judge_timeout: Duration,
    pub model: Option<String>,
    /// Response cap for the HTTP judge
    pub max_tokens: u32,
    /// Apply the repeated-iteration bonus to aggregates
    pub leniency: bool,
    /// Read `<verdict>` JSON blocks before falling back to keywords
    pub structured_verdicts: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            judge_timeout: Duration::from_secs(120),
            model: None,
            max_tokens: 2048,
            leniency: true,
            structured_verdicts: false,
        }
    }
}

impl RunConfig {
    pub fn dispatcher(&self) -> RecoveryDispatcher {
        RecoveryDispatcher::new(
            BackoffPolicy {
                base: self.retry.base_delay,
                ceiling: self.retry.ceiling,
                jitter_ratio: self.retry.jitter_ratio,
            },
            self.retry.max_attempts,
        )
    }

    pub fn judge_config(&self, working_dir: PathBuf) -> JudgeConfig {
        let mut config = JudgeConfig::new(working_dir).with_timeout(self.evaluation.judge_timeout);
        config.model = self.evaluation.model.clone();
        config.max_tokens = self.evaluation.max_tokens;
        config
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::policy::{classify, default_rules};
use crate::{
    BackoffPolicy, CancelReason, CancelToken, Classify, FailureClass, RecoveryAction, RecoveryRule,
};

/// Emitted before every retry sleep
#[derive(Debug, Clone)]
pub struct RetryNotice {
    pub operation: String,
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    pub delay: Duration,
    pub rule: &'static str,
    pub class: FailureClass,
    pub error: String,
}

pub type RetryObserver = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

/// A successful result and how many attempts it took
#[derive(Debug)]
pub struct Recovered<T> {
    pub value: T,
    pub attempts: u32,
}

/// Why an operation gave up
#[derive(Debug)]
pub enum RecoveryFailure<E> {
    /// Matched a fail-fast rule; never retried
    Permanent {
        error: E,
        class: FailureClass,
        rule: &'static str,
    },
    /// Retryable, but the attempt budget ran out
    Exhausted {
        error: E,
        class: FailureClass,
        rule: &'static str,
        attempts: u32,
    },
    /// Cancelled before or between attempts
    Cancelled {
        reason: CancelReason,
        attempts: u32,
        last_error: Option<E>,
    },
}

impl<E: std::fmt::Display> RecoveryFailure<E> {
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            Self::Permanent { class, .. } | Self::Exhausted { class, .. } => Some(*class),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { .. } => 1,
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// One-line explanation suitable for a skip reason
    pub fn describe(&self) -> String {
        match self {
            Self::Permanent { error, rule, .. } => format!("{} ({})", error, rule),
            Self::Exhausted {
                error, attempts, ..
            } => format!("gave up after {} attempts: {}", attempts, error),
            Self::Cancelled { reason, .. } => format!("cancelled: {}", reason),
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RecoveryFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Runs remote operations under the ordered recovery table
#[derive(Clone)]
pub struct RecoveryDispatcher {
    rules: Vec<RecoveryRule>,
    backoff: BackoffPolicy,
    /// Global cap applied on top of each rule's own limit
    max_attempts: u32,
    observer: Option<RetryObserver>,
}

impl Default for RecoveryDispatcher {
    fn default() -> Self {
        Self::new(BackoffPolicy::default(), 5)
    }
}

impl std::fmt::Debug for RecoveryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryDispatcher")
            .field("rules", &self.rules)
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl RecoveryDispatcher {
    pub fn new(backoff: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            rules: default_rules(),
            backoff,
            max_attempts: max_attempts.max(1),
            observer: None,
        }
    }

    pub fn with_rules(mut self, rules: Vec<RecoveryRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Insert a rule ahead of the built-in table
    pub fn with_rule_first(mut self, rule: RecoveryRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn rules(&self) -> &[RecoveryRule] {
        &self.rules
    }

    /// Classify a failure without running anything
    pub fn classify<E: Classify>(&self, error: &E) -> (&RecoveryRule, FailureClass) {
        let signal = error.failure_signal();
        let rule = classify(&self.rules, &signal);
        (rule, rule.class_for(&signal))
    }

    /// Run `op` until it succeeds, a fail-fast rule matches, the attempt
    /// budget is spent, or `cancel` fires. `op` receives the 1-based attempt.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<Recovered<T>, RecoveryFailure<E>>
    where
        E: Classify + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        let mut last_error: Option<E> = None;

        loop {
            if let Some(reason) = cancel.reason() {
                return Err(RecoveryFailure::Cancelled {
                    reason,
                    attempts: attempt,
                    last_error,
                });
            }

            attempt += 1;
            let result = match cancel.run_until(op(attempt)).await {
                Ok(result) => result,
                Err(cancelled) => {
                    return Err(RecoveryFailure::Cancelled {
                        reason: cancelled.0,
                        attempts: attempt,
                        last_error,
                    })
                }
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempts = attempt, "Recovered after retry");
                    }
                    return Ok(Recovered {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            let signal = error.failure_signal();
            let rule = classify(&self.rules, &signal);
            let class = rule.class_for(&signal);

            let delay = match rule.action {
                RecoveryAction::FailFast => {
                    debug!(operation, rule = rule.name, %class, error = %error, "Not retrying");
                    return Err(RecoveryFailure::Permanent {
                        error,
                        class,
                        rule: rule.name,
                    });
                }
                RecoveryAction::FixedDelay(delay) => delay,
                RecoveryAction::Backoff => self.backoff.delay(attempt, signal.retry_after),
            };

            if attempt >= rule.max_attempts.min(self.max_attempts) {
                warn!(operation, attempts = attempt, rule = rule.name, error = %error, "Retries exhausted");
                return Err(RecoveryFailure::Exhausted {
                    error,
                    class,
                    rule: rule.name,
                    attempts: attempt,
                });
            }

            let notice = RetryNotice {
                operation: operation.to_string(),
                attempt,
                delay,
                rule: rule.name,
                class,
                error: error.to_string(),
            };
            warn!(
                operation,
                attempt,
                rule = rule.name,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after failure"
            );
            if let Some(observer) = &self.observer {
                observer(&notice);
            }

            last_error = Some(error);
            if let Err(cancelled) = cancel.sleep(delay).await {
                return Err(RecoveryFailure::Cancelled {
                    reason: cancelled.0,
                    attempts: attempt,
                    last_error,
                });
            }
        }
    }
}

use std::time::Duration;

use crate::{FailureClass, FailureSignal, Origin};

/// What to do once a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry after capped exponential backoff with jitter
    Backoff,
    /// Retry after a fixed pause (lock contention clears on its own)
    FixedDelay(Duration),
    /// Do not retry
    FailFast,
}

/// One row of the recovery table. Rows are evaluated in order; the first
/// matching row wins.
#[derive(Clone)]
pub struct RecoveryRule {
    pub name: &'static str,
    pub matches: fn(&FailureSignal) -> bool,
    pub class: FailureClass,
    pub action: RecoveryAction,
    /// Total attempts allowed while this rule keeps matching
    pub max_attempts: u32,
}

impl std::fmt::Debug for RecoveryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryRule")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("action", &self.action)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl RecoveryRule {
    /// The effective class for a signal; retryable content-side rules become
    /// `JudgeUnavailable` when the judge is the one failing.
    pub fn class_for(&self, signal: &FailureSignal) -> FailureClass {
        match (self.class, signal.origin) {
            (FailureClass::Transient, Origin::Judge) => FailureClass::JudgeUnavailable,
            (class, _) => class,
        }
    }
}

fn is_lock_contention(s: &FailureSignal) -> bool {
    s.mentions(&["index.lock", "lock file", "unable to create lock", "resource busy"])
}

fn is_judge_overloaded(s: &FailureSignal) -> bool {
    s.origin == Origin::Judge
        && (s.status == Some(529) || s.status == Some(503) || s.mentions(&["overloaded"]))
}

fn is_rate_limited(s: &FailureSignal) -> bool {
    s.status == Some(429) || s.mentions(&["rate limit", "rate-limit", "too many requests"])
}

fn is_auth_failure(s: &FailureSignal) -> bool {
    s.status == Some(401)
        || s.status == Some(403)
        || s.mentions(&["permission denied", "unauthorized", "forbidden", "bad credentials"])
}

fn is_not_found(s: &FailureSignal) -> bool {
    s.status == Some(404) || s.status == Some(410) || s.mentions(&["not found"])
}

fn is_malformed(s: &FailureSignal) -> bool {
    s.status == Some(400)
        || s.status == Some(422)
        || s.mentions(&["invalid reference", "malformed"])
}

fn is_timeout(s: &FailureSignal) -> bool {
    s.status == Some(408) || s.status == Some(504) || s.mentions(&["timed out", "timeout"])
}

fn is_connection_failure(s: &FailureSignal) -> bool {
    s.mentions(&[
        "connection failed",
        "connection reset",
        "connection refused",
        "connection closed",
        "broken pipe",
        "error sending request",
        "dns error",
    ])
}

fn is_server_error(s: &FailureSignal) -> bool {
    s.status_in(500..=599)
}

fn is_parse_failure(s: &FailureSignal) -> bool {
    s.mentions(&["failed to parse", "invalid json", "unexpected response shape"])
}

/// The built-in recovery table, in priority order.
pub fn default_rules() -> Vec<RecoveryRule> {
    vec![
        RecoveryRule {
            name: "lock-contention",
            matches: is_lock_contention,
            class: FailureClass::Transient,
            action: RecoveryAction::FixedDelay(Duration::from_millis(500)),
            max_attempts: 3,
        },
        RecoveryRule {
            name: "judge-overloaded",
            matches: is_judge_overloaded,
            class: FailureClass::JudgeUnavailable,
            action: RecoveryAction::Backoff,
            max_attempts: 5,
        },
        RecoveryRule {
            name: "rate-limited",
            matches: is_rate_limited,
            class: FailureClass::Transient,
            action: RecoveryAction::Backoff,
            max_attempts: 5,
        },
        RecoveryRule {
            name: "auth",
            matches: is_auth_failure,
            class: FailureClass::Permanent,
            action: RecoveryAction::FailFast,
            max_attempts: 1,
        },
        RecoveryRule {
            name: "not-found",
            matches: is_not_found,
            class: FailureClass::Permanent,
            action: RecoveryAction::FailFast,
            max_attempts: 1,
        },
        RecoveryRule {
            name: "malformed",
            matches: is_malformed,
            class: FailureClass::Permanent,
            action: RecoveryAction::FailFast,
            max_attempts: 1,
        },
        RecoveryRule {
            name: "timeout",
            matches: is_timeout,
            class: FailureClass::Transient,
            action: RecoveryAction::Backoff,
            max_attempts: 3,
        },
        RecoveryRule {
            name: "connection",
            matches: is_connection_failure,
            class: FailureClass::Transient,
            action: RecoveryAction::Backoff,
            max_attempts: 3,
        },
        RecoveryRule {
            name: "server-error",
            matches: is_server_error,
            class: FailureClass::Transient,
            action: RecoveryAction::Backoff,
            max_attempts: 3,
        },
        RecoveryRule {
            name: "parse",
            matches: is_parse_failure,
            class: FailureClass::Parse,
            action: RecoveryAction::FailFast,
            max_attempts: 1,
        },
    ]
}

/// Row used when nothing in the table matches
pub(crate) const UNCLASSIFIED: RecoveryRule = RecoveryRule {
    name: "unclassified",
    matches: |_| true,
    class: FailureClass::Permanent,
    action: RecoveryAction::FailFast,
    max_attempts: 1,
};

pub(crate) fn classify<'a>(rules: &'a [RecoveryRule], signal: &FailureSignal) -> &'a RecoveryRule {
    rules
        .iter()
        .find(|rule| (rule.matches)(signal))
        .unwrap_or(&UNCLASSIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_name(signal: FailureSignal) -> &'static str {
        let rules = default_rules();
        classify(&rules, &signal).name
    }

    #[test]
    fn test_rate_limit_by_status_and_message() {
        assert_eq!(
            rule_name(FailureSignal::new(Origin::Content, "HTTP error").with_status(429)),
            "rate-limited"
        );
        assert_eq!(
            rule_name(FailureSignal::new(Origin::Content, "API rate limit exceeded")),
            "rate-limited"
        );
    }

    #[test]
    fn test_judge_overload_takes_priority_over_server_error() {
        let signal = FailureSignal::new(Origin::Judge, "service unavailable").with_status(503);
        assert_eq!(rule_name(signal), "judge-overloaded");

        let content = FailureSignal::new(Origin::Content, "service unavailable").with_status(503);
        assert_eq!(rule_name(content), "server-error");
    }

    #[test]
    fn test_permanent_failures_fail_fast() {
        let rules = default_rules();
        for signal in [
            FailureSignal::new(Origin::Content, "x").with_status(404),
            FailureSignal::new(Origin::Content, "Bad credentials"),
            FailureSignal::new(Origin::Content, "invalid reference 'a:b:c'"),
        ] {
            let rule = classify(&rules, &signal);
            assert_eq!(rule.class, FailureClass::Permanent);
            assert_eq!(rule.action, RecoveryAction::FailFast);
        }
    }

    #[test]
    fn test_lock_file_uses_fixed_delay() {
        let rules = default_rules();
        let signal = FailureSignal::new(
            Origin::Content,
            "Unable to create '/repo/.git/index.lock': File exists",
        );
        let rule = classify(&rules, &signal);
        assert!(matches!(rule.action, RecoveryAction::FixedDelay(_)));
    }

    #[test]
    fn test_transient_judge_failure_reports_unavailable() {
        let rules = default_rules();
        let signal = FailureSignal::new(Origin::Judge, "judge call timed out after 30s");
        let rule = classify(&rules, &signal);
        assert_eq!(rule.name, "timeout");
        assert_eq!(rule.class_for(&signal), FailureClass::JudgeUnavailable);
    }

    #[test]
    fn test_unknown_failure_is_unclassified() {
        assert_eq!(
            rule_name(FailureSignal::new(Origin::Content, "something odd")),
            "unclassified"
        );
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Remote content API or local repository
    Content,
    /// Judgment service
    Judge,
}

/// Failure taxonomy shared by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Rate limiting, timeouts, connection resets, 5xx
    Transient,
    /// Not found, permission denied, malformed reference
    Permanent,
    /// Budget exceeded, cache write failure
    ResourceExhausted,
    /// Judgment service overloaded or unavailable
    JudgeUnavailable,
    /// Judge output did not match an expected shape
    Parse,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Transient | FailureClass::JudgeUnavailable)
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
            FailureClass::ResourceExhausted => write!(f, "resource-exhausted"),
            FailureClass::JudgeUnavailable => write!(f, "judge-unavailable"),
            FailureClass::Parse => write!(f, "parse"),
        }
    }
}

/// What the recovery table looks at when classifying a failure
#[derive(Debug, Clone)]
pub struct FailureSignal {
    pub origin: Origin,
    /// HTTP-equivalent status code, when the failure carries one
    pub status: Option<u16>,
    /// Lowercased error message
    pub message: String,
    /// Server-provided retry hint
    pub retry_after: Option<Duration>,
}

impl FailureSignal {
    pub fn new(origin: Origin, message: impl AsRef<str>) -> Self {
        Self {
            origin,
            status: None,
            message: message.as_ref().to_lowercase(),
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.message.contains(n))
    }

    pub fn status_in(&self, range: std::ops::RangeInclusive<u16>) -> bool {
        self.status.is_some_and(|s| range.contains(&s))
    }
}

/// Implemented by error types that can cross a remote boundary
pub trait Classify {
    fn failure_signal(&self) -> FailureSignal;
}

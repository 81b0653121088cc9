//! # promptjudge-recovery
//!
//! Failure classification and bounded retry for every remote call made by
//! promptjudge (content fetches and judgment-service calls).
//!
//! ## Key Types
//!
//! - [`Classify`] - Implemented by remote-facing error types
//! - [`RecoveryRule`] - One row of the ordered recovery table
//! - [`RecoveryDispatcher`] - Runs an operation under the table's policy
//! - [`CancelToken`] - Cooperative cancellation with an optional deadline
//! - [`CallLimiter`] - Calls-per-minute window shared by all remote callers
//!
//! ## Failure taxonomy
//!
//! | Class | Examples | Policy |
//! |---|---|---|
//! | `Transient` | 429, timeouts, resets, 5xx, lock files | capped exponential backoff |
//! | `Permanent` | 404, 401/403, malformed reference | fail fast, surface as skip |
//! | `ResourceExhausted` | budget exceeded | never raised as an error |
//! | `JudgeUnavailable` | overloaded / rate-limited judge | capped exponential backoff |
//! | `Parse` | unexpected judge output | fail fast, caller falls back |

mod backoff;
mod cancel;
mod classify;
mod dispatcher;
mod limiter;
mod policy;

pub use backoff::BackoffPolicy;
pub use cancel::{CancelReason, CancelToken, Cancelled};
pub use classify::{Classify, FailureClass, FailureSignal, Origin};
pub use dispatcher::{Recovered, RecoveryDispatcher, RecoveryFailure, RetryNotice, RetryObserver};
pub use limiter::{CallLimiter, CALL_MARGIN, CALL_WINDOW};
pub use policy::{default_rules, RecoveryAction, RecoveryRule};

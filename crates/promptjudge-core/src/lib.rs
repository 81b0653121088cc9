//! # promptjudge-core
//!
//! Run orchestration: validate a request, load bounded context, evaluate
//! both candidates, compare and synthesize a verdict.
//!
//! ## Key Types
//!
//! - [`RunRequest`] - Baseline, variant, expert and context references
//! - [`RunConfig`] - Budget, loading, cache, retry and evaluation settings
//! - [`RunState`] - Per-run budget, cancel token and warnings
//! - [`Runner`] - Drives one run
//! - [`RunOutcome`] - Completed, invalid or aborted
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut runner = Runner::new(judge, source, cache, config, logger)?;
//! let cancel = runner.cancel_token();
//! let outcome = runner.run(&request, cancel).await;
//! if let Some(result) = outcome.result() {
//!     println!("{}", render_markdown(result));
//! }
//! ```

mod config;
mod error;
mod outcome;
mod report;
mod request;
mod runner;
mod state;

pub use config::{EvaluationSettings, RetrySettings, RunConfig};
pub use error::RunError;
pub use outcome::{RunOutcome, RunResult, UsageReport};
pub use report::render_markdown;
pub use request::RunRequest;
pub use runner::{load_observer, retry_observer, Runner};
pub use state::RunState;

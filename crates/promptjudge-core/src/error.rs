use thiserror::Error;

/// Errors that stop a run before any loading starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("The {which} prompt is empty")]
    EmptyCandidate { which: &'static str },

    #[error("Baseline and variant are identical; nothing to compare")]
    IdenticalCandidates,

    #[error("The expert definition is empty")]
    EmptyExpert,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

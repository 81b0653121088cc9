//! Where content comes from.
//!
//! A source answers two questions about a reference: what is there
//! (`describe`, cheap, carries sizes) and what are the bytes (`fetch`).

mod git;
mod github;

pub use git::GitRepoSource;
pub use github::GitHubSource;

use std::time::Duration;

use async_trait::async_trait;
use promptjudge_recovery::{Classify, FailureSignal, Origin};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ContentReference;

/// One entry of a collection listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    /// Path from the collection root
    pub path: String,
    pub size: u64,
    pub is_collection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteNode {
    File { size: u64 },
    Collection { entries: Vec<RemoteEntry> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContent {
    pub bytes: Vec<u8>,
    pub size: u64,
}

impl RemoteContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self { bytes, size }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("not found: {reference}")]
    NotFound { reference: String },

    #[error("permission denied for {reference}: {message}")]
    PermissionDenied { reference: String, message: String },

    #[error("malformed request for {reference}: {message}")]
    Malformed { reference: String, message: String },

    #[error("rate limited by content API")]
    RateLimited { retry_after: Option<Duration> },

    #[error("content API server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout(e.to_string())
        } else if e.is_decode() {
            SourceError::InvalidResponse(e.to_string())
        } else {
            SourceError::Connection(e.to_string())
        }
    }
}

impl Classify for SourceError {
    fn failure_signal(&self) -> FailureSignal {
        let signal = FailureSignal::new(Origin::Content, self.to_string());
        match self {
            SourceError::NotFound { .. } => signal.with_status(404),
            SourceError::PermissionDenied { .. } => signal.with_status(403),
            SourceError::Malformed { .. } => signal.with_status(422),
            SourceError::RateLimited { retry_after } => {
                signal.with_status(429).with_retry_after(*retry_after)
            }
            SourceError::Server { status, .. } => signal.with_status(*status),
            SourceError::Timeout(_) => signal.with_status(408),
            SourceError::Connection(_) | SourceError::InvalidResponse(_) => signal,
            SourceError::Git(e) => match e.code() {
                git2::ErrorCode::NotFound => signal.with_status(404),
                git2::ErrorCode::Locked => {
                    FailureSignal::new(Origin::Content, format!("lock file: {}", e))
                }
                _ => signal,
            },
        }
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Whether the reference is a file or a collection, with sizes
    async fn describe(&self, reference: &ContentReference) -> Result<RemoteNode, SourceError>;

    /// The bytes of a single file
    async fn fetch(&self, reference: &ContentReference) -> Result<RemoteContent, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptjudge_recovery::{FailureClass, RecoveryDispatcher};

    #[test]
    fn test_source_errors_classify_into_taxonomy() {
        let dispatcher = RecoveryDispatcher::default();
        let cases = [
            (
                SourceError::NotFound {
                    reference: "x".into(),
                },
                FailureClass::Permanent,
            ),
            (
                SourceError::RateLimited { retry_after: None },
                FailureClass::Transient,
            ),
            (
                SourceError::Server {
                    status: 502,
                    message: "bad gateway".into(),
                },
                FailureClass::Transient,
            ),
            (SourceError::Timeout("slow".into()), FailureClass::Transient),
            (
                SourceError::Connection("reset".into()),
                FailureClass::Transient,
            ),
            (
                SourceError::PermissionDenied {
                    reference: "x".into(),
                    message: "no".into(),
                },
                FailureClass::Permanent,
            ),
        ];
        for (error, expected) in cases {
            let (_, class) = dispatcher.classify(&error);
            assert_eq!(class, expected, "{}", error);
        }
    }
}

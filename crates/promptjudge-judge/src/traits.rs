use async_trait::async_trait;
use promptjudge_recovery::{Classify, FailureSignal, Origin};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::JudgeOutput;

/// Errors that can occur during a judgment call
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Failed to spawn judge process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Judge call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Judge configuration error: {0}")]
    ConfigError(String),

    #[error("Judge exited with code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },

    #[error("Judge rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Judge overloaded (HTTP {status})")]
    Overloaded { status: u16 },

    #[error("Judge server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Judge rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Judge connection failed: {0}")]
    Connection(String),

    #[error("Judge returned an unexpected response shape: {0}")]
    InvalidResponse(String),
}

impl Classify for JudgeError {
    fn failure_signal(&self) -> FailureSignal {
        let signal = FailureSignal::new(Origin::Judge, self.to_string());
        match self {
            JudgeError::RateLimited { retry_after } => {
                signal.with_status(429).with_retry_after(*retry_after)
            }
            JudgeError::Overloaded { status }
            | JudgeError::Server { status, .. }
            | JudgeError::Rejected { status, .. } => signal.with_status(*status),
            JudgeError::Timeout(_) => signal.with_status(408),
            // Missing binaries and bad configuration never fix themselves
            JudgeError::SpawnFailed(_) | JudgeError::ConfigError(_) => signal.with_status(400),
            // CLI failures are classified by what they printed
            JudgeError::ExecutionFailed { .. }
            | JudgeError::Connection(_)
            | JudgeError::InvalidResponse(_) => signal,
        }
    }
}

/// One judgment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeRequest {
    /// Pass-specific framing
    pub system: String,
    pub message: String,
}

impl JudgeRequest {
    pub fn new(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            message: message.into(),
        }
    }
}

/// Configuration for judge calls
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Working directory for CLI judges
    pub working_dir: PathBuf,
    /// Per-call timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables for CLI judges
    pub env_vars: HashMap<String, String>,
    /// Model to use (if the judge supports it)
    pub model: Option<String>,
    /// Response length cap for the HTTP judge
    pub max_tokens: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: Some(Duration::from_secs(120)),
            env_vars: HashMap::new(),
            model: None,
            max_tokens: 2048,
        }
    }
}

impl JudgeConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Supported judge backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JudgeType {
    ClaudeCli,
    OpenCode,
    Api,
}

impl std::fmt::Display for JudgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JudgeType::ClaudeCli => write!(f, "claude"),
            JudgeType::OpenCode => write!(f, "opencode"),
            JudgeType::Api => write!(f, "api"),
        }
    }
}

impl std::str::FromStr for JudgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(JudgeType::ClaudeCli),
            "opencode" | "open-code" => Ok(JudgeType::OpenCode),
            "api" | "anthropic" => Ok(JudgeType::Api),
            _ => Err(format!("Unknown judge type: {}", s)),
        }
    }
}

/// The judgment service abstraction
#[async_trait]
pub trait Judge: Send + Sync {
    /// Human-readable name (e.g., "Claude CLI")
    fn name(&self) -> &str;

    fn judge_type(&self) -> JudgeType;

    /// Check if the judge can be reached
    async fn is_available(&self) -> bool;

    /// Send one request and return the judge's free text
    async fn judge(
        &self,
        request: &JudgeRequest,
        config: &JudgeConfig,
    ) -> Result<JudgeOutput, JudgeError>;
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output captured from a judge subprocess
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code from the process (-1 when killed by a signal)
    pub exit_code: i32,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn new(stdout: String, stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n\n--- stderr ---\n{}", self.stdout, self.stderr)
        }
    }
}

/// The judge's answer to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutput {
    pub text: String,
    /// Name of the backend that answered
    pub judge: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl JudgeOutput {
    pub fn new(text: impl Into<String>, judge: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            judge: judge.into(),
            duration,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

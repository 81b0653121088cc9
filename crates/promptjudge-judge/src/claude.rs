use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::{Judge, JudgeConfig, JudgeError, JudgeOutput, JudgeRequest, JudgeType, ProcessSpawner};

/// Judge backed by the `claude` CLI in print mode
pub struct ClaudeCliJudge {
    binary_path: PathBuf,
}

impl ClaudeCliJudge {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("claude"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }

    fn args<'a>(request: &'a JudgeRequest, config: &'a JudgeConfig) -> Vec<&'a str> {
        let mut args = vec!["--print"]; // Non-interactive mode, output only

        if !request.system.is_empty() {
            args.push("--system-prompt");
            args.push(&request.system);
        }

        if let Some(ref model) = config.model {
            args.push("--model");
            args.push(model);
        }

        // Messages starting with '-' must not be read as options
        args.push("--");
        args.push(&request.message);
        args
    }
}

impl Default for ClaudeCliJudge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Judge for ClaudeCliJudge {
    fn name(&self) -> &str {
        "Claude CLI"
    }

    fn judge_type(&self) -> JudgeType {
        JudgeType::ClaudeCli
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn judge(
        &self,
        request: &JudgeRequest,
        config: &JudgeConfig,
    ) -> Result<JudgeOutput, JudgeError> {
        debug!(
            judge = self.name(),
            message_len = request.message.len(),
            "Executing judge"
        );

        let args = Self::args(request, config);
        let output = ProcessSpawner::spawn(&self.binary_path, &args, config).await?;

        if !output.success() {
            return Err(JudgeError::ExecutionFailed {
                exit_code: output.exit_code,
                stderr: output.combined_output(),
            });
        }

        Ok(JudgeOutput::new(output.stdout, self.name(), output.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_put_message_after_separator() {
        let request = JudgeRequest::new("Be strict.", "-compare these");
        let config = JudgeConfig::default().with_model("opus".to_string());

        let args = ClaudeCliJudge::args(&request, &config);
        assert_eq!(
            args,
            vec![
                "--print",
                "--system-prompt",
                "Be strict.",
                "--model",
                "opus",
                "--",
                "-compare these"
            ]
        );
    }

    #[test]
    fn test_args_without_system_or_model() {
        let request = JudgeRequest::new("", "hello");
        let config = JudgeConfig::default();
        let args = ClaudeCliJudge::args(&request, &config);
        assert_eq!(args, vec!["--print", "--", "hello"]);
    }
}

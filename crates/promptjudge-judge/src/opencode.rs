use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::{Judge, JudgeConfig, JudgeError, JudgeOutput, JudgeRequest, JudgeType, ProcessSpawner};

/// Judge backed by `opencode run`
pub struct OpenCodeJudge {
    binary_path: PathBuf,
}

impl OpenCodeJudge {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("opencode"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }

    /// OpenCode has no separate system prompt, so the framing leads the message
    fn prompt(request: &JudgeRequest) -> String {
        if request.system.is_empty() {
            request.message.clone()
        } else {
            format!("{}\n\n{}", request.system, request.message)
        }
    }
}

impl Default for OpenCodeJudge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Judge for OpenCodeJudge {
    fn name(&self) -> &str {
        "OpenCode"
    }

    fn judge_type(&self) -> JudgeType {
        JudgeType::OpenCode
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

        let prompt = Self::prompt(request);

        let mut args = vec!["run"];
        if let Some(ref model) = config.model {
            args.push("--model");
            args.push(model);
        }
        args.push("--prompt");
        args.push(&prompt);

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

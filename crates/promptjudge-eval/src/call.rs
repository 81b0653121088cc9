use promptjudge_judge::{Judge, JudgeConfig, JudgeError, JudgeOutput, JudgeRequest};
use promptjudge_recovery::CallLimiter;
use tracing::info;

/// One judge attempt, after waiting for room in the shared call window
pub(crate) async fn gated_judge(
    judge: &dyn Judge,
    request: &JudgeRequest,
    config: &JudgeConfig,
    limiter: Option<&CallLimiter>,
    operation: &str,
) -> Result<JudgeOutput, JudgeError> {
    if let Some(limiter) = limiter {
        limiter
            .acquire(|wait| {
                info!(
                    operation,
                    wait_ms = wait.as_millis() as u64,
                    "Waiting for API call window"
                )
            })
            .await;
    }
    judge.judge(request, config).await
}

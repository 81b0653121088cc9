//! # promptjudge-judge
//!
//! The judgment service: something that takes a system framing and a user
//! message and returns free text.
//!
//! ## Key Types
//!
//! - [`Judge`] - The trait every judgment backend implements
//! - [`JudgeRequest`] - System framing plus message
//! - [`JudgeConfig`] - Timeout, model and environment for one call
//! - [`JudgeError`] - Failures, classified for the recovery dispatcher
//!
//! ## Backends
//!
//! | Type | Transport |
//! |---|---|
//! | `claude` | `claude --print` subprocess |
//! | `opencode` | `opencode run` subprocess |
//! | `api` | Anthropic-compatible messages endpoint over HTTP |

mod api;
mod claude;
mod opencode;
mod output;
mod spawner;
mod traits;

pub use api::{ApiJudge, DEFAULT_API_BASE_URL, DEFAULT_API_MODEL};
pub use claude::ClaudeCliJudge;
pub use opencode::OpenCodeJudge;
pub use output::{JudgeOutput, ProcessOutput};
pub use spawner::ProcessSpawner;
pub use traits::{Judge, JudgeConfig, JudgeError, JudgeRequest, JudgeType};

/// Backend-specific settings for [`create_judge`]
#[derive(Debug, Clone, Default)]
pub struct JudgeSettings {
    /// Override for the CLI binary
    pub binary: Option<std::path::PathBuf>,
    /// API key for the HTTP backend
    pub api_key: Option<String>,
    /// Base URL for the HTTP backend
    pub api_base_url: Option<String>,
}

/// Create a judge by type
pub fn create_judge(
    judge_type: JudgeType,
    settings: &JudgeSettings,
) -> Result<Box<dyn Judge>, JudgeError> {
    match judge_type {
        JudgeType::ClaudeCli => Ok(Box::new(match &settings.binary {
            Some(path) => ClaudeCliJudge::with_binary_path(path.clone()),
            None => ClaudeCliJudge::new(),
        })),
        JudgeType::OpenCode => Ok(Box::new(match &settings.binary {
            Some(path) => OpenCodeJudge::with_binary_path(path.clone()),
            None => OpenCodeJudge::new(),
        })),
        JudgeType::Api => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                JudgeError::ConfigError("the api judge needs an API key".to_string())
            })?;
            let base_url = settings
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
            Ok(Box::new(ApiJudge::new(base_url, api_key)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_judge_by_type() {
        let settings = JudgeSettings::default();
        assert_eq!(
            create_judge(JudgeType::ClaudeCli, &settings)
                .unwrap()
                .judge_type(),
            JudgeType::ClaudeCli
        );
        assert_eq!(
            create_judge(JudgeType::OpenCode, &settings)
                .unwrap()
                .judge_type(),
            JudgeType::OpenCode
        );
        assert!(matches!(
            create_judge(JudgeType::Api, &settings),
            Err(JudgeError::ConfigError(_))
        ));

        let with_key = JudgeSettings {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert_eq!(
            create_judge(JudgeType::Api, &with_key).unwrap().judge_type(),
            JudgeType::Api
        );
    }
}
